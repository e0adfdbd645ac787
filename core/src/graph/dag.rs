use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node::{Node, NodeId};
use crate::error::GraphError;

/// Named DAG output mapped from a node result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagOutput {
    pub name: String,

    #[serde(alias = "source")]
    pub source_node_id: NodeId,

    /// Dotted path into the source node's output, e.g. `report.summary`.
    #[serde(default)]
    pub output_path: Option<String>,
}

impl DagOutput {
    pub fn new(name: impl Into<String>, source: impl Into<NodeId>) -> Self {
        Self {
            name: name.into(),
            source_node_id: source.into(),
            output_path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Extract this output's value from the source node's output.
    pub fn extract(&self, output: &Value) -> Option<Value> {
        let Some(path) = self.output_path.as_deref() else {
            return Some(output.clone());
        };

        let mut current = output;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }
}

/// Directed acyclic graph of task nodes.
///
/// Edges are stored twice: on each node (`dependencies`) and here as reverse
/// edges (`dependents`). Both views are updated together by [`Dag::add_node`].
#[derive(Debug, Clone)]
pub struct Dag {
    id: String,
    name: String,

    /// Nodes: node_id -> Node
    nodes: HashMap<NodeId, Node>,

    /// Original insertion order (for stable wave ordering)
    order: Vec<NodeId>,

    /// Reverse edges: node_id -> nodes that depend on it
    dependents: HashMap<NodeId, BTreeSet<NodeId>>,

    outputs: Vec<DagOutput>,
}

impl Dag {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: HashMap::new(),
            order: Vec::new(),
            dependents: HashMap::new(),
            outputs: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Insertion position of a node, used to keep output ordering stable.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|k| k.as_str() == id)
    }

    /// Nodes that directly depend on `id`.
    pub fn dependents(&self, id: &str) -> impl Iterator<Item = &NodeId> + '_ {
        self.dependents.get(id).into_iter().flat_map(|set| set.iter())
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.dependencies.len()).sum()
    }

    pub fn outputs(&self) -> &[DagOutput] {
        &self.outputs
    }

    /// Insert a node and register its reverse edges.
    ///
    /// Dependencies may name nodes that are added later; [`Dag::validate`]
    /// reports any that never appear.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        if node.dependencies.contains(&node.id) {
            return Err(GraphError::SelfDependency(node.id));
        }

        for dep in &node.dependencies {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(node.id.clone());
        }
        self.dependents.entry(node.id.clone()).or_default();
        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn add_output(&mut self, output: DagOutput) {
        self.outputs.push(output);
    }

    /// Validate dependency references, output sources and the edge index.
    ///
    /// Cycles are not checked here; see [`crate::scheduler::topological_sort`].
    pub fn validate(&self) -> Result<(), GraphError> {
        for node in self.nodes() {
            for dep in &node.dependencies {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::MissingDependency {
                        node_id: node.id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        for output in &self.outputs {
            if !self.nodes.contains_key(&output.source_node_id) {
                return Err(GraphError::UnknownOutputSource {
                    output: output.name.clone(),
                    node_id: output.source_node_id.clone(),
                });
            }
        }

        self.check_edges()
    }

    /// Verify that every dependency has a matching reverse edge and vice versa.
    pub fn check_edges(&self) -> Result<(), GraphError> {
        for node in self.nodes.values() {
            for dep in &node.dependencies {
                let registered = self
                    .dependents
                    .get(dep)
                    .is_some_and(|set| set.contains(&node.id));
                if !registered {
                    return Err(GraphError::InconsistentEdges(node.id.clone()));
                }
            }
        }

        for (dep, dependents) in &self.dependents {
            for dependent in dependents {
                let declared = self
                    .nodes
                    .get(dependent)
                    .is_some_and(|n| n.dependencies.contains(dep));
                if !declared {
                    return Err(GraphError::InconsistentEdges(dependent.clone()));
                }
            }
        }

        Ok(())
    }
}
