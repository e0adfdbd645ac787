use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::topology::{topological_sort, SortResult};
use crate::error::GraphError;
use crate::graph::{Dag, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    Cycle,
    MissingDependency,
    OrphanNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
    pub node_ids: Vec<NodeId>,
}

impl ValidationIssue {
    /// Orphans are reported but do not make a DAG unrunnable.
    pub fn is_error(&self) -> bool {
        !matches!(self.kind, IssueKind::OrphanNode)
    }
}

/// Structural lint of a DAG. An empty list means the DAG is runnable as-is.
pub fn validate_dag(dag: &Dag) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for node in dag.nodes() {
        for dep in &node.dependencies {
            if !dag.contains(dep.as_str()) {
                issues.push(ValidationIssue {
                    kind: IssueKind::MissingDependency,
                    message: format!("Node '{}' depends on unknown node '{}'", node.id, dep),
                    node_ids: vec![node.id.clone(), dep.clone()],
                });
            }
        }
    }

    // Missing dependencies already explain why sorting fails.
    if issues.is_empty() {
        if let SortResult::Cycle { cycle } = topological_sort(dag) {
            issues.push(ValidationIssue {
                kind: IssueKind::Cycle,
                message: format!("Cycle detected: {}", format_path(&cycle)),
                node_ids: cycle,
            });
        }
    }

    if dag.len() > 1 {
        for node in dag.nodes() {
            let has_dependents = dag.dependents(node.id.as_str()).next().is_some();
            if node.dependencies.is_empty() && !has_dependents {
                issues.push(ValidationIssue {
                    kind: IssueKind::OrphanNode,
                    message: format!("Node '{}' is not connected to any other node", node.id),
                    node_ids: vec![node.id.clone()],
                });
            }
        }
    }

    issues
}

/// Shape statistics of a DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub root_nodes: usize,
    pub leaf_nodes: usize,
    pub max_depth: usize,
    pub wave_count: usize,
    pub max_parallelism: usize,
    pub avg_parallelism: f64,
}

pub fn compute_stats(dag: &Dag) -> DagStats {
    let sorted = topological_sort(dag);
    let waves = sorted.waves();

    let root_nodes = dag.nodes().filter(|n| n.dependencies.is_empty()).count();
    let leaf_nodes = dag
        .nodes()
        .filter(|n| dag.dependents(n.id.as_str()).next().is_none())
        .count();
    let max_parallelism = waves.iter().map(|w| w.node_ids.len()).max().unwrap_or(0);
    let avg_parallelism = if waves.is_empty() {
        0.0
    } else {
        dag.len() as f64 / waves.len() as f64
    };

    DagStats {
        total_nodes: dag.len(),
        total_edges: dag.edge_count(),
        root_nodes,
        leaf_nodes,
        max_depth: waves.len(),
        wave_count: waves.len(),
        max_parallelism,
        avg_parallelism,
    }
}

/// Longest weighted path through the DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalPath {
    pub path: Vec<NodeId>,
    pub length: u64,
}

/// Find the critical path. Nodes without an entry in `weights` weigh 1.
///
/// Returns an empty path for cyclic DAGs.
pub fn find_critical_path(dag: &Dag, weights: Option<&HashMap<NodeId, u64>>) -> CriticalPath {
    let sorted = topological_sort(dag);
    let order = sorted.order();
    if order.is_empty() {
        return CriticalPath {
            path: Vec::new(),
            length: 0,
        };
    }

    let weight_of = |id: &NodeId| weights.and_then(|w| w.get(id)).copied().unwrap_or(1);

    let mut dist: HashMap<&NodeId, u64> = HashMap::new();
    let mut predecessor: HashMap<&NodeId, &NodeId> = HashMap::new();

    for id in order {
        let Some(node) = dag.node(id.as_str()) else {
            continue;
        };
        let mut best: Option<(&NodeId, u64)> = None;
        for dep in &node.dependencies {
            let d = dist.get(dep).copied().unwrap_or(0);
            if best.map_or(true, |(_, b)| d > b) {
                best = Some((dep, d));
            }
        }
        let base = best.map_or(0, |(_, d)| d);
        if let Some((dep, _)) = best {
            predecessor.insert(id, dep);
        }
        dist.insert(id, base + weight_of(id));
    }

    // First node (in order) with the maximum distance ends the path.
    let mut end: Option<(&NodeId, u64)> = None;
    for id in order {
        let d = dist.get(id).copied().unwrap_or(0);
        if end.map_or(true, |(_, best)| d > best) {
            end = Some((id, d));
        }
    }

    let Some((end_id, length)) = end else {
        return CriticalPath {
            path: Vec::new(),
            length: 0,
        };
    };

    let mut path = vec![end_id.clone()];
    let mut cursor = end_id;
    while let Some(prev) = predecessor.get(cursor) {
        path.push((*prev).clone());
        cursor = *prev;
    }
    path.reverse();

    CriticalPath { path, length }
}

/// Every node that `id` depends on, directly or transitively.
pub fn transitive_dependencies(dag: &Dag, id: &str) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<NodeId> = dag
        .node(id)
        .map(|n| n.dependencies.iter().cloned().collect())
        .unwrap_or_default();

    while let Some(current) = stack.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(node) = dag.node(current.as_str()) {
            stack.extend(node.dependencies.iter().cloned());
        }
    }
    seen
}

/// Every node that depends on `id`, directly or transitively.
pub fn transitive_dependents(dag: &Dag, id: &str) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<NodeId> = dag.dependents(id).cloned().collect();

    while let Some(current) = stack.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        stack.extend(dag.dependents(current.as_str()).cloned());
    }
    seen
}

/// Copy the listed nodes into a new DAG, dropping edges that leave the set.
pub fn extract_subgraph(dag: &Dag, node_ids: &[NodeId]) -> Result<Dag, GraphError> {
    let keep: HashSet<&NodeId> = node_ids.iter().collect();
    let mut sub = Dag::new(format!("{}-sub", dag.id()), format!("{} (subgraph)", dag.name()));

    for node in dag.nodes().filter(|n| keep.contains(&n.id)) {
        let mut copy = node.clone();
        copy.dependencies.retain(|d| keep.contains(d));
        sub.add_node(copy)?;
    }
    for output in dag.outputs() {
        if keep.contains(&output.source_node_id) {
            sub.add_output(output.clone());
        }
    }

    Ok(sub)
}

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
