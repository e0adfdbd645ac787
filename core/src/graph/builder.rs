use super::dag::{Dag, DagOutput};
use super::node::{Node, NodeKind};
use crate::error::GraphError;

/// Fluent DAG construction; validates on [`DagBuilder::build`].
#[derive(Debug, Clone)]
pub struct DagBuilder {
    id: String,
    name: String,
    nodes: Vec<Node>,
    outputs: Vec<DagOutput>,
}

impl DagBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Shorthand for a generic task with the given dependencies.
    pub fn task(self, id: &str, deps: &[&str]) -> Self {
        self.node(Node::new(id, NodeKind::GenericTask).depends_on(deps.iter().copied()))
    }

    pub fn output(mut self, name: &str, source: &str) -> Self {
        self.outputs.push(DagOutput::new(name, source));
        self
    }

    pub fn output_at(mut self, output: DagOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn build(self) -> Result<Dag, GraphError> {
        let mut dag = Dag::new(self.id, self.name);
        for node in self.nodes {
            dag.add_node(node)?;
        }
        for output in self.outputs {
            dag.add_output(output);
        }
        dag.validate()?;
        Ok(dag)
    }
}
