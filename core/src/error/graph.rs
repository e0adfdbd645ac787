use thiserror::Error;

use crate::graph::NodeId;

/// Structural errors raised while building or validating a DAG
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate node ID: {0}")]
    DuplicateNode(NodeId),

    #[error("Node '{0}' depends on itself")]
    SelfDependency(NodeId),

    #[error("Dependency not found: node '{node_id}' depends on '{missing_dep}'")]
    MissingDependency { node_id: NodeId, missing_dep: NodeId },

    #[error("Output '{output}' references unknown node '{node_id}'")]
    UnknownOutputSource { output: String, node_id: NodeId },

    #[error("Edge index out of sync for '{0}'")]
    InconsistentEdges(NodeId),

    #[error("Invalid DAG definition: {0}")]
    Definition(String),
}
