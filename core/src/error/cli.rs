use thiserror::Error;

use super::graph::GraphError;
use super::orchestrator::OrchestratorError;

/// Errors surfaced by the `dagwave` binary, each mapped to a process exit code.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid DAG: {0}")]
    InvalidDag(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("orchestration failed: {0}")]
    Orchestrator(#[from] OrchestratorError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CliError {
    // 0: success
    // 1: run finished unsuccessfully (returned as a normal exit code)
    // 11: config error
    // 12: invalid DAG
    // 20: io error
    // 50: internal
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 11,
            Self::InvalidDag(_) => 12,
            Self::Io(_) => 20,
            Self::Orchestrator(OrchestratorError::Graph(_)) => 12,
            Self::Orchestrator(OrchestratorError::Config(_)) => 11,
            Self::Orchestrator(_) => 50,
            Self::Internal(_) => 50,
        }
    }
}

impl From<GraphError> for CliError {
    fn from(e: GraphError) -> Self {
        Self::InvalidDag(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Config("x".into()).exit_code(), 11);
        assert_eq!(
            CliError::from(GraphError::DuplicateNode(NodeId::from("a"))).exit_code(),
            12
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(CliError::from(io).exit_code(), 20);
        assert_eq!(CliError::Internal("boom".into()).exit_code(), 50);
    }
}
