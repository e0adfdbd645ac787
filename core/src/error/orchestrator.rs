use thiserror::Error;

use super::graph::GraphError;
use super::task::TaskErrorCode;
use crate::permissions::PermissionError;
use crate::state::StateError;

/// Errors that abort orchestration itself.
///
/// Run failures (cycles, failed nodes, denials) are reported inside
/// `ExecutionResult`; these variants cover broken invariants and setup problems.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("config error: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Map orchestrator error to task error code
    pub fn error_code(&self) -> TaskErrorCode {
        match self {
            Self::Graph(GraphError::MissingDependency { .. }) => TaskErrorCode::MissingDependency,
            Self::Graph(_) => TaskErrorCode::InvalidInput,
            Self::State(_) => TaskErrorCode::InternalError,
            Self::Permission(_) => TaskErrorCode::PermissionDenied,
            Self::Config(_) => TaskErrorCode::InvalidInput,
        }
    }
}
