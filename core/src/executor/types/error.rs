use thiserror::Error;

use crate::error::TaskErrorCode;
use crate::graph::NodeId;

/// Errors raised by executor backends.
///
/// A task that ran and failed is reported as an unsuccessful
/// [`super::ExecutionResponse`]; these variants cover the cases where no
/// response could be produced at all.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    #[error("node {node_id} timed out after {timeout_ms}ms")]
    Timeout { node_id: NodeId, timeout_ms: u64 },

    #[error("cancelled")]
    Cancelled(NodeId),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    pub fn error_code(&self) -> TaskErrorCode {
        match self {
            Self::Timeout { .. } => TaskErrorCode::Timeout,
            Self::Cancelled(_) => TaskErrorCode::InternalError,
            Self::Unavailable(_) | Self::Backend(_) | Self::Io(_) => TaskErrorCode::ToolError,
        }
    }
}
