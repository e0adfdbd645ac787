use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

/// 任务错误代码（闭合分类）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskErrorCode {
    Timeout,
    RateLimited,
    ModelError,
    ToolError,
    McpError,
    InvalidInput,
    InvalidOutput,
    SchemaMismatch,
    PermissionDenied,
    ScopeViolation,
    IsolationBreach,
    CycleDetected,
    MissingDependency,
    OrphanNode,
    InternalError,
    UnknownError,
}

impl TaskErrorCode {
    /// Codes that a caller may reasonably retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::ModelError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::ModelError => "MODEL_ERROR",
            Self::ToolError => "TOOL_ERROR",
            Self::McpError => "MCP_ERROR",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidOutput => "INVALID_OUTPUT",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ScopeViolation => "SCOPE_VIOLATION",
            Self::IsolationBreach => "ISOLATION_BREACH",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::MissingDependency => "MISSING_DEPENDENCY",
            Self::OrphanNode => "ORPHAN_NODE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for TaskErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error attached to a node (or to the whole run when `source_node_id` is `None`).
///
/// `retryable` is advisory: nothing in the orchestrator retries on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub code: TaskErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_node_id: Option<NodeId>,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl TaskError {
    pub fn new(code: TaskErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source_node_id: None,
            retryable: code.is_retryable(),
            details: None,
        }
    }

    pub fn for_node(code: TaskErrorCode, node_id: &NodeId, message: impl Into<String>) -> Self {
        Self::new(code, message).with_source(node_id.clone())
    }

    pub fn with_source(mut self, node_id: NodeId) -> Self {
        self.source_node_id = Some(node_id);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_node_id {
            Some(node) => write!(f, "[{}] {}: {}", self.code, node, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_follows_code() {
        assert!(TaskError::new(TaskErrorCode::Timeout, "slow").retryable);
        assert!(!TaskError::new(TaskErrorCode::PermissionDenied, "no").retryable);
        assert!(
            TaskError::new(TaskErrorCode::ToolError, "boom")
                .with_retryable(true)
                .retryable
        );
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&TaskErrorCode::CycleDetected).unwrap();
        assert_eq!(json, "\"CYCLE_DETECTED\"");
        assert_eq!(TaskErrorCode::CycleDetected.to_string(), "CYCLE_DETECTED");
    }

    #[test]
    fn test_display_includes_node() {
        let err = TaskError::for_node(TaskErrorCode::ToolError, &NodeId::from("b"), "exit 1");
        assert_eq!(err.to_string(), "[TOOL_ERROR] b: exit 1");
    }
}
