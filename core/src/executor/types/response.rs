use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ExecutorError;
use crate::error::{TaskError, TaskErrorCode};
use crate::graph::{ModelTier, NodeId};
use crate::state::{ResultMetadata, TaskResult, TokenUsage};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub executor: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Backend answer for one [`super::ExecutionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub success: bool,
    pub node_id: NodeId,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub metadata: ResponseMetadata,
}

impl ExecutionResponse {
    pub fn success(node_id: NodeId, output: Value, executor: &str) -> Self {
        Self {
            success: true,
            node_id,
            output,
            confidence: None,
            error: None,
            token_usage: None,
            metadata: ResponseMetadata {
                executor: executor.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn failure(node_id: NodeId, error: TaskError, executor: &str) -> Self {
        let error = if error.source_node_id.is_some() {
            error
        } else {
            error.with_source(node_id.clone())
        };
        Self {
            success: false,
            node_id,
            output: Value::Null,
            confidence: None,
            error: Some(error),
            token_usage: None,
            metadata: ResponseMetadata {
                executor: executor.to_string(),
                ..Default::default()
            },
        }
    }

    /// Convert an executor error into a failed response for `node_id`.
    pub fn from_error(node_id: NodeId, err: &ExecutorError, executor: &str) -> Self {
        let error = TaskError::for_node(err.error_code(), &node_id, err.to_string());
        Self::failure(node_id, error, executor)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.metadata.duration_ms = duration_ms;
        self
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.metadata.exit_code = Some(exit_code);
        self
    }

    /// Error to record when the response is unsuccessful.
    pub fn failure_error(&self) -> TaskError {
        self.error.clone().unwrap_or_else(|| {
            TaskError::for_node(
                TaskErrorCode::ToolError,
                &self.node_id,
                "executor reported failure without an error",
            )
        })
    }

    pub fn into_task_result(self, model: Option<ModelTier>) -> TaskResult {
        let metadata = ResultMetadata {
            executor: self.metadata.executor,
            duration_ms: self.metadata.duration_ms,
            model,
        };
        TaskResult::new(self.output)
            .with_confidence(self.confidence.unwrap_or(1.0))
            .with_token_usage(self.token_usage.unwrap_or_default())
            .with_metadata(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_attaches_source_node() {
        let response = ExecutionResponse::failure(
            NodeId::from("b"),
            TaskError::new(TaskErrorCode::ToolError, "exit 1"),
            "process",
        );
        assert!(!response.success);
        assert_eq!(
            response.failure_error().source_node_id,
            Some(NodeId::from("b"))
        );
    }

    #[test]
    fn test_timeout_error_is_retryable() {
        let err = ExecutorError::Timeout {
            node_id: NodeId::from("slow"),
            timeout_ms: 10,
        };
        let response = ExecutionResponse::from_error(NodeId::from("slow"), &err, "noop");
        let error = response.failure_error();
        assert_eq!(error.code, TaskErrorCode::Timeout);
        assert!(error.retryable);
    }

    #[test]
    fn test_into_task_result_defaults_confidence() {
        let result = ExecutionResponse::success(NodeId::from("a"), json!({"ok": true}), "noop")
            .with_duration_ms(12)
            .into_task_result(Some(ModelTier::Haiku));
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.metadata.executor, "noop");
        assert_eq!(result.metadata.duration_ms, 12);
        assert_eq!(result.metadata.model, Some(ModelTier::Haiku));
    }
}
