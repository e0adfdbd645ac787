use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::traits::Executor;
use super::types::{
    BatchContext, ExecutionRequest, ExecutionResponse, ExecutorCapabilities, ExecutorError,
    ExecutorKind,
};

/// In-process executor that succeeds immediately without doing any work.
#[derive(Debug, Clone, Default)]
pub struct NoopExecutor;

impl NoopExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for NoopExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::InProcess
    }

    fn name(&self) -> &str {
        "noop"
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        _batch: &BatchContext,
    ) -> Result<ExecutionResponse, ExecutorError> {
        let output = json!({
            "nodeId": request.node_id,
            "description": request.description,
            "executed": true,
            "timestamp": Utc::now().to_rfc3339(),
        });
        Ok(ExecutionResponse::success(request.node_id, output, self.name()).with_confidence(1.0))
    }

    fn capabilities(&self) -> ExecutorCapabilities {
        ExecutorCapabilities {
            max_parallelism: 1024,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;

    #[tokio::test]
    async fn test_noop_always_succeeds() {
        let executor = NoopExecutor::new();
        let request = ExecutionRequest::new("a", "do the thing");

        let response = executor
            .execute(request, &BatchContext::new())
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.confidence, Some(1.0));
        assert_eq!(response.output["nodeId"], "a");
        assert_eq!(response.output["executed"], true);
    }

    #[tokio::test]
    async fn test_noop_batch_returns_every_node() {
        let executor = NoopExecutor::new();
        let requests = vec![
            ExecutionRequest::new("a", "x"),
            ExecutionRequest::new("b", "y"),
        ];

        let responses = executor
            .execute_parallel(requests, &BatchContext::new().with_max_parallel(5))
            .await
            .unwrap();

        assert!(responses.contains_key(&NodeId::from("a")));
        assert!(responses.contains_key(&NodeId::from("b")));
    }
}
