use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::graph::{ModelTier, NodeId};

/// One dispatch: everything a backend needs to run a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub node_id: NodeId,
    pub prompt: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    pub agent_type: String,
    pub model: ModelTier,
    pub max_turns: u32,
    /// Outputs of completed dependencies, keyed by node id.
    #[serde(default)]
    pub dependency_results: BTreeMap<NodeId, Value>,
    /// Run inputs and variable bindings.
    #[serde(default)]
    pub context: serde_json::Map<String, Value>,
    /// `0` disables the per-request timeout.
    pub timeout_ms: u64,
}

impl ExecutionRequest {
    pub fn new(node_id: impl Into<NodeId>, prompt: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            description: node_id.to_string(),
            node_id,
            prompt: prompt.into(),
            capability: None,
            agent_type: "general-purpose".to_string(),
            model: ModelTier::Sonnet,
            max_turns: 10,
            dependency_results: BTreeMap::new(),
            context: serde_json::Map::new(),
            timeout_ms: 120_000,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_dependency_result(mut self, node_id: impl Into<NodeId>, output: Value) -> Self {
        self.dependency_results.insert(node_id.into(), output);
        self
    }
}

/// Progress stage reported by a backend while a batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Queued,
    Starting,
    Running,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub node_id: NodeId,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_output: Option<String>,
}

impl ExecutionProgress {
    pub fn new(node_id: NodeId, status: ProgressStatus) -> Self {
        Self {
            node_id,
            status,
            message: None,
            partial_output: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

pub type ProgressCallback = Arc<dyn Fn(ExecutionProgress) + Send + Sync>;

/// Per-batch context handed to [`crate::executor::Executor::execute_parallel`].
#[derive(Clone, Default)]
pub struct BatchContext {
    pub on_progress: Option<ProgressCallback>,
    /// The `maxParallelTasks` hint; the backend's own limit still applies.
    pub max_parallel: Option<usize>,
    pub cancel: CancellationToken,
}

impl BatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = Some(max_parallel);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn report(&self, progress: ExecutionProgress) {
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("on_progress", &self.on_progress.is_some())
            .field("max_parallel", &self.max_parallel)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
