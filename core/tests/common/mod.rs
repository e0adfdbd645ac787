#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dagwave_core::api::{
    BatchContext, Dag, DagBuilder, ExecutionRequest, ExecutionResponse, ExecutionResult, Executor,
    ExecutorError, ExecutorKind, Node, NodeId, Observer, SkipReason, TaskError, TaskErrorCode,
    TaskResult, TokenUsage,
};
use serde_json::json;

/// Route orchestrator logs through the test harness; `RUST_LOG` overrides.
pub fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "dagwave_core=debug".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A -> {B, C} -> D, with D exported as `final`.
pub fn diamond() -> Arc<Dag> {
    Arc::new(
        DagBuilder::new("diamond", "Diamond")
            .task("A", &[])
            .task("B", &["A"])
            .task("C", &["A"])
            .task("D", &["B", "C"])
            .output("final", "D")
            .build()
            .expect("diamond builds"),
    )
}

pub fn id(s: &str) -> NodeId {
    NodeId::from(s)
}

/// Executor that fails a fixed set of nodes and records every call.
#[derive(Default)]
pub struct ScriptedExecutor {
    fail: HashSet<NodeId>,
    delay_ms: u64,
    calls: Mutex<Vec<NodeId>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, nodes: &[&str]) -> Self {
        self.fail.extend(nodes.iter().map(|n| id(n)));
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn calls(&self) -> Vec<NodeId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::InProcess
    }

    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        _batch: &BatchContext,
    ) -> Result<ExecutionResponse, ExecutorError> {
        self.calls.lock().unwrap().push(request.node_id.clone());
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        if self.fail.contains(&request.node_id) {
            let error = TaskError::new(TaskErrorCode::ToolError, "scripted failure");
            return Ok(ExecutionResponse::failure(request.node_id, error, self.name()));
        }

        let deps: Vec<&str> = request.dependency_results.keys().map(|k| k.as_str()).collect();
        let output = json!({ "node": request.node_id, "deps": deps });
        Ok(ExecutionResponse::success(request.node_id, output, self.name())
            .with_confidence(0.8)
            .with_token_usage(TokenUsage::new(10, 5)))
    }
}

/// Executor whose batch call leaves one node without a response.
pub struct LossyBatchExecutor {
    omit: NodeId,
}

impl LossyBatchExecutor {
    pub fn omitting(node: &str) -> Self {
        Self { omit: id(node) }
    }
}

#[async_trait]
impl Executor for LossyBatchExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::InProcess
    }

    fn name(&self) -> &str {
        "lossy"
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        _batch: &BatchContext,
    ) -> Result<ExecutionResponse, ExecutorError> {
        Ok(ExecutionResponse::success(request.node_id, json!({}), self.name()))
    }

    async fn execute_parallel(
        &self,
        requests: Vec<ExecutionRequest>,
        batch: &BatchContext,
    ) -> Result<HashMap<NodeId, ExecutionResponse>, ExecutorError> {
        let mut responses = HashMap::new();
        for request in requests.into_iter().filter(|r| r.node_id != self.omit) {
            let node_id = request.node_id.clone();
            responses.insert(node_id, self.execute(request, batch).await?);
        }
        Ok(responses)
    }
}

/// Executor whose batch call returns `Err` for any batch touching a broken node.
pub struct BrokenBatchExecutor {
    broken: HashSet<NodeId>,
}

impl BrokenBatchExecutor {
    pub fn breaking_on(nodes: &[&str]) -> Self {
        Self {
            broken: nodes.iter().map(|n| id(n)).collect(),
        }
    }
}

#[async_trait]
impl Executor for BrokenBatchExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::InProcess
    }

    fn name(&self) -> &str {
        "broken"
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        _batch: &BatchContext,
    ) -> Result<ExecutionResponse, ExecutorError> {
        Ok(ExecutionResponse::success(request.node_id, json!({}), self.name()))
    }

    async fn execute_parallel(
        &self,
        requests: Vec<ExecutionRequest>,
        batch: &BatchContext,
    ) -> Result<HashMap<NodeId, ExecutionResponse>, ExecutorError> {
        if requests.iter().any(|r| self.broken.contains(&r.node_id)) {
            return Err(ExecutorError::Backend("connection reset".to_string()));
        }
        let mut responses = HashMap::new();
        for request in requests {
            let node_id = request.node_id.clone();
            responses.insert(node_id, self.execute(request, batch).await?);
        }
        Ok(responses)
    }
}

/// Observer that records a compact trace of every callback.
#[derive(Default)]
pub struct RecordingObserver {
    trace: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn trace(&self) -> Vec<String> {
        self.trace.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.trace.lock().unwrap().push(entry);
    }
}

impl Observer for RecordingObserver {
    fn on_run_start(&self, _execution_id: &str, _dag: &Dag, total_waves: usize) {
        self.push(format!("run_start:{total_waves}"));
    }

    fn on_run_end(&self, result: &ExecutionResult) {
        self.push(format!("run_end:{}", result.success));
    }

    fn on_wave_start(&self, wave_number: usize, _node_ids: &[NodeId]) {
        self.push(format!("wave_start:{wave_number}"));
    }

    fn on_wave_complete(&self, wave_number: usize, _results: &BTreeMap<NodeId, TaskResult>) {
        self.push(format!("wave_complete:{wave_number}"));
    }

    fn on_node_start(&self, node: &Node) {
        self.push(format!("node_start:{}", node.id));
    }

    fn on_node_complete(&self, node_id: &NodeId, _result: &TaskResult) {
        self.push(format!("node_complete:{node_id}"));
    }

    fn on_node_error(&self, node_id: &NodeId, error: &TaskError) {
        self.push(format!("node_error:{node_id}:{}", error.code));
    }

    fn on_node_skipped(&self, node_id: &NodeId, reason: SkipReason) {
        self.push(format!("node_skipped:{node_id}:{}", reason.as_str()));
    }
}
