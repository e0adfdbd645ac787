use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use dagwave_core::api::{
    Dag, ExecutionProgress, ExecutionResult, Node, NodeId, Observer, SkipReason, TaskError,
    TaskResult,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::LineSink;

/// Bumped whenever a field is removed or changes meaning.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct Envelope<'a> {
    v: u32,
    #[serde(rename = "type")]
    event_type: &'a str,
    ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_id: Option<String>,
    #[serde(flatten)]
    data: Value,
}

/// Writes one JSON object per line for every orchestrator callback.
pub struct JsonlObserver {
    sink: LineSink,
    execution_id: Mutex<Option<String>>,
    include_progress: bool,
}

impl JsonlObserver {
    pub fn new(sink: LineSink) -> Self {
        Self {
            sink,
            execution_id: Mutex::new(None),
            include_progress: false,
        }
    }

    pub fn with_progress(mut self, include: bool) -> Self {
        self.include_progress = include;
        self
    }

    fn emit(&self, event_type: &str, data: Value) {
        let execution_id = self.execution_id.lock().ok().and_then(|g| g.clone());
        let envelope = Envelope {
            v: EVENT_SCHEMA_VERSION,
            event_type,
            ts: Utc::now().to_rfc3339(),
            execution_id,
            data,
        };
        match serde_json::to_string(&envelope) {
            Ok(line) => self.sink.write_line(&line),
            Err(e) => tracing::warn!(error = %e, event_type, "failed to encode event"),
        }
    }
}

impl Observer for JsonlObserver {
    fn on_run_start(&self, execution_id: &str, dag: &Dag, total_waves: usize) {
        if let Ok(mut g) = self.execution_id.lock() {
            *g = Some(execution_id.to_string());
        }
        self.emit(
            "run.started",
            json!({
                "dag_id": dag.id(),
                "dag_name": dag.name(),
                "total_nodes": dag.len(),
                "total_waves": total_waves,
            }),
        );
    }

    fn on_run_end(&self, result: &ExecutionResult) {
        self.emit(
            "run.finished",
            json!({
                "success": result.success,
                "status": result.snapshot.status,
                "outputs": result.outputs,
                "token_usage": result.total_token_usage,
                "total_time_ms": result.total_time_ms,
                "errors": result.errors,
            }),
        );
    }

    fn on_wave_start(&self, wave_number: usize, node_ids: &[NodeId]) {
        self.emit(
            "wave.started",
            json!({ "wave": wave_number, "node_ids": node_ids }),
        );
    }

    fn on_wave_complete(&self, wave_number: usize, results: &BTreeMap<NodeId, TaskResult>) {
        let completed: Vec<&NodeId> = results.keys().collect();
        self.emit(
            "wave.completed",
            json!({ "wave": wave_number, "completed": completed }),
        );
    }

    fn on_node_start(&self, node: &Node) {
        self.emit(
            "node.started",
            json!({ "node_id": node.id, "kind": node.kind }),
        );
    }

    fn on_node_complete(&self, node_id: &NodeId, result: &TaskResult) {
        self.emit(
            "node.completed",
            json!({
                "node_id": node_id,
                "confidence": result.confidence,
                "duration_ms": result.metadata.duration_ms,
                "token_usage": result.token_usage,
            }),
        );
    }

    fn on_node_error(&self, node_id: &NodeId, error: &TaskError) {
        self.emit("node.failed", json!({ "node_id": node_id, "error": error }));
    }

    fn on_node_skipped(&self, node_id: &NodeId, reason: SkipReason) {
        self.emit(
            "node.skipped",
            json!({ "node_id": node_id, "reason": reason }),
        );
    }

    fn on_progress(&self, progress: &ExecutionProgress) {
        if self.include_progress {
            self.emit("node.progress", json!(progress));
        }
    }
}
