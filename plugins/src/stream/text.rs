use std::collections::BTreeMap;

use dagwave_core::api::{
    Dag, ExecutionResult, Node, NodeId, Observer, SkipReason, TaskError, TaskResult,
};

use super::LineSink;

/// Human-readable run log, one line per event.
///
/// Wave and node lines are suppressed when `quiet` is set; the final summary
/// is always printed.
pub struct TextObserver {
    sink: LineSink,
    quiet: bool,
}

impl TextObserver {
    pub fn new(sink: LineSink) -> Self {
        Self { sink, quiet: false }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn line(&self, text: String) {
        if !self.quiet {
            self.sink.write_line(&text);
        }
    }
}

impl Observer for TextObserver {
    fn on_run_start(&self, execution_id: &str, dag: &Dag, total_waves: usize) {
        self.line(format!(
            "run {execution_id}: {} ({} nodes, {total_waves} waves)",
            dag.name(),
            dag.len()
        ));
    }

    fn on_wave_start(&self, wave_number: usize, node_ids: &[NodeId]) {
        let ids: Vec<&str> = node_ids.iter().map(NodeId::as_str).collect();
        self.line(format!("wave {wave_number}: {}", ids.join(", ")));
    }

    fn on_wave_complete(&self, wave_number: usize, results: &BTreeMap<NodeId, TaskResult>) {
        self.line(format!("wave {wave_number} done ({} completed)", results.len()));
    }

    fn on_node_start(&self, node: &Node) {
        self.line(format!("  > {} [{}]", node.id, node.kind));
    }

    fn on_node_complete(&self, node_id: &NodeId, result: &TaskResult) {
        self.line(format!(
            "  + {node_id} ({}ms, confidence {:.2})",
            result.metadata.duration_ms, result.confidence
        ));
    }

    fn on_node_error(&self, node_id: &NodeId, error: &TaskError) {
        self.line(format!("  x {node_id}: {} {}", error.code, error.message));
    }

    fn on_node_skipped(&self, node_id: &NodeId, reason: SkipReason) {
        self.line(format!("  - {node_id} skipped ({})", reason.as_str()));
    }

    fn on_run_end(&self, result: &ExecutionResult) {
        let counts = result.snapshot.counts();
        let verdict = if result.success { "succeeded" } else { "failed" };
        self.sink.write_line(&format!(
            "run {verdict}: status={} completed={} failed={} skipped={} cancelled={} tokens={} time={}ms",
            result.snapshot.status,
            counts.completed,
            counts.failed,
            counts.skipped,
            counts.cancelled,
            result.total_token_usage.total(),
            result.total_time_ms
        ));
        for error in &result.errors {
            let source = error.source_node_id.as_ref().map_or("-", NodeId::as_str);
            self.sink
                .write_line(&format!("error [{source}] {}: {}", error.code, error.message));
        }
    }
}
