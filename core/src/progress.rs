use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::error::TaskError;
use crate::graph::{Dag, Node, NodeId};
use crate::orchestrator::{ExecutionResult, Observer};
use crate::state::{SkipReason, TaskResult};

const SPINNER_TICKS: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ASCII_TICKS: [&str; 4] = ["|", "/", "-", "\\"];

/// Visual progress for a run: one overall bar plus a spinner per running node.
///
/// Disabled instances draw nothing, which is what jsonl output wants.
pub struct ProgressObserver {
    multi: MultiProgress,
    overall: ProgressBar,
    node_bars: Mutex<HashMap<NodeId, ProgressBar>>,
    enabled: bool,
    ascii: bool,
}

impl ProgressObserver {
    pub fn new(enabled: bool, ascii: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                node_bars: Mutex::new(HashMap::new()),
                enabled: false,
                ascii,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(0));
        let chars = if ascii { "#>-" } else { "█▓▒░  " };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} nodes ({percent}%) {msg}")
        {
            overall.set_style(style.progress_chars(chars));
        }
        overall.set_message("Starting...");

        Self {
            multi,
            overall,
            node_bars: Mutex::new(HashMap::new()),
            enabled: true,
            ascii,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn icon(&self, ok: bool) -> &'static str {
        match (self.ascii, ok) {
            (true, true) => "[ok]",
            (true, false) => "[x]",
            (false, true) => "✅",
            (false, false) => "❌",
        }
    }

    fn finish_node(&self, node_id: &NodeId, message: String) {
        if !self.enabled {
            return;
        }
        if let Ok(mut bars) = self.node_bars.lock() {
            if let Some(bar) = bars.remove(node_id) {
                bar.finish_with_message(message);
            }
        }
        self.overall.inc(1);
    }
}

impl Observer for ProgressObserver {
    fn on_run_start(&self, _execution_id: &str, dag: &Dag, _total_waves: usize) {
        if self.enabled {
            self.overall.set_length(dag.len() as u64);
        }
    }

    fn on_run_end(&self, result: &ExecutionResult) {
        if !self.enabled {
            return;
        }
        let msg = if result.success {
            format!("{} All nodes completed", self.icon(true))
        } else {
            format!("{} Execution failed", self.icon(false))
        };
        self.overall.finish_with_message(msg);
    }

    fn on_wave_start(&self, wave_number: usize, node_ids: &[NodeId]) {
        if self.enabled {
            self.overall
                .set_message(format!("Wave {} ({} nodes)", wave_number, node_ids.len()));
        }
    }

    fn on_node_start(&self, node: &Node) {
        if !self.enabled {
            return;
        }
        let bar = self.multi.add(ProgressBar::new_spinner());
        let ticks: &[&str] = if self.ascii { &ASCII_TICKS } else { &SPINNER_TICKS };
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.green} {msg}") {
            bar.set_style(style.tick_strings(ticks));
        }
        bar.set_message(node.id.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut bars) = self.node_bars.lock() {
            bars.insert(node.id.clone(), bar);
        }
    }

    fn on_node_complete(&self, node_id: &NodeId, result: &TaskResult) {
        let msg = format!(
            "{} {} ({}ms)",
            self.icon(true),
            node_id,
            result.metadata.duration_ms
        );
        self.finish_node(node_id, msg);
    }

    fn on_node_error(&self, node_id: &NodeId, error: &TaskError) {
        let msg = format!("{} {} [{}]", self.icon(false), node_id, error.code);
        self.finish_node(node_id, msg);
    }

    fn on_node_skipped(&self, node_id: &NodeId, reason: SkipReason) {
        let msg = format!("- {} skipped ({})", node_id, reason.as_str());
        self.finish_node(node_id, msg);
    }

    fn on_wave_complete(&self, _wave_number: usize, _results: &BTreeMap<NodeId, TaskResult>) {}
}

impl Drop for ProgressObserver {
    fn drop(&mut self) {
        if let Ok(mut bars) = self.node_bars.lock() {
            for (_, bar) in bars.drain() {
                bar.finish_and_clear();
            }
        }
    }
}
