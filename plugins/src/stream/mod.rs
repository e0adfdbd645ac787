//! Line-oriented renderers for orchestrator callbacks.
//!
//! `text` is meant for humans on stdout, `jsonl` for machines. Both write
//! through a [`LineSink`], so tests can capture output in memory.

mod jsonl;
mod text;

use std::io::Write;
use std::sync::{Arc, Mutex};

pub use jsonl::{JsonlObserver, EVENT_SCHEMA_VERSION};
pub use text::TextObserver;

/// Shared, line-buffered writer. Write errors are logged and dropped.
#[derive(Clone)]
pub struct LineSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LineSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn write_line(&self, line: &str) {
        let Ok(mut w) = self.inner.lock() else {
            return;
        };
        if let Err(e) = writeln!(w, "{line}").and_then(|_| w.flush()) {
            tracing::warn!(error = %e, "failed to write output line");
        }
    }
}

/// In-memory buffer for capturing sink output.
#[derive(Clone, Default)]
pub struct MemoryBuffer(Arc<Mutex<Vec<u8>>>);

impl MemoryBuffer {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut b) => {
                b.extend_from_slice(buf);
                Ok(buf.len())
            }
            Err(_) => Err(std::io::Error::other("buffer poisoned")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagwave_core::api::{DagBuilder, Orchestrator};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn chain() -> Arc<dagwave_core::api::Dag> {
        Arc::new(
            DagBuilder::new("chain", "Chain")
                .task("fetch", &[])
                .task("summarize", &["fetch"])
                .output("summary", "summarize")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_jsonl_event_stream() {
        let buffer = MemoryBuffer::default();
        let observer = Arc::new(JsonlObserver::new(LineSink::new(buffer.clone())));
        let orchestrator = Orchestrator::builder().observer(observer).build();

        let result = orchestrator.execute(chain(), None).await.unwrap();
        assert!(result.success);

        let events: Vec<Value> = buffer
            .lines()
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            vec![
                "run.started",
                "wave.started",
                "node.started",
                "node.completed",
                "wave.completed",
                "wave.started",
                "node.started",
                "node.completed",
                "wave.completed",
                "run.finished",
            ]
        );

        for event in &events {
            assert_eq!(event["v"], EVENT_SCHEMA_VERSION);
            assert_eq!(event["execution_id"], result.execution_id());
        }
        assert_eq!(events[0]["total_waves"], 2);
        assert_eq!(events[9]["status"], "completed");
        assert!(events[9]["outputs"]["summary"].is_object());
    }

    #[tokio::test]
    async fn test_text_summary_only_when_quiet() {
        let buffer = MemoryBuffer::default();
        let observer = Arc::new(TextObserver::new(LineSink::new(buffer.clone())).quiet(true));
        let orchestrator = Orchestrator::builder().observer(observer).build();

        orchestrator.execute(chain(), None).await.unwrap();

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("run succeeded: status=completed completed=2"));
    }

    #[tokio::test]
    async fn test_text_lists_each_node() {
        let buffer = MemoryBuffer::default();
        let observer = Arc::new(TextObserver::new(LineSink::new(buffer.clone())));
        let orchestrator = Orchestrator::builder().observer(observer).build();

        orchestrator.execute(chain(), None).await.unwrap();

        let lines = buffer.lines();
        assert!(lines[0].contains("Chain (2 nodes, 2 waves)"));
        assert!(lines.iter().any(|l| l == "wave 0: fetch"));
        assert!(lines.iter().any(|l| l.starts_with("  + summarize")));
    }
}
