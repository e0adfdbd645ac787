use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::TaskError;
use crate::executor::ExecutionProgress;
use crate::graph::{Dag, Node, NodeId};
use crate::state::{SkipReason, TaskResult};

use super::result::ExecutionResult;

/// Callbacks fired by the orchestrator as a run progresses.
///
/// Every method has a no-op default, so implementors only override what they
/// render. Callbacks run inline on the orchestrator task and should return quickly.
pub trait Observer: Send + Sync {
    fn on_run_start(&self, _execution_id: &str, _dag: &Dag, _total_waves: usize) {}

    fn on_run_end(&self, _result: &ExecutionResult) {}

    fn on_wave_start(&self, _wave_number: usize, _node_ids: &[NodeId]) {}

    fn on_wave_complete(&self, _wave_number: usize, _results: &BTreeMap<NodeId, TaskResult>) {}

    fn on_node_start(&self, _node: &Node) {}

    fn on_node_complete(&self, _node_id: &NodeId, _result: &TaskResult) {}

    fn on_node_error(&self, _node_id: &NodeId, _error: &TaskError) {}

    fn on_node_skipped(&self, _node_id: &NodeId, _reason: SkipReason) {}

    fn on_progress(&self, _progress: &ExecutionProgress) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Fans every callback out to a list of observers, in registration order.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn Observer>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl Observer for ObserverSet {
    fn on_run_start(&self, execution_id: &str, dag: &Dag, total_waves: usize) {
        for o in &self.observers {
            o.on_run_start(execution_id, dag, total_waves);
        }
    }

    fn on_run_end(&self, result: &ExecutionResult) {
        for o in &self.observers {
            o.on_run_end(result);
        }
    }

    fn on_wave_start(&self, wave_number: usize, node_ids: &[NodeId]) {
        for o in &self.observers {
            o.on_wave_start(wave_number, node_ids);
        }
    }

    fn on_wave_complete(&self, wave_number: usize, results: &BTreeMap<NodeId, TaskResult>) {
        for o in &self.observers {
            o.on_wave_complete(wave_number, results);
        }
    }

    fn on_node_start(&self, node: &Node) {
        for o in &self.observers {
            o.on_node_start(node);
        }
    }

    fn on_node_complete(&self, node_id: &NodeId, result: &TaskResult) {
        for o in &self.observers {
            o.on_node_complete(node_id, result);
        }
    }

    fn on_node_error(&self, node_id: &NodeId, error: &TaskError) {
        for o in &self.observers {
            o.on_node_error(node_id, error);
        }
    }

    fn on_node_skipped(&self, node_id: &NodeId, reason: SkipReason) {
        for o in &self.observers {
            o.on_node_skipped(node_id, reason);
        }
    }

    fn on_progress(&self, progress: &ExecutionProgress) {
        for o in &self.observers {
            o.on_progress(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        starts: AtomicUsize,
    }

    impl Observer for Counting {
        fn on_node_start(&self, _node: &Node) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observer_set_fans_out() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let set = ObserverSet::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(NoopObserver));

        set.on_node_start(&Node::new("n", NodeKind::GenericTask));
        set.on_node_skipped(&NodeId::from("n"), SkipReason::ManualSkip);

        assert_eq!(set.len(), 3);
        assert_eq!(a.starts.load(Ordering::SeqCst), 1);
        assert_eq!(b.starts.load(Ordering::SeqCst), 1);
    }
}
