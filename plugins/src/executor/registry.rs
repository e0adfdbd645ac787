//! Executor registry: concrete backends keyed by kind, chosen at startup.

use std::future::Future;
use std::sync::Arc;

use dagwave_core::api::{Executor, ExecutorKind};

/// Registered executors in registration order.
///
/// One executor per kind; registering a kind again replaces the earlier one
/// in place.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: Vec<Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn Executor>) -> &mut Self {
        let kind = executor.kind();
        match self.executors.iter_mut().find(|e| e.kind() == kind) {
            Some(slot) => {
                tracing::debug!(kind = %kind, name = executor.name(), "replacing executor");
                *slot = executor;
            }
            None => {
                tracing::debug!(kind = %kind, name = executor.name(), "registered executor");
                self.executors.push(executor);
            }
        }
        self
    }

    pub fn get(&self, kind: ExecutorKind) -> Option<Arc<dyn Executor>> {
        self.executors.iter().find(|e| e.kind() == kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ExecutorKind> {
        self.executors.iter().map(|e| e.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// First registered executor of the preferred kinds that reports itself available.
    ///
    /// With an empty preference list, every registered executor is tried in
    /// registration order.
    pub async fn select(&self, preference: &[ExecutorKind]) -> Option<Arc<dyn Executor>> {
        let order: Vec<ExecutorKind> = if preference.is_empty() {
            self.kinds()
        } else {
            preference.to_vec()
        };

        for kind in order {
            let Some(executor) = self.get(kind) else {
                continue;
            };
            if executor.is_available().await {
                tracing::info!(kind = %kind, name = executor.name(), "selected executor");
                return Some(executor);
            }
            tracing::debug!(kind = %kind, name = executor.name(), "executor unavailable");
        }
        None
    }

    /// Release every registered backend.
    pub async fn cleanup(&self) {
        for executor in &self.executors {
            if let Err(e) = executor.cleanup().await {
                tracing::warn!(name = executor.name(), error = %e, "executor cleanup failed");
            }
        }
    }

    /// Drive `work` to completion, then release every backend before handing
    /// back its output, success or error alike.
    pub async fn run_then_cleanup<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let output = work.await;
        self.cleanup().await;
        output
    }
}
