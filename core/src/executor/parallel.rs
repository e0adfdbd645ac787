use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

use super::traits::Executor;
use super::types::{
    BatchContext, ExecutionProgress, ExecutionRequest, ExecutionResponse, ExecutorError,
    ProgressStatus,
};
use crate::graph::NodeId;

/// Effective concurrency for one batch.
///
/// The caller's hint is capped by the backend's own limit and never drops below one.
pub fn effective_parallelism(hint: Option<usize>, backend_limit: usize) -> usize {
    hint.map_or(backend_limit, |h| h.min(backend_limit))
        .clamp(1, Semaphore::MAX_PERMITS)
}

/// Execute a batch of requests concurrently
///
/// # Arguments
///
/// * `executor` - Backend that runs each request
/// * `requests` - One request per node in the wave
/// * `batch` - Progress callback, parallelism hint and cancellation token
///
/// # Returns
///
/// Map of node_id -> ExecutionResponse with one entry per request. Timeouts
/// and cancellation become failed responses rather than errors.
pub async fn run_parallel<E>(
    executor: &E,
    requests: Vec<ExecutionRequest>,
    batch: &BatchContext,
) -> HashMap<NodeId, ExecutionResponse>
where
    E: Executor + ?Sized,
{
    let limit = effective_parallelism(batch.max_parallel, executor.capabilities().max_parallelism);
    let sem = Semaphore::new(limit);
    let mut futs = FuturesUnordered::new();

    tracing::debug!(
        executor = executor.name(),
        requests = requests.len(),
        limit,
        "dispatching batch"
    );

    for request in requests {
        let sem = &sem;
        futs.push(async move {
            let node_id = request.node_id.clone();
            batch.report(ExecutionProgress::new(node_id.clone(), ProgressStatus::Queued));

            let permit = tokio::select! {
                biased;
                _ = batch.cancel.cancelled() => None,
                permit = sem.acquire() => permit.ok(),
            };
            let Some(_permit) = permit else {
                let err = ExecutorError::Cancelled(node_id.clone());
                return (node_id.clone(), finish(executor, batch, node_id, Err(err), 0));
            };

            batch.report(ExecutionProgress::new(node_id.clone(), ProgressStatus::Starting));
            let started = Instant::now();
            let outcome = run_one(executor, request, batch).await;
            let elapsed = started.elapsed().as_millis() as u64;

            (node_id.clone(), finish(executor, batch, node_id, outcome, elapsed))
        });
    }

    let mut responses = HashMap::new();
    while let Some((node_id, response)) = futs.next().await {
        responses.insert(node_id, response);
    }
    responses
}

async fn run_one<E>(
    executor: &E,
    request: ExecutionRequest,
    batch: &BatchContext,
) -> Result<ExecutionResponse, ExecutorError>
where
    E: Executor + ?Sized,
{
    let node_id = request.node_id.clone();
    let timeout_ms = request.timeout_ms;
    let limit = if timeout_ms == 0 {
        Duration::MAX
    } else {
        Duration::from_millis(timeout_ms)
    };

    tokio::select! {
        biased;
        _ = batch.cancel.cancelled() => Err(ExecutorError::Cancelled(node_id)),
        res = tokio::time::timeout(limit, executor.execute(request, batch)) => match res {
            Ok(outcome) => outcome,
            Err(_) => Err(ExecutorError::Timeout { node_id, timeout_ms }),
        },
    }
}

fn finish<E>(
    executor: &E,
    batch: &BatchContext,
    node_id: NodeId,
    outcome: Result<ExecutionResponse, ExecutorError>,
    elapsed_ms: u64,
) -> ExecutionResponse
where
    E: Executor + ?Sized,
{
    let response = match outcome {
        Ok(response) if response.metadata.duration_ms == 0 => response.with_duration_ms(elapsed_ms),
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(node_id = %node_id, error = %err, "request did not complete");
            ExecutionResponse::from_error(node_id.clone(), &err, executor.name())
                .with_duration_ms(elapsed_ms)
        }
    };

    let status = if response.success {
        ProgressStatus::Completed
    } else {
        ProgressStatus::Failed
    };
    batch.report(ExecutionProgress::new(node_id, status));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskErrorCode;
    use crate::executor::types::{ExecutorCapabilities, ExecutorKind};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Sleeps for `delay_ms` and tracks peak concurrency.
    struct SleepyExecutor {
        delay_ms: u64,
        active: AtomicUsize,
        peak: AtomicUsize,
        limit: usize,
    }

    impl SleepyExecutor {
        fn new(delay_ms: u64, limit: usize) -> Self {
            Self {
                delay_ms,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                limit,
            }
        }
    }

    #[async_trait]
    impl Executor for SleepyExecutor {
        fn kind(&self) -> ExecutorKind {
            ExecutorKind::InProcess
        }

        fn name(&self) -> &str {
            "sleepy"
        }

        async fn execute(
            &self,
            request: ExecutionRequest,
            _batch: &BatchContext,
        ) -> Result<ExecutionResponse, ExecutorError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ExecutionResponse::success(request.node_id, json!("done"), "sleepy"))
        }

        fn capabilities(&self) -> ExecutorCapabilities {
            ExecutorCapabilities {
                max_parallelism: self.limit,
                ..Default::default()
            }
        }
    }

    fn requests(n: usize) -> Vec<ExecutionRequest> {
        (0..n)
            .map(|i| ExecutionRequest::new(format!("n{i}"), "work"))
            .collect()
    }

    #[test]
    fn test_effective_parallelism() {
        assert_eq!(effective_parallelism(Some(5), 2), 2);
        assert_eq!(effective_parallelism(Some(1), 8), 1);
        assert_eq!(effective_parallelism(None, 4), 4);
        assert_eq!(effective_parallelism(Some(0), 4), 1);
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let executor = SleepyExecutor::new(20, 8);
        let batch = BatchContext::new().with_max_parallel(2);

        let responses = executor.execute_parallel(requests(6), &batch).await.unwrap();

        assert_eq!(responses.len(), 6);
        assert!(responses.values().all(|r| r.success));
        assert!(executor.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_response() {
        let executor = SleepyExecutor::new(200, 4);
        let request = ExecutionRequest::new("slow", "work").with_timeout_ms(10);

        let responses = executor
            .execute_parallel(vec![request], &BatchContext::new())
            .await
            .unwrap();

        let response = &responses[&NodeId::from("slow")];
        assert!(!response.success);
        assert_eq!(response.failure_error().code, TaskErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_cancellation_fails_outstanding_requests() {
        let executor = SleepyExecutor::new(500, 4);
        let batch = BatchContext::new();
        let cancel = batch.cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let responses = executor.execute_parallel(requests(3), &batch).await.unwrap();

        assert_eq!(responses.len(), 3);
        for response in responses.values() {
            let error = response.failure_error();
            assert_eq!(error.code, TaskErrorCode::InternalError);
            assert_eq!(error.message, "cancelled");
        }
    }

    #[tokio::test]
    async fn test_progress_is_reported() {
        let executor = SleepyExecutor::new(1, 4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let batch = BatchContext::new().with_progress(Arc::new(move |p: ExecutionProgress| {
            sink.lock().unwrap().push(p.status);
        }));

        executor.execute_parallel(requests(1), &batch).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ProgressStatus::Queued,
                ProgressStatus::Starting,
                ProgressStatus::Completed
            ]
        );
    }
}
