mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{diamond, init_tracing, ScriptedExecutor};
use dagwave_core::api::{
    CancellationToken, ExecutionStatus, NodeStatus, Orchestrator, OrchestratorOptions,
    TaskErrorCode,
};

#[tokio::test]
async fn test_cancel_before_start() {
    let executor = Arc::new(ScriptedExecutor::new());
    let orchestrator = Orchestrator::builder().executor(executor.clone()).build();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = orchestrator
        .execute_with_cancel(diamond(), None, cancel)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.snapshot.status, ExecutionStatus::Cancelled);
    assert_eq!(result.snapshot.counts().cancelled, 4);
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_wave() {
    init_tracing();
    let executor = Arc::new(ScriptedExecutor::new().with_delay_ms(5_000));
    let orchestrator = Orchestrator::builder().executor(executor).build();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        orchestrator.execute_with_cancel(diamond(), None, cancel),
    )
    .await
    .expect("cancellation stops the run promptly")
    .unwrap();

    assert_eq!(result.snapshot.status, ExecutionStatus::Cancelled);
    assert_eq!(result.snapshot.node_status("A"), Some(NodeStatus::Cancelled));
    assert_eq!(result.snapshot.node_status("D"), Some(NodeStatus::Cancelled));
    assert_eq!(
        result.errors.last().map(|e| e.message.as_str()),
        Some("cancelled")
    );
}

#[tokio::test]
async fn test_run_deadline_records_timeout() {
    let executor = Arc::new(ScriptedExecutor::new().with_delay_ms(5_000));
    let orchestrator = Orchestrator::builder()
        .executor(executor)
        .options(OrchestratorOptions {
            max_execution_time_ms: 50,
            ..Default::default()
        })
        .build();

    let result = orchestrator.execute(diamond(), None).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.snapshot.status, ExecutionStatus::Cancelled);
    assert!(result
        .errors
        .iter()
        .any(|e| e.code == TaskErrorCode::Timeout));
}
