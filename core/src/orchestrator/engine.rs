//! Wave-execution loop.
//!
//! One run: sort the DAG into waves, then for each wave resolve dispatch
//! descriptors, check permissions, hand the batch to the executor (or the
//! built-in simulation) and fan responses back into the state machine.
//! Waves never overlap: wave N+1 starts only after wave N fully resolves.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::dispatch::{DispatchDefaults, DispatchDescriptor, DispatchTable};
use super::failure::FailurePolicy;
use super::observer::{NoopObserver, Observer};
use super::result::{DeniedDispatch, ExecutionPlan, ExecutionResult, WavePlan};
use crate::conflict::{analyze_wave, HintMap};
use crate::error::{OrchestratorError, TaskError, TaskErrorCode};
use crate::executor::{BatchContext, ExecutionProgress, ExecutionResponse, Executor};
use crate::graph::{Dag, ModelTier, Node, NodeId};
use crate::permissions::{
    EnforcerOptions, IsolationLevel, PermissionEnforcer, PermissionMatrix, PresetName,
};
use crate::scheduler::{topological_sort, SortResult};
use crate::state::{
    ExecutionStatus, NodeStatus, SkipReason, StateEvent, StateManager,
    StateManagerConfig, TaskResult, TokenUsage,
};

const EVENT_CHANNEL_CAPACITY: usize = 1000;
const SIMULATION_EXECUTOR: &str = "simulation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorOptions {
    /// Concurrency hint passed to the executor with every batch.
    pub max_parallel_tasks: usize,
    pub default_model: ModelTier,
    pub default_max_turns: u32,
    /// Whole-run deadline. `0` disables it.
    pub max_execution_time_ms: u64,
    pub failure_policy: FailurePolicy,
    pub validate_transitions: bool,
    pub emit_events: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 5,
            default_model: ModelTier::Sonnet,
            default_max_turns: 10,
            max_execution_time_ms: 600_000,
            failure_policy: FailurePolicy::default(),
            validate_transitions: true,
            emit_events: true,
        }
    }
}

/// Why a run stopped before exhausting its waves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    Deadline,
}

/// Result of resolving one ready node.
enum Resolution {
    Dispatch(DispatchDescriptor),
    Denied(String),
    Unresolvable(String),
}

pub struct Orchestrator {
    executor: Option<Arc<dyn Executor>>,
    observer: Arc<dyn Observer>,
    enforcer: PermissionEnforcer,
    dispatch: DispatchTable,
    options: OrchestratorOptions,
    events: broadcast::Sender<StateEvent>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn enforcer(&self) -> &PermissionEnforcer {
        &self.enforcer
    }

    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    /// Subscribe to state-machine events of every subsequent run.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub async fn execute(
        &self,
        dag: Arc<Dag>,
        inputs: Option<&serde_json::Map<String, Value>>,
    ) -> Result<ExecutionResult, OrchestratorError> {
        self.execute_with_cancel(dag, inputs, CancellationToken::new())
            .await
    }

    /// Run a DAG to completion, failure or cancellation.
    ///
    /// `Err` is reserved for broken internal invariants; every run failure is
    /// reported through a fully formed [`ExecutionResult`].
    #[tracing::instrument(skip_all, fields(dag_id = %dag.id()))]
    pub async fn execute_with_cancel(
        &self,
        dag: Arc<Dag>,
        inputs: Option<&serde_json::Map<String, Value>>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, OrchestratorError> {
        let mut ctx = ExecutionContext::new(&dag, inputs);
        let state = StateManager::new(StateManagerConfig {
            dag: dag.clone(),
            execution_id: ctx.execution_id.clone(),
            validate_transitions: self.options.validate_transitions,
            emit_events: self.options.emit_events,
        });
        self.forward_events(&state);

        let sort = topological_sort(&dag);
        let waves = match &sort {
            SortResult::Sorted { waves, .. } => waves.clone(),
            SortResult::Cycle { cycle } => {
                state.start_execution(0).await?;
                self.observer.on_run_start(&ctx.execution_id, &dag, 0);
                let path: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
                tracing::error!(
                    execution_id = %ctx.execution_id,
                    cycle = %path.join(" -> "),
                    "cycle detected"
                );
                let mut error = TaskError::new(
                    TaskErrorCode::CycleDetected,
                    format!("Cycle detected: {}", path.join(" -> ")),
                )
                .with_details(json!({ "cycle": cycle }));
                if let Some(first) = cycle.first() {
                    error = error.with_source(first.clone());
                }
                state.record_error(error).await?;
                return self.finish_run(&state, &ctx, &dag, ExecutionStatus::Failed, false).await;
            }
        };

        let deadline = (self.options.max_execution_time_ms > 0).then(|| {
            Instant::now() + std::time::Duration::from_millis(self.options.max_execution_time_ms)
        });
        let run_cancel = cancel.child_token();

        tracing::info!(
            execution_id = %ctx.execution_id,
            nodes = dag.len(),
            waves = waves.len(),
            executor = self.executor.as_ref().map_or(SIMULATION_EXECUTOR, |e| e.name()),
            "starting execution"
        );
        let initial = state.start_execution(waves.len()).await?;
        self.observer.on_run_start(&ctx.execution_id, &dag, waves.len());
        self.report_skipped(&initial.skipped);

        let policy = self.options.failure_policy;
        for wave in &waves {
            let wave_number = wave.wave_number;

            if let Some(reason) = check_interrupt(&cancel, deadline) {
                return self.interrupt(&state, &ctx, &dag, &run_cancel, reason).await;
            }

            let update = state.update_ready_nodes().await?;
            self.report_skipped(&update.skipped);

            state.start_wave(wave_number).await?;
            self.observer.on_wave_start(wave_number, &wave.node_ids);
            tracing::info!(
                execution_id = %ctx.execution_id,
                wave = wave_number,
                nodes = wave.node_ids.len(),
                "wave started"
            );

            let mut missing: Vec<NodeId> = Vec::new();
            let mut dispatches: Vec<(&Node, DispatchDescriptor)> = Vec::new();

            for node_id in &wave.node_ids {
                let ready = state
                    .node_state(node_id.as_str())
                    .await
                    .is_some_and(|s| s.status() == NodeStatus::Ready);
                let Some(node) = dag.node(node_id.as_str()) else {
                    continue;
                };
                if !ready {
                    // Skipped because an upstream node failed without aborting.
                    continue;
                }

                match self.resolve(node, &ctx) {
                    Resolution::Dispatch(descriptor) => dispatches.push((node, descriptor)),
                    Resolution::Denied(reason) => {
                        tracing::warn!(
                            execution_id = %ctx.execution_id,
                            wave = wave_number,
                            node_id = %node_id,
                            %reason,
                            "permission denied"
                        );
                        state.mark_node_skipped(node_id, SkipReason::PermissionDenied).await?;
                        state
                            .record_error(TaskError::for_node(
                                TaskErrorCode::PermissionDenied,
                                node_id,
                                reason,
                            ))
                            .await?;
                        self.observer.on_node_skipped(node_id, SkipReason::PermissionDenied);
                        missing.push(node_id.clone());
                    }
                    Resolution::Unresolvable(reason) => {
                        let error = TaskError::for_node(
                            TaskErrorCode::InternalError,
                            node_id,
                            format!("No dispatch descriptor for node {node_id}: {reason}"),
                        );
                        state.mark_node_started(node_id).await?;
                        self.observer.on_node_start(node);
                        state.mark_node_failed(node_id, error.clone()).await?;
                        self.observer.on_node_error(node_id, &error);
                        missing.push(node_id.clone());
                    }
                }
            }

            let dispatched: Vec<NodeId> = dispatches.iter().map(|(n, _)| n.id.clone()).collect();
            let analysis = analyze_wave(&dag, &dispatched, None);
            for conflict in &analysis.conflicts {
                tracing::warn!(
                    execution_id = %ctx.execution_id,
                    wave = wave_number,
                    kind = ?conflict.kind,
                    "{}",
                    conflict.description
                );
            }

            for (node, _) in &dispatches {
                state.mark_node_started(&node.id).await?;
                self.observer.on_node_start(node);
            }

            let models: HashMap<NodeId, ModelTier> = dispatches
                .iter()
                .map(|(node, d)| (node.id.clone(), d.model))
                .collect();

            let responses = if dispatches.is_empty() {
                HashMap::new()
            } else {
                let batch = self
                    .run_batch(&ctx, dispatches.clone(), &cancel, &run_cancel, deadline)
                    .await;
                match batch {
                    Ok(responses) => responses,
                    Err(reason) => {
                        return self.interrupt(&state, &ctx, &dag, &run_cancel, reason).await;
                    }
                }
            };

            let mut wave_results: BTreeMap<NodeId, TaskResult> = BTreeMap::new();
            for (node, _) in &dispatches {
                let node_id = &node.id;
                let response = responses.get(node_id).cloned().unwrap_or_else(|| {
                    ExecutionResponse::failure(
                        node_id.clone(),
                        TaskError::new(TaskErrorCode::ToolError, "executor returned no response"),
                        self.executor_name(),
                    )
                });

                if response.success {
                    let result = response.into_task_result(models.get(node_id).copied());
                    state.mark_node_completed(node_id, result.clone()).await?;
                    self.observer.on_node_complete(node_id, &result);
                    ctx.node_results.insert(node_id.clone(), result.clone());
                    wave_results.insert(node_id.clone(), result);
                } else {
                    let error = response.failure_error();
                    tracing::warn!(
                        execution_id = %ctx.execution_id,
                        wave = wave_number,
                        node_id = %node_id,
                        error = %error,
                        "node failed"
                    );
                    state.mark_node_failed(node_id, error.clone()).await?;
                    self.observer.on_node_error(node_id, &error);
                    missing.push(node_id.clone());
                }
            }

            state.complete_wave(wave_number).await?;
            self.observer.on_wave_complete(wave_number, &wave_results);

            if let Some(critical) = missing.iter().find(|id| policy.is_critical(&dag, id)) {
                tracing::error!(
                    execution_id = %ctx.execution_id,
                    wave = wave_number,
                    node_id = %critical,
                    policy = %policy,
                    "critical failure, aborting remaining waves"
                );
                return self.finish_run(&state, &ctx, &dag, ExecutionStatus::Failed, false).await;
            }
        }

        // Dependents of non-critical failures in the last wave.
        let update = state.update_ready_nodes().await?;
        self.report_skipped(&update.skipped);

        self.finish_run(&state, &ctx, &dag, ExecutionStatus::Completed, true).await
    }

    /// Dry run: waves, dispatch descriptors, permission outcomes and conflicts.
    #[tracing::instrument(skip_all, fields(dag_id = %dag.id()))]
    pub fn generate_execution_plan(
        &self,
        dag: &Dag,
        inputs: Option<&serde_json::Map<String, Value>>,
        hints: Option<&HintMap>,
    ) -> ExecutionPlan {
        let ctx = ExecutionContext::new(dag, inputs);
        let mut plan = ExecutionPlan {
            dag_id: dag.id().to_string(),
            dag_name: dag.name().to_string(),
            total_nodes: dag.len(),
            total_waves: 0,
            waves: Vec::new(),
            error: None,
        };

        let waves = match topological_sort(dag) {
            SortResult::Sorted { waves, .. } => waves,
            SortResult::Cycle { cycle } => {
                let path: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
                plan.error = Some(format!("Cycle detected: {}", path.join(" -> ")));
                return plan;
            }
        };
        plan.total_waves = waves.len();

        for wave in waves {
            let mut dispatches = BTreeMap::new();
            let mut denied = Vec::new();

            for node_id in &wave.node_ids {
                let Some(node) = dag.node(node_id.as_str()) else {
                    continue;
                };
                match self.resolve(node, &ctx) {
                    Resolution::Dispatch(descriptor) => {
                        dispatches.insert(node_id.clone(), descriptor);
                    }
                    Resolution::Denied(reason) | Resolution::Unresolvable(reason) => {
                        denied.push(DeniedDispatch {
                            node_id: node_id.clone(),
                            reason,
                        });
                    }
                }
            }

            let analysis = analyze_wave(dag, &wave.node_ids, hints);
            plan.waves.push(WavePlan {
                wave_number: wave.wave_number,
                node_ids: wave.node_ids,
                dispatches,
                denied,
                parallelizable: analysis.can_parallelize,
                conflicts: analysis.conflicts,
                conflict_reason: analysis.remediation,
            });
        }

        plan
    }

    fn executor_name(&self) -> &str {
        self.executor
            .as_ref()
            .map_or(SIMULATION_EXECUTOR, |e| e.name())
    }

    fn resolve(&self, node: &Node, ctx: &ExecutionContext) -> Resolution {
        let defaults = DispatchDefaults {
            model: self.options.default_model,
            max_turns: self.options.default_max_turns,
        };
        let models = &self.enforcer.matrix().models;
        let descriptor = match self.dispatch.resolve(node, ctx, defaults, models) {
            Ok(descriptor) => descriptor,
            Err(err) => return Resolution::Unresolvable(err.to_string()),
        };

        for request in &descriptor.permission_requests {
            let check = self.enforcer.check(request);
            if !check.allowed {
                let reason = check
                    .reason
                    .unwrap_or_else(|| format!("{} not allowed", request.resource));
                return Resolution::Denied(reason);
            }
        }
        Resolution::Dispatch(descriptor)
    }

    /// Run one wave's dispatches. `Err` means the run was interrupted mid-batch.
    async fn run_batch(
        &self,
        ctx: &ExecutionContext,
        dispatches: Vec<(&Node, DispatchDescriptor)>,
        cancel: &CancellationToken,
        run_cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<HashMap<NodeId, ExecutionResponse>, Interrupt> {
        let Some(executor) = &self.executor else {
            return Ok(dispatches
                .into_iter()
                .map(|(_, descriptor)| {
                    let response = simulate(&descriptor);
                    (descriptor.node_id, response)
                })
                .collect());
        };

        let requests: Vec<_> = dispatches
            .into_iter()
            .map(|(node, descriptor)| descriptor.into_request(ctx, node))
            .collect();
        let node_ids: Vec<NodeId> = requests.iter().map(|r| r.node_id.clone()).collect();

        let observer = self.observer.clone();
        let batch = BatchContext::new()
            .with_progress(Arc::new(move |p: ExecutionProgress| observer.on_progress(&p)))
            .with_max_parallel(self.options.max_parallel_tasks)
            .with_cancel(run_cancel.clone());

        let deadline_hit = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = deadline_hit => Err(Interrupt::Deadline),
            res = executor.execute_parallel(requests, &batch) => match res {
                Ok(responses) => Ok(responses),
                Err(err) => {
                    tracing::error!(executor = executor.name(), error = %err, "batch failed");
                    Ok(batch_failure(node_ids, executor.name(), &err))
                }
            },
        }
    }

    async fn interrupt(
        &self,
        state: &StateManager,
        ctx: &ExecutionContext,
        dag: &Dag,
        run_cancel: &CancellationToken,
        reason: Interrupt,
    ) -> Result<ExecutionResult, OrchestratorError> {
        run_cancel.cancel();
        let cancelled = state.cancel_remaining().await?;
        tracing::warn!(
            execution_id = %ctx.execution_id,
            cancelled = cancelled.len(),
            reason = ?reason,
            "execution interrupted"
        );

        let error = match reason {
            Interrupt::Cancelled => TaskError::new(TaskErrorCode::InternalError, "cancelled"),
            Interrupt::Deadline => TaskError::new(
                TaskErrorCode::Timeout,
                format!(
                    "execution exceeded {}ms",
                    self.options.max_execution_time_ms
                ),
            ),
        };
        state.record_error(error).await?;
        self.finish_run(state, ctx, dag, ExecutionStatus::Cancelled, false)
            .await
    }

    async fn finish_run(
        &self,
        state: &StateManager,
        ctx: &ExecutionContext,
        dag: &Dag,
        status: ExecutionStatus,
        success: bool,
    ) -> Result<ExecutionResult, OrchestratorError> {
        let snapshot = state.finish(status).await?;
        let result = ExecutionResult {
            success,
            outputs: if success {
                ctx.collect_outputs(dag)
            } else {
                BTreeMap::new()
            },
            total_token_usage: ctx.total_token_usage(),
            total_time_ms: ctx.elapsed_ms(),
            errors: snapshot.errors.clone(),
            snapshot,
        };

        tracing::info!(
            execution_id = %ctx.execution_id,
            success,
            status = ?status,
            errors = result.errors.len(),
            total_time_ms = result.total_time_ms,
            "execution finished"
        );
        self.observer.on_run_end(&result);
        Ok(result)
    }

    fn report_skipped(&self, skipped: &[NodeId]) {
        for node_id in skipped {
            self.observer
                .on_node_skipped(node_id, SkipReason::DependencyFailed);
        }
    }

    fn forward_events(&self, state: &StateManager) {
        if !self.options.emit_events || self.events.receiver_count() == 0 {
            return;
        }
        let mut rx = state.subscribe();
        let tx = self.events.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

fn check_interrupt(cancel: &CancellationToken, deadline: Option<Instant>) -> Option<Interrupt> {
    if cancel.is_cancelled() {
        return Some(Interrupt::Cancelled);
    }
    match deadline {
        Some(at) if Instant::now() >= at => Some(Interrupt::Deadline),
        _ => None,
    }
}

/// Placeholder result used when no executor is configured.
fn simulate(descriptor: &DispatchDescriptor) -> ExecutionResponse {
    let output = json!({
        "nodeId": descriptor.node_id,
        "simulated": true,
        "taskCall": {
            "description": descriptor.description,
            "subagent_type": descriptor.agent_type,
            "model": descriptor.model,
        },
    });
    ExecutionResponse::success(descriptor.node_id.clone(), output, SIMULATION_EXECUTOR)
        .with_confidence(0.9)
        .with_token_usage(TokenUsage::new(100, 50))
}

/// Failed responses for every request of a batch whose executor call itself failed.
fn batch_failure(
    node_ids: Vec<NodeId>,
    executor: &str,
    err: &crate::executor::ExecutorError,
) -> HashMap<NodeId, ExecutionResponse> {
    node_ids
        .into_iter()
        .map(|id| {
            let response = ExecutionResponse::from_error(id.clone(), err, executor);
            (id, response)
        })
        .collect()
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    executor: Option<Arc<dyn Executor>>,
    observer: Arc<dyn Observer>,
    preset: PresetName,
    matrix: Option<PermissionMatrix>,
    isolation_level: Option<IsolationLevel>,
    dispatch: DispatchTable,
    options: OrchestratorOptions,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            executor: None,
            observer: Arc::new(NoopObserver),
            preset: PresetName::Standard,
            matrix: None,
            isolation_level: None,
            dispatch: DispatchTable::default(),
            options: OrchestratorOptions::default(),
        }
    }
}

impl OrchestratorBuilder {
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Use a named preset. Ignored when an explicit matrix is set.
    pub fn preset(mut self, preset: PresetName) -> Self {
        self.preset = preset;
        self
    }

    pub fn permissions(mut self, matrix: PermissionMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn dispatch_table(mut self, table: DispatchTable) -> Self {
        self.dispatch = table;
        self
    }

    pub fn options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_parallel_tasks(mut self, n: usize) -> Self {
        self.options.max_parallel_tasks = n.max(1);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.options.failure_policy = policy;
        self
    }

    pub fn build(self) -> Orchestrator {
        let isolation_level = self.isolation_level.unwrap_or_else(|| match self.matrix {
            Some(_) => IsolationLevel::default(),
            None => self.preset.isolation_level(),
        });
        let matrix = self.matrix.unwrap_or_else(|| self.preset.matrix());
        let enforcer = PermissionEnforcer::new(
            matrix,
            EnforcerOptions {
                isolation_level,
                ..EnforcerOptions::default()
            },
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Orchestrator {
            executor: self.executor,
            observer: self.observer,
            enforcer,
            dispatch: self.dispatch,
            options: self.options,
            events,
        }
    }
}
