//! 状态管理器：一次执行中所有节点状态的唯一写入者

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

use super::snapshot::ExecutionSnapshot;
use super::transitions::{StateTransition, TransitionError};
use super::types::{
    ExecutionStatus, NodeState, NodeStatus, SkipReason, StateCounts, StateEvent, TaskResult,
    TokenUsage,
};
use crate::error::TaskError;
use crate::graph::{Dag, NodeId};

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// 状态管理错误
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Execution {0} is finished; its snapshot is frozen")]
    Frozen(String),
}

/// 状态管理器配置
#[derive(Debug, Clone)]
pub struct StateManagerConfig {
    pub dag: Arc<Dag>,
    pub execution_id: String,
    /// 开启后非法转换返回错误
    pub validate_transitions: bool,
    /// 开启后通过广播通道发送生命周期事件
    pub emit_events: bool,
}

impl StateManagerConfig {
    pub fn new(dag: Arc<Dag>) -> Self {
        Self {
            dag,
            execution_id: format!("exec-{}", uuid::Uuid::new_v4()),
            validate_transitions: true,
            emit_events: true,
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }
}

/// `update_ready_nodes` 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadyUpdate {
    /// 本次新晋升为 ready 的节点
    pub ready: Vec<NodeId>,
    /// 因依赖失败被跳过的节点
    pub skipped: Vec<NodeId>,
}

/// 状态管理器
#[derive(Clone)]
pub struct StateManager {
    inner: Arc<StateManagerInner>,
}

struct StateManagerInner {
    dag: Arc<Dag>,
    execution_id: String,
    validate_transitions: bool,
    emit_events: bool,
    /// 执行数据（单把写锁保证每次转换原子可见）
    data: RwLock<ExecutionData>,
    /// 事件广播通道
    event_tx: broadcast::Sender<StateEvent>,
}

struct ExecutionData {
    node_states: HashMap<NodeId, NodeState>,
    node_outputs: BTreeMap<NodeId, Value>,
    errors: Vec<TaskError>,
    token_usage: TokenUsage,
    current_wave: Option<usize>,
    total_waves: usize,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    /// 冻结后的最终状态
    finished: Option<ExecutionStatus>,
}

impl ExecutionData {
    fn status_of(&self, id: &NodeId) -> Option<NodeStatus> {
        self.node_states.get(id).map(NodeState::status)
    }

    fn is_complete(&self) -> bool {
        self.node_states
            .values()
            .all(|s| StateTransition::is_terminal(s.status()))
    }

    fn is_successful(&self) -> bool {
        let clean = self
            .node_states
            .values()
            .all(|s| !matches!(s.status(), NodeStatus::Failed | NodeStatus::Cancelled));
        clean && self.is_complete()
    }

    fn derived_status(&self) -> ExecutionStatus {
        if let Some(status) = self.finished {
            return status;
        }
        if self.is_complete() {
            if self.is_successful() {
                ExecutionStatus::Completed
            } else if self
                .node_states
                .values()
                .any(|s| s.status() == NodeStatus::Cancelled)
            {
                ExecutionStatus::Cancelled
            } else {
                ExecutionStatus::Failed
            }
        } else if self.started_at.is_some() {
            ExecutionStatus::Running
        } else {
            ExecutionStatus::Pending
        }
    }
}

impl StateManager {
    /// 创建状态管理器，所有节点初始为 pending
    pub fn new(config: StateManagerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let node_states = config
            .dag
            .node_ids()
            .iter()
            .map(|id| (id.clone(), NodeState::Pending))
            .collect();

        let data = ExecutionData {
            node_states,
            node_outputs: BTreeMap::new(),
            errors: Vec::new(),
            token_usage: TokenUsage::default(),
            current_wave: None,
            total_waves: 0,
            started_at: None,
            completed_at: None,
            finished: None,
        };

        Self {
            inner: Arc::new(StateManagerInner {
                dag: config.dag,
                execution_id: config.execution_id,
                validate_transitions: config.validate_transitions,
                emit_events: config.emit_events,
                data: RwLock::new(data),
                event_tx,
            }),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.inner.execution_id
    }

    pub fn dag(&self) -> &Arc<Dag> {
        &self.inner.dag
    }

    /// 订阅状态事件
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.event_tx.subscribe()
    }

    /// 发送状态事件（无订阅者时静默丢弃）
    fn emit(&self, event: StateEvent) {
        if self.inner.emit_events {
            let _ = self.inner.event_tx.send(event);
        }
    }

    fn ensure_open(&self, data: &ExecutionData) -> Result<(), StateError> {
        if data.finished.is_some() {
            return Err(StateError::Frozen(self.inner.execution_id.clone()));
        }
        Ok(())
    }

    /// 在已持有写锁的前提下执行一次转换
    ///
    /// 返回 `false` 表示校验关闭时被忽略的终态写入。
    fn apply(
        &self,
        data: &mut ExecutionData,
        id: &NodeId,
        next: NodeState,
    ) -> Result<bool, StateError> {
        self.ensure_open(data)?;
        let from = data
            .status_of(id)
            .ok_or_else(|| StateError::UnknownNode(id.clone()))?;

        if self.inner.validate_transitions {
            StateTransition::validate(id, from, next.status())?;
        } else if StateTransition::is_terminal(from) {
            tracing::warn!(
                execution_id = %self.inner.execution_id,
                node_id = %id,
                from = %from,
                to = %next.status(),
                "ignoring write to terminal node"
            );
            return Ok(false);
        }

        data.node_states.insert(id.clone(), next);
        Ok(true)
    }

    /// 开始执行：记录波次总数，并把无依赖节点标记为 ready
    pub async fn start_execution(&self, total_waves: usize) -> Result<ReadyUpdate, StateError> {
        {
            let mut data = self.inner.data.write().await;
            self.ensure_open(&data)?;
            data.started_at = Some(Utc::now());
            data.total_waves = total_waves;
        }

        tracing::debug!(
            execution_id = %self.inner.execution_id,
            dag_id = self.inner.dag.id(),
            total_waves,
            "execution started"
        );
        self.emit(StateEvent::ExecutionStarted {
            execution_id: self.inner.execution_id.clone(),
            dag_id: self.inner.dag.id().to_string(),
            timestamp: Utc::now(),
        });

        self.update_ready_nodes().await
    }

    /// 重新扫描 pending 节点，直到不再变化：
    /// 依赖全部 completed 的晋升为 ready；任一依赖失败、跳过或取消的标记为 skipped
    pub async fn update_ready_nodes(&self) -> Result<ReadyUpdate, StateError> {
        let mut update = ReadyUpdate::default();
        let mut data = self.inner.data.write().await;
        self.ensure_open(&data)?;

        loop {
            let mut changed = false;

            for node in self.inner.dag.nodes() {
                if data.status_of(&node.id) != Some(NodeStatus::Pending) {
                    continue;
                }

                let dep_statuses: Vec<Option<NodeStatus>> =
                    node.dependencies.iter().map(|d| data.status_of(d)).collect();

                let blocked = dep_statuses.iter().any(|s| {
                    matches!(
                        s,
                        Some(NodeStatus::Failed | NodeStatus::Skipped | NodeStatus::Cancelled)
                    )
                });
                let satisfied = dep_statuses
                    .iter()
                    .all(|s| *s == Some(NodeStatus::Completed));

                if blocked {
                    let next = NodeState::Skipped {
                        reason: SkipReason::DependencyFailed,
                        skipped_at: Utc::now(),
                    };
                    if self.apply(&mut data, &node.id, next)? {
                        update.skipped.push(node.id.clone());
                        changed = true;
                    }
                } else if satisfied && self.apply(&mut data, &node.id, NodeState::Ready)? {
                    update.ready.push(node.id.clone());
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
        drop(data);

        let now = Utc::now();
        for id in &update.ready {
            self.emit(StateEvent::NodeReady {
                node_id: id.clone(),
                timestamp: now,
            });
        }
        for id in &update.skipped {
            tracing::debug!(node_id = %id, "skipping node after dependency failure");
            self.emit(StateEvent::NodeSkipped {
                node_id: id.clone(),
                reason: SkipReason::DependencyFailed,
                timestamp: now,
            });
        }

        Ok(update)
    }

    /// ready -> running
    pub async fn mark_node_started(&self, id: &NodeId) -> Result<(), StateError> {
        let started_at = Utc::now();
        {
            let mut data = self.inner.data.write().await;
            let next = NodeState::Running {
                started_at,
                attempt: 1,
            };
            if !self.apply(&mut data, id, next)? {
                return Ok(());
            }
        }

        self.emit(StateEvent::NodeStarted {
            node_id: id.clone(),
            timestamp: started_at,
        });
        Ok(())
    }

    /// running -> completed，保存输出并累计 token 用量
    pub async fn mark_node_completed(&self, id: &NodeId, result: TaskResult) -> Result<(), StateError> {
        let completed_at = Utc::now();
        let duration_ms = {
            let mut data = self.inner.data.write().await;
            let duration_ms = match data.node_states.get(id) {
                Some(NodeState::Running { started_at, .. }) => {
                    (completed_at - *started_at).num_milliseconds().max(0) as u64
                }
                _ => 0,
            };

            let output = result.output.clone();
            let usage = result.token_usage;
            let next = NodeState::Completed {
                result,
                completed_at,
                duration_ms,
            };
            if !self.apply(&mut data, id, next)? {
                return Ok(());
            }
            data.node_outputs.insert(id.clone(), output);
            data.token_usage.add(&usage);
            duration_ms
        };

        self.emit(StateEvent::NodeCompleted {
            node_id: id.clone(),
            duration_ms,
            timestamp: completed_at,
        });
        Ok(())
    }

    /// running -> failed，错误同时记入错误列表
    pub async fn mark_node_failed(&self, id: &NodeId, error: TaskError) -> Result<(), StateError> {
        let error = if error.source_node_id.is_some() {
            error
        } else {
            error.with_source(id.clone())
        };

        {
            let mut data = self.inner.data.write().await;
            let next = NodeState::Failed {
                error: error.clone(),
                failed_at: Utc::now(),
            };
            if !self.apply(&mut data, id, next)? {
                return Ok(());
            }
            data.errors.push(error.clone());
        }

        self.emit(StateEvent::NodeFailed {
            node_id: id.clone(),
            error,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// pending|ready -> skipped
    pub async fn mark_node_skipped(&self, id: &NodeId, reason: SkipReason) -> Result<(), StateError> {
        {
            let mut data = self.inner.data.write().await;
            let next = NodeState::Skipped {
                reason,
                skipped_at: Utc::now(),
            };
            if !self.apply(&mut data, id, next)? {
                return Ok(());
            }
        }

        self.emit(StateEvent::NodeSkipped {
            node_id: id.clone(),
            reason,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// 非终态 -> cancelled
    pub async fn mark_node_cancelled(&self, id: &NodeId) -> Result<(), StateError> {
        {
            let mut data = self.inner.data.write().await;
            let next = NodeState::Cancelled {
                cancelled_at: Utc::now(),
            };
            if !self.apply(&mut data, id, next)? {
                return Ok(());
            }
        }

        self.emit(StateEvent::NodeCancelled {
            node_id: id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// 取消所有尚未结束的节点，返回被取消的节点
    pub async fn cancel_remaining(&self) -> Result<Vec<NodeId>, StateError> {
        let cancelled_at = Utc::now();
        let mut cancelled = Vec::new();
        {
            let mut data = self.inner.data.write().await;
            for id in self.inner.dag.node_ids() {
                let open = data
                    .status_of(id)
                    .is_some_and(|s| !StateTransition::is_terminal(s));
                if open && self.apply(&mut data, id, NodeState::Cancelled { cancelled_at })? {
                    cancelled.push(id.clone());
                }
            }
        }

        for id in &cancelled {
            self.emit(StateEvent::NodeCancelled {
                node_id: id.clone(),
                timestamp: cancelled_at,
            });
        }
        Ok(cancelled)
    }

    /// 记录与节点状态无关的错误（环检测、权限拒绝、超时等）
    pub async fn record_error(&self, error: TaskError) -> Result<(), StateError> {
        let mut data = self.inner.data.write().await;
        self.ensure_open(&data)?;
        data.errors.push(error);
        Ok(())
    }

    pub async fn start_wave(&self, wave_number: usize) -> Result<(), StateError> {
        {
            let mut data = self.inner.data.write().await;
            self.ensure_open(&data)?;
            data.current_wave = Some(wave_number);
        }
        self.emit(StateEvent::WaveStarted {
            wave_number,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn complete_wave(&self, wave_number: usize) -> Result<(), StateError> {
        self.ensure_open(&*self.inner.data.read().await)?;
        self.emit(StateEvent::WaveCompleted {
            wave_number,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// 冻结快照并写入最终状态，之后的任何修改都会返回 [`StateError::Frozen`]
    pub async fn finish(&self, status: ExecutionStatus) -> Result<ExecutionSnapshot, StateError> {
        let snapshot = {
            let mut data = self.inner.data.write().await;
            self.ensure_open(&data)?;
            data.finished = Some(status);
            data.completed_at = Some(Utc::now());
            self.build_snapshot(&data)
        };

        tracing::debug!(
            execution_id = %self.inner.execution_id,
            status = ?status,
            "execution finished"
        );
        self.emit(StateEvent::ExecutionFinished {
            execution_id: self.inner.execution_id.clone(),
            status,
            timestamp: Utc::now(),
        });
        Ok(snapshot)
    }

    pub async fn node_state(&self, id: &str) -> Option<NodeState> {
        self.inner.data.read().await.node_states.get(id).cloned()
    }

    pub async fn node_result(&self, id: &NodeId) -> Option<TaskResult> {
        let data = self.inner.data.read().await;
        data.node_states.get(id).and_then(NodeState::result).cloned()
    }

    /// 指定状态的节点（按插入顺序）
    pub async fn nodes_in_state(&self, status: NodeStatus) -> Vec<NodeId> {
        let data = self.inner.data.read().await;
        self.inner
            .dag
            .node_ids()
            .iter()
            .filter(|id| data.status_of(id) == Some(status))
            .cloned()
            .collect()
    }

    pub async fn state_counts(&self) -> StateCounts {
        let data = self.inner.data.read().await;
        let mut counts = StateCounts::default();
        for state in data.node_states.values() {
            counts.bump(state.status());
        }
        counts
    }

    pub async fn is_execution_complete(&self) -> bool {
        self.inner.data.read().await.is_complete()
    }

    pub async fn is_execution_successful(&self) -> bool {
        self.inner.data.read().await.is_successful()
    }

    /// 获取一致的只读快照
    pub async fn snapshot(&self) -> ExecutionSnapshot {
        let data = self.inner.data.read().await;
        self.build_snapshot(&data)
    }

    fn build_snapshot(&self, data: &ExecutionData) -> ExecutionSnapshot {
        ExecutionSnapshot {
            execution_id: self.inner.execution_id.clone(),
            dag_id: self.inner.dag.id().to_string(),
            started_at: data.started_at,
            completed_at: data.completed_at,
            status: data.derived_status(),
            current_wave: data.current_wave,
            total_waves: data.total_waves,
            node_states: data
                .node_states
                .iter()
                .map(|(id, state)| (id.clone(), state.clone()))
                .collect(),
            node_outputs: data.node_outputs.clone(),
            total_token_usage: data.token_usage,
            errors: data.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskErrorCode;
    use crate::graph::DagBuilder;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn diamond() -> Arc<Dag> {
        Arc::new(
            DagBuilder::new("diamond", "Diamond")
                .task("A", &[])
                .task("B", &["A"])
                .task("C", &["A"])
                .task("D", &["B", "C"])
                .build()
                .unwrap(),
        )
    }

    fn manager() -> StateManager {
        StateManager::new(StateManagerConfig::new(diamond()).with_execution_id("exec-test"))
    }

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    async fn run_node(m: &StateManager, node: &str) {
        m.mark_node_started(&id(node)).await.unwrap();
        m.mark_node_completed(&id(node), TaskResult::new(json!({ "node": node })))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let m = manager();
        assert_eq!(m.snapshot().await.status, ExecutionStatus::Pending);

        let update = m.start_execution(3).await.unwrap();
        assert_eq!(update.ready, vec![id("A")]);
        assert_eq!(m.snapshot().await.status, ExecutionStatus::Running);

        run_node(&m, "A").await;
        let update = m.update_ready_nodes().await.unwrap();
        assert_eq!(update.ready, vec![id("B"), id("C")]);

        run_node(&m, "B").await;
        run_node(&m, "C").await;
        m.update_ready_nodes().await.unwrap();
        run_node(&m, "D").await;

        assert!(m.is_execution_complete().await);
        assert!(m.is_execution_successful().await);

        let snapshot = m.snapshot().await;
        assert_eq!(snapshot.status, ExecutionStatus::Completed);
        assert_eq!(snapshot.node_outputs.len(), 4);
        assert_eq!(snapshot.node_outputs[&id("D")], json!({ "node": "D" }));
    }

    #[tokio::test]
    async fn test_invalid_transition_fails_loudly() {
        let m = manager();
        m.start_execution(3).await.unwrap();

        // D is still pending: it can neither start nor complete.
        let err = m.mark_node_started(&id("D")).await.unwrap_err();
        assert!(matches!(err, StateError::Transition(_)));
        let err = m
            .mark_node_completed(&id("D"), TaskResult::new(json!(null)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::Transition(TransitionError::InvalidTransition { .. })
        ));

        let err = m.mark_node_started(&id("ghost")).await.unwrap_err();
        assert!(matches!(err, StateError::UnknownNode(_)));
    }

    #[tokio::test]
    async fn test_terminal_nodes_are_immune() {
        let m = manager();
        m.start_execution(3).await.unwrap();
        run_node(&m, "A").await;

        let err = m.mark_node_cancelled(&id("A")).await.unwrap_err();
        assert!(matches!(
            err,
            StateError::Transition(TransitionError::FromTerminalState { .. })
        ));

        let lenient = StateManager::new(StateManagerConfig {
            validate_transitions: false,
            ..StateManagerConfig::new(diamond())
        });
        lenient.start_execution(3).await.unwrap();
        run_node(&lenient, "A").await;
        lenient.mark_node_cancelled(&id("A")).await.unwrap();
        assert_eq!(
            lenient.node_state("A").await.map(|s| s.status()),
            Some(NodeStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_transitively() {
        let m = manager();
        m.start_execution(3).await.unwrap();
        run_node(&m, "A").await;
        m.update_ready_nodes().await.unwrap();

        m.mark_node_started(&id("B")).await.unwrap();
        m.mark_node_failed(&id("B"), TaskError::new(TaskErrorCode::ToolError, "boom"))
            .await
            .unwrap();

        let update = m.update_ready_nodes().await.unwrap();
        assert_eq!(update.skipped, vec![id("D")]);

        let snapshot = m.snapshot().await;
        assert_eq!(snapshot.node_status("D"), Some(NodeStatus::Skipped));
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].source_node_id, Some(id("B")));
        // C is still ready, so the run is not complete yet.
        assert_eq!(snapshot.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn test_finish_freezes_snapshot() {
        let m = manager();
        m.start_execution(3).await.unwrap();
        let snapshot = m.finish(ExecutionStatus::Failed).await.unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Failed);
        assert!(snapshot.completed_at.is_some());

        assert!(matches!(
            m.mark_node_started(&id("A")).await,
            Err(StateError::Frozen(_))
        ));
        assert!(matches!(
            m.finish(ExecutionStatus::Completed).await,
            Err(StateError::Frozen(_))
        ));
        assert_eq!(m.snapshot().await.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_remaining() {
        let m = manager();
        m.start_execution(3).await.unwrap();
        run_node(&m, "A").await;

        let cancelled = m.cancel_remaining().await.unwrap();
        assert_eq!(cancelled, vec![id("B"), id("C"), id("D")]);
        assert!(m.is_execution_complete().await);
        assert!(!m.is_execution_successful().await);
        assert_eq!(m.snapshot().await.status, ExecutionStatus::Cancelled);
        assert_eq!(m.state_counts().await.cancelled, 3);
    }

    #[tokio::test]
    async fn test_event_subscription() {
        let m = manager();
        let mut rx = m.subscribe();

        m.start_execution(3).await.unwrap();

        match rx.recv().await {
            Ok(StateEvent::ExecutionStarted { execution_id, .. }) => {
                assert_eq!(execution_id, "exec-test");
            }
            other => panic!("Expected ExecutionStarted, got {other:?}"),
        }
        match rx.recv().await {
            Ok(StateEvent::NodeReady { node_id, .. }) => assert_eq!(node_id, id("A")),
            other => panic!("Expected NodeReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nodes_in_state_keeps_insertion_order() {
        let m = manager();
        m.start_execution(3).await.unwrap();
        assert_eq!(
            m.nodes_in_state(NodeStatus::Pending).await,
            vec![id("B"), id("C"), id("D")]
        );
    }
}
