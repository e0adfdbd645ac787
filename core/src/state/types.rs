//! 节点状态类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;
use crate::graph::{ModelTier, NodeId};

/// Token 用量统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Self::default()
        }
    }

    /// 累加另一份用量
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// 执行元数据（后端标识、耗时）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub executor: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelTier>,
}

/// 节点执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub output: Value,
    /// 置信度，取值范围 [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub metadata: ResultMetadata,
}

impl TaskResult {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            confidence: 1.0,
            token_usage: TokenUsage::default(),
            metadata: ResultMetadata::default(),
        }
    }

    /// 设置置信度（自动截断到 [0, 1]）
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = usage;
        self
    }

    pub fn with_metadata(mut self, metadata: ResultMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// 依赖失败、被跳过或被取消
    DependencyFailed,
    /// 权限检查未通过
    PermissionDenied,
    ConditionNotMet,
    ManualSkip,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::DependencyFailed => "dependency-failed",
            SkipReason::PermissionDenied => "permission-denied",
            SkipReason::ConditionNotMet => "condition-not-met",
            SkipReason::ManualSkip => "manual-skip",
        }
    }
}

/// 节点状态（无负载的标签，用于转换校验和统计）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl NodeStatus {
    pub const ALL: [NodeStatus; 7] = [
        NodeStatus::Pending,
        NodeStatus::Ready,
        NodeStatus::Running,
        NodeStatus::Completed,
        NodeStatus::Failed,
        NodeStatus::Skipped,
        NodeStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
            NodeStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 节点状态（带负载）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Ready,
    Running {
        started_at: DateTime<Utc>,
        attempt: u32,
    },
    Completed {
        result: TaskResult,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
    },
    Failed {
        error: TaskError,
        failed_at: DateTime<Utc>,
    },
    Skipped {
        reason: SkipReason,
        skipped_at: DateTime<Utc>,
    },
    Cancelled {
        cancelled_at: DateTime<Utc>,
    },
}

impl NodeState {
    pub fn status(&self) -> NodeStatus {
        match self {
            NodeState::Pending => NodeStatus::Pending,
            NodeState::Ready => NodeStatus::Ready,
            NodeState::Running { .. } => NodeStatus::Running,
            NodeState::Completed { .. } => NodeStatus::Completed,
            NodeState::Failed { .. } => NodeStatus::Failed,
            NodeState::Skipped { .. } => NodeStatus::Skipped,
            NodeState::Cancelled { .. } => NodeStatus::Cancelled,
        }
    }

    pub fn result(&self) -> Option<&TaskResult> {
        match self {
            NodeState::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            NodeState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// 执行整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 各状态节点计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl StateCounts {
    pub(crate) fn bump(&mut self, status: NodeStatus) {
        match status {
            NodeStatus::Pending => self.pending += 1,
            NodeStatus::Ready => self.ready += 1,
            NodeStatus::Running => self.running += 1,
            NodeStatus::Completed => self.completed += 1,
            NodeStatus::Failed => self.failed += 1,
            NodeStatus::Skipped => self.skipped += 1,
            NodeStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn get(&self, status: NodeStatus) -> usize {
        match status {
            NodeStatus::Pending => self.pending,
            NodeStatus::Ready => self.ready,
            NodeStatus::Running => self.running,
            NodeStatus::Completed => self.completed,
            NodeStatus::Failed => self.failed,
            NodeStatus::Skipped => self.skipped,
            NodeStatus::Cancelled => self.cancelled,
        }
    }
}

/// 生命周期事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// 执行开始
    ExecutionStarted {
        execution_id: String,
        dag_id: String,
        timestamp: DateTime<Utc>,
    },
    /// 执行结束（快照冻结）
    ExecutionFinished {
        execution_id: String,
        status: ExecutionStatus,
        timestamp: DateTime<Utc>,
    },
    NodeReady {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        node_id: NodeId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        node_id: NodeId,
        error: TaskError,
        timestamp: DateTime<Utc>,
    },
    NodeSkipped {
        node_id: NodeId,
        reason: SkipReason,
        timestamp: DateTime<Utc>,
    },
    NodeCancelled {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    WaveStarted {
        wave_number: usize,
        timestamp: DateTime<Utc>,
    },
    WaveCompleted {
        wave_number: usize,
        timestamp: DateTime<Utc>,
    },
}
