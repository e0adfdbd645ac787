//! # 节点状态机
//!
//! 一次执行中所有节点状态的唯一所有者。
//!
//! ```text
//! pending ──► ready ──► running ──► completed
//!    │          │          ├──────► failed
//!    │          │          └──────► cancelled
//!    ├──────────┴──► skipped
//!    └──────────┴──► cancelled
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一写入者**：只有 [`StateManager`] 能修改节点状态
//! 2. **原子转换**：每次转换在一把写锁内完成，快照永远看不到半更新的节点
//! 3. **只进不退**：没有任何转换会回到 pending，终态不可再修改
//! 4. **事件驱动**：状态变更通过广播通道通知订阅者

mod manager;
mod snapshot;
mod transitions;
mod types;

pub use manager::{ReadyUpdate, StateError, StateManager, StateManagerConfig};
pub use snapshot::ExecutionSnapshot;
pub use transitions::{StateTransition, TransitionError};
pub use types::{
    ExecutionStatus, NodeState, NodeStatus, ResultMetadata, SkipReason, StateCounts, StateEvent,
    TaskResult, TokenUsage,
};
