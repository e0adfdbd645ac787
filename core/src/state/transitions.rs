//! 状态转换规则和验证

use super::types::NodeStatus;
use crate::graph::NodeId;
use thiserror::Error;

/// 状态转换错误
#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    #[error("Invalid state transition for node {node_id}: {from} -> {to}")]
    InvalidTransition {
        node_id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },
    #[error("Node {node_id} is in terminal state {state}")]
    FromTerminalState { node_id: NodeId, state: NodeStatus },
}

/// 状态转换
pub struct StateTransition;

impl StateTransition {
    /// 验证状态转换是否合法
    pub fn validate(node_id: &NodeId, from: NodeStatus, to: NodeStatus) -> Result<(), TransitionError> {
        // 终态不能转换
        if Self::is_terminal(from) {
            return Err(TransitionError::FromTerminalState {
                node_id: node_id.clone(),
                state: from,
            });
        }

        if Self::is_allowed(from, to) {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                node_id: node_id.clone(),
                from,
                to,
            })
        }
    }

    /// 转换表：只能向前推进，永远不会回到 pending
    pub fn is_allowed(from: NodeStatus, to: NodeStatus) -> bool {
        use NodeStatus::*;

        matches!(
            (from, to),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Pending, Cancelled)
                | (Ready, Running)
                | (Ready, Skipped)
                | (Ready, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// 判断是否为终态
    pub fn is_terminal(status: NodeStatus) -> bool {
        matches!(
            status,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped | NodeStatus::Cancelled
        )
    }

    /// 获取状态的可读描述
    pub fn status_description(status: NodeStatus) -> &'static str {
        match status {
            NodeStatus::Pending => "等待依赖",
            NodeStatus::Ready => "可调度",
            NodeStatus::Running => "执行中",
            NodeStatus::Completed => "已完成",
            NodeStatus::Failed => "已失败",
            NodeStatus::Skipped => "已跳过",
            NodeStatus::Cancelled => "已取消",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NodeStatus::*;

    fn id() -> NodeId {
        NodeId::from("n")
    }

    #[test]
    fn test_valid_transitions() {
        assert!(StateTransition::validate(&id(), Pending, Ready).is_ok());
        assert!(StateTransition::validate(&id(), Ready, Running).is_ok());
        assert!(StateTransition::validate(&id(), Running, Completed).is_ok());
        assert!(StateTransition::validate(&id(), Running, Failed).is_ok());
        assert!(StateTransition::validate(&id(), Pending, Skipped).is_ok());
    }

    #[test]
    fn test_pending_never_jumps_to_completed() {
        assert!(matches!(
            StateTransition::validate(&id(), Pending, Completed),
            Err(TransitionError::InvalidTransition { .. })
        ));
        assert!(StateTransition::validate(&id(), Ready, Completed).is_err());
        assert!(StateTransition::validate(&id(), Pending, Running).is_err());
    }

    #[test]
    fn test_nothing_returns_to_pending() {
        for from in NodeStatus::ALL {
            assert!(!StateTransition::is_allowed(from, Pending));
        }
    }

    #[test]
    fn test_terminal_states() {
        for state in [Completed, Failed, Skipped, Cancelled] {
            assert!(StateTransition::is_terminal(state));
            assert!(matches!(
                StateTransition::validate(&id(), state, Running),
                Err(TransitionError::FromTerminalState { .. })
            ));
        }
        assert!(!StateTransition::is_terminal(Running));
    }
}
