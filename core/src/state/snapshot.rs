//! 执行快照：一次运行对外可见的唯一记录

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ExecutionStatus, NodeState, NodeStatus, StateCounts, TokenUsage};
use crate::error::TaskError;
use crate::graph::NodeId;

/// 执行快照（只读副本）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub execution_id: String,
    pub dag_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// 当前波次（尚未开始时为 `None`）
    pub current_wave: Option<usize>,
    pub total_waves: usize,
    pub node_states: BTreeMap<NodeId, NodeState>,
    pub node_outputs: BTreeMap<NodeId, Value>,
    pub total_token_usage: TokenUsage,
    pub errors: Vec<TaskError>,
}

impl ExecutionSnapshot {
    pub fn node_status(&self, id: &str) -> Option<NodeStatus> {
        self.node_states.get(id).map(NodeState::status)
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for state in self.node_states.values() {
            counts.bump(state.status());
        }
        counts
    }

    pub fn nodes_in(&self, status: NodeStatus) -> Vec<&NodeId> {
        self.node_states
            .iter()
            .filter(|(_, state)| state.status() == status)
            .map(|(id, _)| id)
            .collect()
    }

    /// 序列化为 JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize snapshot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts_and_lookup() {
        let mut node_states = BTreeMap::new();
        node_states.insert(NodeId::from("a"), NodeState::Ready);
        node_states.insert(NodeId::from("b"), NodeState::Pending);
        node_states.insert(NodeId::from("c"), NodeState::Pending);

        let snapshot = ExecutionSnapshot {
            execution_id: "exec-1".into(),
            dag_id: "dag".into(),
            started_at: Some(Utc::now()),
            completed_at: None,
            status: ExecutionStatus::Running,
            current_wave: Some(0),
            total_waves: 2,
            node_states,
            node_outputs: BTreeMap::from([(NodeId::from("z"), json!(1))]),
            total_token_usage: TokenUsage::default(),
            errors: Vec::new(),
        };

        assert_eq!(snapshot.node_status("a"), Some(NodeStatus::Ready));
        assert_eq!(snapshot.node_status("missing"), None);
        assert_eq!(snapshot.counts().pending, 2);
        assert_eq!(snapshot.nodes_in(NodeStatus::Ready).len(), 1);

        let text = snapshot.to_json().unwrap();
        assert!(text.contains("\"execution_id\": \"exec-1\""));
    }
}
