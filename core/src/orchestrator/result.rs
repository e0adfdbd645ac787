use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dispatch::DispatchDescriptor;
use crate::conflict::NodeConflict;
use crate::error::TaskError;
use crate::graph::NodeId;
use crate::state::{ExecutionSnapshot, TokenUsage};

/// Outcome of one run. Failed runs still carry a complete snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub snapshot: ExecutionSnapshot,
    /// Declared DAG outputs by name.
    pub outputs: BTreeMap<String, Value>,
    pub total_token_usage: TokenUsage,
    pub total_time_ms: u64,
    pub errors: Vec<TaskError>,
}

impl ExecutionResult {
    pub fn execution_id(&self) -> &str {
        &self.snapshot.execution_id
    }

    pub fn total_waves(&self) -> usize {
        self.snapshot.total_waves
    }
}

/// A node the plan would not dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeniedDispatch {
    pub node_id: NodeId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavePlan {
    pub wave_number: usize,
    pub node_ids: Vec<NodeId>,
    pub dispatches: BTreeMap<NodeId, DispatchDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denied: Vec<DeniedDispatch>,
    pub parallelizable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<NodeConflict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_reason: Option<String>,
}

/// Dry-run view of a DAG: waves, dispatch descriptors and conflict analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub dag_id: String,
    pub dag_name: String,
    pub total_nodes: usize,
    pub total_waves: usize,
    pub waves: Vec<WavePlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionPlan {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn conflict_count(&self) -> usize {
        self.waves.iter().map(|w| w.conflicts.len()).sum()
    }
}
