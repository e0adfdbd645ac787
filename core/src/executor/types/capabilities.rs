use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::ModelTier;

/// Backend families an executor can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    TaskTool,
    Process,
    Worktree,
    Mcp,
    InProcess,
}

impl ExecutorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskTool => "task-tool",
            Self::Process => "process",
            Self::Worktree => "worktree",
            Self::Mcp => "mcp",
            Self::InProcess => "in-process",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorCapabilities {
    pub max_parallelism: usize,
    pub supports_streaming: bool,
    pub supports_cancellation: bool,
    pub supports_mcp: bool,
    pub supported_models: Vec<ModelTier>,
}

impl Default for ExecutorCapabilities {
    fn default() -> Self {
        Self {
            max_parallelism: num_cpus::get().max(1),
            supports_streaming: false,
            supports_cancellation: true,
            supports_mcp: false,
            supported_models: vec![ModelTier::Haiku, ModelTier::Sonnet, ModelTier::Opus],
        }
    }
}
