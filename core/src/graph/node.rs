use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::conflict::SingletonKind;

/// Node identifier, unique within one DAG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Closed set of node kinds. Dispatch behaviour is resolved from this tag.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    #[default]
    GenericTask,
    AgentTask,
    ToolCall,
    Composite,
    Conditional,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::GenericTask,
        NodeKind::AgentTask,
        NodeKind::ToolCall,
        NodeKind::Composite,
        NodeKind::Conditional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GenericTask => "generic-task",
            Self::AgentTask => "agent-task",
            Self::ToolCall => "tool-call",
            Self::Composite => "composite",
            Self::Conditional => "conditional",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model tier hint, ordered from cheapest to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Haiku,
    Sonnet,
    Opus,
}

impl ModelTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Haiku => "haiku",
            Self::Sonnet => "sonnet",
            Self::Opus => "opus",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "haiku" => Some(Self::Haiku),
            "sonnet" => Some(Self::Sonnet),
            "opus" => Some(Self::Opus),
            _ => None,
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-node configuration. Opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Advisory retry budget; the orchestrator never retries on its own.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub model: Option<ModelTier>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Declared write scopes (paths or `*` patterns), used by conflict analysis.
    #[serde(default)]
    pub writes: Vec<String>,

    #[serde(default)]
    pub singleton: Option<SingletonKind>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            model: None,
            max_tokens: None,
            writes: Vec::new(),
            singleton: None,
            metadata: serde_json::Map::new(),
        }
    }
}

/// One unit of work in the DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub prompt: Option<String>,

    #[serde(default)]
    pub kind: NodeKind,

    /// Named skill, or `server:tool` for tool-call nodes.
    #[serde(default)]
    pub capability: Option<String>,

    /// Explicit agent type, bypassing the dispatch table.
    #[serde(default)]
    pub agent: Option<String>,

    #[serde(default)]
    pub dependencies: BTreeSet<NodeId>,

    #[serde(default)]
    pub config: NodeConfig,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            description: None,
            prompt: None,
            kind,
            capability: None,
            agent: None,
            dependencies: BTreeSet::new(),
            config: NodeConfig::default(),
            tags: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_model(mut self, model: ModelTier) -> Self {
        self.config.model = Some(model);
        self
    }

    pub fn with_writes<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.writes.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_singleton(mut self, kind: SingletonKind) -> Self {
        self.config.singleton = Some(kind);
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Text used for heuristics (singleton detection, descriptions).
    pub fn summary_text(&self) -> &str {
        self.description
            .as_deref()
            .or(self.prompt.as_deref())
            .unwrap_or(self.id.as_str())
    }
}
