use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PermissionError;
use crate::graph::ModelTier;

/// Built-in agent tools gated by [`CoreToolPermissions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreTool {
    Read,
    Write,
    Edit,
    Glob,
    Grep,
    Task,
    WebFetch,
    WebSearch,
    TodoWrite,
    Ls,
    NotebookEdit,
}

impl CoreTool {
    pub const ALL: [CoreTool; 11] = [
        CoreTool::Read,
        CoreTool::Write,
        CoreTool::Edit,
        CoreTool::Glob,
        CoreTool::Grep,
        CoreTool::Task,
        CoreTool::WebFetch,
        CoreTool::WebSearch,
        CoreTool::TodoWrite,
        CoreTool::Ls,
        CoreTool::NotebookEdit,
    ];

    /// Tool name as agents request it, e.g. `WebFetch`.
    pub fn name(self) -> &'static str {
        match self {
            CoreTool::Read => "Read",
            CoreTool::Write => "Write",
            CoreTool::Edit => "Edit",
            CoreTool::Glob => "Glob",
            CoreTool::Grep => "Grep",
            CoreTool::Task => "Task",
            CoreTool::WebFetch => "WebFetch",
            CoreTool::WebSearch => "WebSearch",
            CoreTool::TodoWrite => "TodoWrite",
            CoreTool::Ls => "Ls",
            CoreTool::NotebookEdit => "NotebookEdit",
        }
    }

    /// Matrix field backing this tool, e.g. `core_tools.web_fetch`.
    pub fn field(self) -> &'static str {
        match self {
            CoreTool::Read => "core_tools.read",
            CoreTool::Write => "core_tools.write",
            CoreTool::Edit => "core_tools.edit",
            CoreTool::Glob => "core_tools.glob",
            CoreTool::Grep => "core_tools.grep",
            CoreTool::Task => "core_tools.task",
            CoreTool::WebFetch => "core_tools.web_fetch",
            CoreTool::WebSearch => "core_tools.web_search",
            CoreTool::TodoWrite => "core_tools.todo_write",
            CoreTool::Ls => "core_tools.ls",
            CoreTool::NotebookEdit => "core_tools.notebook_edit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreToolPermissions {
    pub read: bool,
    pub write: bool,
    pub edit: bool,
    pub glob: bool,
    pub grep: bool,
    pub task: bool,
    pub web_fetch: bool,
    pub web_search: bool,
    pub todo_write: bool,
    pub ls: bool,
    pub notebook_edit: bool,
}

impl CoreToolPermissions {
    pub fn all(enabled: bool) -> Self {
        Self {
            read: enabled,
            write: enabled,
            edit: enabled,
            glob: enabled,
            grep: enabled,
            task: enabled,
            web_fetch: enabled,
            web_search: enabled,
            todo_write: enabled,
            ls: enabled,
            notebook_edit: enabled,
        }
    }

    pub fn allows(&self, tool: CoreTool) -> bool {
        match tool {
            CoreTool::Read => self.read,
            CoreTool::Write => self.write,
            CoreTool::Edit => self.edit,
            CoreTool::Glob => self.glob,
            CoreTool::Grep => self.grep,
            CoreTool::Task => self.task,
            CoreTool::WebFetch => self.web_fetch,
            CoreTool::WebSearch => self.web_search,
            CoreTool::TodoWrite => self.todo_write,
            CoreTool::Ls => self.ls,
            CoreTool::NotebookEdit => self.notebook_edit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BashPermissions {
    pub enabled: bool,
    pub sandboxed: bool,
    /// Regex patterns; an empty list allows any command that is not denied.
    pub allowed_patterns: Vec<String>,
    pub denied_patterns: Vec<String>,
    pub max_execution_time_ms: u64,
    pub allow_background: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemPermissions {
    /// Glob patterns; an empty list allows any path that is not denied.
    pub read_patterns: Vec<String>,
    pub write_patterns: Vec<String>,
    pub deny_patterns: Vec<String>,
    pub max_read_size_bytes: u64,
    pub max_write_size_bytes: u64,
    pub max_total_write_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpToolPermissions {
    /// `server:tool` specs, `*` wildcards allowed on either side.
    pub allowed: Vec<String>,
    pub denied: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkPermissions {
    pub enabled: bool,
    /// Exact hosts or `*.example.com`; empty allows every host not denied.
    pub allowed_domains: Vec<String>,
    pub denied_domains: Vec<String>,
    pub allowed_protocols: Vec<String>,
    pub max_request_size_bytes: u64,
    pub max_response_size_bytes: u64,
    pub request_timeout_ms: u64,
    pub max_concurrent_requests: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPermissions {
    pub allowed: Vec<ModelTier>,
    pub preferred_for_spawning: Option<ModelTier>,
    pub max_tokens_per_model: BTreeMap<ModelTier, u32>,
    pub allow_escalation: bool,
}

impl Default for ModelPermissions {
    fn default() -> Self {
        Self {
            allowed: vec![ModelTier::Haiku, ModelTier::Sonnet, ModelTier::Opus],
            preferred_for_spawning: None,
            max_tokens_per_model: BTreeMap::new(),
            allow_escalation: false,
        }
    }
}

impl ModelPermissions {
    pub fn allows(&self, tier: ModelTier) -> bool {
        self.allowed.contains(&tier)
    }

    /// Replacement tier for a disallowed choice: the preferred tier when it is
    /// itself allowed, else the first allowed tier.
    pub fn fallback(&self) -> Option<ModelTier> {
        self.preferred_for_spawning
            .filter(|tier| self.allows(*tier))
            .or_else(|| self.allowed.first().copied())
    }
}

/// Capability matrix consulted before any node is dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionMatrix {
    pub core_tools: CoreToolPermissions,
    pub bash: BashPermissions,
    pub file_system: FileSystemPermissions,
    pub mcp_tools: McpToolPermissions,
    pub network: NetworkPermissions,
    pub models: ModelPermissions,
}

impl PermissionMatrix {
    /// Deep-merge a partial JSON document over this matrix.
    ///
    /// Objects merge key by key; arrays and scalars replace the base value.
    pub fn with_overrides(&self, overrides: &Value) -> Result<Self, PermissionError> {
        if overrides.is_null() {
            return Ok(self.clone());
        }
        if !overrides.is_object() {
            return Err(PermissionError::InvalidOverrides(
                "overrides must be a JSON object".to_string(),
            ));
        }

        let mut base = serde_json::to_value(self)
            .map_err(|e| PermissionError::InvalidOverrides(e.to_string()))?;
        deep_merge(&mut base, overrides);
        serde_json::from_value(base).map_err(|e| PermissionError::InvalidOverrides(e.to_string()))
    }
}

fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                let nested = value.is_object() && target.get(key).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = target.get_mut(key) {
                        deep_merge(existing, value);
                    }
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// How aggressively shell commands are screened beyond the matrix itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    Strict,
    #[default]
    Moderate,
    Permissive,
}

impl IsolationLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "moderate" => Some(Self::Moderate),
            "permissive" => Some(Self::Permissive),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_core_tool_names_round_trip() {
        for tool in CoreTool::ALL {
            assert_eq!(CoreTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(CoreTool::from_name("Bash"), None);
    }

    #[test]
    fn test_overrides_merge_objects_and_replace_arrays() {
        let mut base = PermissionMatrix::default();
        base.core_tools.read = true;
        base.bash.denied_patterns = vec!["sudo".into(), "eval".into()];

        let merged = base
            .with_overrides(&json!({
                "core_tools": { "write": true },
                "bash": { "denied_patterns": ["mkfs"] },
                "models": { "allowed": ["haiku"] }
            }))
            .unwrap();

        assert!(merged.core_tools.read);
        assert!(merged.core_tools.write);
        assert_eq!(merged.bash.denied_patterns, vec!["mkfs".to_string()]);
        assert_eq!(merged.models.allowed, vec![ModelTier::Haiku]);
    }

    #[test]
    fn test_overrides_reject_bad_shapes() {
        let base = PermissionMatrix::default();
        assert!(base.with_overrides(&json!([1, 2])).is_err());
        assert!(base
            .with_overrides(&json!({"models": {"allowed": ["gpt"]}}))
            .is_err());
        assert_eq!(base.with_overrides(&Value::Null).unwrap(), base);
    }

    #[test]
    fn test_model_fallback() {
        let models = ModelPermissions {
            allowed: vec![ModelTier::Sonnet, ModelTier::Opus],
            preferred_for_spawning: Some(ModelTier::Haiku),
            ..ModelPermissions::default()
        };
        assert_eq!(models.fallback(), Some(ModelTier::Sonnet));
    }
}
