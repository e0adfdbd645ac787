//! Node → dispatch descriptor resolution.
//!
//! Each node is resolved exactly once per wave into a [`DispatchDescriptor`]:
//! the agent profile comes from a [`DispatchTable`] keyed by [`NodeKind`],
//! with named-capability overrides layered on top.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::ExecutionContext;
use crate::executor::ExecutionRequest;
use crate::graph::{ModelTier, Node, NodeId, NodeKind};
use crate::permissions::{ModelPermissions, PermissionRequest};

pub const DEFAULT_AGENT: &str = "general-purpose";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("tool-call node {0} has no `server:tool` capability")]
    MissingToolCapability(NodeId),

    #[error("tool-call node {node_id} has malformed capability `{capability}`")]
    MalformedToolSpec { node_id: NodeId, capability: String },
}

/// Static knobs used while resolving nodes.
#[derive(Debug, Clone, Copy)]
pub struct DispatchDefaults {
    pub model: ModelTier,
    pub max_turns: u32,
}

/// Resolved work order for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchDescriptor {
    pub node_id: NodeId,
    pub description: String,
    pub prompt: String,
    pub agent_type: String,
    pub model: ModelTier,
    /// `true` when the model came from the node itself.
    pub explicit_model: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    pub max_turns: u32,
    pub timeout_ms: u64,
    /// Checks that must all pass before dispatch.
    pub permission_requests: Vec<PermissionRequest>,
}

impl DispatchDescriptor {
    pub fn into_request(self, ctx: &ExecutionContext, node: &Node) -> ExecutionRequest {
        ExecutionRequest {
            dependency_results: ctx.dependency_outputs(node),
            context: ctx.variables.clone(),
            node_id: self.node_id,
            prompt: self.prompt,
            description: self.description,
            capability: self.capability,
            agent_type: self.agent_type,
            model: self.model,
            max_turns: self.max_turns,
            timeout_ms: self.timeout_ms,
        }
    }
}

/// NodeKind → agent profile, with capability overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchTable {
    kinds: HashMap<NodeKind, String>,
    capabilities: HashMap<String, String>,
}

impl Default for DispatchTable {
    fn default() -> Self {
        let kinds = NodeKind::ALL
            .into_iter()
            .map(|kind| {
                let agent = match kind {
                    NodeKind::Composite => "Plan",
                    _ => DEFAULT_AGENT,
                };
                (kind, agent.to_string())
            })
            .collect();

        let capabilities = [
            ("graph-builder", "Plan"),
            ("dynamic-replanner", "Plan"),
            ("skill-registry", "Explore"),
            ("semantic-matcher", "Explore"),
            ("output-validator", "code-reviewer"),
            ("iteration-detector", "debugger"),
            ("failure-analyzer", "debugger"),
            ("performance-profiler", "performance-engineer"),
        ]
        .into_iter()
        .map(|(cap, agent)| (cap.to_string(), agent.to_string()))
        .collect();

        Self {
            kinds,
            capabilities,
        }
    }
}

impl DispatchTable {
    /// Table with every kind mapped to the general-purpose agent and no overrides.
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
            capabilities: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: NodeKind, agent: impl Into<String>) -> Self {
        self.kinds.insert(kind, agent.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>, agent: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into(), agent.into());
        self
    }

    /// Agent for a node: explicit override, then capability, then
    /// `metadata.subagent_type`, then the node's kind.
    pub fn agent_for(&self, node: &Node) -> String {
        if let Some(agent) = &node.agent {
            return agent.clone();
        }
        if let Some(agent) = node
            .capability
            .as_deref()
            .and_then(|cap| self.capabilities.get(cap))
        {
            return agent.clone();
        }
        if let Some(agent) = node
            .config
            .metadata
            .get("subagent_type")
            .and_then(|v| v.as_str())
        {
            return agent.to_string();
        }
        self.kinds
            .get(&node.kind)
            .cloned()
            .unwrap_or_else(|| DEFAULT_AGENT.to_string())
    }

    pub fn resolve(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
        defaults: DispatchDefaults,
        models: &ModelPermissions,
    ) -> Result<DispatchDescriptor, DispatchError> {
        let mut permission_requests = vec![PermissionRequest::tool("Task").with_action("execute")];

        if node.kind == NodeKind::ToolCall {
            let spec = node
                .capability
                .as_deref()
                .ok_or_else(|| DispatchError::MissingToolCapability(node.id.clone()))?;
            if !spec.contains(':') {
                return Err(DispatchError::MalformedToolSpec {
                    node_id: node.id.clone(),
                    capability: spec.to_string(),
                });
            }
            permission_requests.push(PermissionRequest::mcp(spec).with_action("invoke"));
        }

        let (model, explicit_model) = select_model(node, defaults.model, models);
        permission_requests.push(PermissionRequest::model(model));

        Ok(DispatchDescriptor {
            node_id: node.id.clone(),
            description: describe(node),
            prompt: build_prompt(node, ctx),
            agent_type: self.agent_for(node),
            model,
            explicit_model,
            capability: node.capability.clone(),
            max_turns: defaults.max_turns,
            timeout_ms: node.config.timeout_ms,
            permission_requests,
        })
    }
}

/// Complexity estimate used when the node does not pin a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

pub fn estimate_complexity(node: &Node) -> Complexity {
    if node.kind == NodeKind::Composite {
        return Complexity::Complex;
    }
    match node.dependencies.len() {
        0 => Complexity::Simple,
        n if n > 3 => Complexity::Complex,
        _ => Complexity::Moderate,
    }
}

/// Pick a model tier. Returns the tier and whether the node chose it explicitly.
///
/// Explicit choices are never clamped; the permission check decides them.
pub fn select_model(
    node: &Node,
    default_model: ModelTier,
    models: &ModelPermissions,
) -> (ModelTier, bool) {
    if let Some(model) = node.config.model {
        return (model, true);
    }

    let chosen = match estimate_complexity(node) {
        Complexity::Simple => ModelTier::Haiku,
        Complexity::Complex => ModelTier::Opus,
        Complexity::Moderate => default_model,
    };

    if models.allows(chosen) {
        (chosen, false)
    } else {
        (models.fallback().unwrap_or(chosen), false)
    }
}

fn describe(node: &Node) -> String {
    if let Some(capability) = &node.capability {
        return format!("Execute {capability}");
    }
    if node.kind == NodeKind::Composite {
        return format!("Execute sub-DAG {}", node.id);
    }
    format!("Execute node {}", node.id)
}

fn pretty(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// Render the work prompt for a node, including dependency results and
/// run variables.
pub fn build_prompt(node: &Node, ctx: &ExecutionContext) -> String {
    let mut parts: Vec<String> = vec![format!("## Task: {}", node.id), String::new()];

    if let Some(prompt) = node.prompt.as_deref().or(node.description.as_deref()) {
        parts.push(prompt.to_string());
        parts.push(String::new());
    }

    if let Some(capability) = &node.capability {
        parts.push(format!("Execute the {capability} skill."));
        parts.push(String::new());
    }

    let deps: BTreeMap<_, _> = ctx.dependency_outputs(node);
    if !deps.is_empty() {
        parts.push("## Results from Dependencies".to_string());
        for (dep, output) in &deps {
            parts.push(format!("### {dep}"));
            parts.push("```json".to_string());
            parts.push(pretty(output));
            parts.push("```".to_string());
            parts.push(String::new());
        }
    }

    if !ctx.variables.is_empty() {
        parts.push("## Available Variables".to_string());
        parts.push("```json".to_string());
        parts.push(pretty(&ctx.variables));
        parts.push("```".to_string());
        parts.push(String::new());
    }

    parts.push("## Output Format".to_string());
    parts.push("Return your result as valid JSON with the following structure:".to_string());
    parts.push("```json".to_string());
    parts.push(pretty(&serde_json::json!({
        "output": "/* your result data */",
        "confidence": 0.95,
    })));
    parts.push("```".to_string());

    parts.join("\n")
}
