use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::matrix::{CoreTool, IsolationLevel, PermissionMatrix};
use super::presets::PresetName;
use super::PermissionError;
use crate::graph::ModelTier;

/// Default audit log capacity.
pub const DEFAULT_MAX_AUDIT_ENTRIES: usize = 1000;

lazy_static! {
    // Screened in strict isolation regardless of the matrix.
    static ref DANGEROUS_COMMANDS: Vec<Regex> = vec![
        Regex::new(r"rm\s+-rf").unwrap(),
        Regex::new(r"sudo").unwrap(),
        Regex::new(r"chmod\s+777").unwrap(),
        Regex::new(r">\s*/dev/").unwrap(),
        Regex::new(r"mkfs").unwrap(),
        Regex::new(r"dd\s+if=").unwrap(),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestType {
    Tool,
    FileRead,
    FileWrite,
    Bash,
    Mcp,
    Network,
    Model,
}

/// One resource/action pair to check against the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    #[serde(rename = "type")]
    pub kind: RequestType,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl PermissionRequest {
    pub fn new(kind: RequestType, resource: impl Into<String>) -> Self {
        Self {
            kind,
            resource: resource.into(),
            action: None,
        }
    }

    pub fn tool(name: &str) -> Self {
        Self::new(RequestType::Tool, name)
    }

    pub fn file_read(path: &str) -> Self {
        Self::new(RequestType::FileRead, path)
    }

    pub fn file_write(path: &str) -> Self {
        Self::new(RequestType::FileWrite, path)
    }

    pub fn bash(command: &str) -> Self {
        Self::new(RequestType::Bash, command)
    }

    pub fn mcp(spec: &str) -> Self {
        Self::new(RequestType::Mcp, spec)
    }

    pub fn network(url: &str) -> Self {
        Self::new(RequestType::Network, url)
    }

    pub fn model(tier: ModelTier) -> Self {
        Self::new(RequestType::Model, tier.as_str())
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ToolDenied,
    FileReadDenied,
    FileWriteDenied,
    BashDenied,
    BashPatternDenied,
    McpDenied,
    NetworkDenied,
    ModelDenied,
    IsolationViolation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub resource: String,
    /// Matrix field that caused the denial, e.g. `bash.denied_patterns`.
    pub permission: String,
    pub message: String,
}

impl Violation {
    fn new(kind: ViolationKind, resource: &str, permission: &str, message: String) -> Self {
        Self {
            kind,
            resource: resource.to_string(),
            permission: permission.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl EnforcementResult {
    fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            allowed: violations.is_empty(),
            reason: violations.first().map(|v| v.message.clone()),
            violations,
            suggestions: Vec::new(),
        }
    }

    fn deny(violation: Violation) -> Self {
        Self::from_violations(vec![violation])
    }

    fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub request: PermissionRequest,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_us: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct EnforcerOptions {
    pub isolation_level: IsolationLevel,
    pub max_audit_entries: usize,
}

impl Default for EnforcerOptions {
    fn default() -> Self {
        Self {
            isolation_level: IsolationLevel::Moderate,
            max_audit_entries: DEFAULT_MAX_AUDIT_ENTRIES,
        }
    }
}

/// Regex compiled from a matrix entry. Patterns that fail to compile fall
/// back to substring matching.
#[derive(Debug)]
struct CommandPattern {
    source: String,
    regex: Option<Regex>,
}

impl CommandPattern {
    fn compile(source: &str) -> Self {
        let regex = Regex::new(source).ok();
        if regex.is_none() {
            tracing::warn!(pattern = source, "invalid command pattern, using substring match");
        }
        Self {
            source: source.to_string(),
            regex,
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(text),
            None => text.contains(&self.source),
        }
    }
}

/// Checks permission requests against an immutable [`PermissionMatrix`].
#[derive(Debug)]
pub struct PermissionEnforcer {
    matrix: PermissionMatrix,
    options: EnforcerOptions,
    bash_allowed: Vec<CommandPattern>,
    bash_denied: Vec<CommandPattern>,
    audit: Mutex<VecDeque<AuditEntry>>,
}

impl PermissionEnforcer {
    pub fn new(matrix: PermissionMatrix, options: EnforcerOptions) -> Self {
        let bash_allowed = matrix
            .bash
            .allowed_patterns
            .iter()
            .map(|p| CommandPattern::compile(p))
            .collect();
        let bash_denied = matrix
            .bash
            .denied_patterns
            .iter()
            .map(|p| CommandPattern::compile(p))
            .collect();

        Self {
            matrix,
            options,
            bash_allowed,
            bash_denied,
            audit: Mutex::new(VecDeque::new()),
        }
    }

    /// Enforcer for a preset, using the preset's natural isolation level.
    pub fn from_preset(preset: PresetName) -> Self {
        Self::new(
            preset.matrix(),
            EnforcerOptions {
                isolation_level: preset.isolation_level(),
                ..EnforcerOptions::default()
            },
        )
    }

    pub fn matrix(&self) -> &PermissionMatrix {
        &self.matrix
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.options.isolation_level
    }

    pub fn check(&self, request: &PermissionRequest) -> EnforcementResult {
        let started = Instant::now();
        let resource = request.resource.as_str();

        let result = match request.kind {
            RequestType::Tool => self.check_tool(resource),
            RequestType::FileRead => self.check_file_read(resource),
            RequestType::FileWrite => self.check_file_write(resource),
            RequestType::Bash => self.check_bash(resource),
            RequestType::Mcp => self.check_mcp(resource),
            RequestType::Network => self.check_network(resource),
            RequestType::Model => self.check_model(resource),
        };

        tracing::debug!(
            kind = ?request.kind,
            resource,
            allowed = result.allowed,
            "permission check"
        );
        self.record(request, &result, started);
        result
    }

    /// Like [`check`](Self::check), but a denial becomes an error.
    pub fn enforce(&self, request: &PermissionRequest) -> Result<(), PermissionError> {
        let result = self.check(request);
        if result.allowed {
            return Ok(());
        }
        Err(PermissionError::Denied {
            reason: result
                .reason
                .unwrap_or_else(|| "Permission denied".to_string()),
            violations: result.violations,
        })
    }

    pub fn check_all(&self, requests: &[PermissionRequest]) -> Vec<EnforcementResult> {
        requests.iter().map(|r| self.check(r)).collect()
    }

    /// Most recent audit entries, oldest first. `None` returns everything kept.
    pub fn audit_log(&self, limit: Option<usize>) -> Vec<AuditEntry> {
        let Ok(log) = self.audit.lock() else {
            return Vec::new();
        };
        let skip = limit.map_or(0, |l| log.len().saturating_sub(l));
        log.iter().skip(skip).cloned().collect()
    }

    pub fn clear_audit_log(&self) {
        if let Ok(mut log) = self.audit.lock() {
            log.clear();
        }
    }

    fn record(&self, request: &PermissionRequest, result: &EnforcementResult, started: Instant) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            request: request.clone(),
            allowed: result.allowed,
            reason: result.reason.clone(),
            duration_us: started.elapsed().as_micros() as u64,
        };
        if let Ok(mut log) = self.audit.lock() {
            log.push_back(entry);
            while log.len() > self.options.max_audit_entries {
                log.pop_front();
            }
        }
    }

    fn check_tool(&self, name: &str) -> EnforcementResult {
        let Some(tool) = CoreTool::from_name(name) else {
            return EnforcementResult::deny(Violation::new(
                ViolationKind::ToolDenied,
                name,
                "core_tools",
                format!("Unknown tool \"{name}\""),
            ));
        };
        if self.matrix.core_tools.allows(tool) {
            return EnforcementResult::from_violations(Vec::new());
        }
        EnforcementResult::deny(Violation::new(
            ViolationKind::ToolDenied,
            name,
            tool.field(),
            format!("Tool \"{name}\" is not allowed"),
        ))
    }

    fn denied_path(&self, path: &str, kind: ViolationKind) -> Option<EnforcementResult> {
        self.matrix
            .file_system
            .deny_patterns
            .iter()
            .find(|pattern| matches_glob(path, pattern))
            .map(|pattern| {
                EnforcementResult::deny(Violation::new(
                    kind,
                    path,
                    "file_system.deny_patterns",
                    format!("Path \"{path}\" matches deny pattern \"{pattern}\""),
                ))
            })
    }

    fn check_file_read(&self, path: &str) -> EnforcementResult {
        if let Some(denied) = self.denied_path(path, ViolationKind::FileReadDenied) {
            return denied;
        }

        let patterns = &self.matrix.file_system.read_patterns;
        if patterns.is_empty() || patterns.iter().any(|p| matches_glob(path, p)) {
            return EnforcementResult::from_violations(Vec::new());
        }

        let result = EnforcementResult::deny(Violation::new(
            ViolationKind::FileReadDenied,
            path,
            "file_system.read_patterns",
            format!("Path \"{path}\" does not match any allowed read pattern"),
        ));
        let similar = similar_patterns(path, patterns);
        if similar.is_empty() {
            result
        } else {
            result.with_suggestion(format!("Similar allowed patterns: {}", similar.join(", ")))
        }
    }

    fn check_file_write(&self, path: &str) -> EnforcementResult {
        if let Some(denied) = self.denied_path(path, ViolationKind::FileWriteDenied) {
            return denied;
        }

        let tools = &self.matrix.core_tools;
        if !tools.write && !tools.edit {
            return EnforcementResult::deny(Violation::new(
                ViolationKind::FileWriteDenied,
                path,
                "core_tools.write",
                "Write operations are not allowed".to_string(),
            ));
        }

        let patterns = &self.matrix.file_system.write_patterns;
        if patterns.is_empty() || patterns.iter().any(|p| matches_glob(path, p)) {
            return EnforcementResult::from_violations(Vec::new());
        }
        EnforcementResult::deny(Violation::new(
            ViolationKind::FileWriteDenied,
            path,
            "file_system.write_patterns",
            format!("Path \"{path}\" does not match any allowed write pattern"),
        ))
    }

    fn check_bash(&self, command: &str) -> EnforcementResult {
        if !self.matrix.bash.enabled {
            return EnforcementResult::deny(Violation::new(
                ViolationKind::BashDenied,
                command,
                "bash.enabled",
                "Bash commands are not allowed".to_string(),
            ));
        }

        if let Some(pattern) = self.bash_denied.iter().find(|p| p.is_match(command)) {
            return EnforcementResult::deny(Violation::new(
                ViolationKind::BashPatternDenied,
                command,
                "bash.denied_patterns",
                format!("Command matches denied pattern \"{}\"", pattern.source),
            ));
        }

        let mut violations = Vec::new();
        if !self.bash_allowed.is_empty() && !self.bash_allowed.iter().any(|p| p.is_match(command)) {
            violations.push(Violation::new(
                ViolationKind::BashPatternDenied,
                command,
                "bash.allowed_patterns",
                "Command does not match any allowed pattern".to_string(),
            ));
        }

        if self.options.isolation_level == IsolationLevel::Strict
            && DANGEROUS_COMMANDS.iter().any(|re| re.is_match(command))
        {
            violations.push(Violation::new(
                ViolationKind::IsolationViolation,
                command,
                "isolation_level",
                "Command contains dangerous pattern in strict isolation mode".to_string(),
            ));
        }

        EnforcementResult::from_violations(violations)
    }

    fn check_mcp(&self, spec: &str) -> EnforcementResult {
        let mcp = &self.matrix.mcp_tools;

        if let Some(pattern) = mcp.denied.iter().find(|p| matches_mcp_spec(spec, p)) {
            return EnforcementResult::deny(Violation::new(
                ViolationKind::McpDenied,
                spec,
                "mcp_tools.denied",
                format!("MCP tool \"{spec}\" is explicitly denied by \"{pattern}\""),
            ));
        }

        if mcp.allowed.iter().any(|p| matches_mcp_spec(spec, p)) {
            return EnforcementResult::from_violations(Vec::new());
        }
        EnforcementResult::deny(Violation::new(
            ViolationKind::McpDenied,
            spec,
            "mcp_tools.allowed",
            format!("MCP tool \"{spec}\" is not in allowed list"),
        ))
    }

    fn check_network(&self, target: &str) -> EnforcementResult {
        let network = &self.matrix.network;
        if !network.enabled {
            return EnforcementResult::deny(Violation::new(
                ViolationKind::NetworkDenied,
                target,
                "network.enabled",
                "Network access is not allowed".to_string(),
            ));
        }

        // Bare hosts are accepted as well as full URLs.
        let parsed = url::Url::parse(target).ok();
        let domain = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .unwrap_or(target)
            .to_ascii_lowercase();

        if network.denied_domains.iter().any(|d| matches_domain(&domain, d)) {
            return EnforcementResult::deny(Violation::new(
                ViolationKind::NetworkDenied,
                target,
                "network.denied_domains",
                format!("Domain \"{domain}\" is explicitly denied"),
            ));
        }

        let mut violations = Vec::new();
        if let Some(url) = &parsed {
            let scheme = url.scheme();
            if !network.allowed_protocols.is_empty()
                && !network.allowed_protocols.iter().any(|p| p == scheme)
            {
                violations.push(Violation::new(
                    ViolationKind::NetworkDenied,
                    target,
                    "network.allowed_protocols",
                    format!("Protocol \"{scheme}\" is not allowed"),
                ));
            }
        }

        if !network.allowed_domains.is_empty()
            && !network.allowed_domains.iter().any(|d| matches_domain(&domain, d))
        {
            violations.push(Violation::new(
                ViolationKind::NetworkDenied,
                target,
                "network.allowed_domains",
                format!("Domain \"{domain}\" is not in allowed list"),
            ));
        }

        EnforcementResult::from_violations(violations)
    }

    fn check_model(&self, model: &str) -> EnforcementResult {
        let models = &self.matrix.models;
        let allowed_list = models
            .allowed
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let allowed = ModelTier::parse(model).is_some_and(|tier| models.allows(tier));
        if allowed {
            return EnforcementResult::from_violations(Vec::new());
        }

        EnforcementResult::deny(Violation::new(
            ViolationKind::ModelDenied,
            model,
            "models.allowed",
            format!("Model \"{model}\" is not allowed. Allowed: {allowed_list}"),
        ))
        .with_suggestion(format!("Consider using: {allowed_list}"))
    }
}

fn matches_glob(path: &str, pattern: &str) -> bool {
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches_with(path, options),
        Err(_) => path == pattern,
    }
}

fn matches_mcp_spec(spec: &str, pattern: &str) -> bool {
    if pattern == "*" || pattern == spec {
        return true;
    }
    if !pattern.contains('*') {
        return false;
    }
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Regex::new(&format!("^{}$", escaped.join(".*")))
        .map(|re| re.is_match(spec))
        .unwrap_or(false)
}

fn matches_domain(domain: &str, pattern: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    if pattern == "*" || pattern == domain {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(base) => domain == base || domain.ends_with(&format!(".{base}")),
        None => false,
    }
}

fn similar_patterns<'a>(path: &str, patterns: &'a [String]) -> Vec<&'a str> {
    let path_parts: Vec<&str> = path.split('/').collect();
    patterns
        .iter()
        .filter(|pattern| {
            let parts: Vec<&str> = pattern.split('/').collect();
            parts.first() == path_parts.first()
                || (parts.len() > 1 && parts.get(1) == path_parts.get(1))
        })
        .map(String::as_str)
        .take(3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn standard() -> PermissionEnforcer {
        PermissionEnforcer::from_preset(PresetName::Standard)
    }

    #[test]
    fn test_tool_in_matrix_allowed_absent_denied() {
        let enforcer = PermissionEnforcer::from_preset(PresetName::ReadOnly);
        assert!(enforcer.check(&PermissionRequest::tool("Read")).allowed);

        let denied = enforcer.check(&PermissionRequest::tool("Write"));
        assert!(!denied.allowed);
        assert_eq!(denied.violations[0].permission, "core_tools.write");

        let unknown = enforcer.check(&PermissionRequest::tool("Teleport"));
        assert!(!unknown.allowed);
        assert_eq!(unknown.violations[0].kind, ViolationKind::ToolDenied);
    }

    #[test]
    fn test_file_deny_patterns_take_precedence() {
        let enforcer = standard();
        assert!(enforcer.check(&PermissionRequest::file_read("src/main.rs")).allowed);

        let secret = enforcer.check(&PermissionRequest::file_read("config/.env.local"));
        assert!(!secret.allowed);
        assert_eq!(secret.violations[0].permission, "file_system.deny_patterns");

        assert!(enforcer.check(&PermissionRequest::file_write("src/lib/mod.rs")).allowed);
        assert!(!enforcer.check(&PermissionRequest::file_write("target/out.bin")).allowed);
    }

    #[test]
    fn test_write_denied_without_write_tools() {
        let enforcer = PermissionEnforcer::from_preset(PresetName::ReadOnly);
        let result = enforcer.check(&PermissionRequest::file_write("src/a.rs"));
        assert!(!result.allowed);
        assert_eq!(result.reason.as_deref(), Some("Write operations are not allowed"));
    }

    #[test]
    fn test_bash_patterns() {
        let enforcer = standard();
        assert!(enforcer.check(&PermissionRequest::bash("cargo test")).allowed);
        assert!(enforcer.check(&PermissionRequest::bash("rm -rf build")).allowed);
        assert!(!enforcer.check(&PermissionRequest::bash("rm -rf /")).allowed);
        assert!(!enforcer.check(&PermissionRequest::bash("sudo make install")).allowed);
        assert!(!enforcer.check(&PermissionRequest::bash("shutdown now")).allowed);

        let strict = PermissionEnforcer::from_preset(PresetName::Minimal);
        let result = strict.check(&PermissionRequest::bash("ls"));
        assert_eq!(result.violations[0].kind, ViolationKind::BashDenied);
    }

    #[test]
    fn test_strict_isolation_adds_dangerous_patterns() {
        let enforcer = PermissionEnforcer::new(
            PresetName::Full.matrix(),
            EnforcerOptions {
                isolation_level: IsolationLevel::Strict,
                ..EnforcerOptions::default()
            },
        );
        let result = enforcer.check(&PermissionRequest::bash("rm -rf ./tmp"));
        assert!(!result.allowed);
        assert_eq!(result.violations[0].kind, ViolationKind::IsolationViolation);

        let permissive = PermissionEnforcer::from_preset(PresetName::Full);
        assert!(permissive.check(&PermissionRequest::bash("rm -rf ./tmp")).allowed);
    }

    #[test]
    fn test_mcp_wildcards() {
        let enforcer = PermissionEnforcer::from_preset(PresetName::ReadOnly);
        assert!(enforcer.check(&PermissionRequest::mcp("octocode:search")).allowed);
        assert!(!enforcer.check(&PermissionRequest::mcp("filesystem:write_file")).allowed);

        let minimal = PermissionEnforcer::from_preset(PresetName::Minimal);
        let result = minimal.check(&PermissionRequest::mcp("octocode:search"));
        assert_eq!(result.violations[0].permission, "mcp_tools.denied");
    }

    #[test]
    fn test_network_domains_and_protocols() {
        let enforcer = PermissionEnforcer::from_preset(PresetName::ReadOnly);
        assert!(enforcer
            .check(&PermissionRequest::network("https://api.github.com/repos"))
            .allowed);
        assert!(enforcer.check(&PermissionRequest::network("github.com")).allowed);
        assert!(!enforcer
            .check(&PermissionRequest::network("https://example.org"))
            .allowed);
        assert!(!enforcer
            .check(&PermissionRequest::network("http://github.com"))
            .allowed);
    }

    #[test]
    fn test_model_tiers() {
        let enforcer = PermissionEnforcer::from_preset(PresetName::ReadOnly);
        assert!(enforcer.check(&PermissionRequest::model(ModelTier::Sonnet)).allowed);

        let denied = enforcer.check(&PermissionRequest::model(ModelTier::Opus));
        assert!(!denied.allowed);
        assert_eq!(denied.suggestions, vec!["Consider using: haiku, sonnet".to_string()]);

        let unknown = enforcer.check(&PermissionRequest::new(RequestType::Model, "gpt-9"));
        assert!(!unknown.allowed);
    }

    #[test]
    fn test_enforce_returns_denied_error() {
        let enforcer = PermissionEnforcer::from_preset(PresetName::Minimal);
        let err = enforcer.enforce(&PermissionRequest::tool("Task")).unwrap_err();
        assert!(matches!(err, PermissionError::Denied { .. }));
        assert!(enforcer.enforce(&PermissionRequest::tool("Read")).is_ok());
    }

    #[test]
    fn test_audit_log_is_bounded() {
        let enforcer = PermissionEnforcer::new(
            PresetName::Standard.matrix(),
            EnforcerOptions {
                max_audit_entries: 3,
                ..EnforcerOptions::default()
            },
        );
        let requests: Vec<_> = ["Read", "Write", "Edit", "Glob", "Grep"]
            .iter()
            .map(|t| PermissionRequest::tool(t))
            .collect();
        let results = enforcer.check_all(&requests);
        assert_eq!(results.len(), 5);

        let log = enforcer.audit_log(None);
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].request.resource, "Edit");
        assert_eq!(enforcer.audit_log(Some(1))[0].request.resource, "Grep");

        enforcer.clear_audit_log();
        assert!(enforcer.audit_log(None).is_empty());
    }
}
