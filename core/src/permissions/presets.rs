//! Named permission presets, from most to least restrictive.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::matrix::{
    BashPermissions, CoreToolPermissions, FileSystemPermissions, IsolationLevel,
    McpToolPermissions, ModelPermissions, NetworkPermissions, PermissionMatrix,
};
use super::PermissionError;
use crate::graph::ModelTier;

const MB: u64 = 1024 * 1024;

const SECRET_PATTERNS: [&str; 4] = ["**/.env*", "**/secrets/**", "**/*.pem", "**/*.key"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresetName {
    Strict,
    Minimal,
    ReadOnly,
    Standard,
    #[serde(alias = "permissive")]
    Full,
}

impl PresetName {
    pub const ALL: [PresetName; 5] = [
        PresetName::Strict,
        PresetName::Minimal,
        PresetName::ReadOnly,
        PresetName::Standard,
        PresetName::Full,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PresetName::Strict => "strict",
            PresetName::Minimal => "minimal",
            PresetName::ReadOnly => "read-only",
            PresetName::Standard => "standard",
            PresetName::Full => "full",
        }
    }

    pub fn matrix(self) -> PermissionMatrix {
        match self {
            PresetName::Strict => strict(),
            PresetName::Minimal => minimal(),
            PresetName::ReadOnly => read_only(),
            PresetName::Standard => standard(),
            PresetName::Full => full(),
        }
    }

    /// Isolation level that pairs naturally with this preset.
    pub fn isolation_level(self) -> IsolationLevel {
        match self {
            PresetName::Strict | PresetName::Minimal | PresetName::ReadOnly => {
                IsolationLevel::Strict
            }
            PresetName::Standard => IsolationLevel::Moderate,
            PresetName::Full => IsolationLevel::Permissive,
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetName {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(PresetName::Strict),
            "minimal" => Ok(PresetName::Minimal),
            "read-only" | "readonly" | "read_only" => Ok(PresetName::ReadOnly),
            "standard" => Ok(PresetName::Standard),
            "full" | "permissive" => Ok(PresetName::Full),
            other => Err(PermissionError::UnknownPreset(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetInfo {
    pub name: PresetName,
    pub description: &'static str,
    pub security_level: &'static str,
}

pub fn list_presets() -> Vec<PresetInfo> {
    PresetName::ALL
        .into_iter()
        .map(|name| {
            let (description, security_level) = match name {
                PresetName::Strict => (
                    "Read and spawn only; no shell, network or MCP tools, haiku only",
                    "Highest",
                ),
                PresetName::Minimal => ("Read-only access with no external connectivity", "Highest"),
                PresetName::ReadOnly => ("Can read files and search but not modify", "High"),
                PresetName::Standard => ("Balanced for typical development work", "Medium"),
                PresetName::Full => ("Maximum access for trusted operations", "Low"),
            };
            PresetInfo {
                name,
                description,
                security_level,
            }
        })
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn token_limits(limits: &[(ModelTier, u32)]) -> BTreeMap<ModelTier, u32> {
    limits.iter().copied().collect()
}

fn locked_down_deny() -> Vec<String> {
    let mut deny = strings(&["**/.*", "**/credentials*"]);
    deny.extend(strings(&SECRET_PATTERNS));
    deny
}

fn disabled_network() -> NetworkPermissions {
    NetworkPermissions {
        enabled: false,
        denied_domains: strings(&["*"]),
        ..NetworkPermissions::default()
    }
}

fn disabled_bash() -> BashPermissions {
    BashPermissions {
        enabled: false,
        sandboxed: true,
        denied_patterns: strings(&[".*"]),
        ..BashPermissions::default()
    }
}

fn strict() -> PermissionMatrix {
    PermissionMatrix {
        core_tools: CoreToolPermissions {
            read: true,
            glob: true,
            grep: true,
            ls: true,
            task: true,
            ..CoreToolPermissions::all(false)
        },
        bash: disabled_bash(),
        file_system: FileSystemPermissions {
            read_patterns: strings(&["**/*"]),
            deny_patterns: locked_down_deny(),
            max_read_size_bytes: MB,
            ..FileSystemPermissions::default()
        },
        mcp_tools: McpToolPermissions {
            allowed: Vec::new(),
            denied: strings(&["*"]),
        },
        network: disabled_network(),
        models: ModelPermissions {
            allowed: vec![ModelTier::Haiku],
            preferred_for_spawning: Some(ModelTier::Haiku),
            max_tokens_per_model: token_limits(&[(ModelTier::Haiku, 2048)]),
            allow_escalation: false,
        },
    }
}

fn minimal() -> PermissionMatrix {
    PermissionMatrix {
        core_tools: CoreToolPermissions {
            read: true,
            glob: true,
            grep: true,
            ls: true,
            ..CoreToolPermissions::all(false)
        },
        bash: disabled_bash(),
        file_system: FileSystemPermissions {
            deny_patterns: locked_down_deny(),
            max_read_size_bytes: MB,
            ..FileSystemPermissions::default()
        },
        mcp_tools: McpToolPermissions {
            allowed: Vec::new(),
            denied: strings(&["*"]),
        },
        network: disabled_network(),
        models: ModelPermissions {
            allowed: vec![ModelTier::Haiku],
            preferred_for_spawning: Some(ModelTier::Haiku),
            max_tokens_per_model: token_limits(&[(ModelTier::Haiku, 2048)]),
            allow_escalation: false,
        },
    }
}

fn read_only() -> PermissionMatrix {
    let mut deny = strings(&SECRET_PATTERNS);
    deny.extend(strings(&["**/credentials*", "**/node_modules/**"]));

    PermissionMatrix {
        core_tools: CoreToolPermissions {
            write: false,
            edit: false,
            notebook_edit: false,
            ..CoreToolPermissions::all(true)
        },
        bash: BashPermissions {
            enabled: true,
            sandboxed: true,
            allowed_patterns: strings(&[
                r"^ls\b",
                r"^cat\b",
                r"^head\b",
                r"^tail\b",
                r"^wc\b",
                r"^find\b",
                r"^grep\b",
                r"^git\s+(status|log|diff|branch|show)",
                r"^npm\s+(list|ls|outdated)",
                r"^cargo\s+(tree|metadata)",
                r"^node\s+--version",
                r"^python\s+--version",
            ]),
            denied_patterns: strings(&[
                r"rm\b",
                r"mv\b",
                r"cp\b",
                r"mkdir\b",
                r"touch\b",
                r"chmod\b",
                r"chown\b",
                r"sudo\b",
                r"\|\s*sh",
                r"\|\s*bash",
                r"curl.*\|",
                r"wget.*\|",
            ]),
            max_execution_time_ms: 30_000,
            allow_background: false,
        },
        file_system: FileSystemPermissions {
            read_patterns: strings(&["**/*"]),
            write_patterns: Vec::new(),
            deny_patterns: deny,
            max_read_size_bytes: 10 * MB,
            max_write_size_bytes: 0,
            max_total_write_bytes: 0,
        },
        mcp_tools: McpToolPermissions {
            allowed: strings(&["octocode:*", "Context7:*", "brave-search:*"]),
            denied: Vec::new(),
        },
        network: NetworkPermissions {
            enabled: true,
            allowed_domains: strings(&[
                "github.com",
                "*.github.com",
                "raw.githubusercontent.com",
                "crates.io",
                "docs.rs",
                "npmjs.com",
                "pypi.org",
                "docs.python.org",
                "developer.mozilla.org",
            ]),
            denied_domains: Vec::new(),
            allowed_protocols: strings(&["https"]),
            max_request_size_bytes: MB,
            max_response_size_bytes: 10 * MB,
            request_timeout_ms: 30_000,
            max_concurrent_requests: 5,
        },
        models: ModelPermissions {
            allowed: vec![ModelTier::Haiku, ModelTier::Sonnet],
            preferred_for_spawning: Some(ModelTier::Haiku),
            max_tokens_per_model: token_limits(&[(ModelTier::Haiku, 4096), (ModelTier::Sonnet, 8192)]),
            allow_escalation: true,
        },
    }
}

fn standard() -> PermissionMatrix {
    let mut deny = strings(&SECRET_PATTERNS);
    deny.extend(strings(&["**/credentials*", ".git/**"]));

    PermissionMatrix {
        core_tools: CoreToolPermissions::all(true),
        bash: BashPermissions {
            enabled: true,
            sandboxed: false,
            allowed_patterns: strings(&[
                r"^npm\b",
                r"^npx\b",
                r"^yarn\b",
                r"^pnpm\b",
                r"^node\b",
                r"^python3?\b",
                r"^pip3?\b",
                r"^cargo\b",
                r"^git\b",
                r"^ls\b",
                r"^cat\b",
                r"^head\b",
                r"^tail\b",
                r"^grep\b",
                r"^find\b",
                r"^wc\b",
                r"^mkdir\b",
                r"^touch\b",
                r"^cp\b",
                r"^mv\b",
                // rm only on relative paths
                r"^rm\s+-[rf]*\s+[^/\s]\S*",
                r"^echo\b",
                r"^pwd\b",
                r"^cd\b",
                r"^which\b",
                r"^env\b",
                r"^export\b",
                r"^curl\b",
                r"^wget\b",
            ]),
            denied_patterns: strings(&[
                r"sudo\b",
                r"\bsu\b",
                r"chmod\s+777",
                r"rm\s+-rf\s+/",
                r"rm\s+-rf\s+\*",
                r"mkfs",
                r"dd\s+if=",
                r">\s*/dev/",
                r"eval\b",
                r"\$\(",
            ]),
            max_execution_time_ms: 300_000,
            allow_background: true,
        },
        file_system: FileSystemPermissions {
            read_patterns: strings(&["**/*"]),
            write_patterns: strings(&[
                "src/**/*",
                "lib/**/*",
                "test/**/*",
                "tests/**/*",
                "docs/**/*",
                "*.json",
                "*.toml",
                "*.yaml",
                "*.yml",
                "*.md",
                "*.rs",
                "*.ts",
                "*.tsx",
                "*.js",
                "*.jsx",
                "*.py",
                "*.css",
                "*.html",
            ]),
            deny_patterns: deny,
            max_read_size_bytes: 10 * MB,
            max_write_size_bytes: MB,
            max_total_write_bytes: 50 * MB,
        },
        mcp_tools: McpToolPermissions {
            allowed: strings(&["*"]),
            denied: Vec::new(),
        },
        network: NetworkPermissions {
            enabled: true,
            allowed_domains: Vec::new(),
            denied_domains: Vec::new(),
            allowed_protocols: strings(&["http", "https"]),
            max_request_size_bytes: 5 * MB,
            max_response_size_bytes: 20 * MB,
            request_timeout_ms: 60_000,
            max_concurrent_requests: 10,
        },
        models: ModelPermissions {
            allowed: vec![ModelTier::Haiku, ModelTier::Sonnet, ModelTier::Opus],
            preferred_for_spawning: Some(ModelTier::Sonnet),
            max_tokens_per_model: token_limits(&[
                (ModelTier::Haiku, 8192),
                (ModelTier::Sonnet, 16384),
                (ModelTier::Opus, 32768),
            ]),
            allow_escalation: true,
        },
    }
}

fn full() -> PermissionMatrix {
    PermissionMatrix {
        core_tools: CoreToolPermissions::all(true),
        bash: BashPermissions {
            enabled: true,
            sandboxed: false,
            allowed_patterns: strings(&[".*"]),
            denied_patterns: Vec::new(),
            max_execution_time_ms: 600_000,
            allow_background: true,
        },
        file_system: FileSystemPermissions {
            read_patterns: strings(&["**/*"]),
            write_patterns: strings(&["**/*"]),
            deny_patterns: Vec::new(),
            max_read_size_bytes: 100 * MB,
            max_write_size_bytes: 50 * MB,
            max_total_write_bytes: 500 * MB,
        },
        mcp_tools: McpToolPermissions {
            allowed: strings(&["*"]),
            denied: Vec::new(),
        },
        network: NetworkPermissions {
            enabled: true,
            allowed_domains: Vec::new(),
            denied_domains: Vec::new(),
            allowed_protocols: strings(&["http", "https", "ws", "wss"]),
            max_request_size_bytes: 50 * MB,
            max_response_size_bytes: 100 * MB,
            request_timeout_ms: 300_000,
            max_concurrent_requests: 20,
        },
        models: ModelPermissions {
            allowed: vec![ModelTier::Haiku, ModelTier::Sonnet, ModelTier::Opus],
            preferred_for_spawning: Some(ModelTier::Opus),
            max_tokens_per_model: token_limits(&[
                (ModelTier::Haiku, 8192),
                (ModelTier::Sonnet, 32768),
                (ModelTier::Opus, 65536),
            ]),
            allow_escalation: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_alias() {
        assert_eq!("standard".parse::<PresetName>().unwrap(), PresetName::Standard);
        assert_eq!("permissive".parse::<PresetName>().unwrap(), PresetName::Full);
        assert_eq!("Read-Only".parse::<PresetName>().unwrap(), PresetName::ReadOnly);
        assert!(matches!(
            "lenient".parse::<PresetName>(),
            Err(PermissionError::UnknownPreset(_))
        ));

        let alias: PresetName = serde_json::from_str("\"permissive\"").unwrap();
        assert_eq!(alias, PresetName::Full);
    }

    #[test]
    fn test_presets_are_ordered_by_restriction() {
        let strict = PresetName::Strict.matrix();
        let standard = PresetName::Standard.matrix();
        let full = PresetName::Full.matrix();

        assert!(!strict.bash.enabled);
        assert!(strict.core_tools.task);
        assert!(!PresetName::Minimal.matrix().core_tools.task);
        assert!(standard.bash.enabled);
        assert!(full.file_system.deny_patterns.is_empty());
        assert_eq!(strict.models.allowed, vec![ModelTier::Haiku]);
        assert_eq!(full.models.preferred_for_spawning, Some(ModelTier::Opus));
    }

    #[test]
    fn test_every_preset_pattern_compiles() {
        for name in PresetName::ALL {
            let matrix = name.matrix();
            for pattern in matrix
                .bash
                .allowed_patterns
                .iter()
                .chain(&matrix.bash.denied_patterns)
            {
                assert!(regex::Regex::new(pattern).is_ok(), "{name}: {pattern}");
            }
            for pattern in matrix
                .file_system
                .read_patterns
                .iter()
                .chain(&matrix.file_system.write_patterns)
                .chain(&matrix.file_system.deny_patterns)
            {
                assert!(glob::Pattern::new(pattern).is_ok(), "{name}: {pattern}");
            }
        }
    }

    #[test]
    fn test_list_presets_covers_all() {
        let listed = list_presets();
        assert_eq!(listed.len(), PresetName::ALL.len());
        assert!(listed.iter().all(|p| !p.description.is_empty()));
    }
}
