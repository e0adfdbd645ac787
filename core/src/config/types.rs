use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::orchestrator::OrchestratorOptions;
use crate::permissions::{IsolationLevel, PermissionError, PermissionMatrix, PresetName};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorOptions,

    #[serde(default)]
    pub permissions: PermissionsConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// Preset matrix with the configured overrides merged over it.
    pub fn permission_matrix(&self) -> Result<PermissionMatrix, PermissionError> {
        let base = self.permissions.preset.matrix();
        match &self.permissions.overrides {
            Some(overrides) => base.with_overrides(overrides),
            None => Ok(base),
        }
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.permissions
            .isolation_level
            .unwrap_or_else(|| self.permissions.preset.isolation_level())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a daily file under `directory`.
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "dagwave_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Directory for log files. Defaults to `~/.dagwave/logs`.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default = "default_preset")]
    pub preset: PresetName,

    /// Overrides the preset's own isolation level.
    #[serde(default)]
    pub isolation_level: Option<IsolationLevel>,

    /// Partial matrix deep-merged over the preset.
    #[serde(default)]
    pub overrides: Option<Value>,
}

fn default_preset() -> PresetName {
    PresetName::Standard
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            isolation_level: None,
            overrides: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Progress bars; always off for jsonl.
    #[serde(default = "default_progress_bar")]
    pub progress_bar: bool,

    #[serde(default)]
    pub ascii_only: bool,
}

fn default_progress_bar() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            progress_bar: default_progress_bar(),
            ascii_only: false,
        }
    }
}

impl OutputConfig {
    pub fn progress_enabled(&self) -> bool {
        self.progress_bar && self.format == OutputFormat::Text
    }
}
