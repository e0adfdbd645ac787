use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;
use crate::permissions::PresetName;

pub const ENV_MAX_PARALLEL: &str = "DAGWAVE_MAX_PARALLEL";
pub const ENV_PERMISSION_PRESET: &str = "DAGWAVE_PERMISSION_PRESET";
pub const ENV_LOG_LEVEL: &str = "DAGWAVE_LOG_LEVEL";
pub const ENV_FAILURE_POLICY: &str = "DAGWAVE_FAILURE_POLICY";

/// Get the default dagwave data directory: ~/.dagwave
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".dagwave"))
}

pub fn load_from_file(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str::<AppConfig>(&s)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

/// Load configuration.
///
/// Lookup order: `explicit` path, then `~/.dagwave/config.toml`, then
/// `./dagwave.toml`, then defaults. Environment overrides apply last.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let local_config = Path::new("dagwave.toml");
    let home_config = get_data_dir().ok().map(|dir| dir.join("config.toml"));

    let mut cfg = match explicit {
        Some(path) => load_from_file(path)?,
        None => match home_config.filter(|p| p.exists()) {
            Some(path) => load_from_file(&path)?,
            None if local_config.exists() => load_from_file(local_config)?,
            None => AppConfig::default(),
        },
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;

    if cfg.logging.file && cfg.logging.directory.as_deref().map_or(true, |d| d.trim().is_empty()) {
        if let Ok(dir) = get_data_dir() {
            cfg.logging.directory = Some(dir.join("logs").to_string_lossy().to_string());
        }
    }

    tracing::debug!(
        preset = %cfg.permissions.preset,
        max_parallel = cfg.orchestrator.max_parallel_tasks,
        "configuration loaded"
    );
    Ok(cfg)
}

/// Apply `DAGWAVE_*` overrides. Blank values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, get: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var(ENV_MAX_PARALLEL) {
        let n: usize = v
            .trim()
            .parse()
            .with_context(|| format!("{ENV_MAX_PARALLEL} must be a positive integer, got {v:?}"))?;
        cfg.orchestrator.max_parallel_tasks = n.max(1);
    }
    if let Some(v) = var(ENV_PERMISSION_PRESET) {
        cfg.permissions.preset = v
            .parse::<PresetName>()
            .with_context(|| format!("invalid {ENV_PERMISSION_PRESET}"))?;
    }
    if let Some(v) = var(ENV_LOG_LEVEL) {
        cfg.logging.level = v.trim().to_string();
    }
    if let Some(v) = var(ENV_FAILURE_POLICY) {
        cfg.orchestrator.failure_policy = v
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("invalid {ENV_FAILURE_POLICY}"))?;
    }
    Ok(())
}
