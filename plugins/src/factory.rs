//! Builds the orchestrator and its collaborators from an [`AppConfig`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dagwave_core::api::{
    AppConfig, Executor, ExecutorKind, NoopExecutor, Observer, ObserverSet, Orchestrator,
    OutputFormat, ProgressObserver,
};

use crate::executor::ExecutorRegistry;
use crate::stream::{JsonlObserver, LineSink, TextObserver};

/// Which backend runs the nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorChoice {
    /// No executor; the orchestrator synthesizes results.
    #[default]
    Simulate,
    Noop,
}

impl ExecutorChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simulate => "simulate",
            Self::Noop => "noop",
        }
    }
}

impl fmt::Display for ExecutorChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulate" | "simulation" => Ok(Self::Simulate),
            "noop" => Ok(Self::Noop),
            other => Err(format!("unknown executor: {other}")),
        }
    }
}

/// Registry with every built-in executor.
pub fn build_registry() -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(NoopExecutor::new()));
    registry
}

/// Resolve the executor for a run. `Simulate` yields `None`.
pub async fn build_executor(
    choice: ExecutorChoice,
    registry: &ExecutorRegistry,
) -> Result<Option<Arc<dyn Executor>>> {
    match choice {
        ExecutorChoice::Simulate => Ok(None),
        ExecutorChoice::Noop => registry
            .select(&[ExecutorKind::InProcess])
            .await
            .map(Some)
            .context("noop executor is not available"),
    }
}

/// Observers for the configured output format.
///
/// jsonl gets the event stream only. text gets the progress bars when enabled,
/// and the line log is reduced to the final summary while bars are drawn.
pub fn build_observer(cfg: &AppConfig, sink: LineSink) -> Arc<dyn Observer> {
    match cfg.output.format {
        OutputFormat::Jsonl => Arc::new(JsonlObserver::new(sink)),
        OutputFormat::Text => {
            let progress = ProgressObserver::new(cfg.output.progress_enabled(), cfg.output.ascii_only);
            let bars = progress.is_enabled();
            Arc::new(
                ObserverSet::new()
                    .with(Arc::new(progress))
                    .with(Arc::new(TextObserver::new(sink).quiet(bars))),
            )
        }
    }
}

pub fn build_orchestrator(
    cfg: &AppConfig,
    executor: Option<Arc<dyn Executor>>,
    observer: Arc<dyn Observer>,
) -> Result<Orchestrator> {
    let matrix = cfg
        .permission_matrix()
        .context("invalid permission overrides")?;

    let mut builder = Orchestrator::builder()
        .permissions(matrix)
        .isolation_level(cfg.isolation_level())
        .options(cfg.orchestrator.clone())
        .observer(observer);
    if let Some(executor) = executor {
        builder = builder.executor(executor);
    }

    tracing::debug!(
        preset = %cfg.permissions.preset,
        max_parallel = cfg.orchestrator.max_parallel_tasks,
        failure_policy = %cfg.orchestrator.failure_policy,
        "orchestrator configured"
    );
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagwave_core::api::{ModelTier, PresetName};
    use serde_json::json;

    #[test]
    fn test_executor_choice_parsing() {
        assert_eq!("noop".parse::<ExecutorChoice>(), Ok(ExecutorChoice::Noop));
        assert_eq!(
            "Simulate".parse::<ExecutorChoice>(),
            Ok(ExecutorChoice::Simulate)
        );
        assert!("docker".parse::<ExecutorChoice>().is_err());
    }

    #[tokio::test]
    async fn test_build_executor() {
        let registry = build_registry();
        assert!(build_executor(ExecutorChoice::Simulate, &registry)
            .await
            .unwrap()
            .is_none());
        let noop = tokio_test::assert_ok!(build_executor(ExecutorChoice::Noop, &registry).await)
            .unwrap();
        assert_eq!(noop.name(), "noop");
    }

    #[test]
    fn test_orchestrator_uses_config_permissions() {
        let mut cfg = AppConfig::default();
        cfg.permissions.preset = PresetName::Strict;
        cfg.orchestrator.max_parallel_tasks = 2;

        let orchestrator = build_orchestrator(&cfg, None, Arc::new(ObserverSet::new())).unwrap();
        assert_eq!(orchestrator.options().max_parallel_tasks, 2);
        assert!(orchestrator.enforcer().matrix().models.allows(ModelTier::Haiku));
        assert!(!orchestrator.enforcer().matrix().models.allows(ModelTier::Opus));
    }

    #[test]
    fn test_orchestrator_applies_overrides() {
        let mut cfg = AppConfig::default();
        cfg.permissions.preset = PresetName::Strict;
        cfg.permissions.overrides = Some(json!({ "models": { "allowed": ["haiku", "opus"] } }));

        let orchestrator = build_orchestrator(&cfg, None, Arc::new(ObserverSet::new())).unwrap();
        assert!(orchestrator.enforcer().matrix().models.allows(ModelTier::Opus));
    }
}
