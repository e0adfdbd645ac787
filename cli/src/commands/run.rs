use std::io::Write;
use std::sync::Arc;

use dagwave_core::api::{
    AppConfig, CancellationToken, CliError, FailurePolicy, OutputFormat, PresetName,
};
use dagwave_plugins::factory::{self, ExecutorChoice};
use dagwave_plugins::stream::LineSink;
use serde_json::{Map, Value};

use super::cli::{ExecutorArg, RunArgs, RunFormat};
use super::load_dag;

pub async fn run_cmd(args: RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    apply_run_overrides(&args, &mut cfg)?;
    let inputs = parse_inputs(&args.input)?;
    let dag = Arc::new(load_dag(&args.dag)?);

    let registry = factory::build_registry();
    let choice = match args.executor {
        ExecutorArg::Simulate => ExecutorChoice::Simulate,
        ExecutorArg::Noop => ExecutorChoice::Noop,
    };
    let executor = factory::build_executor(choice, &registry)
        .await
        .map_err(|e| CliError::Internal(format!("{e:#}")))?;

    let observer = factory::build_observer(&cfg, LineSink::stdout());
    let orchestrator = factory::build_orchestrator(&cfg, executor, observer)
        .map_err(|e| CliError::Config(format!("{e:#}")))?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    tracing::info!(
        dag_id = dag.id(),
        executor = choice.as_str(),
        format = cfg.output.format.as_str(),
        "run starting"
    );
    let result = registry
        .run_then_cleanup(orchestrator.execute_with_cancel(dag, Some(&inputs), cancel))
        .await?;

    if cfg.output.format == OutputFormat::Text && !result.outputs.is_empty() {
        let json = serde_json::to_string_pretty(&result.outputs)
            .map_err(|e| CliError::Internal(e.to_string()))?;
        writeln!(std::io::stdout().lock(), "outputs:\n{json}")?;
    }

    Ok(if result.success { 0 } else { 1 })
}

pub fn parse_preset(raw: &str) -> Result<PresetName, CliError> {
    raw.parse().map_err(|e| CliError::Config(format!("{e}")))
}

fn apply_run_overrides(args: &RunArgs, cfg: &mut AppConfig) -> Result<(), CliError> {
    if let Some(preset) = args.preset.as_deref() {
        cfg.permissions.preset = parse_preset(preset)?;
    }
    if let Some(policy) = args.failure_policy.as_deref() {
        cfg.orchestrator.failure_policy = policy
            .parse::<FailurePolicy>()
            .map_err(CliError::Config)?;
    }
    if let Some(n) = args.max_parallel {
        if n == 0 {
            return Err(CliError::Config("--max-parallel must be at least 1".to_string()));
        }
        cfg.orchestrator.max_parallel_tasks = n;
    }
    if let Some(format) = args.format {
        cfg.output.format = match format {
            RunFormat::Text => OutputFormat::Text,
            RunFormat::Jsonl => OutputFormat::Jsonl,
        };
    }
    if args.no_progress || !atty::is(atty::Stream::Stdout) {
        cfg.output.progress_bar = false;
    }
    Ok(())
}

/// `KEY=VALUE` pairs; a value that parses as JSON is kept as JSON, anything
/// else becomes a string.
pub fn parse_inputs(raw: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut inputs = Map::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "invalid --input '{pair}', expected KEY=VALUE"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::Config(format!("empty key in --input '{pair}'")));
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        inputs.insert(key.to_string(), value);
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn args() -> RunArgs {
        RunArgs {
            dag: "dag.json".into(),
            input: Vec::new(),
            max_parallel: None,
            preset: None,
            failure_policy: None,
            format: None,
            no_progress: false,
            executor: ExecutorArg::Simulate,
        }
    }

    #[test]
    fn test_parse_inputs() {
        let raw = vec![
            "topic=graphs".to_string(),
            "limit=3".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
            "expr=a=b".to_string(),
        ];
        let inputs = parse_inputs(&raw).unwrap();
        assert_eq!(inputs["topic"], json!("graphs"));
        assert_eq!(inputs["limit"], json!(3));
        assert_eq!(inputs["tags"], json!(["a", "b"]));
        assert_eq!(inputs["expr"], json!("a=b"));
    }

    #[test]
    fn test_parse_inputs_rejects_missing_equals() {
        let err = parse_inputs(&["oops".to_string()]).unwrap_err();
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn test_overrides() {
        let mut cfg = AppConfig::default();
        let mut a = args();
        a.preset = Some("permissive".to_string());
        a.failure_policy = Some("abort-on-output-failure".to_string());
        a.max_parallel = Some(3);
        a.format = Some(RunFormat::Jsonl);
        a.no_progress = true;

        apply_run_overrides(&a, &mut cfg).unwrap();

        assert_eq!(cfg.permissions.preset, PresetName::Full);
        assert_eq!(
            cfg.orchestrator.failure_policy,
            FailurePolicy::AbortOnOutputFailure
        );
        assert_eq!(cfg.orchestrator.max_parallel_tasks, 3);
        assert_eq!(cfg.output.format, OutputFormat::Jsonl);
        assert!(!cfg.output.progress_bar);
    }

    #[test]
    fn test_bad_overrides_are_config_errors() {
        let mut a = args();
        a.preset = Some("godmode".to_string());
        let err = apply_run_overrides(&a, &mut AppConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 11);

        let mut a = args();
        a.max_parallel = Some(0);
        assert!(apply_run_overrides(&a, &mut AppConfig::default()).is_err());
    }
}
