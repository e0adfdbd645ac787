use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dagwave_core::api::{AppConfig, CliError, ExecutionPlan, HintMap, NoopObserver};
use dagwave_plugins::factory;

use super::cli::{PlanArgs, PlanFormat};
use super::load_dag;
use super::run::parse_preset;

pub fn plan_cmd(args: &PlanArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    let dag = load_dag(&args.dag)?;
    let hints = args.hints.as_deref().map(load_hints).transpose()?;
    if let Some(preset) = args.preset.as_deref() {
        cfg.permissions.preset = parse_preset(preset)?;
    }

    let orchestrator = factory::build_orchestrator(&cfg, None, Arc::new(NoopObserver))
        .map_err(|e| CliError::Config(format!("{e:#}")))?;
    let plan = orchestrator.generate_execution_plan(&dag, None, hints.as_ref());

    let mut out = std::io::stdout().lock();
    match args.format {
        PlanFormat::Json => {
            let json = serde_json::to_string_pretty(&plan)
                .map_err(|e| CliError::Internal(e.to_string()))?;
            writeln!(out, "{json}")?;
        }
        PlanFormat::Text => render(&plan, &mut out)?,
    }

    match plan.error {
        Some(error) => Err(CliError::InvalidDag(error)),
        None => Ok(0),
    }
}

fn load_hints(path: &Path) -> Result<HintMap, CliError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse hints file {}", path.display()))
        .map_err(|e| CliError::Config(format!("{e:#}")))
}

pub fn render(plan: &ExecutionPlan, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(
        out,
        "{} ({}): {} nodes, {} waves",
        plan.dag_name, plan.dag_id, plan.total_nodes, plan.total_waves
    )?;
    if let Some(error) = &plan.error {
        writeln!(out, "error: {error}")?;
        return Ok(());
    }

    for wave in &plan.waves {
        let mode = if wave.parallelizable { "parallel" } else { "sequential" };
        writeln!(out, "wave {} [{mode}]", wave.wave_number)?;
        for (id, d) in &wave.dispatches {
            writeln!(out, "  {id}: agent={} model={}", d.agent_type, d.model)?;
        }
        for denied in &wave.denied {
            writeln!(out, "  {}: DENIED {}", denied.node_id, denied.reason)?;
        }
        for conflict in &wave.conflicts {
            writeln!(out, "  conflict: {}", conflict.description)?;
        }
        if let Some(reason) = &wave.conflict_reason {
            writeln!(out, "  remediation: {reason}")?;
        }
    }
    Ok(())
}
