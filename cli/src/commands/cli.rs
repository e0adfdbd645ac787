use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Text,
    Json,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFormat {
    Text,
    Jsonl,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorArg {
    Simulate,
    Noop,
}

#[derive(Parser, Debug)]
#[command(name = "dagwave", version, about = "Wave-based DAG orchestrator")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to ~/.dagwave/config.toml, then ./dagwave.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    /// DAG definition (.json or .toml).
    pub dag: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    pub dag: PathBuf,

    /// JSON map of node id -> {predicted_files, singleton}.
    #[arg(long)]
    pub hints: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = PlanFormat::Text)]
    pub format: PlanFormat,

    /// Override the permission preset used to resolve dispatches.
    #[arg(long)]
    pub preset: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    pub dag: PathBuf,

    /// Run input (KEY=VALUE). Values are parsed as JSON when possible.
    /// Can be specified multiple times.
    #[arg(long = "input", action = clap::ArgAction::Append)]
    pub input: Vec<String>,

    #[arg(long)]
    pub max_parallel: Option<usize>,

    #[arg(long)]
    pub preset: Option<String>,

    /// abort-on-any-failure | abort-on-output-failure
    #[arg(long)]
    pub failure_policy: Option<String>,

    #[arg(long, value_enum)]
    pub format: Option<RunFormat>,

    #[arg(long)]
    pub no_progress: bool,

    #[arg(long, value_enum, default_value_t = ExecutorArg::Simulate)]
    pub executor: ExecutorArg,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a DAG for cycles, missing dependencies and orphans.
    Validate(ValidateArgs),
    /// Print the wave plan without executing anything.
    Plan(PlanArgs),
    /// Execute a DAG.
    Run(RunArgs),
    /// List permission presets.
    Presets,
}
