use clap::Parser;
use dagwave_cli::commands::{cli, plan, presets, run, validate};
use dagwave_cli::logging::init_tracing;
use dagwave_core::api::{load_config, CliError};

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(args.config.as_deref()).map_err(|e| CliError::Config(format!("{e:#}")))?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    match args.command {
        cli::Commands::Validate(a) => validate::validate_cmd(&a),
        cli::Commands::Plan(a) => plan::plan_cmd(&a, cfg),
        cli::Commands::Run(a) => run::run_cmd(a, cfg).await,
        cli::Commands::Presets => presets::presets_cmd(),
    }
}
