//! Reforge CLI entry point.
//!
//! Binary name: `reforge`
//!
//! Parses CLI arguments, installs tracing, loads `reforge.toml` and
//! dispatches to the command handlers.

mod cli;
mod human;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, PlanCommand};
use reforge_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing, verbosity_filter};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let tracing_options = TracingOptions {
        format: if cli.json { LogFormat::Json } else { LogFormat::Pretty },
        otel: cli.otel,
        ..TracingOptions::new(verbosity_filter(cli.verbose, cli.quiet))
    };
    init_tracing(&tracing_options).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need a project
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "reforge", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::load(&cli.config).await?;

    let result = match cli.command {
        Commands::Run { once } => cli::run::run(&state, once, cli.json).await,
        Commands::Plan { action } => match action {
            PlanCommand::List => cli::plan::list(&state, cli.json).await,
            PlanCommand::Set { id, status, notes } => {
                cli::plan::set(&state, &id, status, notes.as_deref(), cli.json).await
            }
        },
        Commands::Validate => cli::validate::validate(&state, cli.json).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    shutdown_tracing();
    result
}
