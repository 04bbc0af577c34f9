//! CLI command definitions for the `reforge` binary.

pub mod plan;
pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use reforge_infra::config::DEFAULT_CONFIG_FILE;
use reforge_types::plan::StepStatus;

/// Drive a migration plan one reviewed step at a time.
#[derive(Parser)]
#[command(name = "reforge", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the project configuration.
    #[arg(long, short = 'c', global = true, env = "REFORGE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive the plan until it is exhausted or a step is rejected.
    Run {
        /// Drive a single step attempt and stop.
        #[arg(long)]
        once: bool,
    },

    /// Inspect or edit the plan document.
    Plan {
        #[command(subcommand)]
        action: PlanCommand,
    },

    /// Check the configuration, plan and pipeline without running anything.
    Validate,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum PlanCommand {
    /// List every step with its status.
    #[command(alias = "ls")]
    List,

    /// Overwrite a step's status (and optionally its notes).
    Set {
        /// Step id.
        id: String,
        /// New status (todo, in_progress, done, skipped, failed, rejected).
        #[arg(value_parser = parse_status)]
        status: StepStatus,
        /// Replace the step's notes.
        #[arg(long)]
        notes: Option<String>,
    },
}

fn parse_status(raw: &str) -> Result<StepStatus, String> {
    raw.parse()
}
