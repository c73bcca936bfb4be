//! CLI interface for poly-latency
//!
//! Provides subcommands for:
//! - `run`: Start the trading loop
//! - `report`: Show the daily rollup from the trade database
//! - `config`: Show the effective configuration

mod report;
mod run;

pub use report::ReportArgs;
pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "poly-latency")]
#[command(about = "Signal-driven trading loop for Up or Down prediction markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the trading loop
    Run(RunArgs),
    /// Show daily performance from the trade database
    Report(ReportArgs),
    /// Show configuration
    Config,
}
