//! brew CLI - Command line tool for brewery batch timing and quality analytics.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "brew-cli",
    version,
    about = "Brewery batch timing and quality analytics toolkit"
)]
struct Cli {
    /// JSON configuration file (ingest and analysis thresholds)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: brew_cmd::Command,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = brew_cmd::BrewConfig::load(cli.config.as_deref())?;
    brew_cmd::run(cli.command, &config)
}
