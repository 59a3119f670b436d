//! `swarmctl` entry point: configuration loading, validation, and logging
//! bootstrap.

use anyhow::Result;
use clap::Parser;
use swarm_orchestrator::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = cli.init_logging()?;
    cli.run()
}
