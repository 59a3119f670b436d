//! Thin CLI surface: configuration loading, validation, and logging
//! bootstrap. Wiring the `SpawnAgent`, `Decomposer`, `QualityJudge`, and
//! `ArtifactCheck` collaborators and driving a run through
//! [`crate::application::Orchestrator`] is the embedding application's job,
//! not this binary's — those collaborators reach out to a language model
//! and a working directory, neither of which this crate owns.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::models::SwarmConfig;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LogFormat, LoggerImpl};

#[derive(Parser, Debug)]
#[command(name = "swarmctl", version, about = "Swarm orchestrator configuration and diagnostics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level passed to the tracing subscriber.
    #[arg(long, global = true, default_value = "info", env = "SWARM_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = CliLogFormat::Pretty)]
    pub log_format: CliLogFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum CliLogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the effective configuration (defaults, `.swarm/config.yaml`,
    /// `.swarm/local.yaml`, then `SWARM_*` env vars) and print it.
    ConfigShow,
    /// Validate a specific configuration file in isolation.
    ConfigValidate {
        /// Path to a YAML configuration file.
        file: PathBuf,
    },
}

impl Cli {
    /// Initialize the tracing subscriber according to the global log flags.
    ///
    /// # Errors
    /// Returns an error if the subscriber cannot be installed.
    pub fn init_logging(&self) -> Result<LoggerImpl> {
        let format = match self.log_format {
            CliLogFormat::Json => LogFormat::Json,
            CliLogFormat::Pretty => LogFormat::Pretty,
        };
        let log_config = LogConfig {
            level: self.log_level.clone(),
            format,
            ..LogConfig::default()
        };
        LoggerImpl::init(&log_config)
    }

    /// Dispatch the parsed subcommand.
    ///
    /// # Errors
    /// Propagates configuration loading or validation failures.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::ConfigShow => {
                let config = ConfigLoader::load()?;
                print_config_table(&config);
            }
            Commands::ConfigValidate { file } => {
                let config = ConfigLoader::load_from_file(&file)?;
                println!("{} is valid", file.display());
                print_config_table(&config);
            }
        }
        Ok(())
    }
}

fn print_config_table(config: &SwarmConfig) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["setting", "value"]);
    table.add_row(vec!["totalBudget".to_string(), config.total_budget.to_string()]);
    table.add_row(vec!["maxCost".to_string(), format!("{:.2}", config.max_cost)]);
    table.add_row(vec![
        "orchestratorReserveRatio".to_string(),
        format!("{:.2}", config.orchestrator_reserve_ratio),
    ]);
    table.add_row(vec!["maxConcurrency".to_string(), config.max_concurrency.to_string()]);
    table.add_row(vec!["workerRetries".to_string(), config.worker_retries.to_string()]);
    table.add_row(vec![
        "maxDispatchesPerTask".to_string(),
        config.max_dispatches_per_task.to_string(),
    ]);
    table.add_row(vec![
        "qualityGateThreshold".to_string(),
        config.quality_gate_threshold.to_string(),
    ]);
    table.add_row(vec!["workers".to_string(), config.workers.len().to_string()]);
    println!("{table}");
}
