use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::SwarmConfig;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("total_budget must be greater than zero")]
    EmptyBudget,

    #[error("max_cost must be positive: {0}")]
    InvalidMaxCost(f64),

    #[error("orchestrator_reserve_ratio must be in [0.0, 1.0): {0}")]
    InvalidReserveRatio(f64),

    #[error("max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("max_dispatches_per_task must be at least 1")]
    InvalidDispatchCap,

    #[error("worker_retries ({0}) must be less than max_dispatches_per_task ({1})")]
    RetriesExceedDispatchCap(u32, u32),

    #[error("quality_gate_threshold must be at least 1")]
    InvalidQualityGateThreshold,

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.swarm/config.yaml` (project config)
    /// 3. `.swarm/local.yaml` (project local overrides, optional)
    /// 4. Environment variables (`SWARM_*` prefix, highest priority)
    ///
    /// # Errors
    /// Returns an error if figment extraction or validation fails.
    pub fn load() -> Result<SwarmConfig> {
        let config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(".swarm/config.yaml"))
            .merge(Yaml::file(".swarm/local.yaml"))
            .merge(Env::prefixed("SWARM_").split("__"))
            .extract()
            .context("failed to extract swarm configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, skipping the project/env
    /// layers. Used by the CLI's `--config` flag.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, extraction fails, or
    /// validation fails.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SwarmConfig> {
        let config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] encountered.
    pub fn validate(config: &SwarmConfig) -> Result<(), ConfigError> {
        if config.total_budget == 0 {
            return Err(ConfigError::EmptyBudget);
        }
        if config.max_cost <= 0.0 {
            return Err(ConfigError::InvalidMaxCost(config.max_cost));
        }
        if !(0.0..1.0).contains(&config.orchestrator_reserve_ratio) {
            return Err(ConfigError::InvalidReserveRatio(config.orchestrator_reserve_ratio));
        }
        if config.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if config.max_dispatches_per_task == 0 {
            return Err(ConfigError::InvalidDispatchCap);
        }
        if config.worker_retries >= config.max_dispatches_per_task {
            return Err(ConfigError::RetriesExceedDispatchCap(
                config.worker_retries,
                config.max_dispatches_per_task,
            ));
        }
        if config.quality_gate_threshold == 0 {
            return Err(ConfigError::InvalidQualityGateThreshold);
        }

        for worker in &config.workers {
            if worker.name.is_empty() {
                return Err(ConfigError::ValidationFailed("worker name cannot be empty".to_string()));
            }
            if worker.model.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "worker '{}' must declare a model",
                    worker.name
                )));
            }
        }

        Ok(())
    }
}
