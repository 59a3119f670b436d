//! Run configuration for the swarm orchestrator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Declares one worker role available to the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDefinition {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
}

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmConfig {
    #[serde(default = "default_total_budget")]
    pub total_budget: u64,
    #[serde(default = "default_max_cost")]
    pub max_cost: f64,
    #[serde(default = "default_orchestrator_reserve_ratio")]
    pub orchestrator_reserve_ratio: f64,
    #[serde(default = "default_max_tokens_per_worker")]
    pub max_tokens_per_worker: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_worker_retries")]
    pub worker_retries: u32,
    #[serde(default = "default_max_dispatches_per_task")]
    pub max_dispatches_per_task: u32,
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
    #[serde(default = "default_task_type_timeouts")]
    pub task_type_timeouts: HashMap<String, u64>,
    #[serde(default = "default_consecutive_timeout_limit")]
    pub consecutive_timeout_limit: u32,
    #[serde(default = "default_quality_gate_threshold")]
    pub quality_gate_threshold: u32,
    #[serde(default = "default_true")]
    pub quality_gates: bool,
    #[serde(default)]
    pub enable_verification: bool,
    #[serde(default)]
    pub enable_planning: bool,
    #[serde(default)]
    pub enable_wave_review: bool,
    #[serde(default)]
    pub workers: Vec<WorkerDefinition>,
    #[serde(default = "default_dispatch_stagger_ms")]
    pub dispatch_stagger_ms: u64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            total_budget: default_total_budget(),
            max_cost: default_max_cost(),
            orchestrator_reserve_ratio: default_orchestrator_reserve_ratio(),
            max_tokens_per_worker: default_max_tokens_per_worker(),
            max_concurrency: default_max_concurrency(),
            worker_retries: default_worker_retries(),
            max_dispatches_per_task: default_max_dispatches_per_task(),
            worker_timeout_secs: default_worker_timeout_secs(),
            task_type_timeouts: default_task_type_timeouts(),
            consecutive_timeout_limit: default_consecutive_timeout_limit(),
            quality_gate_threshold: default_quality_gate_threshold(),
            quality_gates: true,
            enable_verification: false,
            enable_planning: false,
            enable_wave_review: false,
            workers: Vec::new(),
            dispatch_stagger_ms: default_dispatch_stagger_ms(),
        }
    }
}

fn default_total_budget() -> u64 {
    2_000_000
}
fn default_max_cost() -> f64 {
    50.0
}
fn default_orchestrator_reserve_ratio() -> f64 {
    0.15
}
fn default_max_tokens_per_worker() -> u64 {
    150_000
}
fn default_max_concurrency() -> usize {
    4
}
fn default_worker_retries() -> u32 {
    2
}
fn default_max_dispatches_per_task() -> u32 {
    3
}
fn default_worker_timeout_secs() -> u64 {
    120
}
fn default_task_type_timeouts() -> HashMap<String, u64> {
    HashMap::from([
        ("research".to_string(), 300),
        ("analyze".to_string(), 300),
        ("merge".to_string(), 180),
    ])
}
fn default_consecutive_timeout_limit() -> u32 {
    3
}
fn default_quality_gate_threshold() -> u32 {
    8
}
fn default_true() -> bool {
    true
}
fn default_dispatch_stagger_ms() -> u64 {
    250
}

impl SwarmConfig {
    /// Timeout for `task_type`, falling back to `workerTimeout` when the
    /// type has no explicit entry.
    #[must_use]
    pub fn timeout_for(&self, task_type: &str) -> std::time::Duration {
        let secs = self
            .task_type_timeouts
            .get(task_type)
            .copied()
            .unwrap_or(self.worker_timeout_secs);
        std::time::Duration::from_secs(secs)
    }
}
