//! `SpawnAgent` collaborator: the language-model transport and prompt
//! formatting live outside the core; this port is the seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::{ClosureReport, TaskMetrics};

/// What a spawned agent returned for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnResult {
    pub success: bool,
    pub output: String,
    pub metrics: TaskMetrics,
    pub tokens_used: u64,
    pub cost_used: f64,
    pub duration_ms: u64,
    #[serde(default)]
    pub files_modified: Vec<String>,
    pub closure_report: Option<ClosureReport>,
}

/// `SpawnAgent(roleName, prompt) -> Future<SpawnResult>`.
#[async_trait]
pub trait SpawnAgent: Send + Sync {
    async fn spawn(&self, role_name: &str, prompt: &str) -> anyhow::Result<SpawnResult>;
}
