//! `Decomposer` collaborator: the LLM-based task decomposer is invoked
//! by the core but its prompts are not specified here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::TaskType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub id: String,
    pub description: String,
    pub task_type: TaskType,
    pub complexity: u8,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub parallelizable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionResult {
    pub subtasks: Vec<SubtaskSpec>,
    pub strategy: String,
}

/// `decompose(goal, context) -> DecompositionResult`. The orchestrator
/// rejects a cyclic result.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, goal: &str, context: &str) -> anyhow::Result<DecompositionResult>;
}
