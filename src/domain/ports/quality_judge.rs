//! `QualityJudge` collaborator: evaluates a completed task's output
//! against acceptance criteria.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::Task;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub pass: bool,
    /// 1..5.
    pub score: u8,
    pub reasoning: String,
}

/// `judge(task, output, criteria) -> { pass, score, reasoning }`.
#[async_trait]
pub trait QualityJudge: Send + Sync {
    async fn judge(&self, task: &Task, output: &str, criteria: &str) -> anyhow::Result<Verdict>;
}
