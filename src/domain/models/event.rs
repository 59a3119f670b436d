//! Typed event stream emitted by the orchestrator: callback-heavy emission
//! is modeled as a single-writer channel of these variants rather than ad
//! hoc callbacks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SwarmEvent {
    Start {
        task_count: usize,
        wave_count: u32,
    },
    PhaseProgress {
        phase: RunPhase,
    },
    TaskDispatched {
        task_id: String,
        model: String,
        worker_name: String,
        /// Required: consumers rely on this to order repeated dispatches.
        attempts: u32,
    },
    TaskHollow {
        task_id: String,
        attempts: u32,
    },
    TaskCompleted {
        task_id: String,
        quality_score: Option<u8>,
        degraded: Option<bool>,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    TaskSkipped {
        task_id: String,
        reason: String,
    },
    TaskRescued {
        task_id: String,
        rescue_context: String,
    },
    TaskDecomposed {
        task_id: String,
        subtask_ids: Vec<String>,
    },
    ConsensusReached {
        task_id: String,
        strategy: String,
    },
    Complete {
        success: bool,
        stats: RunStats,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Decomposing,
    Planning,
    Executing,
    Verifying,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub degraded_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
    pub decomposed_tasks: usize,
    pub tokens_used: u64,
    pub cost_used: f64,
}
