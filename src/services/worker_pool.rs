//! Worker pool (C3): takes a ready task and produces a `TaskResult` via the
//! external worker function. Stateless across dispatches except for
//! the ephemeral worker-role selection.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::timeout;

use crate::domain::models::budget::iteration_multiplier;
use crate::domain::models::{SwarmConfig, Task, TaskMetrics, TaskResult, TaskType, WorkerDefinition};
use crate::domain::ports::{SpawnAgent, SpawnResult};

pub struct WorkerPool {
    spawn_agent: Arc<dyn SpawnAgent>,
    workers: Vec<WorkerDefinition>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(spawn_agent: Arc<dyn SpawnAgent>, workers: Vec<WorkerDefinition>) -> Self {
        Self { spawn_agent, workers }
    }

    /// Select a worker role whose capabilities contain `task.task_type`, or
    /// any role if none match.
    fn select_worker(&self, task: &Task) -> Option<&WorkerDefinition> {
        let type_key = task_type_key(task.task_type);
        self.workers
            .iter()
            .find(|w| w.capabilities.iter().any(|c| c.eq_ignore_ascii_case(type_key)))
            .or_else(|| self.workers.first())
    }

    /// `(worker_name, model)` the pool would select for `task`. Exposed so
    /// the orchestrator can record the selection in `markDispatched` and the
    /// `dispatched` event before the worker actually runs.
    #[must_use]
    pub fn select_for(&self, task: &Task) -> (String, String) {
        let worker = self.select_worker(task);
        let name = worker.map_or_else(|| "generalist".to_string(), |w| w.name.clone());
        let model = worker.map_or_else(|| "unknown".to_string(), |w| w.model.clone());
        (name, model)
    }

    /// Race the spawn against the task type's timeout, widened for later
    /// attempts by `iteration_multiplier` so a retried task gets more room to
    /// iterate rather than being cut off at the same wall-clock point that
    /// already failed it once. A timeout yields a synthetic failed result
    /// with `metrics.toolCalls = -1`; resource accounting against the budget
    /// pool is the orchestrator's job, not this pool's.
    pub async fn dispatch(&self, task: &Task, prompt: String, config: &SwarmConfig, attempt: u32) -> TaskResult {
        let (role_name, model) = self.select_for(task);
        let base_timeout = config.timeout_for(task_type_key(task.task_type));
        let dispatch_timeout = base_timeout.mul_f64(iteration_multiplier(attempt));

        let started = Instant::now();
        match timeout(dispatch_timeout, self.spawn_agent.spawn(&role_name, &prompt)).await {
            Ok(Ok(spawn_result)) => spawn_result.into_task_result(model),
            Ok(Err(err)) => {
                tracing::warn!(task_id = %task.id, error = %err, "worker invocation returned an error");
                failed_result(model, err.to_string(), started.elapsed().as_millis(), 0)
            }
            Err(_elapsed) => {
                tracing::warn!(
                    task_id = %task.id,
                    timeout_secs = dispatch_timeout.as_secs(),
                    "worker dispatch timed out"
                );
                failed_result(model, String::new(), dispatch_timeout.as_millis(), -1)
            }
        }
    }
}

trait IntoTaskResult {
    fn into_task_result(self, model: String) -> TaskResult;
}

impl IntoTaskResult for SpawnResult {
    fn into_task_result(self, model: String) -> TaskResult {
        TaskResult {
            success: self.success,
            output: self.output,
            tokens_used: self.tokens_used,
            cost_used: self.cost_used,
            duration_ms: self.duration_ms,
            model,
            degraded: false,
            quality_score: None,
            files_modified: self.files_modified,
            closure_report: self.closure_report,
            metrics: self.metrics,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn failed_result(model: String, output: String, duration_ms: u128, tool_calls: i64) -> TaskResult {
    TaskResult {
        success: false,
        output,
        tokens_used: 0,
        cost_used: 0.0,
        duration_ms: duration_ms as u64,
        model,
        degraded: false,
        quality_score: None,
        files_modified: Vec::new(),
        closure_report: None,
        metrics: TaskMetrics { tool_calls },
    }
}

const fn task_type_key(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Implement => "implement",
        TaskType::Test => "test",
        TaskType::Research => "research",
        TaskType::Analyze => "analyze",
        TaskType::Merge => "merge",
        TaskType::Design => "design",
        TaskType::Fix => "fix",
    }
}
