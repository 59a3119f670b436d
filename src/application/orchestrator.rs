//! Swarm orchestrator (C6): drives a [`TaskGraph`] to completion wave by
//! wave, composing the worker pool, hollow detector, and quality gate and
//! applying the three-tier resilience recovery when a task exhausts its
//! normal retries.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                Orchestrator                   │
//! ├──────────────────────────────────────────────┤
//! │ - TaskGraph (single source of truth)          │
//! │ - BudgetPool (token/cost reservation)         │
//! │ - CircuitBreakerState (per-wave)               │
//! │ - WorkerPool (dispatch + timeout)             │
//! │ - QualityGate (judge + breaker accounting)    │
//! └──────────────────────────────────────────────┘
//!          │                         │
//!          ▼                         ▼
//!   control loop (1 task)   bounded JoinSet of
//!   dispatches + waits      in-flight worker calls
//! ```
//!
//! All graph and budget mutation happens on the control loop; dispatched
//! workers run concurrently but report back through the `JoinSet`, so there
//! is exactly one writer to [`TaskGraph`] and [`BudgetPool`] at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::domain::models::{
    Allocation, BudgetPool, CircuitBreakerState, RunPhase, RunStats, SwarmConfig, SwarmEvent, Task, TaskGraph,
    TaskResult, TaskStatus,
};
use crate::domain::errors::DomainError;
use crate::domain::models::queue::FailOutcome;
use crate::domain::ports::{ArtifactCheck, Decomposer, QualityJudge};
use crate::services::{is_hollow, QualityGate, QualityOutcome, WorkerPool};

/// A clonable handle that lets a caller request cancellation of a run in
/// progress. Checked at the top of the control loop and before every
/// dispatch; in-flight workers are left to finish naturally.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

pub struct Orchestrator {
    graph: TaskGraph,
    budget: BudgetPool,
    config: SwarmConfig,
    breaker: CircuitBreakerState,
    worker_pool: Arc<WorkerPool>,
    decomposer: Arc<dyn Decomposer>,
    judge: Arc<dyn QualityJudge>,
    artifact_check: Arc<dyn ArtifactCheck>,
    events: mpsc::UnboundedSender<SwarmEvent>,
    consecutive_timeouts: HashMap<String, u32>,
    cancel: Arc<AtomicBool>,
    /// Set when a fatal error (a cyclic micro-decomposition, or an internal
    /// invariant violation) demands the run stop immediately rather than be
    /// routed around at the task level.
    fatal_error: Option<String>,
}

impl Orchestrator {
    /// Decompose `goal` into an initial task graph and build an
    /// orchestrator ready to run it. The returned receiver streams every
    /// event emitted over the run's lifetime.
    ///
    /// # Errors
    /// Propagates a decomposer failure, or a dependency cycle in the
    /// decomposition.
    pub async fn bootstrap(
        goal: &str,
        config: SwarmConfig,
        worker_pool: Arc<WorkerPool>,
        decomposer: Arc<dyn Decomposer>,
        judge: Arc<dyn QualityJudge>,
        artifact_check: Arc<dyn ArtifactCheck>,
    ) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<SwarmEvent>)> {
        let (events, receiver) = mpsc::unbounded_channel();
        let _ = events.send(SwarmEvent::PhaseProgress {
            phase: RunPhase::Decomposing,
        });

        let decomposition = decomposer.decompose(goal, "").await?;
        let graph = TaskGraph::load_from_decomposition(&decomposition)?;

        let budget = BudgetPool::with_reserve_ratio(
            config.total_budget,
            config.max_cost,
            config.max_tokens_per_worker,
            config.orchestrator_reserve_ratio,
        );
        let breaker = CircuitBreakerState::new(config.quality_gate_threshold);

        Ok((
            Self {
                graph,
                budget,
                config,
                breaker,
                worker_pool,
                decomposer,
                judge,
                artifact_check,
                events,
                consecutive_timeouts: HashMap::new(),
                cancel: Arc::new(AtomicBool::new(false)),
                fatal_error: None,
            },
            receiver,
        ))
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Run the graph to completion: dispatch every ready task, bounded by
    /// `maxConcurrency`, advancing waves and scanning for rescues as tasks
    /// finish. Consumes `self` since a run is one-shot.
    pub async fn run(mut self) -> RunStats {
        self.emit(SwarmEvent::Start {
            task_count: self.graph.len(),
            wave_count: self.graph.wave_count(),
        });
        self.emit(SwarmEvent::PhaseProgress {
            phase: RunPhase::Executing,
        });

        let mut inflight: JoinSet<(String, Allocation, TaskResult)> = JoinSet::new();
        let mut cancelled = false;

        while !self.graph.all_terminal() {
            if self.is_cancelled() {
                cancelled = true;
                break;
            }
            if self.fatal_error.is_some() {
                break;
            }

            let ready_ids: Vec<String> = self.graph.get_ready().into_iter().map(|t| t.id.clone()).collect();
            let mut dispatched_any = false;

            for task_id in ready_ids {
                if inflight.len() >= self.config.max_concurrency || self.is_cancelled() {
                    break;
                }
                if self.dispatch_one(&task_id, &mut inflight).await {
                    dispatched_any = true;
                    tokio::time::sleep(Duration::from_millis(self.config.dispatch_stagger_ms)).await;
                }
            }

            if let Some(joined) = inflight.join_next().await {
                match joined {
                    Ok((task_id, alloc, result)) => self.handle_completion(task_id, alloc, result).await,
                    Err(join_err) => tracing::error!(error = %join_err, "worker task panicked"),
                }
            } else if !dispatched_any {
                if !self.graph.advance_wave() {
                    break;
                }
                self.breaker.reset_for_new_wave();
                self.scan_for_rescues();
            }
        }

        // Drain whatever is still in flight, cancelled or not: a worker
        // that already started gets to report its result.
        while let Some(joined) = inflight.join_next().await {
            if let Ok((task_id, alloc, result)) = joined {
                self.handle_completion(task_id, alloc, result).await;
            }
        }

        let stats = self.collect_stats();
        let success = !cancelled && self.fatal_error.is_none() && stats.failed_tasks == 0;
        self.emit(SwarmEvent::PhaseProgress {
            phase: if success { RunPhase::Completed } else { RunPhase::Failed },
        });
        self.emit(SwarmEvent::Complete {
            success,
            stats: stats.clone(),
        });
        stats
    }

    /// Reserve budget, select a worker, mark the task dispatched, emit the
    /// event, and spawn the worker call. Returns whether a dispatch actually
    /// happened (a reservation or a transition failure aborts silently).
    async fn dispatch_one(&mut self, task_id: &str, inflight: &mut JoinSet<(String, Allocation, TaskResult)>) -> bool {
        let Some(task) = self.graph.get(task_id).cloned() else {
            return false;
        };
        let attempt = task.attempts + 1;
        let Some(alloc) = self.budget.reserve(&task.id, task.complexity, attempt) else {
            tracing::warn!(task_id = %task.id, "budget pool exhausted, cannot dispatch");
            return false;
        };

        let (worker_name, model) = self.worker_pool.select_for(&task);
        if let Err(err) = self.graph.mark_dispatched(task_id, &model) {
            tracing::error!(task_id = %task_id, error = %err, "failed to mark task dispatched");
            self.budget.release(alloc, 0, 0.0);
            return false;
        }

        self.emit(SwarmEvent::TaskDispatched {
            task_id: task_id.to_string(),
            model: model.clone(),
            worker_name,
            attempts: attempt,
        });

        let prompt = build_prompt(&task);
        let pool = Arc::clone(&self.worker_pool);
        let config = self.config.clone();
        let task_id_owned = task_id.to_string();
        inflight.spawn(async move {
            let result = pool.dispatch(&task, prompt, &config, attempt).await;
            (task_id_owned, alloc, result)
        });
        true
    }

    /// Release the allocation, then walk the hollow / failure / quality
    /// decision tree for one completed dispatch.
    async fn handle_completion(&mut self, task_id: String, alloc: Allocation, result: TaskResult) {
        self.budget.release(alloc, result.tokens_used, result.cost_used);

        if is_hollow(result.metrics, &result.output) {
            let attempts = self.graph.get(&task_id).map_or(0, |t| t.attempts);
            self.emit(SwarmEvent::TaskHollow {
                task_id: task_id.clone(),
                attempts,
            });
            self.retry_or_recover(&task_id, &result, "hollow").await;
            return;
        }

        if !result.success {
            let mut force_recovery = false;
            if result.metrics.timed_out() {
                let count = self.bump_consecutive_timeout(&result.model);
                force_recovery = count > self.config.consecutive_timeout_limit;
            } else {
                self.reset_consecutive_timeout(&result.model);
            }

            if force_recovery {
                self.attempt_resilience_recovery(&task_id, &result, "timeout").await;
            } else {
                self.retry_or_recover(&task_id, &result, "exhausted").await;
            }
            return;
        }
        self.reset_consecutive_timeout(&result.model);

        if !self.config.quality_gates {
            self.complete_task(&task_id, result);
            return;
        }

        let Some(task) = self.graph.get(&task_id).cloned() else {
            return;
        };
        let gate = QualityGate::new(self.judge.as_ref());
        let outcome = gate
            .evaluate(
                &task,
                &result.output,
                "the task's description and any explicit acceptance expectations",
                result.closure_report.as_ref(),
                &mut self.breaker,
            )
            .await;

        match outcome {
            QualityOutcome::Pass { score, .. } => {
                let mut result = result;
                result.quality_score = Some(score);
                self.complete_task(&task_id, result);
            }
            QualityOutcome::Bypassed => self.complete_task(&task_id, result),
            QualityOutcome::Fail { .. } => {
                self.retry_or_recover(&task_id, &result, "quality").await;
            }
        }
    }

    /// Normal retry if the task is within its retry budget and hasn't hit
    /// the hard dispatch cap; otherwise hand off to resilience recovery.
    async fn retry_or_recover(&mut self, task_id: &str, result: &TaskResult, reason: &str) {
        let Some(task) = self.graph.get(task_id).cloned() else {
            return;
        };

        if task.attempts >= self.config.max_dispatches_per_task || task.attempts > self.config.worker_retries {
            self.attempt_resilience_recovery(task_id, result, reason).await;
            return;
        }

        if let Err(err) = self.graph.mark_failed(task_id, self.config.worker_retries, self.artifact_check.as_ref()) {
            tracing::error!(task_id, error = %err, "failed to mark task for retry");
        }
    }

    /// Three tiers, tried in order: degraded acceptance, micro-decomposition,
    /// cascade skip. The first tier that applies wins.
    async fn attempt_resilience_recovery(&mut self, task_id: &str, result: &TaskResult, reason: &str) {
        let Some(task) = self.graph.get(task_id).cloned() else {
            return;
        };
        tracing::info!(task_id = %task.id, reason, "entering resilience recovery");

        if result.metrics.tool_calls > 0 || self.artifact_check.has_artifacts(&task) {
            let mut degraded_result = result.clone();
            degraded_result.success = true;
            degraded_result.degraded = true;
            degraded_result.quality_score = Some(2);
            if self.graph.mark_completed(task_id, degraded_result).is_ok() {
                self.emit(SwarmEvent::TaskCompleted {
                    task_id: task.id.clone(),
                    quality_score: Some(2),
                    degraded: Some(true),
                });
                return;
            }
        }

        if task.complexity >= 6 && task.attempts >= 2 && task.subtask_ids.is_empty() {
            let context = task.dependency_context.clone().unwrap_or_default();
            match self.decomposer.decompose(&task.description, &context).await {
                Ok(decomposition) if (2..=4).contains(&decomposition.subtasks.len()) => {
                    match self.graph.replace_with_subtasks(task_id, decomposition.subtasks) {
                        Ok(subtask_ids) => {
                            self.emit(SwarmEvent::TaskDecomposed {
                                task_id: task.id.clone(),
                                subtask_ids,
                            });
                            return;
                        }
                        Err(err @ DomainError::CyclicDecomposition(_)) => {
                            tracing::error!(
                                task_id = %task.id,
                                error = %err,
                                "decomposer returned a cyclic subtask graph; terminating run"
                            );
                            self.fatal_error = Some(err.to_string());
                            self.emit(SwarmEvent::TaskFailed {
                                task_id: task.id.clone(),
                                error: err.to_string(),
                            });
                            return;
                        }
                        Err(err) => tracing::warn!(
                            task_id = %task.id,
                            error = %err,
                            "micro-decomposition could not be applied"
                        ),
                    }
                }
                Ok(decomposition) => tracing::warn!(
                    task_id = %task.id,
                    count = decomposition.subtasks.len(),
                    "decomposer returned an out-of-range subtask count, falling back to cascade skip"
                ),
                Err(err) => tracing::warn!(task_id = %task.id, error = %err, "micro-decomposition invocation failed"),
            }
        }

        match self.graph.mark_failed(task_id, 0, self.artifact_check.as_ref()) {
            Ok(FailOutcome::Failed { skipped }) => {
                self.emit(SwarmEvent::TaskFailed {
                    task_id: task.id.clone(),
                    error: reason.to_string(),
                });
                for skipped_id in skipped {
                    self.emit(SwarmEvent::TaskSkipped {
                        task_id: skipped_id,
                        reason: format!("cascade skip: {} failed", task.id),
                    });
                }
            }
            Ok(FailOutcome::Retried) => {
                tracing::error!(task_id = %task.id, "mark_failed unexpectedly retried during terminal recovery");
            }
            Err(err) => tracing::error!(
                task_id = %task.id,
                error = %err,
                "failed to mark task failed during resilience recovery"
            ),
        }
    }

    fn complete_task(&mut self, task_id: &str, result: TaskResult) {
        let quality_score = result.quality_score;
        let degraded = result.degraded;
        if let Err(err) = self.graph.mark_completed(task_id, result) {
            tracing::error!(task_id, error = %err, "failed to mark task completed");
            return;
        }
        self.emit(SwarmEvent::TaskCompleted {
            task_id: task_id.to_string(),
            quality_score,
            degraded: Some(degraded),
        });
    }

    /// After a wave boundary, check every skipped task's failed upstream
    /// dependency for artifacts; rescue it if any is found.
    fn scan_for_rescues(&mut self) {
        let skipped_ids: Vec<String> = self.graph.skipped_tasks().iter().map(|t| t.id.clone()).collect();
        for id in skipped_ids {
            let Some(task) = self.graph.get(&id) else { continue };
            let failed_upstream = task
                .dependencies
                .iter()
                .filter_map(|dep_id| self.graph.get(dep_id))
                .find(|dep| dep.status == TaskStatus::Failed)
                .cloned();
            let Some(upstream) = failed_upstream else { continue };
            if !self.artifact_check.has_artifacts(&upstream) {
                continue;
            }
            let reason = format!("upstream task {} left usable artifacts despite failing", upstream.id);
            if self.graph.rescue_task(&id, reason.clone()).is_ok() {
                self.emit(SwarmEvent::TaskRescued {
                    task_id: id,
                    rescue_context: reason,
                });
            }
        }
    }

    fn collect_stats(&self) -> RunStats {
        let mut stats = RunStats {
            total_tasks: self.graph.len(),
            ..RunStats::default()
        };
        for task in self.graph.all_tasks() {
            match task.status {
                TaskStatus::Completed if task.degraded => stats.degraded_tasks += 1,
                TaskStatus::Completed => stats.completed_tasks += 1,
                TaskStatus::Failed => stats.failed_tasks += 1,
                TaskStatus::Skipped => stats.skipped_tasks += 1,
                TaskStatus::Decomposed => stats.decomposed_tasks += 1,
                TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Dispatched => {}
            }
        }
        stats.tokens_used = self.budget.tokens_used;
        stats.cost_used = self.budget.cost_used;
        stats
    }

    fn bump_consecutive_timeout(&mut self, model: &str) -> u32 {
        let count = self.consecutive_timeouts.entry(model.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset_consecutive_timeout(&mut self, model: &str) {
        self.consecutive_timeouts.remove(model);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn emit(&self, event: SwarmEvent) {
        let _ = self.events.send(event);
    }
}

fn build_prompt(task: &Task) -> String {
    let mut prompt = task.description.clone();
    if let Some(context) = &task.dependency_context {
        prompt.push_str("\n\n--- Dependency context ---\n");
        prompt.push_str(context);
    }
    if let Some(rescue) = &task.rescue_context {
        prompt.push_str("\n\n--- Rescue note ---\n");
        prompt.push_str(rescue);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TaskMetrics, TaskType};
    use crate::domain::ports::{DecompositionResult, NoArtifacts, SpawnResult, SubtaskSpec, Verdict};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct FixedDecomposer(Vec<SubtaskSpec>);
    #[async_trait]
    impl Decomposer for FixedDecomposer {
        async fn decompose(&self, _goal: &str, _context: &str) -> anyhow::Result<DecompositionResult> {
            Ok(DecompositionResult {
                subtasks: self.0.clone(),
                strategy: "fixed".to_string(),
            })
        }
    }

    struct AlwaysPassJudge;
    #[async_trait]
    impl QualityJudge for AlwaysPassJudge {
        async fn judge(&self, _task: &Task, _output: &str, _criteria: &str) -> anyhow::Result<Verdict> {
            Ok(Verdict {
                pass: true,
                score: 5,
                reasoning: "good".to_string(),
            })
        }
    }

    struct CountingSpawn {
        calls: AtomicU32,
    }
    #[async_trait]
    impl crate::domain::ports::SpawnAgent for CountingSpawn {
        async fn spawn(&self, _role: &str, _prompt: &str) -> anyhow::Result<SpawnResult> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(SpawnResult {
                success: true,
                output: "did real work with tool calls".to_string(),
                metrics: TaskMetrics { tool_calls: 3 },
                tokens_used: 1000,
                cost_used: 0.02,
                duration_ms: 5,
                files_modified: vec!["src/lib.rs".to_string()],
                closure_report: None,
            })
        }
    }

    fn spec(id: &str, deps: &[&str]) -> SubtaskSpec {
        SubtaskSpec {
            id: id.to_string(),
            description: format!("do {id}"),
            task_type: TaskType::Implement,
            complexity: 3,
            dependencies: deps.iter().map(|s| (*s).to_string()).collect(),
            parallelizable: true,
        }
    }

    #[tokio::test]
    async fn a_two_task_chain_completes_successfully() {
        let decomposer = Arc::new(FixedDecomposer(vec![spec("st-0", &[]), spec("st-1", &["st-0"])]));
        let judge = Arc::new(AlwaysPassJudge);
        let spawn = Arc::new(CountingSpawn { calls: AtomicU32::new(0) });
        let pool = Arc::new(WorkerPool::new(
            spawn,
            vec![crate::domain::models::WorkerDefinition {
                name: "coder".to_string(),
                model: "claude-sonnet".to_string(),
                capabilities: vec!["implement".to_string()],
                allowed_tools: None,
            }],
        ));

        let (orchestrator, mut events) =
            Orchestrator::bootstrap("build the thing", SwarmConfig::default(), pool, decomposer, judge, Arc::new(NoArtifacts))
                .await
                .unwrap();

        let run = tokio::spawn(orchestrator.run());
        let mut saw_complete = false;
        while let Some(event) = events.recv().await {
            if let SwarmEvent::Complete { success, .. } = event {
                assert!(success);
                saw_complete = true;
            }
        }
        let stats = run.await.unwrap();
        assert!(saw_complete);
        assert_eq!(stats.completed_tasks, 2);
        assert_eq!(stats.failed_tasks, 0);
    }

    #[tokio::test]
    async fn cancellation_stops_new_dispatches() {
        let decomposer = Arc::new(FixedDecomposer(vec![spec("st-0", &[])]));
        let judge = Arc::new(AlwaysPassJudge);
        let spawn = Arc::new(CountingSpawn { calls: AtomicU32::new(0) });
        let pool = Arc::new(WorkerPool::new(spawn, vec![]));

        let (orchestrator, _events) =
            Orchestrator::bootstrap("build the thing", SwarmConfig::default(), pool, decomposer, judge, Arc::new(NoArtifacts))
                .await
                .unwrap();

        let handle = orchestrator.cancel_handle();
        handle.cancel();
        let stats = orchestrator.run().await;
        assert_eq!(stats.completed_tasks, 0);
    }

    struct AlwaysFailJudge;
    #[async_trait]
    impl QualityJudge for AlwaysFailJudge {
        async fn judge(&self, _task: &Task, _output: &str, _criteria: &str) -> anyhow::Result<Verdict> {
            Ok(Verdict {
                pass: false,
                score: 1,
                reasoning: "bad".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn disabling_quality_gates_completes_tasks_a_failing_judge_would_reject() {
        let decomposer = Arc::new(FixedDecomposer(vec![spec("st-0", &[])]));
        let judge = Arc::new(AlwaysFailJudge);
        let spawn = Arc::new(CountingSpawn { calls: AtomicU32::new(0) });
        let pool = Arc::new(WorkerPool::new(
            spawn,
            vec![crate::domain::models::WorkerDefinition {
                name: "coder".to_string(),
                model: "claude-sonnet".to_string(),
                capabilities: vec!["implement".to_string()],
                allowed_tools: None,
            }],
        ));
        let mut config = SwarmConfig::default();
        config.quality_gates = false;

        let (orchestrator, mut events) =
            Orchestrator::bootstrap("build the thing", config, pool, decomposer, judge, Arc::new(NoArtifacts))
                .await
                .unwrap();

        let run = tokio::spawn(orchestrator.run());
        let mut saw_complete = false;
        while let Some(event) = events.recv().await {
            if let SwarmEvent::Complete { success, .. } = event {
                assert!(success, "a failing judge must not block completion once quality gates are off");
                saw_complete = true;
            }
        }
        let stats = run.await.unwrap();
        assert!(saw_complete);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.failed_tasks, 0);
    }
}
