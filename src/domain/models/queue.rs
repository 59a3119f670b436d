//! The task graph: single source of truth for graph state and readiness.
//! Owns all task state and exposes only transition methods — the
//! orchestrator holds a reference and serializes every mutation on the
//! control thread.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{ArtifactCheck, DecompositionResult, SubtaskSpec};

use super::task::{Task, TaskResult, TaskStatus};

const DEPENDENCY_CONTEXT_OUTPUT_TRUNCATE: usize = 400;

/// Outcome of `mark_failed`, distinguishing a retry from a terminal failure
/// so the orchestrator knows whether a cascade skip fired.
#[derive(Debug, Clone)]
pub enum FailOutcome {
    Retried,
    Failed { skipped: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: HashMap<String, Task>,
    /// Insertion order, used to break ties deterministically when a
    /// task's `id` does not sort the way callers expect.
    order: Vec<String>,
    current_wave: u32,
    max_wave: u32,
}

impl TaskGraph {
    /// Materialize all tasks from a decomposition; assign waves by
    /// longest-dependency-path; reject cycles.
    ///
    /// # Errors
    /// Returns [`DomainError::DependencyCycle`] if the decomposition's
    /// dependency graph is cyclic.
    pub fn load_from_decomposition(decomp: &DecompositionResult) -> DomainResult<Self> {
        let specs: HashMap<&str, &SubtaskSpec> =
            decomp.subtasks.iter().map(|s| (s.id.as_str(), s)).collect();

        let waves = compute_waves(&specs)?;

        let mut tasks = HashMap::with_capacity(decomp.subtasks.len());
        let mut order = Vec::with_capacity(decomp.subtasks.len());
        let mut max_wave = 0;

        for spec in &decomp.subtasks {
            let wave = waves[spec.id.as_str()];
            max_wave = max_wave.max(wave);

            let mut task = Task::new(
                spec.id.clone(),
                spec.description.clone(),
                spec.task_type,
                spec.complexity,
            )
            .with_dependencies(spec.dependencies.clone())
            .with_wave(wave);

            if spec.dependencies.is_empty() {
                task.transition_to(TaskStatus::Ready)?;
            }

            order.push(spec.id.clone());
            tasks.insert(spec.id.clone(), task);
        }

        Ok(Self {
            tasks,
            order,
            current_wave: 0,
            max_wave,
        })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    #[must_use]
    pub fn current_wave(&self) -> u32 {
        self.current_wave
    }

    #[must_use]
    pub fn wave_count(&self) -> u32 {
        self.max_wave + 1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All tasks with status `ready` in the current wave, ordered
    /// (wave ascending, id ascending).
    #[must_use]
    pub fn get_ready(&self) -> Vec<&Task> {
        let mut ready: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Ready && t.wave == self.current_wave)
            .collect();
        ready.sort_by(|a, b| a.wave.cmp(&b.wave).then_with(|| a.id.cmp(&b.id)));
        ready
    }

    #[must_use]
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id)).collect()
    }

    #[must_use]
    pub fn skipped_tasks(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Skipped)
            .collect()
    }

    /// `ready -> dispatched`.
    ///
    /// # Errors
    /// Returns an error if `id` is unknown or not `ready`.
    pub fn mark_dispatched(&mut self, id: &str, model: &str) -> DomainResult<()> {
        let task = self.task_mut(id)?;
        task.mark_dispatched(model)
    }

    /// `dispatched -> completed`; rebuilds readiness for dependents.
    ///
    /// # Errors
    /// Returns an error if `id` is unknown or not `dispatched`.
    pub fn mark_completed(&mut self, id: &str, result: TaskResult) -> DomainResult<()> {
        let degraded = result.degraded;
        let task = self.task_mut(id)?;
        task.transition_to(TaskStatus::Completed)?;
        task.degraded = degraded;
        task.result = Some(result);
        self.update_ready_status();
        Ok(())
    }

    /// `dispatched -> ready` (retry) or `dispatched -> failed` (exhausted),
    /// cascading a skip through dependents on terminal failure.
    ///
    /// # Errors
    /// Returns an error if `id` is unknown or not `dispatched`.
    pub fn mark_failed(
        &mut self,
        id: &str,
        max_retries: u32,
        artifact_check: &dyn ArtifactCheck,
    ) -> DomainResult<FailOutcome> {
        let attempts = self.task_ref(id)?.attempts;
        if attempts > max_retries {
            self.task_mut(id)?.transition_to(TaskStatus::Failed)?;
            let skipped = self.cascade_skip(id, artifact_check);
            Ok(FailOutcome::Failed { skipped })
        } else {
            self.task_mut(id)?.transition_to(TaskStatus::Ready)?;
            self.rebuild_context_for(id);
            Ok(FailOutcome::Retried)
        }
    }

    /// `dispatched -> decomposed`; subtasks inherit the parent's
    /// dependencies and every task that depended on `id` now depends on
    /// every new subtask instead. Calling this twice on the same id is a
    /// no-op on the second call.
    ///
    /// # Errors
    /// Returns an error if `id` is unknown, if `id` is neither `dispatched`
    /// nor already `decomposed`, or if the subtasks' declared dependencies
    /// contain a cycle among themselves.
    pub fn replace_with_subtasks(
        &mut self,
        id: &str,
        subtasks: Vec<SubtaskSpec>,
    ) -> DomainResult<Vec<String>> {
        let existing = self.task_ref(id)?;
        if existing.status == TaskStatus::Decomposed {
            return Ok(existing.subtask_ids.clone());
        }

        if has_cycle_among(&subtasks) {
            return Err(DomainError::CyclicDecomposition(id.to_string()));
        }

        let parent_deps = existing.dependencies.clone();
        let parent_wave = existing.wave;

        self.task_mut(id)?.transition_to(TaskStatus::Decomposed)?;

        let mut new_ids = Vec::with_capacity(subtasks.len());
        for spec in subtasks {
            let mut deps = spec.dependencies.clone();
            for parent_dep in &parent_deps {
                if !deps.contains(parent_dep) {
                    deps.push(parent_dep.clone());
                }
            }

            let mut child = Task::new(spec.id.clone(), spec.description, spec.task_type, spec.complexity)
                .with_dependencies(deps)
                .with_parent(id)
                .with_wave(parent_wave);

            if child.dependencies.is_empty() {
                child.transition_to(TaskStatus::Ready)?;
            }

            new_ids.push(spec.id.clone());
            self.order.push(spec.id.clone());
            self.tasks.insert(spec.id, child);
        }

        self.task_mut(id)?.subtask_ids = new_ids.clone();

        for task in self.tasks.values_mut() {
            if task.id == id {
                continue;
            }
            if task.dependencies.iter().any(|d| d == id) {
                let mut rewritten = Vec::with_capacity(task.dependencies.len() + new_ids.len());
                for dep in &task.dependencies {
                    if dep == id {
                        for new_id in &new_ids {
                            if !rewritten.contains(new_id) {
                                rewritten.push(new_id.clone());
                            }
                        }
                    } else if !rewritten.contains(dep) {
                        rewritten.push(dep.clone());
                    }
                }
                task.dependencies = rewritten;
            }
        }

        self.update_ready_status();
        Ok(new_ids)
    }

    /// `skipped -> ready`; records why, and rebuilds `dependencyContext`.
    ///
    /// # Errors
    /// Returns an error if `id` is unknown or not `skipped`.
    pub fn rescue_task(&mut self, id: &str, reason: impl Into<String>) -> DomainResult<()> {
        let task = self.task_mut(id)?;
        task.transition_to(TaskStatus::Ready)?;
        task.rescue_context = Some(reason.into());
        self.rebuild_context_for(id);
        Ok(())
    }

    /// BFS over reverse edges from `root_id`; transitions each reachable
    /// non-terminal descendant to skipped. A descendant the artifact check
    /// reports progress for is left at its current status and the cascade
    /// does not propagate past it — rescue may re-enable it later instead.
    pub fn cascade_skip(&mut self, root_id: &str, artifact_check: &dyn ArtifactCheck) -> Vec<String> {
        let dependents = self.reverse_edges();
        let mut queue: VecDeque<String> = dependents.get(root_id).cloned().unwrap_or_default().into();
        let mut visited: HashSet<String> = HashSet::new();
        let mut skipped = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(task) = self.tasks.get(&id) else { continue };
            if task.status.is_terminal() {
                continue;
            }
            if artifact_check.has_artifacts(task) {
                tracing::debug!(task_id = %id, "cascade skip exempted task: artifacts present");
                continue;
            }
            if let Some(task) = self.tasks.get_mut(&id) {
                if task.transition_to(TaskStatus::Skipped).is_ok() {
                    skipped.push(id.clone());
                    tracing::info!(task_id = %id, root = root_id, "cascade-skipped descendant of failed task");
                    if let Some(next) = dependents.get(&id) {
                        queue.extend(next.iter().cloned());
                    }
                }
            }
        }

        skipped
    }

    /// True iff every task in the current wave is terminal.
    #[must_use]
    pub fn is_current_wave_complete(&self) -> bool {
        self.tasks
            .values()
            .filter(|t| t.wave == self.current_wave)
            .all(|t| t.status.is_terminal())
    }

    /// Advance the wave pointer if the current wave is complete. Returns
    /// whether it advanced.
    pub fn advance_wave(&mut self) -> bool {
        if self.current_wave >= self.max_wave || !self.is_current_wave_complete() {
            return false;
        }
        self.current_wave += 1;
        true
    }

    /// True once every task in the graph is terminal (the orchestrator's
    /// top-level loop condition).
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.status.is_terminal())
    }

    fn task_ref(&self, id: &str) -> DomainResult<&Task> {
        self.tasks
            .get(id)
            .ok_or_else(|| DomainError::TaskNotFound(id.to_string()))
    }

    fn task_mut(&mut self, id: &str) -> DomainResult<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| DomainError::TaskNotFound(id.to_string()))
    }

    fn reverse_edges(&self) -> HashMap<String, Vec<String>> {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for id in &self.order {
            if let Some(task) = self.tasks.get(id) {
                for dep in &task.dependencies {
                    dependents.entry(dep.clone()).or_default().push(id.clone());
                }
            }
        }
        dependents
    }

    /// Promote every pending task whose dependencies are all in a
    /// terminal-good state to ready, rebuilding its dependency context.
    fn update_ready_status(&mut self) {
        let to_promote: Vec<String> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && self.dependencies_satisfied(t))
            .map(|t| t.id.clone())
            .collect();

        for id in to_promote {
            if let Some(task) = self.tasks.get_mut(&id) {
                let _ = task.transition_to(TaskStatus::Ready);
            }
            self.rebuild_context_for(&id);
        }
    }

    fn dependencies_satisfied(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dep_id| {
            self.tasks
                .get(dep_id)
                .is_some_and(|dep| dep.status.is_terminal_good())
        })
    }

    /// Rebuild `dependencyContext` from scratch for `id`.
    fn rebuild_context_for(&mut self, id: &str) {
        let Some(task) = self.tasks.get(id) else { return };
        if task.dependencies.is_empty() {
            return;
        }
        let context = self.build_dependency_context(&task.dependencies);
        if let Some(task) = self.tasks.get_mut(id) {
            task.dependency_context = Some(context);
        }
    }

    /// For each dependency, append a block with its description, a
    /// truncated view of its result output, and any files modified.
    /// Prefixed with "DEGRADED —" for degraded completions and
    /// "WARNING (hollow) —" when the closure report is empty and admits
    /// failure (never for a merely short-but-substantive completion).
    fn build_dependency_context(&self, dependencies: &[String]) -> String {
        let mut blocks = Vec::with_capacity(dependencies.len());
        for dep_id in dependencies {
            let Some(dep) = self.tasks.get(dep_id) else { continue };

            let mut prefix = String::new();
            if dep.degraded {
                prefix.push_str("DEGRADED — ");
            }
            let hollow_warning = dep
                .result
                .as_ref()
                .and_then(|r| r.closure_report.as_ref())
                .is_some_and(super::task::ClosureReport::is_empty_with_failure_admission);
            if hollow_warning {
                prefix.push_str("WARNING (hollow) — ");
            }

            let output = dep
                .result
                .as_ref()
                .map(|r| truncate(&r.output, DEPENDENCY_CONTEXT_OUTPUT_TRUNCATE))
                .unwrap_or_default();
            let files = dep
                .result
                .as_ref()
                .map(|r| r.files_modified.join(", "))
                .unwrap_or_default();

            blocks.push(format!(
                "{prefix}{id}: {description}\n  output: {output}\n  files: {files}",
                id = dep.id,
                description = dep.description,
            ));
        }
        blocks.join("\n\n")
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}

/// DFS cycle check restricted to edges between members of `subtasks`
/// themselves — a dependency on a task outside this batch (e.g. an
/// inherited parent dependency) lies outside the set and cannot
/// contribute to a cycle among the new subtasks.
fn has_cycle_among(subtasks: &[SubtaskSpec]) -> bool {
    let ids: HashSet<&str> = subtasks.iter().map(|s| s.id.as_str()).collect();
    let by_id: HashMap<&str, &SubtaskSpec> = subtasks.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut visiting: HashSet<&str> = HashSet::new();
    let mut done: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        id: &'a str,
        ids: &HashSet<&'a str>,
        by_id: &HashMap<&'a str, &'a SubtaskSpec>,
        visiting: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> bool {
        if done.contains(id) {
            return false;
        }
        if !visiting.insert(id) {
            return true;
        }
        if let Some(spec) = by_id.get(id) {
            for dep in &spec.dependencies {
                if ids.contains(dep.as_str()) && visit(dep.as_str(), ids, by_id, visiting, done) {
                    return true;
                }
            }
        }
        visiting.remove(id);
        done.insert(id);
        false
    }

    for id in &ids {
        if visit(id, &ids, &by_id, &mut visiting, &mut done) {
            return true;
        }
    }
    false
}

/// Longest-dependency-path wave assignment; errors on any cycle.
fn compute_waves<'a>(specs: &HashMap<&'a str, &'a SubtaskSpec>) -> DomainResult<HashMap<&'a str, u32>> {
    let mut waves: HashMap<&str, u32> = HashMap::new();
    let mut visiting: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        id: &'a str,
        specs: &HashMap<&'a str, &'a SubtaskSpec>,
        waves: &mut HashMap<&'a str, u32>,
        visiting: &mut HashSet<&'a str>,
    ) -> DomainResult<u32> {
        if let Some(&w) = waves.get(id) {
            return Ok(w);
        }
        if !visiting.insert(id) {
            return Err(DomainError::DependencyCycle(id.to_string()));
        }
        let spec = specs
            .get(id)
            .ok_or_else(|| DomainError::InvariantViolation(format!("dependency {id} has no spec")))?;

        let mut wave = 0u32;
        for dep in &spec.dependencies {
            let dep_wave = visit(dep, specs, waves, visiting)?;
            wave = wave.max(dep_wave + 1);
        }
        visiting.remove(id);
        waves.insert(id, wave);
        Ok(wave)
    }

    for id in specs.keys() {
        visit(id, specs, &mut waves, &mut visiting)?;
    }
    Ok(waves)
}
