//! Task graph node: the unit of work dispatched to a worker.

use serde::{Deserialize, Serialize};

/// The kind of work a task represents, used to route it to a capable worker
/// and to select a dispatch timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Implement,
    Test,
    Research,
    Analyze,
    Merge,
    Design,
    Fix,
}

impl TaskType {
    /// Default dispatch timeout for this task type.
    #[must_use]
    pub const fn default_timeout_secs(self) -> u64 {
        match self {
            Self::Research | Self::Analyze => 300,
            Self::Merge => 180,
            Self::Implement | Self::Test | Self::Design | Self::Fix => 120,
        }
    }
}

/// Lifecycle state of a task within a run.
///
/// `pending -> ready -> dispatched -> {completed | failed | decomposed}`,
/// and `{pending | ready} -> skipped -> ready` via rescue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Dispatched,
    Completed,
    Failed,
    Decomposed,
    Skipped,
}

impl TaskStatus {
    /// Whether `self -> to` is a transition the state machine allows.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Ready)
                | (Self::Pending, Self::Skipped)
                | (Self::Ready, Self::Dispatched)
                | (Self::Ready, Self::Skipped)
                | (Self::Dispatched, Self::Completed)
                | (Self::Dispatched, Self::Failed)
                | (Self::Dispatched, Self::Ready)
                | (Self::Dispatched, Self::Decomposed)
                | (Self::Skipped, Self::Ready)
        )
    }

    /// A task in one of these states will never be dispatched again this run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Decomposed | Self::Skipped
        )
    }

    /// A dependency in one of these states satisfies a dependent's readiness
    /// check. Degraded completions count as completed here.
    #[must_use]
    pub const fn is_terminal_good(self) -> bool {
        matches!(self, Self::Completed | Self::Decomposed)
    }
}

/// A structured summary a worker may attach to its result when it believes
/// the task is done (or has given up).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClosureReport {
    pub findings: Vec<String>,
    pub actions_taken: Vec<String>,
    pub failures: Vec<String>,
    pub remaining_work: Vec<String>,
    pub exit_reason: String,
}

impl ClosureReport {
    /// True when the report admits failure and has nothing substantive to
    /// show for it. Used by the quality-gate pre-check and by the
    /// dependency-context hollow warning; both require the same
    /// conjunction, never either half alone.
    #[must_use]
    pub fn is_empty_with_failure_admission(&self) -> bool {
        let no_real_findings = self.findings.is_empty()
            || self
                .findings
                .iter()
                .all(|f| f.trim().is_empty() || looks_like_budget_excuse(f));
        let admits_failure = !self.failures.is_empty() || !self.remaining_work.is_empty();
        no_real_findings && admits_failure
    }
}

fn looks_like_budget_excuse(finding: &str) -> bool {
    let lower = finding.to_lowercase();
    ["out of budget", "ran out of time", "token limit", "no time left"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Worker-reported resource and tool-call counters for one dispatch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskMetrics {
    /// Number of tool calls the worker made. `-1` sentinels a timeout.
    pub tool_calls: i64,
}

impl TaskMetrics {
    #[must_use]
    pub const fn timed_out(self) -> bool {
        self.tool_calls == -1
    }
}

/// What a worker produced for one dispatch of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub output: String,
    pub tokens_used: u64,
    pub cost_used: f64,
    pub duration_ms: u64,
    pub model: String,
    #[serde(default)]
    pub degraded: bool,
    /// 1..5, optional: not every completion is judged.
    pub quality_score: Option<u8>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    pub closure_report: Option<ClosureReport>,
    #[serde(default)]
    pub metrics: TaskMetrics,
}

/// A node in the execution graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub task_type: TaskType,
    /// 1..10, used to size the worker's budget.
    pub complexity: u8,
    pub wave: u32,
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub degraded: bool,
    pub parent_task_id: Option<String>,
    pub subtask_ids: Vec<String>,
    /// Rebuilt from scratch on every transition into `ready`.
    pub dependency_context: Option<String>,
    /// Set only when a skipped task was rescued back to ready.
    pub rescue_context: Option<String>,
    pub result: Option<TaskResult>,
    /// Paths the artifact-check collaborator should look for when this task
    /// is the subject of degraded acceptance or of a descendant's rescue.
    pub target_files: Vec<String>,
    /// The model the orchestrator selected at the most recent dispatch.
    pub dispatched_model: Option<String>,
}

impl Task {
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>, task_type: TaskType, complexity: u8) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            task_type,
            complexity: complexity.clamp(1, 10),
            wave: 0,
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            attempts: 0,
            degraded: false,
            parent_task_id: None,
            subtask_ids: Vec::new(),
            dependency_context: None,
            rescue_context: None,
            result: None,
            target_files: Vec::new(),
            dispatched_model: None,
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_task_id: impl Into<String>) -> Self {
        self.parent_task_id = Some(parent_task_id.into());
        self
    }

    #[must_use]
    pub fn with_target_files(mut self, target_files: Vec<String>) -> Self {
        self.target_files = target_files;
        self
    }

    #[must_use]
    pub fn with_wave(mut self, wave: u32) -> Self {
        self.wave = wave;
        self
    }

    /// Validate and apply a status transition.
    ///
    /// # Errors
    /// Returns [`crate::domain::errors::DomainError::InvalidTransition`] if the
    /// state machine does not permit `self.status -> to`.
    pub fn transition_to(&mut self, to: TaskStatus) -> crate::domain::errors::DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(crate::domain::errors::DomainError::InvalidTransition {
                task_id: self.id.clone(),
                from: format!("{:?}", self.status),
                to: format!("{to:?}"),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Force a status transition outside the normal table. Used only by
    /// cancellation, which must move a task straight to `failed` from
    /// whatever state it was in when the run was cancelled.
    pub fn force_status(&mut self, to: TaskStatus) {
        if !self.status.can_transition_to(to) {
            tracing::warn!(
                task_id = %self.id,
                from = ?self.status,
                to = ?to,
                "forcing status transition outside the normal state machine"
            );
        }
        self.status = to;
    }

    /// `ready -> dispatched`; increments `attempts` before the caller spawns
    /// the worker, per the attempts-before-dispatch ordering guarantee.
    ///
    /// # Errors
    /// Returns an error if `self.status` is not `ready`.
    pub fn mark_dispatched(&mut self, model: impl Into<String>) -> crate::domain::errors::DomainResult<()> {
        self.transition_to(TaskStatus::Dispatched)?;
        self.attempts += 1;
        self.dispatched_model = Some(model.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_ready_is_allowed() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Ready));
    }

    #[test]
    fn ready_cannot_skip_straight_to_completed() {
        assert!(!TaskStatus::Ready.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn dispatched_can_retry_to_ready() {
        assert!(TaskStatus::Dispatched.can_transition_to(TaskStatus::Ready));
    }

    #[test]
    fn skipped_only_goes_back_to_ready() {
        assert!(TaskStatus::Skipped.can_transition_to(TaskStatus::Ready));
        assert!(!TaskStatus::Skipped.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn decomposed_and_failed_are_terminal() {
        assert!(TaskStatus::Decomposed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Dispatched.is_terminal());
    }

    #[test]
    fn decomposed_counts_as_terminal_good_for_dependents() {
        assert!(TaskStatus::Decomposed.is_terminal_good());
        assert!(TaskStatus::Completed.is_terminal_good());
        assert!(!TaskStatus::Failed.is_terminal_good());
        assert!(!TaskStatus::Skipped.is_terminal_good());
    }

    #[test]
    fn mark_dispatched_increments_attempts_monotonically() {
        let mut task = Task::new("st-0", "do the thing", TaskType::Implement, 3);
        task.transition_to(TaskStatus::Ready).unwrap();
        task.mark_dispatched("claude-sonnet").unwrap();
        assert_eq!(task.attempts, 1);
        assert_eq!(task.status, TaskStatus::Dispatched);

        task.transition_to(TaskStatus::Ready).unwrap();
        task.mark_dispatched("claude-sonnet").unwrap();
        assert_eq!(task.attempts, 2);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut task = Task::new("st-0", "do the thing", TaskType::Implement, 3);
        assert!(task.transition_to(TaskStatus::Completed).is_err());
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn closure_report_requires_both_no_findings_and_failure_admission() {
        let substantive = ClosureReport {
            findings: vec!["identified root cause in parser.rs".into()],
            failures: vec![],
            ..Default::default()
        };
        assert!(!substantive.is_empty_with_failure_admission());

        let empty_but_no_admission = ClosureReport {
            findings: vec![],
            failures: vec![],
            remaining_work: vec![],
            ..Default::default()
        };
        assert!(!empty_but_no_admission.is_empty_with_failure_admission());

        let hollow = ClosureReport {
            findings: vec!["ran out of time to investigate".into()],
            failures: vec!["could not complete".into()],
            ..Default::default()
        };
        assert!(hollow.is_empty_with_failure_admission());
    }
}
