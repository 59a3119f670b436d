//! Property-based coverage of the quantified invariants: budget accounting
//! never overshoots its ceiling, the retry multiplier schedule never
//! decreases, the circuit breaker trips exactly at its threshold, and a
//! linear task chain only ever dispatches a task once every dependency
//! ahead of it has reached a terminal-good state.

use proptest::prelude::*;

use swarm_orchestrator::domain::models::budget::{retry_multiplier, BudgetPool};
use swarm_orchestrator::domain::models::circuit_breaker::CircuitBreakerState;
use swarm_orchestrator::domain::models::task::{TaskMetrics, TaskResult, TaskStatus, TaskType};
use swarm_orchestrator::domain::models::TaskGraph;
use swarm_orchestrator::domain::ports::{DecompositionResult, NoArtifacts, SubtaskSpec};

fn spec(id: &str, deps: &[&str]) -> SubtaskSpec {
    SubtaskSpec {
        id: id.to_string(),
        description: format!("task {id}"),
        task_type: TaskType::Implement,
        complexity: 3,
        dependencies: deps.iter().map(|s| (*s).to_string()).collect(),
        parallelizable: true,
    }
}

fn chain_decomposition(len: usize) -> DecompositionResult {
    let subtasks = (0..len)
        .map(|i| {
            if i == 0 {
                spec(&format!("st-{i}"), &[])
            } else {
                spec(&format!("st-{i}"), &[&format!("st-{}", i - 1)])
            }
        })
        .collect();
    DecompositionResult {
        subtasks,
        strategy: "chain".to_string(),
    }
}

fn ok_result() -> TaskResult {
    TaskResult {
        success: true,
        output: "did the work".to_string(),
        tokens_used: 50,
        cost_used: 0.005,
        duration_ms: 5,
        model: "test-model".to_string(),
        degraded: false,
        quality_score: Some(4),
        files_modified: vec![],
        closure_report: None,
        metrics: TaskMetrics { tool_calls: 2 },
    }
}

proptest! {
    /// `reserve` must never let `tokens_used` exceed `total_tokens -
    /// orchestrator_reserve`, whatever sequence of attempts and
    /// complexities a single task is reserved against.
    #[test]
    fn reserve_never_exceeds_the_orchestrator_reserve_ceiling(
        total_tokens in 10_000u64..2_000_000,
        max_per_worker in 1_000u64..200_000,
        complexity in 1u8..10,
        attempts in prop::collection::vec(1u32..6, 0..20),
    ) {
        let mut pool = BudgetPool::new(total_tokens, 1_000_000.0, max_per_worker);
        let ceiling = pool.total_tokens.saturating_sub(pool.orchestrator_reserve);

        for (i, attempt) in attempts.iter().enumerate() {
            let task_id = format!("t{i}");
            if let Some(alloc) = pool.reserve(&task_id, complexity, *attempt) {
                prop_assert!(pool.tokens_used <= ceiling);
                pool.release(alloc, alloc.token_budget, alloc.cost_budget);
            }
        }
        prop_assert!(pool.tokens_used <= ceiling);
    }

    /// The retry multiplier schedule never decreases as the attempt number
    /// grows, so a stalled task is never given *less* room on a later try.
    #[test]
    fn retry_multiplier_is_monotonically_non_decreasing(attempt in 1u32..50) {
        prop_assert!(retry_multiplier(attempt + 1) >= retry_multiplier(attempt));
    }

    /// A circuit breaker with an arbitrary threshold trips on exactly the
    /// rejection that brings the counter to the threshold, never earlier.
    #[test]
    fn breaker_trips_exactly_at_its_threshold(threshold in 1u32..30) {
        let mut breaker = CircuitBreakerState::new(threshold);
        for _ in 0..threshold - 1 {
            prop_assert!(!breaker.record_rejection());
            prop_assert!(!breaker.quality_gate_disabled);
        }
        prop_assert!(breaker.record_rejection());
        prop_assert!(breaker.quality_gate_disabled);
    }

    /// A pass between rejections resets the counter, so the breaker never
    /// trips on non-consecutive rejections reaching the threshold count.
    #[test]
    fn a_pass_breaks_the_consecutive_streak(threshold in 2u32..10) {
        let mut breaker = CircuitBreakerState::new(threshold);
        for _ in 0..threshold - 1 {
            breaker.record_rejection();
        }
        breaker.record_pass();
        prop_assert_eq!(breaker.consecutive_quality_rejections, 0);
        prop_assert!(!breaker.quality_gate_disabled);
        for _ in 0..threshold - 1 {
            prop_assert!(!breaker.record_rejection());
        }
    }

    /// Draining a linear dependency chain of arbitrary length only ever
    /// dispatches a task once every dependency ahead of it is
    /// terminal-good, and every task's `attempts` stays monotonic.
    #[test]
    fn chain_drains_respecting_dependency_order(len in 1usize..12) {
        let mut graph = TaskGraph::load_from_decomposition(&chain_decomposition(len)).unwrap();

        for wave in 0..graph.wave_count() {
            prop_assert_eq!(graph.current_wave(), wave);
            loop {
                let ready_ids: Vec<String> = graph.get_ready().iter().map(|t| t.id.clone()).collect();
                if ready_ids.is_empty() {
                    break;
                }
                for id in ready_ids {
                    for dep_id in graph.get(&id).unwrap().dependencies.clone() {
                        let dep_status = graph.get(&dep_id).unwrap().status;
                        prop_assert!(dep_status.is_terminal_good());
                    }
                    let attempts_before = graph.get(&id).unwrap().attempts;
                    graph.mark_dispatched(&id, "test-model").unwrap();
                    prop_assert_eq!(graph.get(&id).unwrap().attempts, attempts_before + 1);
                    graph.mark_completed(&id, ok_result()).unwrap();
                    prop_assert_eq!(graph.get(&id).unwrap().status, TaskStatus::Completed);
                }
            }
            if wave < graph.wave_count() - 1 {
                prop_assert!(graph.advance_wave());
            }
        }
        prop_assert!(graph.all_terminal());
    }

    /// Calling `replace_with_subtasks` a second time on an already-decomposed
    /// task is a no-op regardless of what subtasks the second call offers.
    #[test]
    fn replace_with_subtasks_is_idempotent_on_the_second_call(
        extra_id in "[a-z]{3,8}",
    ) {
        let mut graph = TaskGraph::load_from_decomposition(&chain_decomposition(1)).unwrap();
        graph.mark_dispatched("st-0", "m").unwrap();

        let first = graph
            .replace_with_subtasks("st-0", vec![spec("st-0a", &[]), spec("st-0b", &["st-0a"])])
            .unwrap();

        let second = graph
            .replace_with_subtasks("st-0", vec![spec(&extra_id, &[])])
            .unwrap();

        prop_assert_eq!(&second, &first);
        prop_assert!(graph.get(&extra_id).is_none());
        prop_assert_eq!(graph.get("st-0").unwrap().status, TaskStatus::Decomposed);
    }

    /// A terminally failed task's descendants are skipped unless an
    /// artifact check reports progress; with no artifacts every reachable
    /// descendant in a chain is skipped.
    #[test]
    fn cascade_skip_reaches_every_non_terminal_descendant_without_artifacts(len in 2usize..10) {
        let mut graph = TaskGraph::load_from_decomposition(&chain_decomposition(len)).unwrap();
        graph.mark_dispatched("st-0", "m").unwrap();
        let skipped = graph.cascade_skip("st-0", &NoArtifacts);

        prop_assert_eq!(skipped.len(), len - 1);
        for i in 1..len {
            prop_assert_eq!(graph.get(&format!("st-{i}")).unwrap().status, TaskStatus::Skipped);
        }
    }
}
