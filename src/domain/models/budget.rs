//! Process-wide budget pool and per-worker allocation.

use serde::{Deserialize, Serialize};

/// Per-attempt retry/iteration multipliers, 1-based attempt number.
///
/// Later attempts get more room to think, but the multiplier is capped so a
/// single pathological task cannot drain the pool.
#[must_use]
pub fn retry_multiplier(attempt: u32) -> f64 {
    match attempt {
        0 | 1 => 1.0,
        2 => 1.3,
        3 => 1.6,
        _ => 2.0,
    }
}

#[must_use]
pub fn iteration_multiplier(attempt: u32) -> f64 {
    match attempt {
        0 | 1 | 2 => 1.0,
        3 => 1.5,
        _ => 1.5,
    }
}

/// Maps a task's 1..10 complexity rating onto a token-budget scaling factor.
#[must_use]
pub fn complexity_factor(complexity: u8) -> f64 {
    f64::from(complexity.clamp(1, 10)) / 5.0
}

/// An ephemeral handle given to a dispatched worker. Subtracted from the
/// pool on `reserve` and returned (possibly partially) on `release`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Allocation {
    pub token_budget: u64,
    pub cost_budget: f64,
}

/// Process-wide singleton for one run's token/cost budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPool {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub tokens_used: u64,
    pub cost_used: f64,
    /// Absolute token count the orchestrator keeps for its own LLM calls
    /// (decomposition, judging, review). Never handed to a worker.
    pub orchestrator_reserve: u64,
    pub max_per_worker: u64,
    /// Base token budget before complexity/retry scaling is applied.
    pub base_tokens_per_task: u64,
}

impl BudgetPool {
    #[must_use]
    pub fn new(total_tokens: u64, total_cost: f64, max_per_worker: u64) -> Self {
        Self::with_reserve_ratio(total_tokens, total_cost, max_per_worker, 0.15)
    }

    #[must_use]
    pub fn with_reserve_ratio(
        total_tokens: u64,
        total_cost: f64,
        max_per_worker: u64,
        orchestrator_reserve_ratio: f64,
    ) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let orchestrator_reserve = (total_tokens as f64 * orchestrator_reserve_ratio) as u64;
        Self {
            total_tokens,
            total_cost,
            tokens_used: 0,
            cost_used: 0.0,
            orchestrator_reserve,
            max_per_worker,
            base_tokens_per_task: max_per_worker.min(20_000),
        }
    }

    /// True iff the pool still has room for a worker reservation, leaving
    /// the orchestrator reserve untouched.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.tokens_used < self.total_tokens.saturating_sub(self.orchestrator_reserve)
            && self.cost_used < self.total_cost
    }

    /// Reserve a token/cost allocation for dispatching `task_id` at
    /// `attempt` (1-based) given its `complexity`. Returns `None` if the
    /// reservation would draw into the orchestrator reserve or exceed the
    /// cost ceiling.
    pub fn reserve(&mut self, task_id: &str, complexity: u8, attempt: u32) -> Option<Allocation> {
        if !self.has_capacity() {
            tracing::debug!(task_id, "budget pool has no capacity left to reserve");
            return None;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = (self.base_tokens_per_task as f64 * complexity_factor(complexity)
            * retry_multiplier(attempt)) as u64;
        let token_budget = scaled.min(self.max_per_worker);
        let cost_budget = self.estimate_cost(token_budget);

        let available = self.total_tokens.saturating_sub(self.orchestrator_reserve) - self.tokens_used;
        if token_budget > available || self.cost_used + cost_budget > self.total_cost {
            tracing::debug!(task_id, token_budget, available, "reservation exceeds remaining budget");
            return None;
        }

        self.tokens_used += token_budget;
        self.cost_used += cost_budget;
        Some(Allocation {
            token_budget,
            cost_budget,
        })
    }

    /// Credit back the unused portion of `allocation`, then charge the
    /// pool for what the worker actually used.
    pub fn release(&mut self, allocation: Allocation, actual_tokens: u64, actual_cost: f64) {
        self.tokens_used = self.tokens_used.saturating_sub(allocation.token_budget);
        self.cost_used = (self.cost_used - allocation.cost_budget).max(0.0);
        self.tokens_used += actual_tokens;
        self.cost_used += actual_cost;
    }

    fn estimate_cost(&self, token_budget: u64) -> f64 {
        if self.total_tokens == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = token_budget as f64 / self.total_tokens as f64;
        fraction * self.total_cost
    }
}
