//! Hollow detector (C4): a pure predicate over a worker result.

use crate::domain::models::TaskMetrics;

/// `isHollow(result) -> bool`.
///
/// A timeout is a genuine failure, never hollow. Zero tool calls and a
/// trivial output means the worker contributed nothing; substantial text
/// without tool calls may still be useful analysis and is not hollow.
#[must_use]
pub fn is_hollow(metrics: TaskMetrics, output: &str) -> bool {
    if metrics.timed_out() {
        return false;
    }
    metrics.tool_calls == 0 && output.trim().len() < 50
}
