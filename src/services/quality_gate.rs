//! Quality gate (C5): evaluates a completed task's output; raises the
//! circuit breaker after consecutive rejections; resets on pass or wave
//! boundary.

use crate::domain::models::{CircuitBreakerState, ClosureReport, Task};
use crate::domain::ports::QualityJudge;

#[derive(Debug, Clone)]
pub enum QualityOutcome {
    /// A genuine judge pass.
    Pass { score: u8, reasoning: String },
    /// Rejected either by the pre-check or by the judge.
    Fail {
        score: Option<u8>,
        reasoning: String,
        breaker_tripped: bool,
    },
    /// The circuit breaker was already tripped; accepted without judging.
    Bypassed,
}

pub struct QualityGate<'a> {
    judge: &'a dyn QualityJudge,
}

impl<'a> QualityGate<'a> {
    #[must_use]
    pub fn new(judge: &'a dyn QualityJudge) -> Self {
        Self { judge }
    }

    /// Evaluate one non-hollow completion. `breaker` is per-run, per-wave
    /// state the caller owns and resets at wave boundaries.
    pub async fn evaluate(
        &self,
        task: &Task,
        output: &str,
        criteria: &str,
        closure_report: Option<&ClosureReport>,
        breaker: &mut CircuitBreakerState,
    ) -> QualityOutcome {
        if breaker.quality_gate_disabled {
            return QualityOutcome::Bypassed;
        }

        if closure_report.is_some_and(ClosureReport::is_empty_with_failure_admission) {
            let tripped = breaker.record_rejection();
            return QualityOutcome::Fail {
                score: None,
                reasoning: "pre-check: closure report admits failure with no real findings".to_string(),
                breaker_tripped: tripped,
            };
        }

        match self.judge.judge(task, output, criteria).await {
            Ok(verdict) if verdict.pass => {
                breaker.record_pass();
                QualityOutcome::Pass {
                    score: verdict.score,
                    reasoning: verdict.reasoning,
                }
            }
            Ok(verdict) => {
                let tripped = breaker.record_rejection();
                QualityOutcome::Fail {
                    score: Some(verdict.score),
                    reasoning: verdict.reasoning,
                    breaker_tripped: tripped,
                }
            }
            Err(err) => {
                tracing::warn!(task_id = %task.id, error = %err, "quality judge invocation failed");
                let tripped = breaker.record_rejection();
                QualityOutcome::Fail {
                    score: None,
                    reasoning: format!("judge unavailable: {err}"),
                    breaker_tripped: tripped,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TaskType, Task as DomainTask};
    use crate::domain::ports::Verdict;
    use async_trait::async_trait;

    struct AlwaysPass;
    #[async_trait]
    impl QualityJudge for AlwaysPass {
        async fn judge(&self, _task: &DomainTask, _output: &str, _criteria: &str) -> anyhow::Result<Verdict> {
            Ok(Verdict {
                pass: true,
                score: 4,
                reasoning: "looks good".to_string(),
            })
        }
    }

    struct AlwaysFail;
    #[async_trait]
    impl QualityJudge for AlwaysFail {
        async fn judge(&self, _task: &DomainTask, _output: &str, _criteria: &str) -> anyhow::Result<Verdict> {
            Ok(Verdict {
                pass: false,
                score: 1,
                reasoning: "missing tests".to_string(),
            })
        }
    }

    fn task() -> DomainTask {
        DomainTask::new("st-0", "do it", TaskType::Implement, 3)
    }

    #[tokio::test]
    async fn precheck_short_circuits_the_judge() {
        let judge = AlwaysPass;
        let gate = QualityGate::new(&judge);
        let mut breaker = CircuitBreakerState::default();
        let report = ClosureReport {
            findings: vec![],
            failures: vec!["gave up".to_string()],
            ..Default::default()
        };
        let outcome = gate
            .evaluate(&task(), "", "criteria", Some(&report), &mut breaker)
            .await;
        assert!(matches!(outcome, QualityOutcome::Fail { .. }));
    }

    #[tokio::test]
    async fn eight_rejections_trip_the_breaker_and_bypass_follows() {
        let judge = AlwaysFail;
        let gate = QualityGate::new(&judge);
        let mut breaker = CircuitBreakerState::default();
        for _ in 0..8 {
            gate.evaluate(&task(), "out", "criteria", None, &mut breaker).await;
        }
        assert!(breaker.quality_gate_disabled);

        let outcome = gate.evaluate(&task(), "out", "criteria", None, &mut breaker).await;
        assert!(matches!(outcome, QualityOutcome::Bypassed));
    }

    #[tokio::test]
    async fn a_pass_resets_the_counter() {
        let fail_judge = AlwaysFail;
        let gate = QualityGate::new(&fail_judge);
        let mut breaker = CircuitBreakerState::default();
        gate.evaluate(&task(), "out", "criteria", None, &mut breaker).await;
        gate.evaluate(&task(), "out", "criteria", None, &mut breaker).await;
        assert_eq!(breaker.consecutive_quality_rejections, 2);

        let pass_judge = AlwaysPass;
        let pass_gate = QualityGate::new(&pass_judge);
        pass_gate.evaluate(&task(), "out", "criteria", None, &mut breaker).await;
        assert_eq!(breaker.consecutive_quality_rejections, 0);
    }
}
