//! Quality-gate circuit breaker: trips after consecutive rejections
//! pile up within a wave, to stop a run thrashing on the LLM judge.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub consecutive_quality_rejections: u32,
    pub quality_gate_disabled: bool,
    pub threshold: u32,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self::new(8)
    }
}

impl CircuitBreakerState {
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            consecutive_quality_rejections: 0,
            quality_gate_disabled: false,
            threshold,
        }
    }

    /// Record a judge rejection; trips the breaker once the threshold is
    /// reached. Returns whether this call tripped it.
    pub fn record_rejection(&mut self) -> bool {
        self.consecutive_quality_rejections += 1;
        if self.consecutive_quality_rejections >= self.threshold && !self.quality_gate_disabled {
            self.quality_gate_disabled = true;
            tracing::warn!(
                threshold = self.threshold,
                "quality gate circuit breaker tripped; judging disabled for the rest of this wave"
            );
            return true;
        }
        false
    }

    /// A genuine judge pass resets the counter but leaves a tripped breaker
    /// disabled until the wave boundary.
    pub fn record_pass(&mut self) {
        self.consecutive_quality_rejections = 0;
    }

    /// Wave boundary: reset counter and flag together (reset condition (b)).
    pub fn reset_for_new_wave(&mut self) {
        self.consecutive_quality_rejections = 0;
        self.quality_gate_disabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_consecutive_rejections_trip_the_breaker() {
        let mut breaker = CircuitBreakerState::new(8);
        for _ in 0..7 {
            assert!(!breaker.record_rejection());
        }
        assert!(breaker.record_rejection());
        assert!(breaker.quality_gate_disabled);
    }

    #[test]
    fn a_pass_resets_the_counter_but_not_a_tripped_flag() {
        let mut breaker = CircuitBreakerState::new(2);
        breaker.record_rejection();
        breaker.record_rejection();
        assert!(breaker.quality_gate_disabled);
        breaker.record_pass();
        assert_eq!(breaker.consecutive_quality_rejections, 0);
        assert!(breaker.quality_gate_disabled);
    }

    #[test]
    fn wave_boundary_resets_both_counter_and_flag() {
        let mut breaker = CircuitBreakerState::new(2);
        breaker.record_rejection();
        breaker.record_rejection();
        assert!(breaker.quality_gate_disabled);
        breaker.reset_for_new_wave();
        assert_eq!(breaker.consecutive_quality_rejections, 0);
        assert!(!breaker.quality_gate_disabled);
    }
}
