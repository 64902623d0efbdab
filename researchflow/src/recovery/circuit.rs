//! Per-step circuit breaker.
//!
//! State machine per step name: CLOSED, then OPEN once consecutive
//! exhausted failures reach the threshold (all calls skipped for the
//! cooldown), then an implicit HALF-OPEN probe on the first call after the
//! cooldown. A successful probe closes the breaker; a failed probe re-opens
//! it immediately, because the failure counter is never reset while open
//! and re-crosses the threshold on that single failure.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive exhausted failures before the circuit opens.
    pub threshold: u32,
    /// How long an open circuit skips calls.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Per-step failure tracking.
#[derive(Debug, Default)]
struct CircuitState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Tracks failure streaks per step name and decides when to skip calls.
///
/// Not internally synchronized; the orchestrator guards it with its own
/// lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    states: HashMap<String, CircuitState>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given thresholds.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Returns true if calls to `step_name` should be skipped at `now`.
    ///
    /// An elapsed cooldown clears `open_until` (half-open) so the caller's
    /// next invocation is a live probe; the failure counter is kept.
    pub fn should_skip(&mut self, step_name: &str, now: Instant) -> bool {
        let Some(state) = self.states.get_mut(step_name) else {
            return false;
        };
        match state.open_until {
            Some(until) if now < until => true,
            Some(_) => {
                state.open_until = None;
                false
            }
            None => false,
        }
    }

    /// Records a successful call, closing the circuit for the step.
    pub fn record_success(&mut self, step_name: &str) {
        self.states.remove(step_name);
    }

    /// Records an exhausted failure. Returns true if this failure opened
    /// (or re-opened) the circuit.
    pub fn record_failure(&mut self, step_name: &str, now: Instant) -> bool {
        let state = self.states.entry(step_name.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.threshold {
            state.open_until = Some(now + self.config.cooldown);
            true
        } else {
            false
        }
    }

    /// The current consecutive-failure count for a step.
    #[must_use]
    pub fn failure_count(&self, step_name: &str) -> u32 {
        self.states
            .get(step_name)
            .map_or(0, |s| s.consecutive_failures)
    }
}
