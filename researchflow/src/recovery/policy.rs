//! Retry policies with exponential backoff.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Retry behavior for one step name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the initial one.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Creates a new policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt ceiling.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial backoff.
    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sets the backoff ceiling.
    #[must_use]
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// The wait after failed attempt number `attempt` (1-indexed):
    /// `min(initial_backoff * 2^(attempt-1), max_backoff)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 2u32.saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Per-step retry policies with a default fallback.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicySet {
    default: RetryPolicy,
    per_step: HashMap<String, RetryPolicy>,
}

impl RetryPolicySet {
    /// Creates a policy set with the given default.
    #[must_use]
    pub fn new(default: RetryPolicy) -> Self {
        Self {
            default,
            per_step: HashMap::new(),
        }
    }

    /// Overrides the policy for one step name.
    #[must_use]
    pub fn with_step(mut self, step_name: impl Into<String>, policy: RetryPolicy) -> Self {
        self.per_step.insert(step_name.into(), policy);
        self
    }

    /// The policy for a step, falling back to the default.
    #[must_use]
    pub fn for_step(&self, step_name: &str) -> &RetryPolicy {
        self.per_step.get(step_name).unwrap_or(&self.default)
    }
}
