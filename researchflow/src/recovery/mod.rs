//! Failure recovery around pipeline steps.
//!
//! The [`RecoveryOrchestrator`] wraps each named step with bounded retry
//! and exponential backoff, a per-step circuit breaker, and a bounded
//! dead-letter queue. A wrapped step never raises: callers always receive
//! a [`crate::state::StepResult`], with recovery telemetry merged into its
//! metadata.

mod circuit;
mod dead_letter;
mod metrics;
mod orchestrator;
mod policy;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig};
pub use dead_letter::{DeadLetterEntry, DeadLetterQueue, DeadLetterReason};
pub use metrics::RecoveryMetrics;
pub use orchestrator::{RecoveryConfig, RecoveryOrchestrator, WrappedStep};
pub use policy::{RetryPolicy, RetryPolicySet};
