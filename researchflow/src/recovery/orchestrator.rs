//! The recovery orchestrator: retry, circuit-breaking, and dead-lettering
//! around step execution.

use super::circuit::{CircuitBreaker, CircuitBreakerConfig};
use super::dead_letter::{DeadLetterEntry, DeadLetterQueue, DeadLetterReason};
use super::metrics::RecoveryMetrics;
use super::policy::RetryPolicySet;
use crate::cancellation::CancellationToken;
use crate::state::{PipelineState, StepResult, StepStatus};
use crate::steps::Step;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for a [`RecoveryOrchestrator`].
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Per-step retry policies with a default fallback.
    pub policies: RetryPolicySet,
    /// Consecutive exhausted failures before a step's circuit opens.
    pub circuit_threshold: u32,
    /// How long an open circuit skips calls.
    pub circuit_cooldown: Duration,
    /// Dead-letter ring buffer capacity.
    pub dead_letter_capacity: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            policies: RetryPolicySet::default(),
            circuit_threshold: 5,
            circuit_cooldown: Duration::from_secs(60),
            dead_letter_capacity: 50,
        }
    }
}

/// Mutable orchestrator state, guarded by one lock.
///
/// The lock is only ever held across short synchronous sections, never
/// across an await point.
#[derive(Debug)]
struct Shared {
    circuit: CircuitBreaker,
    dead_letters: DeadLetterQueue,
    metrics: RecoveryMetrics,
}

/// Wraps step execution with bounded retry, a per-step circuit breaker,
/// and a bounded dead-letter queue.
///
/// Scoped to one pipeline run with one caller advancing one step at a
/// time; parallel execution needs independent orchestrator instances.
#[derive(Debug)]
pub struct RecoveryOrchestrator {
    policies: RetryPolicySet,
    shared: Mutex<Shared>,
    cancel: CancellationToken,
}

impl RecoveryOrchestrator {
    /// Creates an orchestrator from config and a shared cancellation token.
    #[must_use]
    pub fn new(config: RecoveryConfig, cancel: CancellationToken) -> Self {
        Self {
            policies: config.policies,
            shared: Mutex::new(Shared {
                circuit: CircuitBreaker::new(CircuitBreakerConfig {
                    threshold: config.circuit_threshold,
                    cooldown: config.circuit_cooldown,
                }),
                dead_letters: DeadLetterQueue::new(config.dead_letter_capacity),
                metrics: RecoveryMetrics::default(),
            }),
            cancel,
        }
    }

    /// Wraps a step so every invocation goes through recovery handling.
    ///
    /// The wrapped form has the same [`Step`] signature and is the only
    /// sanctioned way to invoke a step.
    pub fn wrap<S: Step>(self: Arc<Self>, step: S) -> WrappedStep<S> {
        WrappedStep {
            orchestrator: self,
            step,
        }
    }

    /// A snapshot of the current recovery counters.
    #[must_use]
    pub fn metrics(&self) -> RecoveryMetrics {
        let shared = self.shared.lock();
        let mut metrics = shared.metrics.clone();
        metrics.dead_letter_size = shared.dead_letters.len();
        metrics
    }

    /// A read-only copy of the dead-letter queue, oldest first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.shared.lock().dead_letters.snapshot()
    }

    /// Executes a step with retry, circuit-breaking, and dead-lettering.
    ///
    /// Never returns an error: failures become a [`StepResult`] carrying a
    /// non-recoverable error note, so one failing step cannot crash the
    /// driver loop.
    async fn invoke(&self, step: &dyn Step, state: &PipelineState) -> StepResult {
        let step_name = step.name().to_string();

        if self.check_circuit_skip(&step_name) {
            let mut result = StepResult::fail(format!(
                "Circuit open for step '{step_name}'; call skipped"
            ));
            self.augment(&mut result);
            return result;
        }

        let policy = *self.policies.for_step(&step_name);
        let mut attempt: u32 = 0;
        let mut last_error = String::from("no attempts made");

        while attempt < policy.max_attempts {
            attempt += 1;

            if self.cancel.is_cancelled() {
                return self.cancelled_result(attempt.saturating_sub(1));
            }

            let mut result = step.execute(state).await;
            result.attempts = attempt;

            match result.status {
                // Cancellation propagates immediately: no retries, no
                // dead letter.
                StepStatus::Cancelled => {
                    self.augment(&mut result);
                    return result;
                }
                StepStatus::Ok => {
                    self.record_success(&step_name, attempt);
                    self.augment(&mut result);
                    return result;
                }
                StepStatus::Fail => {
                    last_error = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string());

                    if !result.retryable {
                        debug!(step = %step_name, error = %last_error, "Non-retryable failure");
                        break;
                    }
                    if attempt < policy.max_attempts {
                        let delay = policy.backoff_delay(attempt);
                        self.shared.lock().metrics.retries_attempted += 1;
                        debug!(
                            step = %step_name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_error,
                            "Retrying after error"
                        );
                        // The wait is a suspension point and must yield to
                        // a shutdown signal immediately.
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            () = self.cancel.cancelled() => {
                                return self.cancelled_result(attempt);
                            }
                        }
                    }
                }
            }
        }

        self.record_exhaustion(&step_name, attempt, &last_error);
        let mut result = StepResult::fail(format!(
            "Step '{step_name}' failed after {attempt} attempt(s): {last_error}"
        ));
        result.attempts = attempt;
        self.augment(&mut result);
        result
    }

    /// Returns true if the step's circuit is open, recording the skip.
    fn check_circuit_skip(&self, step_name: &str) -> bool {
        let mut shared = self.shared.lock();
        if !shared.circuit.should_skip(step_name, Instant::now()) {
            return false;
        }
        shared.metrics.circuit_skips += 1;
        shared.dead_letters.push(DeadLetterEntry {
            step_name: step_name.to_string(),
            category: "circuit".to_string(),
            message: format!("circuit open for step '{step_name}'"),
            attempts: 0,
            reason: DeadLetterReason::CircuitOpen,
            enqueued_at: Utc::now(),
        });
        drop(shared);
        warn!(step = step_name, "Circuit open; skipping step invocation");
        true
    }

    fn record_success(&self, step_name: &str, attempt: u32) {
        let mut shared = self.shared.lock();
        if attempt >= 2 {
            shared.metrics.recoveries += 1;
            info!(step = step_name, attempt, "Step recovered after retries");
        }
        shared.circuit.record_success(step_name);
    }

    fn record_exhaustion(&self, step_name: &str, attempts: u32, error: &str) {
        let mut shared = self.shared.lock();
        shared.metrics.retries_exhausted += 1;
        let opened = shared.circuit.record_failure(step_name, Instant::now());
        if opened {
            shared.metrics.circuit_opens += 1;
        }
        shared.dead_letters.push(DeadLetterEntry {
            step_name: step_name.to_string(),
            category: "step_failure".to_string(),
            message: error.to_string(),
            attempts,
            reason: DeadLetterReason::RetriesExhausted,
            enqueued_at: Utc::now(),
        });
        drop(shared);
        if opened {
            warn!(step = step_name, "Circuit opened after repeated failures");
        }
        warn!(step = step_name, attempts, error, "Step failed; dead-lettered");
    }

    fn cancelled_result(&self, attempts: u32) -> StepResult {
        let reason = self
            .cancel
            .reason()
            .unwrap_or_else(|| "shutdown requested".to_string());
        let mut result = StepResult::cancelled(reason);
        result.attempts = attempts;
        self.augment(&mut result);
        result
    }

    /// Merges a recovery telemetry snapshot into the result metadata.
    fn augment(&self, result: &mut StepResult) {
        let metrics = self.metrics();
        let dead_letters = self.dead_letters();
        result.merge_metadata(
            "recovery",
            serde_json::json!({
                "metrics": metrics,
                "dead_letters": dead_letters,
            }),
        );
    }
}

/// A step wrapped with recovery handling; same signature as the inner step.
pub struct WrappedStep<S: Step> {
    orchestrator: Arc<RecoveryOrchestrator>,
    step: S,
}

impl<S: Step> std::fmt::Debug for WrappedStep<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedStep")
            .field("step", &self.step)
            .finish()
    }
}

#[async_trait]
impl<S: Step> Step for WrappedStep<S> {
    fn name(&self) -> &str {
        self.step.name()
    }

    async fn execute(&self, state: &PipelineState) -> StepResult {
        self.orchestrator.invoke(&self.step, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StepUpdate;
    use crate::steps::FnStep;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policies(max_attempts: u32) -> RetryPolicySet {
        RetryPolicySet::new(
            crate::recovery::RetryPolicy::new()
                .with_max_attempts(max_attempts)
                .with_initial_backoff(Duration::from_millis(2))
                .with_max_backoff(Duration::from_millis(8)),
        )
    }

    fn orchestrator(config: RecoveryConfig) -> Arc<RecoveryOrchestrator> {
        Arc::new(RecoveryOrchestrator::new(config, CancellationToken::new()))
    }

    fn flaky_step(name: &str, failures_before_success: u32) -> (FnStep<impl Fn(&PipelineState) -> StepResult + Send + Sync>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let step = FnStep::new(name, move |_state| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < failures_before_success {
                StepResult::fail_retryable(format!("transient failure {n}"))
            } else {
                StepResult::ok(StepUpdate::new().with_plan(vec!["done".to_string()]))
            }
        });
        (step, calls)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let orch = orchestrator(RecoveryConfig {
            policies: fast_policies(3),
            ..RecoveryConfig::default()
        });
        let (step, calls) = flaky_step("plan", 0);
        let wrapped = Arc::clone(&orch).wrap(step);

        let state = PipelineState::new("run-1", "q");
        let result = wrapped.execute(&state).await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.metrics().recoveries, 0);
        // Telemetry is threaded through the result metadata.
        assert!(result.metadata.contains_key("recovery"));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let orch = orchestrator(RecoveryConfig {
            policies: fast_policies(3),
            ..RecoveryConfig::default()
        });
        let (step, calls) = flaky_step("search", 2);
        let wrapped = Arc::clone(&orch).wrap(step);

        let state = PipelineState::new("run-1", "q");
        let result = wrapped.execute(&state).await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let metrics = orch.metrics();
        assert_eq!(metrics.recoveries, 1);
        assert_eq!(metrics.retries_attempted, 2);
        assert_eq!(metrics.retries_exhausted, 0);
        assert!(orch.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_dead_letters_and_never_panics() {
        let orch = orchestrator(RecoveryConfig {
            policies: fast_policies(3),
            ..RecoveryConfig::default()
        });
        let wrapped = Arc::clone(&orch).wrap(FnStep::new("scrape", |_state| {
            StepResult::fail_retryable("connection reset")
        }));

        let state = PipelineState::new("run-1", "q");
        let result = wrapped.execute(&state).await;

        assert!(!result.is_success());
        assert!(!result.retryable);
        assert_eq!(result.attempts, 3);
        assert!(result.error.as_deref().unwrap().contains("connection reset"));

        let metrics = orch.metrics();
        assert_eq!(metrics.retries_exhausted, 1);
        assert_eq!(metrics.dead_letter_size, 1);

        let letters = orch.dead_letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, DeadLetterReason::RetriesExhausted);
        assert_eq!(letters[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_stops_immediately() {
        let orch = orchestrator(RecoveryConfig {
            policies: fast_policies(5),
            ..RecoveryConfig::default()
        });
        let (step, calls) = {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = Arc::clone(&calls);
            let step = FnStep::new("synthesize", move |_state| {
                counter.fetch_add(1, Ordering::SeqCst);
                StepResult::fail("invalid prompt")
            });
            (step, calls)
        };
        let wrapped = Arc::clone(&orch).wrap(step);

        let state = PipelineState::new("run-1", "q");
        let result = wrapped.execute(&state).await;

        assert!(!result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempts, 1);
        assert_eq!(orch.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_circuit_opens_then_skips_then_probes() {
        let orch = orchestrator(RecoveryConfig {
            policies: fast_policies(1),
            circuit_threshold: 2,
            circuit_cooldown: Duration::from_millis(80),
            dead_letter_capacity: 10,
        });
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let wrapped = Arc::clone(&orch).wrap(FnStep::new("search", move |_state| {
            counter.fetch_add(1, Ordering::SeqCst);
            StepResult::fail_retryable("backend down")
        }));
        let state = PipelineState::new("run-1", "q");

        // Two exhausted failures reach the threshold and open the circuit.
        wrapped.execute(&state).await;
        wrapped.execute(&state).await;
        assert_eq!(orch.metrics().circuit_opens, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Within the cooldown the step is never invoked.
        let skipped = wrapped.execute(&state).await;
        assert!(!skipped.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(orch.metrics().circuit_skips, 1);
        let letters = orch.dead_letters();
        assert_eq!(
            letters.last().unwrap().reason,
            DeadLetterReason::CircuitOpen
        );

        // After the cooldown the next call is a live probe.
        tokio::time::sleep(Duration::from_millis(120)).await;
        wrapped.execute(&state).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // The probe failed, so the circuit re-opened immediately.
        wrapped.execute(&state).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(orch.metrics().circuit_opens, 2);
    }

    #[tokio::test]
    async fn test_probe_success_closes_circuit() {
        let orch = orchestrator(RecoveryConfig {
            policies: fast_policies(1),
            circuit_threshold: 1,
            circuit_cooldown: Duration::from_millis(40),
            dead_letter_capacity: 10,
        });
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let wrapped = Arc::clone(&orch).wrap(FnStep::new("summarize", move |_state| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                StepResult::fail_retryable("first call fails")
            } else {
                StepResult::ok_empty()
            }
        }));
        let state = PipelineState::new("run-1", "q");

        wrapped.execute(&state).await;
        assert_eq!(orch.metrics().circuit_opens, 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let probe = wrapped.execute(&state).await;
        assert!(probe.is_success());

        // Closed again: the next call goes straight through.
        let next = wrapped.execute(&state).await;
        assert!(next.is_success());
        assert_eq!(orch.metrics().circuit_skips, 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let orch = Arc::new(RecoveryOrchestrator::new(
            RecoveryConfig {
                policies: RetryPolicySet::new(
                    crate::recovery::RetryPolicy::new()
                        .with_max_attempts(3)
                        .with_initial_backoff(Duration::from_secs(30))
                        .with_max_backoff(Duration::from_secs(30)),
                ),
                ..RecoveryConfig::default()
            },
            cancel.clone(),
        ));
        let wrapped = Arc::clone(&orch).wrap(FnStep::new("search", |_state| {
            StepResult::fail_retryable("transient")
        }));
        let state = PipelineState::new("run-1", "q");

        let start = Instant::now();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel("operator interrupt");
            })
        };

        let result = wrapped.execute(&state).await;
        handle.await.unwrap();

        assert!(result.is_cancelled());
        assert_eq!(result.cancel_reason.as_deref(), Some("operator interrupt"));
        // Returned long before the 30s backoff would have elapsed.
        assert!(start.elapsed() < Duration::from_secs(5));
        // Cancellation is never dead-lettered.
        assert!(orch.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_step_result_propagates_without_retry() {
        let orch = orchestrator(RecoveryConfig {
            policies: fast_policies(5),
            ..RecoveryConfig::default()
        });
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let wrapped = Arc::clone(&orch).wrap(FnStep::new("plan", move |_state| {
            counter.fetch_add(1, Ordering::SeqCst);
            StepResult::cancelled("shutdown")
        }));

        let state = PipelineState::new("run-1", "q");
        let result = wrapped.execute(&state).await;

        assert!(result.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(orch.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_augmentation_merges_not_replaces() {
        let orch = orchestrator(RecoveryConfig {
            policies: fast_policies(1),
            ..RecoveryConfig::default()
        });
        let wrapped = Arc::clone(&orch).wrap(FnStep::new("plan", |_state| {
            let mut result = StepResult::ok_empty();
            result
                .metadata
                .insert("model".to_string(), serde_json::json!("large-v2"));
            result
        }));

        let state = PipelineState::new("run-1", "q");
        let result = wrapped.execute(&state).await;

        // Step-authored metadata survives alongside the recovery snapshot.
        assert_eq!(result.metadata["model"], serde_json::json!("large-v2"));
        assert!(result.metadata["recovery"]["metrics"].is_object());
        assert!(result.metadata["recovery"]["dead_letters"].is_array());
    }
}
