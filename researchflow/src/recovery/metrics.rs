//! Run-scoped recovery counters.

use serde::{Deserialize, Serialize};

/// Counters written only by the orchestrator and read by the driver.
///
/// A snapshot of these is merged into every wrapped step's result metadata,
/// so downstream reporting sees live telemetry without a separate query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMetrics {
    /// Retry waits performed (one per backoff).
    pub retries_attempted: u64,
    /// Invocations whose every attempt failed.
    pub retries_exhausted: u64,
    /// Invocations that succeeded after two or more attempts.
    pub recoveries: u64,
    /// Times a circuit transitioned to open.
    pub circuit_opens: u64,
    /// Calls skipped because a circuit was open.
    pub circuit_skips: u64,
    /// Current dead-letter queue size.
    pub dead_letter_size: usize,
}
