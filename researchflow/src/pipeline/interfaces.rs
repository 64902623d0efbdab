//! Interfaces for the driver's external collaborators.
//!
//! These are seams only: the audit log and budget manager live outside this
//! crate. The defaults here do nothing (or allow everything) so the driver
//! works stand-alone.

use tracing::{info, warn};

/// Receives step lifecycle events keyed by step name.
pub trait AuditSink: Send + Sync {
    /// A step is about to execute.
    fn step_started(&self, step_name: &str);

    /// A step finished successfully.
    fn step_finished(&self, step_name: &str);

    /// A step failed or was skipped with an error.
    fn step_failed(&self, step_name: &str, error: &str);
}

/// An audit sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditSink;

impl AuditSink for NoOpAuditSink {
    fn step_started(&self, _step_name: &str) {}
    fn step_finished(&self, _step_name: &str) {}
    fn step_failed(&self, _step_name: &str, _error: &str) {}
}

/// An audit sink that logs events using the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAuditSink;

impl AuditSink for LoggingAuditSink {
    fn step_started(&self, step_name: &str) {
        info!(step = step_name, "step.started");
    }

    fn step_finished(&self, step_name: &str) {
        info!(step = step_name, "step.finished");
    }

    fn step_failed(&self, step_name: &str, error: &str) {
        warn!(step = step_name, error, "step.failed");
    }
}

/// Consulted before each step invocation.
///
/// A denial stops the run before the step executes; completed work stays
/// checkpointed.
pub trait BudgetGate: Send + Sync {
    /// Returns true if the named step may run.
    fn permit(&self, step_name: &str) -> bool;
}

/// A budget gate that allows every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedBudget;

impl BudgetGate for UnlimitedBudget {
    fn permit(&self, _step_name: &str) -> bool {
        true
    }
}
