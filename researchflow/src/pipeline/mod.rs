//! The pipeline driver: wires wrapped steps to the checkpoint store.
//!
//! The driver owns the in-memory state, invokes each step through its
//! orchestrator-wrapped form, merges partial updates back, and persists a
//! checkpoint after every completed step. On restart it recovers the newest
//! valid snapshot and skips steps the recovered state records as completed.

mod driver;
mod interfaces;


pub use driver::{DriverConfig, PipelineDriver, RunHandle, RunOutcome};
pub use interfaces::{AuditSink, BudgetGate, LoggingAuditSink, NoOpAuditSink, UnlimitedBudget};
