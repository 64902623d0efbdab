//! # Researchflow
//!
//! Crash-safe checkpointing and failure recovery for long-running research
//! pipelines (plan → search → scrape → summarize → synthesize).
//!
//! Runs can take minutes and cost real money per step, so the crate's job
//! is making sure completed work survives process crashes, network
//! failures, and operator interrupts:
//!
//! - **Checkpoint store**: durable, content-checksummed snapshots with
//!   atomic writes, rotation, quarantine of corrupt records, and additive
//!   schema migration
//! - **Recovery orchestrator**: bounded retry with exponential backoff, a
//!   per-step circuit breaker, and a bounded dead-letter queue
//! - **Pipeline driver**: wires wrapped steps to the store, resuming from
//!   the newest valid snapshot after a restart
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use researchflow::prelude::*;
//!
//! let mut driver = PipelineDriver::new(
//!     "runs/run-42",
//!     DriverConfig::default(),
//!     PipelineState::new("run-42", "what is rust"),
//! )?
//! .with_step(PlanStep::new())
//! .with_step(SearchStep::new());
//!
//! driver.resume()?;
//! let outcome = driver.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod checkpoint;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod recovery;
pub mod state;
pub mod steps;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::checkpoint::{CheckpointConfig, CheckpointMetadata, CheckpointStore};
    pub use crate::errors::{RecoveryError, Result};
    pub use crate::pipeline::{
        AuditSink, BudgetGate, DriverConfig, LoggingAuditSink, NoOpAuditSink, PipelineDriver,
        RunHandle, RunOutcome, UnlimitedBudget,
    };
    pub use crate::recovery::{
        DeadLetterEntry, DeadLetterReason, RecoveryConfig, RecoveryMetrics,
        RecoveryOrchestrator, RetryPolicy, RetryPolicySet, WrappedStep,
    };
    pub use crate::state::{
        PipelineState, SearchResult, SourceDocument, StepResult, StepStatus, StepUpdate,
    };
    pub use crate::steps::{FnStep, NoOpStep, Step};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_exports_core_types() {
        let state = PipelineState::new("run-1", "what is rust");
        assert_eq!(state.run_id, "run-1");
        assert!(RetryPolicy::default().max_attempts >= 1);
    }
}
