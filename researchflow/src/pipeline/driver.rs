//! The pipeline driver and its run handle.

use super::interfaces::{AuditSink, BudgetGate, NoOpAuditSink, UnlimitedBudget};
use crate::cancellation::CancellationToken;
use crate::checkpoint::{CheckpointConfig, CheckpointStore};
use crate::errors::Result;
use crate::recovery::{RecoveryConfig, RecoveryMetrics, RecoveryOrchestrator};
use crate::state::{PipelineState, StepStatus};
use crate::steps::Step;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for a [`PipelineDriver`].
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// Checkpoint store settings.
    pub checkpoint: CheckpointConfig,
    /// Recovery orchestrator settings.
    pub recovery: RecoveryConfig,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step completed.
    Completed,
    /// A step failed non-recoverably; earlier work is checkpointed.
    Failed {
        /// The failing step.
        step_name: String,
        /// The final error.
        error: String,
    },
    /// The run was cancelled; a best-effort checkpoint was taken.
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
    /// The budget gate denied a step before it ran.
    BudgetDenied {
        /// The denied step.
        step_name: String,
    },
}

/// A cloneable handle to one run, safe to hand to a signal handler.
///
/// Replaces any notion of a process-wide "current run" global: the interrupt
/// handler closes over the handle instead.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
}

impl RunHandle {
    /// Requests cooperative shutdown of the run.
    ///
    /// Any pending backoff wait is interrupted so the driver can checkpoint
    /// and exit without waiting it out.
    pub fn shutdown(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    /// Returns true if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The id of the run this handle controls.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

/// Drives one research run: step execution, state merging, checkpointing.
pub struct PipelineDriver {
    store: CheckpointStore,
    orchestrator: Arc<RecoveryOrchestrator>,
    steps: Vec<Box<dyn Step>>,
    audit: Arc<dyn AuditSink>,
    budget: Arc<dyn BudgetGate>,
    cancel: CancellationToken,
    state: PipelineState,
}

impl PipelineDriver {
    /// Creates a driver for a fresh run.
    ///
    /// The checkpoint directory should be scoped to this run id; the store
    /// assumes one active writer per directory.
    pub fn new(
        checkpoint_dir: impl Into<std::path::PathBuf>,
        config: DriverConfig,
        initial_state: PipelineState,
    ) -> Result<Self> {
        let store = CheckpointStore::open(checkpoint_dir, config.checkpoint)?;
        let cancel = CancellationToken::new();
        let orchestrator = Arc::new(RecoveryOrchestrator::new(config.recovery, cancel.clone()));
        Ok(Self {
            store,
            orchestrator,
            steps: Vec::new(),
            audit: Arc::new(NoOpAuditSink),
            budget: Arc::new(UnlimitedBudget),
            cancel,
            state: initial_state,
        })
    }

    /// Installs an audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Installs a budget gate.
    #[must_use]
    pub fn with_budget_gate(mut self, gate: Arc<dyn BudgetGate>) -> Self {
        self.budget = gate;
        self
    }

    /// Appends a step; it is wrapped by the orchestrator on the way in, so
    /// every invocation goes through recovery handling.
    #[must_use]
    pub fn with_step<S: Step + 'static>(mut self, step: S) -> Self {
        let wrapped = Arc::clone(&self.orchestrator).wrap(step);
        self.steps.push(Box::new(wrapped));
        self
    }

    /// A handle for interrupt handlers and external supervisors.
    #[must_use]
    pub fn handle(&self) -> RunHandle {
        RunHandle {
            run_id: self.state.run_id.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Read access to the current state.
    #[must_use]
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// A snapshot of the orchestrator's recovery counters.
    #[must_use]
    pub fn metrics(&self) -> RecoveryMetrics {
        self.orchestrator.metrics()
    }

    /// Replaces the in-memory state with the newest valid snapshot on disk.
    ///
    /// Returns true if a snapshot was recovered. Corrupt records are
    /// quarantined during the scan.
    pub fn resume(&mut self) -> Result<bool> {
        match self.store.recover_checkpoint()? {
            Some(state) => {
                info!(
                    run_id = %state.run_id,
                    completed = state.completed_steps.len(),
                    "Resuming from recovered checkpoint"
                );
                self.state = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Executes the remaining steps in order, checkpointing after each.
    ///
    /// Steps already recorded as completed in the state are skipped, which
    /// makes `resume()` followed by `run()` crash-safe: finished work is
    /// never repeated or lost.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        for index in 0..self.steps.len() {
            let step_name = self.steps[index].name().to_string();

            if self.state.is_step_completed(&step_name) {
                debug!(step = %step_name, "Step already completed; skipping");
                continue;
            }

            if self.cancel.is_cancelled() {
                return Ok(self.finish_cancelled(index, &step_name));
            }

            if !self.budget.permit(&step_name) {
                warn!(step = %step_name, "Budget gate denied step");
                self.audit
                    .step_failed(&step_name, "budget gate denied step");
                return Ok(RunOutcome::BudgetDenied { step_name });
            }

            self.audit.step_started(&step_name);
            let result = self.steps[index].execute(&self.state).await;

            // Thread recovery telemetry into the persisted state so a
            // recovered snapshot carries it too.
            if let Some(recovery) = result.metadata.get("recovery") {
                self.state
                    .metadata
                    .insert("recovery".to_string(), recovery.clone());
            }

            match result.status {
                StepStatus::Ok => {
                    if let Some(ref update) = result.data {
                        self.state.apply(update);
                    }
                    self.state.mark_step_completed(&step_name);
                    self.audit.step_finished(&step_name);
                    self.save_checkpoint(index, &step_name)?;
                }
                StepStatus::Cancelled => {
                    let reason = result
                        .cancel_reason
                        .unwrap_or_else(|| "shutdown requested".to_string());
                    self.audit.step_failed(&step_name, &reason);
                    self.best_effort_save(index, &step_name);
                    return Ok(RunOutcome::Cancelled { reason });
                }
                StepStatus::Fail => {
                    let error = result
                        .error
                        .unwrap_or_else(|| "unknown error".to_string());
                    self.audit.step_failed(&step_name, &error);
                    // Keep what we have; the failure itself is already
                    // dead-lettered by the orchestrator.
                    self.best_effort_save(index, &step_name);
                    return Ok(RunOutcome::Failed { step_name, error });
                }
            }
        }

        info!(run_id = %self.state.run_id, "Run completed");
        Ok(RunOutcome::Completed)
    }

    fn finish_cancelled(&mut self, index: usize, step_name: &str) -> RunOutcome {
        let reason = self
            .cancel
            .reason()
            .unwrap_or_else(|| "shutdown requested".to_string());
        self.best_effort_save(index, step_name);
        RunOutcome::Cancelled { reason }
    }

    fn save_checkpoint(&self, index: usize, step_name: &str) -> Result<()> {
        let id = checkpoint_id(index, step_name);
        self.store.save(&id, &self.state, index + 1, step_name)?;
        Ok(())
    }

    fn best_effort_save(&self, index: usize, step_name: &str) {
        if let Err(e) = self.save_checkpoint(index, step_name) {
            warn!(step = step_name, error = %e, "Best-effort checkpoint failed");
        }
    }
}

/// Zero-padded ids keep lexicographic order aligned with step order, so
/// timestamp ties resolve the right way.
fn checkpoint_id(index: usize, step_name: &str) -> String {
    format!("{:04}-{step_name}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_id_is_zero_padded() {
        assert_eq!(checkpoint_id(0, "plan"), "0001-plan");
        assert_eq!(checkpoint_id(11, "search"), "0012-search");
    }

    #[test]
    fn test_handle_shutdown_flags_the_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let driver = PipelineDriver::new(
            dir.path(),
            DriverConfig::default(),
            PipelineState::new("run-1", "q"),
        )
        .unwrap();

        let handle = driver.handle();
        assert_eq!(handle.run_id(), "run-1");
        assert!(!handle.is_shutdown());

        handle.shutdown("signal");
        assert!(handle.is_shutdown());
        assert!(driver.cancel.is_cancelled());
    }
}
