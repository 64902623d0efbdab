//! Step trait and implementations.
//!
//! Steps are the units of work in a research pipeline: plan, search,
//! scrape, summarize, synthesize. The crate never implements step logic
//! itself; callers supply it behind this trait and invoke it through
//! [`crate::recovery::RecoveryOrchestrator::wrap`].

use crate::state::{PipelineState, StepResult};
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline steps.
///
/// A step reads the current state and returns a [`StepResult`] carrying a
/// partial update. Steps must not assume they run exactly once: a crash or
/// retry can invoke them again with the same state.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Executes the step against a read view of the current state.
    async fn execute(&self, state: &PipelineState) -> StepResult;
}

/// A simple function-based step.
pub struct FnStep<F>
where
    F: Fn(&PipelineState) -> StepResult + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&PipelineState) -> StepResult + Send + Sync,
{
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&PipelineState) -> StepResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&PipelineState) -> StepResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, state: &PipelineState) -> StepResult {
        (self.func)(state)
    }
}

/// A no-op step for testing.
#[derive(Debug, Clone)]
pub struct NoOpStep {
    name: String,
}

impl NoOpStep {
    /// Creates a new no-op step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for NoOpStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _state: &PipelineState) -> StepResult {
        StepResult::ok_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StepUpdate;

    #[tokio::test]
    async fn test_fn_step() {
        let step = FnStep::new("plan", |_state| {
            StepResult::ok(StepUpdate::new().with_plan(vec!["q1".to_string()]))
        });

        assert_eq!(step.name(), "plan");

        let state = PipelineState::new("run-1", "q");
        let result = step.execute(&state).await;
        assert!(result.is_success());
        assert!(result.data.unwrap().plan.is_some());
    }

    #[tokio::test]
    async fn test_noop_step() {
        let step = NoOpStep::new("noop");
        let state = PipelineState::new("run-1", "q");
        assert!(step.execute(&state).await.is_success());
    }
}
