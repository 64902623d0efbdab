//! Step results and partial state updates.
//!
//! Steps never mutate the state they are given; they return a [`StepUpdate`]
//! that the driver merges into its owned state. [`StepResult`] mirrors the
//! shape of the update plus execution status and metadata, and is the only
//! thing a wrapped step ever returns.

use super::{SearchResult, SourceDocument};
use crate::state::PipelineState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The status of a step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step completed successfully.
    Ok,
    /// The step failed.
    Fail,
    /// The step was cancelled by a shutdown signal.
    Cancelled,
}

/// A partial update produced by one step.
///
/// Every field is additive: vectors extend, maps extend, and `report`
/// replaces only because there is exactly one report per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    /// New plan entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<String>>,
    /// New search hits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<SearchResult>>,
    /// Newly scraped documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceDocument>>,
    /// New per-source summaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<BTreeMap<String, String>>,
    /// The synthesized report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Metadata entries to merge into the state.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StepUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the plan entries.
    #[must_use]
    pub fn with_plan(mut self, plan: Vec<String>) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Sets the search results.
    #[must_use]
    pub fn with_search_results(mut self, results: Vec<SearchResult>) -> Self {
        self.search_results = Some(results);
        self
    }

    /// Sets the scraped sources.
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<SourceDocument>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Sets the report.
    #[must_use]
    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = Some(report.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl PipelineState {
    /// Merges a partial update into this state.
    ///
    /// Collections extend rather than replace, so re-running a step after a
    /// crash adds to what earlier attempts saved.
    pub fn apply(&mut self, update: &StepUpdate) {
        if let Some(ref plan) = update.plan {
            self.plan.extend(plan.iter().cloned());
        }
        if let Some(ref results) = update.search_results {
            self.search_results.extend(results.iter().cloned());
        }
        if let Some(ref sources) = update.sources {
            self.sources.extend(sources.iter().cloned());
        }
        if let Some(ref summaries) = update.summaries {
            self.summaries
                .extend(summaries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(ref report) = update.report {
            self.report = Some(report.clone());
        }
        self.metadata
            .extend(update.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// The outcome of one (possibly retried) step invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The execution status.
    pub status: StepStatus,

    /// The partial update to merge into the state, for successful runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StepUpdate>,

    /// Shared metadata; the orchestrator merges recovery telemetry here.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Error message, for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Cancel reason, for cancelled runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,

    /// Whether the failure is worth retrying.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,

    /// How many attempts the orchestrator consumed producing this result.
    #[serde(default)]
    pub attempts: u32,
}

impl StepResult {
    /// Creates a successful result carrying an update.
    #[must_use]
    pub fn ok(update: StepUpdate) -> Self {
        Self {
            status: StepStatus::Ok,
            data: Some(update),
            metadata: HashMap::new(),
            error: None,
            cancel_reason: None,
            retryable: false,
            attempts: 0,
        }
    }

    /// Creates a successful result with no update.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self {
            status: StepStatus::Ok,
            data: None,
            metadata: HashMap::new(),
            error: None,
            cancel_reason: None,
            retryable: false,
            attempts: 0,
        }
    }

    /// Creates a non-retryable failure result.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Fail,
            data: None,
            metadata: HashMap::new(),
            error: Some(error.into()),
            cancel_reason: None,
            retryable: false,
            attempts: 0,
        }
    }

    /// Creates a retryable failure result.
    #[must_use]
    pub fn fail_retryable(error: impl Into<String>) -> Self {
        let mut result = Self::fail(error);
        result.retryable = true;
        result
    }

    /// Creates a cancelled result.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Cancelled,
            data: None,
            metadata: HashMap::new(),
            error: None,
            cancel_reason: Some(reason.into()),
            retryable: false,
            attempts: 0,
        }
    }

    /// Returns true if the step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Ok
    }

    /// Returns true if the step was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == StepStatus::Cancelled
    }

    /// Merges a value into the metadata map under `key`.
    ///
    /// If both the existing and incoming values are JSON objects their keys
    /// are combined, with incoming keys winning; otherwise the incoming value
    /// replaces the old one. Other metadata keys are never touched.
    pub fn merge_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        let merged = match (self.metadata.remove(&key), value) {
            (
                Some(serde_json::Value::Object(mut existing)),
                serde_json::Value::Object(incoming),
            ) => {
                existing.extend(incoming);
                serde_json::Value::Object(existing)
            }
            (_, value) => value,
        };
        self.metadata.insert(key, merged);
    }
}
