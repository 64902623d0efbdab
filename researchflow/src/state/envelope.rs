//! The versioned state envelope.
//!
//! State is a tagged envelope: an explicit `schema_version` plus typed
//! fields, so migration operates over concrete cases rather than ad hoc
//! key-presence checks. All maps are `BTreeMap` and serialization goes
//! through [`PipelineState::canonical_bytes`], so identical logical state
//! always produces identical bytes (and therefore identical digests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The schema version written by this build.
///
/// Version history:
/// - 1: query, plan, search_results, summaries, report
/// - 2: added `sources` (scraped documents split out of search results)
/// - 3: added `completed_steps` and `metadata`
pub const SCHEMA_VERSION: u32 = 3;

fn default_schema_version() -> u32 {
    // Records written before the envelope carried a version tag.
    1
}

/// A single search hit recorded by the search step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Short snippet from the search provider.
    #[serde(default)]
    pub snippet: String,
}

/// A scraped source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// The URL the content was fetched from.
    pub url: String,
    /// Extracted text content.
    pub content: String,
    /// When the fetch happened.
    pub fetched_at: DateTime<Utc>,
}

/// The full state of one research run.
///
/// Immutable from the store's point of view: a save persists a snapshot,
/// and a new save creates a new record rather than patching one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Envelope schema version. Absent in pre-versioning records.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Unique id of this run; also scopes the checkpoint directory.
    pub run_id: String,
    /// The research question driving the run.
    pub query: String,
    /// Ordered sub-queries produced by the planning step.
    #[serde(default)]
    pub plan: Vec<String>,
    /// Accumulated search hits.
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
    /// Scraped documents (schema v2+).
    #[serde(default)]
    pub sources: Vec<SourceDocument>,
    /// Per-source summaries keyed by URL.
    #[serde(default)]
    pub summaries: BTreeMap<String, String>,
    /// The synthesized final report, once produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Names of steps that have completed (schema v3+).
    #[serde(default)]
    pub completed_steps: Vec<String>,
    /// Free-form metadata, including merged recovery telemetry (schema v3+).
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PipelineState {
    /// Creates a fresh state for a new run.
    #[must_use]
    pub fn new(run_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.into(),
            query: query.into(),
            plan: Vec::new(),
            search_results: Vec::new(),
            sources: Vec::new(),
            summaries: BTreeMap::new(),
            report: None,
            completed_steps: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Serializes the state to its canonical byte encoding.
    ///
    /// Struct fields serialize in declaration order and all maps are
    /// `BTreeMap`, so the encoding is deterministic for a given state.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Returns true if the named step has already completed.
    #[must_use]
    pub fn is_step_completed(&self, step_name: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step_name)
    }

    /// Records a step as completed. Idempotent.
    pub fn mark_step_completed(&mut self, step_name: impl Into<String>) {
        let name = step_name.into();
        if !self.completed_steps.contains(&name) {
            self.completed_steps.push(name);
        }
    }
}
