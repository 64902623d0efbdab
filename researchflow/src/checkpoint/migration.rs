//! Additive schema migration for checkpoint payloads.
//!
//! Every payload is a versioned envelope; a missing `schema_version` tag
//! marks the oldest known layout. Upgrades run one version at a time over
//! the raw JSON value before typed deserialization, and only ever add
//! default-filled fields. Nothing is renamed, reinterpreted, or removed.

use crate::state::SCHEMA_VERSION;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Migrates a raw payload value to the current schema version.
///
/// Non-object payloads are returned untouched; typed deserialization will
/// reject them with the real error.
#[must_use]
pub fn migrate(value: Value) -> Value {
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => return other,
    };

    let mut version = obj
        .get("schema_version")
        .and_then(Value::as_u64)
        .map_or(1, |v| u32::try_from(v).unwrap_or(1));

    while version < SCHEMA_VERSION {
        match version {
            1 => upgrade_v1_to_v2(&mut obj),
            2 => upgrade_v2_to_v3(&mut obj),
            _ => break,
        }
        version += 1;
        debug!(schema_version = version, "Migrated checkpoint payload");
    }

    obj.insert("schema_version".to_string(), json!(version));
    Value::Object(obj)
}

/// v2 split scraped documents out of search results into `sources`.
fn upgrade_v1_to_v2(obj: &mut Map<String, Value>) {
    obj.entry("sources").or_insert_with(|| json!([]));
}

/// v3 added the completed-step ledger and free-form metadata.
fn upgrade_v2_to_v3(obj: &mut Map<String, Value>) {
    obj.entry("completed_steps").or_insert_with(|| json!([]));
    obj.entry("metadata").or_insert_with(|| json!({}));
}
