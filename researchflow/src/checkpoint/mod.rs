//! Crash-safe checkpoint persistence.
//!
//! The store owns a run-scoped directory holding two files per record: the
//! `{id}` payload and an `{id}.meta` sidecar summarizing it. Writes go
//! through write-temp, flush-to-device, atomic-rename, so a crash mid-write
//! never exposes a partial file under a final name. Records that fail
//! integrity verification are moved to a `quarantine/` subdirectory rather
//! than deleted.

mod migration;
mod record;
mod store;

pub use migration::migrate;
pub use record::{content_digest, CheckpointMetadata};
pub use store::{CheckpointConfig, CheckpointStore, MIN_RETENTION};
