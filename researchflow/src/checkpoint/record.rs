//! Checkpoint record metadata and content digests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sidecar summary of one checkpoint record.
///
/// Carries everything listing and integrity checks need without reading the
/// payload itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Checkpoint id, unique within the run directory.
    pub id: String,
    /// Hex-encoded SHA-256 digest of the payload bytes.
    pub digest: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Index of the step that produced this checkpoint.
    pub step_index: usize,
    /// Name of the step that produced this checkpoint.
    pub step_name: String,
    /// When the record was created. This timestamp, not file mtime, is the
    /// ordering rule for "newest"; ties break toward the greater id.
    pub created_at: DateTime<Utc>,
    /// Schema version of the payload envelope.
    pub schema_version: u32,
}

impl CheckpointMetadata {
    /// The sort key used everywhere a "newest first" ordering is needed.
    #[must_use]
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// Computes the hex-encoded SHA-256 digest of a payload.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(content_digest(b"abc"), content_digest(b"abc"));
        assert_ne!(content_digest(b"abc"), content_digest(b"abd"));
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let digest = content_digest(b"");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
