//! Error types for the researchflow recovery layer.
//!
//! The taxonomy separates durable-storage failures (which a recovery scan
//! handles locally) from control signals like cancellation (which always
//! propagate and are never retried or dead-lettered).

use thiserror::Error;

/// The main error type for researchflow operations.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// An I/O failure while writing or scanning checkpoint files.
    #[error("Checkpoint store I/O error: {0}")]
    Store(#[from] std::io::Error),

    /// A load was attempted for a checkpoint id that does not exist.
    #[error("Checkpoint not found: {id}")]
    NotFound {
        /// The missing checkpoint id.
        id: String,
    },

    /// A stored payload no longer matches its recorded digest.
    #[error("Checkpoint '{id}' failed integrity check: expected digest {expected}, got {actual}")]
    Corruption {
        /// The corrupt checkpoint id.
        id: String,
        /// The digest recorded in the sidecar.
        expected: String,
        /// The digest recomputed from the payload on disk.
        actual: String,
    },

    /// State could not be serialized or deserialized.
    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A checkpoint sidecar exists but its contents are not parseable.
    #[error("Checkpoint '{id}' has an unreadable sidecar: {reason}")]
    InvalidSidecar {
        /// The checkpoint id.
        id: String,
        /// Why the sidecar could not be used.
        reason: String,
    },

    /// A cooperative shutdown was requested.
    ///
    /// Cancellation always propagates immediately: it consumes no retry
    /// attempts and is never recorded as a dead letter.
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
}

impl RecoveryError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a corruption error.
    #[must_use]
    pub fn corruption(
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Corruption {
            id: id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Returns true if this error is a cancellation signal.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RecoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_message_names_both_digests() {
        let err = RecoveryError::corruption("0001-search", "abc", "def");
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("def"));
        assert!(msg.contains("0001-search"));
    }

    #[test]
    fn test_cancellation_detection() {
        assert!(RecoveryError::cancelled("shutdown").is_cancellation());
        assert!(!RecoveryError::not_found("x").is_cancellation());
    }

    #[test]
    fn test_io_error_converts_to_store() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: RecoveryError = io.into();
        assert!(matches!(err, RecoveryError::Store(_)));
    }
}
