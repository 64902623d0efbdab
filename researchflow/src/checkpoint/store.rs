//! The checkpoint store: durable save/load with integrity verification,
//! rotation, and quarantine.

use super::migration::migrate;
use super::record::{content_digest, CheckpointMetadata};
use crate::errors::{RecoveryError, Result};
use crate::state::PipelineState;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Records below this retention count are never rotated away, so a verified
/// fallback survives even if the newest record is corrupt.
pub const MIN_RETENTION: usize = 2;

/// Sidecar file extension.
const META_SUFFIX: &str = ".meta";

/// Subdirectory for records that failed integrity verification.
const QUARANTINE_DIR: &str = "quarantine";

/// Configuration for a checkpoint store.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointConfig {
    /// How many records to keep; floored at [`MIN_RETENTION`].
    pub retention: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { retention: 5 }
    }
}

impl CheckpointConfig {
    /// Creates a config with the given retention.
    #[must_use]
    pub fn with_retention(retention: usize) -> Self {
        Self { retention }
    }

    /// The retention actually applied, never below [`MIN_RETENTION`].
    #[must_use]
    pub fn effective_retention(&self) -> usize {
        self.retention.max(MIN_RETENTION)
    }
}

/// Durable, content-checksummed persistence of pipeline state.
///
/// The store exclusively owns all files under its run directory. It provides
/// no cross-process locking: one active writer per run directory is enforced
/// by run-id scoping, not by the store.
#[derive(Debug)]
pub struct CheckpointStore {
    root: PathBuf,
    config: CheckpointConfig,
}

impl CheckpointStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>, config: CheckpointConfig) -> Result<Self> {
        let root = dir.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, config })
    }

    /// Returns the run directory this store owns.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists a snapshot of `state` under `id`.
    ///
    /// The payload and its sidecar are each written via write-temp,
    /// flush-to-device, atomic-rename, so a crash mid-save never exposes a
    /// partial file under a final name. Rotation runs after a successful
    /// save.
    pub fn save(
        &self,
        id: &str,
        state: &PipelineState,
        step_index: usize,
        step_name: &str,
    ) -> Result<CheckpointMetadata> {
        validate_id(id)?;

        let payload = state.canonical_bytes()?;
        let metadata = CheckpointMetadata {
            id: id.to_string(),
            digest: content_digest(&payload),
            size: payload.len() as u64,
            step_index,
            step_name: step_name.to_string(),
            created_at: Utc::now(),
            schema_version: state.schema_version,
        };
        let sidecar = serde_json::to_vec_pretty(&metadata)?;

        self.write_atomic(&self.payload_path(id), &payload)?;
        self.write_atomic(&self.sidecar_path(id), &sidecar)?;

        info!(
            id,
            step = step_name,
            size = metadata.size,
            "Saved checkpoint"
        );

        self.rotate()?;
        Ok(metadata)
    }

    /// Loads and verifies the checkpoint stored under `id`.
    ///
    /// If a sidecar exists its digest is recomputed and compared, surfacing
    /// [`RecoveryError::Corruption`] on mismatch. Schema migration is applied
    /// before the state is returned.
    pub fn load(&self, id: &str) -> Result<PipelineState> {
        let payload_path = self.payload_path(id);
        if !payload_path.exists() {
            return Err(RecoveryError::not_found(id));
        }
        let payload = fs::read(&payload_path)?;

        let sidecar_path = self.sidecar_path(id);
        if sidecar_path.exists() {
            let metadata = self.read_sidecar(id, &sidecar_path)?;
            let actual = content_digest(&payload);
            if actual != metadata.digest {
                return Err(RecoveryError::corruption(id, metadata.digest, actual));
            }
        }

        let raw: serde_json::Value = serde_json::from_slice(&payload)?;
        let state: PipelineState = serde_json::from_value(migrate(raw))?;
        Ok(state)
    }

    /// Returns the id of the most recently created record, if any.
    ///
    /// "Most recent" is decided by the sidecar's creation timestamp, with
    /// ties broken toward the greater id. File mtime is never consulted.
    #[must_use]
    pub fn latest(&self) -> Option<String> {
        self.list_checkpoints().into_iter().next().map(|m| m.id)
    }

    /// Lists checkpoint metadata, newest first.
    ///
    /// Unreadable sidecars are skipped with a warning rather than failing
    /// the whole listing.
    #[must_use]
    pub fn list_checkpoints(&self) -> Vec<CheckpointMetadata> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.root.display(), error = %e, "Failed to read checkpoint directory");
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(id) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };
            match self.read_sidecar(id, &path) {
                Ok(metadata) => records.push(metadata),
                Err(e) => {
                    warn!(id, error = %e, "Skipping unreadable checkpoint sidecar");
                }
            }
        }

        records.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        records
    }

    /// Scans newest-first for a loadable checkpoint.
    ///
    /// Records failing integrity are moved into `quarantine/` and the scan
    /// continues with the next older record. Returns `None` only if every
    /// record is corrupt or none exist.
    pub fn recover_checkpoint(&self) -> Result<Option<PipelineState>> {
        for metadata in self.list_checkpoints() {
            match self.load(&metadata.id) {
                Ok(state) => {
                    info!(id = %metadata.id, "Recovered checkpoint");
                    return Ok(Some(state));
                }
                Err(
                    err @ (RecoveryError::Corruption { .. }
                    | RecoveryError::Serialization(_)
                    | RecoveryError::NotFound { .. }
                    | RecoveryError::InvalidSidecar { .. }),
                ) => {
                    warn!(id = %metadata.id, error = %err, "Quarantining corrupt checkpoint");
                    self.quarantine(&metadata.id)?;
                }
                Err(RecoveryError::Store(e)) => {
                    warn!(id = %metadata.id, error = %e, "Skipping unreadable checkpoint");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Removes the record stored under `id`, payload and sidecar both.
    pub fn delete(&self, id: &str) -> Result<()> {
        remove_if_exists(&self.payload_path(id))?;
        remove_if_exists(&self.sidecar_path(id))?;
        Ok(())
    }

    /// Moves a record into the quarantine subdirectory.
    fn quarantine(&self, id: &str) -> Result<()> {
        let quarantine = self.root.join(QUARANTINE_DIR);
        fs::create_dir_all(&quarantine)?;

        for path in [self.payload_path(id), self.sidecar_path(id)] {
            if path.exists() {
                if let Some(name) = path.file_name() {
                    fs::rename(&path, quarantine.join(name))?;
                }
            }
        }
        Ok(())
    }

    /// Deletes records beyond the effective retention count, oldest first.
    fn rotate(&self) -> Result<()> {
        let retention = self.config.effective_retention();
        let records = self.list_checkpoints();
        for metadata in records.iter().skip(retention) {
            debug!(id = %metadata.id, "Rotating out old checkpoint");
            self.delete(&metadata.id)?;
        }
        Ok(())
    }

    fn read_sidecar(&self, id: &str, path: &Path) -> Result<CheckpointMetadata> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| RecoveryError::InvalidSidecar {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Writes `bytes` to `path` crash-safely.
    ///
    /// Each write targets a distinct uuid-suffixed temp name before the
    /// rename, so two saves under the same id are last-write-wins with no
    /// observable interleaving.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("checkpoint");
        let tmp_path = self
            .root
            .join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result.map_err(RecoveryError::from)
    }

    fn payload_path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn sidecar_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{META_SUFFIX}"))
    }
}

/// Rejects ids that would escape the run directory or collide with the
/// store's own file naming.
fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.ends_with(META_SUFFIX)
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RecoveryError::Store(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid checkpoint id: {id:?}"),
        )))
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
