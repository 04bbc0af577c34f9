//! JSON run record store.

use std::path::{Path, PathBuf};

use reforge_core::repository::{RecordError, RunRecordStore};
use reforge_types::record::RunRecord;

use crate::fs::write_atomic;

/// Keeps the latest run record as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonRunRecordStore {
    path: PathBuf,
}

impl JsonRunRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunRecordStore for JsonRunRecordStore {
    async fn load(&self) -> Result<Option<RunRecord>, RecordError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(RecordError::Storage(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )));
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                // An unreadable record only disables resume.
                tracing::warn!("Ignoring malformed run record {}: {err}", self.path.display());
                Ok(None)
            }
        }
    }

    async fn save(&self, record: &RunRecord) -> Result<(), RecordError> {
        let mut bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| RecordError::Serialization(e.to_string()))?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes).await.map_err(|e| {
            RecordError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })?;
        tracing::debug!(
            step_id = %record.step_id,
            decision = %record.decision,
            "run record written to {}",
            self.path.display()
        );
        Ok(())
    }
}
