//! Run record store trait definition.

use thiserror::Error;
use tokio::sync::Mutex;

use reforge_types::record::RunRecord;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("run record storage error: {0}")]
    Storage(String),

    #[error("run record serialization error: {0}")]
    Serialization(String),
}

/// Storage for the latest run record.
pub trait RunRecordStore: Send + Sync {
    /// The last record written, if any.
    fn load(&self)
    -> impl std::future::Future<Output = Result<Option<RunRecord>, RecordError>> + Send;

    /// Replace the stored record.
    fn save(
        &self,
        record: &RunRecord,
    ) -> impl std::future::Future<Output = Result<(), RecordError>> + Send;
}

/// Keeps every saved record in memory; `load` returns the latest.
#[derive(Debug, Default)]
pub struct InMemoryRunRecordStore {
    records: Mutex<Vec<RunRecord>>,
}

impl InMemoryRunRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: RunRecord) -> Self {
        Self {
            records: Mutex::new(vec![record]),
        }
    }

    /// Every record saved so far, oldest first.
    pub async fn history(&self) -> Vec<RunRecord> {
        self.records.lock().await.clone()
    }
}

impl RunRecordStore for InMemoryRunRecordStore {
    async fn load(&self) -> Result<Option<RunRecord>, RecordError> {
        Ok(self.records.lock().await.last().cloned())
    }

    async fn save(&self, record: &RunRecord) -> Result<(), RecordError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
