use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::OptimizationRecord;
use crate::traits::RecordStore;

/// A `RecordStore` that keeps records in process memory.
///
/// Used by tests and by `--compare-only` dry runs where nothing should be
/// written to disk.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, OptimizationRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn newest_first(records: &mut [OptimizationRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(&self, record: OptimizationRecord) -> Result<(), StorageError> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<OptimizationRecord, StorageError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::RecordNotFound { id: id.to_string() })
    }

    async fn list(&self) -> Result<Vec<OptimizationRecord>, StorageError> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn list_by_database(
        &self,
        database: &str,
    ) -> Result<Vec<OptimizationRecord>, StorageError> {
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.database_name == database)
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn latest(&self) -> Result<OptimizationRecord, StorageError> {
        self.records
            .read()
            .await
            .values()
            .max_by_key(|r| r.timestamp)
            .cloned()
            .ok_or(StorageError::Empty)
    }

    async fn delete_older_than(&self, cutoff: OffsetDateTime) -> Result<usize, StorageError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.timestamp >= cutoff);
        Ok(before - records.len())
    }
}
