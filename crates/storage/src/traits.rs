use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::OptimizationRecord;

/// Durable history of optimization attempts.
///
/// ## Ordering
///
/// `list`, `list_by_database` and `latest` order records by `timestamp`,
/// newest first. Records with equal timestamps have no defined order.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a single store can be
/// shared by every orchestrator worker behind an `Arc`.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Persist a record. Saving a record whose id already exists replaces it.
    async fn save(&self, record: OptimizationRecord) -> Result<(), StorageError>;

    /// Read a record by id.
    ///
    /// Returns `Err(StorageError::RecordNotFound)` if no such record exists.
    async fn get(&self, id: &str) -> Result<OptimizationRecord, StorageError>;

    /// All records across every database, newest first.
    async fn list(&self) -> Result<Vec<OptimizationRecord>, StorageError>;

    /// Records for one database, newest first. Unknown databases yield an
    /// empty list.
    async fn list_by_database(
        &self,
        database: &str,
    ) -> Result<Vec<OptimizationRecord>, StorageError>;

    /// The most recent record across every database.
    ///
    /// Returns `Err(StorageError::Empty)` if the store holds no records.
    async fn latest(&self) -> Result<OptimizationRecord, StorageError>;

    /// Delete every record strictly older than `cutoff`. Returns the number
    /// of records removed.
    async fn delete_older_than(&self, cutoff: OffsetDateTime) -> Result<usize, StorageError>;
}
