//! Metric collection: the `MetricsProvider` seam and report assembly.

use async_trait::async_trait;
use mongotune_core::{CollectionStats, DatabaseStats, IndexStats, Report, ServerStats};

use crate::cancel::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to read {what}: {message}")]
    Read { what: String, message: String },
    #[error("metric collection cancelled")]
    Cancelled,
}

impl MetricsError {
    pub fn read(what: impl Into<String>, message: impl Into<String>) -> Self {
        MetricsError::Read {
            what: what.into(),
            message: message.into(),
        }
    }
}

/// Source of performance statistics for one server.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn server_stats(&self) -> Result<ServerStats, MetricsError>;

    async fn database_stats(&self, database: &str) -> Result<DatabaseStats, MetricsError>;

    async fn collection_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<CollectionStats, MetricsError>;

    async fn index_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<IndexStats>, MetricsError>;

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, MetricsError>;
}

/// Assemble a full report for `database`.
///
/// Any provider failure aborts the collection; partial reports are never
/// returned.
pub async fn collect_report(
    provider: &dyn MetricsProvider,
    database: &str,
    token: &CancellationToken,
) -> Result<Report, MetricsError> {
    let mut report = Report::new(database);

    let cancelled = |token: &CancellationToken| {
        if token.is_cancelled() {
            Err(MetricsError::Cancelled)
        } else {
            Ok(())
        }
    };

    cancelled(token)?;
    report.server = provider.server_stats().await?;
    report.database_stats = provider.database_stats(database).await?;

    let collections = provider.list_collections(database).await?;
    for collection in collections {
        cancelled(token)?;
        let stats = provider.collection_stats(database, &collection).await?;
        let indexes = provider.index_stats(database, &collection).await?;
        report.collections.insert(collection.clone(), stats);
        report.indexes.insert(collection, indexes);
    }

    log::debug!(
        "collected report database={} collections={}",
        database,
        report.collections.len()
    );
    Ok(report)
}
