pub(crate) mod cleanup;
pub(crate) mod history;
pub(crate) mod run;

use std::sync::Arc;

use mongotune_core::{Settings, StorageType};
use mongotune_mongo::ConnectError;
use mongotune_storage::{FileRecordStore, ObjectRecordStore, RecordStore, StorageError};

/// Failures that end a subcommand with a non-zero exit status.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CommandError {
    #[error("record store: {0}")]
    Storage(#[from] StorageError),

    #[error("mongodb: {0}")]
    Connect(#[from] ConnectError),

    #[error("no database given (use --database, MONGO_DB or the config file)")]
    NoDatabase,

    #[error("no databases given (use --databases or the config file)")]
    NoDatabases,

    #[error("{failed} of {total} database optimizations failed")]
    Failures { failed: usize, total: usize },

    #[error("interrupted")]
    Interrupted,
}

/// Open the record store selected by `settings.storage_type`.
pub(crate) async fn open_store(settings: &Settings) -> Result<Arc<dyn RecordStore>, CommandError> {
    let store: Arc<dyn RecordStore> = match settings.storage_type {
        StorageType::File => Arc::new(FileRecordStore::open(&settings.storage_path).await?),
        StorageType::S3 => Arc::new(ObjectRecordStore::s3(&settings.s3).await?),
    };
    Ok(store)
}
