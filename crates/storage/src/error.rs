/// All errors that can be returned by a RecordStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No record with the given id.
    #[error("optimization record not found: {id}")]
    RecordNotFound { id: String },

    /// `latest` was called on an empty store.
    #[error("no optimization records found")]
    Empty,

    /// The record carries a database name that cannot be used as a storage key.
    #[error("invalid database name for storage: '{0}'")]
    InvalidDatabaseName(String),

    /// Reading or writing the backing files failed.
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A backend-specific storage error.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
