use std::fmt;

use serde::{Deserialize, Serialize};

/// The taxonomy of failures the optimization lifecycle can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Connection,
    Index,
    Query,
    Schema,
    Config,
    Validation,
    Rollback,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Index => "index",
            ErrorKind::Query => "query",
            ErrorKind::Schema => "schema",
            ErrorKind::Config => "config",
            ErrorKind::Validation => "validation",
            ErrorKind::Rollback => "rollback",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error raised while applying, validating or rolling back a suggestion.
///
/// Carries optional diagnostic context: the database and collection the
/// failing step targeted, and the rendered native command that failed.
/// `progress` counts the operations that had already completed (applied or
/// reverted) when the error occurred, so partial application and partial
/// rollback can be told apart from a failure on the first operation.
#[derive(Debug, thiserror::Error)]
#[error("{kind} error: {message}{}", source_suffix(.source))]
pub struct OptimizerError {
    pub kind: ErrorKind,
    pub message: String,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub command: Option<String>,
    pub progress: usize,
    #[source]
    pub source: Option<BoxedSource>,
}

fn source_suffix(source: &Option<BoxedSource>) -> String {
    match source {
        Some(e) => format!(" - {}", e),
        None => String::new(),
    }
}

impl OptimizerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        OptimizerError {
            kind,
            message: message.into(),
            database: None,
            collection: None,
            command: None,
            progress: 0,
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        OptimizerError::new(ErrorKind::Validation, message)
    }

    pub fn cancelled() -> Self {
        OptimizerError::new(ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_progress(mut self, progress: usize) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Whether a caller may reasonably try the same call again.
    ///
    /// Unknown or unimplemented categories, validation failures and
    /// cancellations are terminal. Execution failures against the server
    /// may be transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Connection | ErrorKind::Index | ErrorKind::Rollback
        )
    }

    /// A rollback that reverted some, but not all, operations.
    pub fn is_partial_rollback(&self) -> bool {
        self.kind == ErrorKind::Rollback && self.progress > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_message_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = OptimizerError::new(ErrorKind::Index, "failed to execute createIndexes")
            .with_source(io);
        assert_eq!(
            err.to_string(),
            "index error: failed to execute createIndexes - socket closed"
        );
    }

    #[test]
    fn display_without_source() {
        let err = OptimizerError::validation("collection 'users' does not exist");
        assert_eq!(
            err.to_string(),
            "validation error: collection 'users' does not exist"
        );
    }

    #[test]
    fn context_builders_attach_diagnostics() {
        let err = OptimizerError::new(ErrorKind::Rollback, "drop failed")
            .with_database("shop")
            .with_collection("orders")
            .with_command("{\"dropIndexes\":\"orders\",\"index\":\"a_1\"}")
            .with_progress(2);
        assert_eq!(err.database.as_deref(), Some("shop"));
        assert_eq!(err.collection.as_deref(), Some("orders"));
        assert!(err.command.as_deref().unwrap().contains("dropIndexes"));
        assert!(err.is_partial_rollback());
    }

    #[test]
    fn terminal_kinds_are_not_retryable() {
        assert!(!OptimizerError::new(ErrorKind::Unknown, "not implemented").is_retryable());
        assert!(!OptimizerError::validation("bad").is_retryable());
        assert!(!OptimizerError::cancelled().is_retryable());
        assert!(OptimizerError::new(ErrorKind::Index, "timeout").is_retryable());
    }

    #[test]
    fn rollback_failing_first_operation_is_not_partial() {
        let err = OptimizerError::new(ErrorKind::Rollback, "drop failed");
        assert!(!err.is_partial_rollback());
    }
}
