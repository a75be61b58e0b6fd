//! The seam between the lifecycle engine and the database.
//!
//! The engine never talks to a driver directly. It builds [`NativeCommand`]
//! values and hands them to a [`CommandExecutor`], which also answers the
//! existence questions the pre- and post-checks need.

use std::fmt;

use async_trait::async_trait;
use mongotune_core::{IndexKeys, IndexOptions};

// ──────────────────────────────────────────────
// NativeCommand
// ──────────────────────────────────────────────

/// A database administrative command, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCommand {
    CreateIndexes {
        collection: String,
        name: String,
        keys: IndexKeys,
        options: IndexOptions,
    },
    DropIndexes {
        collection: String,
        name: String,
    },
}

impl NativeCommand {
    pub fn collection(&self) -> &str {
        match self {
            NativeCommand::CreateIndexes { collection, .. }
            | NativeCommand::DropIndexes { collection, .. } => collection,
        }
    }

    /// The index this command creates or drops.
    pub fn index_name(&self) -> &str {
        match self {
            NativeCommand::CreateIndexes { name, .. } | NativeCommand::DropIndexes { name, .. } => {
                name
            }
        }
    }

    /// The command document in the server's wire shape.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            NativeCommand::CreateIndexes {
                collection,
                name,
                keys,
                options,
            } => {
                let mut index = serde_json::Map::new();
                index.insert(
                    "key".to_string(),
                    serde_json::to_value(keys).unwrap_or(serde_json::Value::Null),
                );
                index.insert("name".to_string(), serde_json::Value::from(name.as_str()));
                if options.unique {
                    index.insert("unique".to_string(), serde_json::Value::Bool(true));
                }
                if options.sparse {
                    index.insert("sparse".to_string(), serde_json::Value::Bool(true));
                }
                if let Some(secs) = options.expire_after_seconds {
                    index.insert("expireAfterSeconds".to_string(), serde_json::Value::from(secs));
                }
                serde_json::json!({
                    "createIndexes": collection,
                    "indexes": [serde_json::Value::Object(index)],
                })
            }
            NativeCommand::DropIndexes { collection, name } => serde_json::json!({
                "dropIndexes": collection,
                "index": name,
            }),
        }
    }
}

impl fmt::Display for NativeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// ──────────────────────────────────────────────
// ExecutorError
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The server could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The server rejected or failed the command.
    #[error("command failed: {0}")]
    Command(String),
}

// ──────────────────────────────────────────────
// CommandExecutor
// ──────────────────────────────────────────────

/// Runs native commands against a named database.
///
/// Implementations must be shareable across the orchestrator's workers.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn collection_exists(&self, database: &str, collection: &str)
        -> Result<bool, ExecutorError>;

    /// Names of every index on `collection`.
    async fn index_names(&self, database: &str, collection: &str)
        -> Result<Vec<String>, ExecutorError>;

    async fn run(&self, database: &str, command: &NativeCommand) -> Result<(), ExecutorError>;
}
