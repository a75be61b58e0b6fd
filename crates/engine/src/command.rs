//! Command Builder/Verifier: one [`IndexOperation`] in, one checked native
//! command executed.
//!
//! Each operation goes through the same four steps: pre-validate existence,
//! build the native command, execute it, post-verify existence. Failures at
//! each step map to a distinct [`ErrorKind`].

use std::sync::Arc;

use mongotune_core::{ErrorKind, IndexAction, IndexOperation, OptimizerError};

use crate::cancel::CancellationToken;
use crate::executor::{CommandExecutor, ExecutorError, NativeCommand};

/// Translate an operation into its native command.
pub fn build(op: &IndexOperation) -> Result<NativeCommand, OptimizerError> {
    op.validate()?;
    let name = op.resolved_name().ok_or_else(|| {
        OptimizerError::validation(format!(
            "{} on '{}' has no usable index name",
            op.action, op.collection
        ))
        .with_collection(&op.collection)
    })?;
    Ok(match op.action {
        IndexAction::CreateIndex => NativeCommand::CreateIndexes {
            collection: op.collection.clone(),
            name,
            keys: op.keys.clone(),
            options: op.options.clone(),
        },
        IndexAction::DropIndex => NativeCommand::DropIndexes {
            collection: op.collection.clone(),
            name,
        },
    })
}

/// The operation that undoes `op`.
///
/// createIndex inverts to a dropIndex of the resolved name. dropIndex
/// inverts to a createIndex rebuilt from the keys and options recorded on
/// the operation; a drop that recorded no keys cannot be inverted.
pub fn invert(op: &IndexOperation) -> Result<IndexOperation, OptimizerError> {
    let name = op.resolved_name().ok_or_else(|| {
        OptimizerError::new(
            ErrorKind::Rollback,
            format!("cannot invert {} on '{}': no index name", op.action, op.collection),
        )
        .with_collection(&op.collection)
    })?;
    match op.action {
        IndexAction::CreateIndex => Ok(IndexOperation::drop_index(&op.collection, name)),
        IndexAction::DropIndex => {
            if op.keys.is_empty() {
                return Err(OptimizerError::new(
                    ErrorKind::Rollback,
                    format!(
                        "cannot recreate dropped index '{}' on '{}': its keys were not recorded",
                        name, op.collection
                    ),
                )
                .with_collection(&op.collection));
            }
            let mut options = op.options.clone();
            options.name = Some(name.clone());
            Ok(IndexOperation::create_index(&op.collection, op.keys.clone())
                .named(name)
                .with_options(options))
        }
    }
}

fn executor_error(
    kind: ErrorKind,
    database: &str,
    message: String,
    err: ExecutorError,
) -> OptimizerError {
    let kind = match err {
        ExecutorError::Connection(_) => ErrorKind::Connection,
        ExecutorError::Command(_) => kind,
    };
    OptimizerError::new(kind, message)
        .with_database(database)
        .with_source(err)
}

/// Runs operations through pre-check, execute and post-verify against one
/// executor.
#[derive(Clone)]
pub struct CommandRunner {
    executor: Arc<dyn CommandExecutor>,
}

impl CommandRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        CommandRunner { executor }
    }

    async fn index_exists(
        &self,
        database: &str,
        collection: &str,
        name: &str,
        kind: ErrorKind,
    ) -> Result<bool, OptimizerError> {
        let names = self
            .executor
            .index_names(database, collection)
            .await
            .map_err(|e| {
                executor_error(
                    kind,
                    database,
                    format!("failed to list indexes on '{}'", collection),
                    e,
                )
                .with_collection(collection)
            })?;
        Ok(names.iter().any(|n| n == name))
    }

    /// Check that `op` can run against the current state of `database`.
    pub async fn pre_check(
        &self,
        database: &str,
        op: &IndexOperation,
        kind: ErrorKind,
    ) -> Result<NativeCommand, OptimizerError> {
        let command = build(op)?;
        let collection = command.collection();

        let exists = self
            .executor
            .collection_exists(database, collection)
            .await
            .map_err(|e| {
                executor_error(
                    kind,
                    database,
                    format!("failed to check collection '{}'", collection),
                    e,
                )
                .with_collection(collection)
            })?;
        if !exists {
            return Err(OptimizerError::validation(format!(
                "collection '{}' does not exist",
                collection
            ))
            .with_database(database)
            .with_collection(collection));
        }

        let present = self
            .index_exists(database, collection, command.index_name(), kind)
            .await?;
        match (&command, present) {
            (NativeCommand::CreateIndexes { name, .. }, true) => Err(OptimizerError::validation(
                format!("index '{}' already exists on '{}'", name, collection),
            )
            .with_database(database)
            .with_collection(collection)
            .with_command(command.to_string())),
            (NativeCommand::DropIndexes { name, .. }, false) => Err(OptimizerError::validation(
                format!("index '{}' does not exist on '{}'", name, collection),
            )
            .with_database(database)
            .with_collection(collection)
            .with_command(command.to_string())),
            _ => Ok(command),
        }
    }

    /// Execute a command that passed [`CommandRunner::pre_check`].
    pub async fn execute(
        &self,
        database: &str,
        command: &NativeCommand,
        kind: ErrorKind,
        token: &CancellationToken,
    ) -> Result<(), OptimizerError> {
        token.check()?;
        let result = tokio::select! {
            r = self.executor.run(database, command) => r,
            _ = token.cancelled() => return Err(OptimizerError::cancelled()
                .with_database(database)
                .with_command(command.to_string())),
        };
        result.map_err(|e| {
            let verb = match command {
                NativeCommand::CreateIndexes { .. } => "createIndexes",
                NativeCommand::DropIndexes { .. } => "dropIndexes",
            };
            executor_error(kind, database, format!("failed to execute {}", verb), e)
                .with_collection(command.collection())
                .with_command(command.to_string())
        })
    }

    /// Confirm the command's effect is visible.
    pub async fn post_verify(
        &self,
        database: &str,
        command: &NativeCommand,
        kind: ErrorKind,
    ) -> Result<(), OptimizerError> {
        let present = self
            .index_exists(database, command.collection(), command.index_name(), kind)
            .await?;
        let expected = matches!(command, NativeCommand::CreateIndexes { .. });
        if present != expected {
            let what = if expected {
                "was not created"
            } else {
                "is still present after drop"
            };
            return Err(OptimizerError::validation(format!(
                "verification failed: index '{}' on '{}' {}",
                command.index_name(),
                command.collection(),
                what
            ))
            .with_database(database)
            .with_collection(command.collection())
            .with_command(command.to_string()));
        }
        Ok(())
    }

    /// Pre-check, execute and post-verify one operation.
    pub async fn run_checked(
        &self,
        database: &str,
        op: &IndexOperation,
        kind: ErrorKind,
        token: &CancellationToken,
    ) -> Result<(), OptimizerError> {
        token.check()?;
        let command = self.pre_check(database, op, kind).await?;
        log::debug!("executing native command database={} command={}", database, command);
        self.execute(database, &command, kind, token).await?;
        self.post_verify(database, &command, kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongotune_core::{IndexKeys, IndexOptions};

    #[test]
    fn build_uses_resolved_name() {
        let op = IndexOperation::create_index("orders", IndexKeys::new().asc("a").desc("b"));
        let cmd = build(&op).unwrap();
        assert_eq!(cmd.index_name(), "a_1_b_-1");
    }

    #[test]
    fn build_rejects_blank_drop_name() {
        let op = IndexOperation::drop_index("orders", "");
        let err = build(&op).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn invert_create_drops_resolved_name() {
        let op = IndexOperation::create_index("orders", IndexKeys::new().asc("a")).with_options(
            IndexOptions {
                name: Some("by_a".into()),
                ..IndexOptions::default()
            },
        );
        let inv = invert(&op).unwrap();
        assert_eq!(inv.action, IndexAction::DropIndex);
        assert_eq!(inv.resolved_name().as_deref(), Some("by_a"));
    }

    #[test]
    fn invert_drop_rebuilds_from_recorded_keys() {
        let mut op = IndexOperation::drop_index("orders", "sku_1");
        op.keys = IndexKeys::new().asc("sku");
        op.options.unique = true;
        let inv = invert(&op).unwrap();
        assert_eq!(inv.action, IndexAction::CreateIndex);
        assert_eq!(inv.resolved_name().as_deref(), Some("sku_1"));
        assert!(inv.options.unique);
    }

    #[test]
    fn invert_drop_without_keys_is_rollback_error() {
        let op = IndexOperation::drop_index("orders", "sku_1");
        let err = invert(&op).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Rollback);
    }
}
