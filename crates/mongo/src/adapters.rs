//! Engine collaborators backed by the MongoDB driver.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::error::ErrorKind as DriverErrorKind;
use mongotune_core::{CollectionStats, DatabaseStats, IndexStats, ServerStats, ValidationStep};
use mongotune_engine::{
    extract_number, CommandExecutor, DiagnosticProbe, ExecutorError, MetricsError,
    MetricsProvider, NativeCommand, ProbeError, ProbeReading,
};

use crate::connection::MongoConnection;
use crate::convert;

fn is_connection_failure(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        DriverErrorKind::ServerSelection { .. }
            | DriverErrorKind::Io(_)
            | DriverErrorKind::ConnectionPoolCleared { .. }
    )
}

fn executor_error(e: mongodb::error::Error) -> ExecutorError {
    if is_connection_failure(&e) {
        ExecutorError::Connection(e.to_string())
    } else {
        ExecutorError::Command(e.to_string())
    }
}

// ──────────────────────────────────────────────
// Command executor
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MongoCommandExecutor {
    connection: MongoConnection,
}

impl MongoCommandExecutor {
    pub fn new(connection: MongoConnection) -> Self {
        MongoCommandExecutor { connection }
    }
}

#[async_trait]
impl CommandExecutor for MongoCommandExecutor {
    async fn collection_exists(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<bool, ExecutorError> {
        let names = self
            .connection
            .database(database)
            .list_collection_names()
            .filter(doc! { "name": collection })
            .await
            .map_err(executor_error)?;
        Ok(!names.is_empty())
    }

    async fn index_names(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<String>, ExecutorError> {
        self.connection
            .database(database)
            .collection::<Document>(collection)
            .list_index_names()
            .await
            .map_err(executor_error)
    }

    async fn run(&self, database: &str, command: &NativeCommand) -> Result<(), ExecutorError> {
        let document = convert::to_document(&command.to_json())
            .map_err(|e| ExecutorError::Command(format!("cannot encode command: {}", e)))?;
        log::debug!("running command database={} command={}", database, command);
        self.connection
            .database(database)
            .run_command(document)
            .await
            .map_err(executor_error)?;
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Metrics provider
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MongoMetricsProvider {
    connection: MongoConnection,
}

impl MongoMetricsProvider {
    pub fn new(connection: MongoConnection) -> Self {
        MongoMetricsProvider { connection }
    }

    async fn command(
        &self,
        database: &str,
        what: &str,
        command: Document,
    ) -> Result<serde_json::Value, MetricsError> {
        self.connection
            .database(database)
            .run_command(command)
            .await
            .map(convert::to_json)
            .map_err(|e| MetricsError::read(what, e.to_string()))
    }
}

#[async_trait]
impl MetricsProvider for MongoMetricsProvider {
    async fn server_stats(&self) -> Result<ServerStats, MetricsError> {
        let status = self
            .command("admin", "server status", doc! { "serverStatus": 1 })
            .await?;
        Ok(convert::server_stats(&status))
    }

    async fn database_stats(&self, database: &str) -> Result<DatabaseStats, MetricsError> {
        let stats = self
            .command(database, "database stats", doc! { "dbStats": 1 })
            .await?;
        Ok(convert::database_stats(database, &stats))
    }

    async fn collection_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<CollectionStats, MetricsError> {
        let stats = self
            .command(database, "collection stats", doc! { "collStats": collection })
            .await?;
        Ok(convert::collection_stats(collection, &stats))
    }

    async fn index_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<IndexStats>, MetricsError> {
        let read_error = |e: mongodb::error::Error| MetricsError::read("index stats", e.to_string());
        let mut cursor = self
            .connection
            .database(database)
            .collection::<Document>(collection)
            .aggregate(vec![doc! { "$indexStats": {} }])
            .await
            .map_err(read_error)?;
        let mut stats = Vec::new();
        while cursor.advance().await.map_err(read_error)? {
            let entry = cursor.deserialize_current().map_err(read_error)?;
            stats.push(convert::index_stats(&convert::to_json(entry)));
        }
        Ok(stats)
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, MetricsError> {
        let mut names = self
            .connection
            .database(database)
            .list_collection_names()
            .await
            .map_err(|e| MetricsError::read("collections", e.to_string()))?;
        names.retain(|n| !n.starts_with("system."));
        names.sort();
        Ok(names)
    }
}

// ──────────────────────────────────────────────
// Diagnostic probe
// ──────────────────────────────────────────────

/// Runs a validation step's command against the target database.
#[derive(Debug, Clone)]
pub struct MongoProbe {
    connection: MongoConnection,
}

impl MongoProbe {
    pub fn new(connection: MongoConnection) -> Self {
        MongoProbe { connection }
    }
}

#[async_trait]
impl DiagnosticProbe for MongoProbe {
    async fn read(
        &self,
        database: &str,
        step: &ValidationStep,
    ) -> Result<ProbeReading, ProbeError> {
        let command = convert::to_document(&serde_json::Value::Object(step.command.clone()))
            .map_err(|e| ProbeError::Command(format!("cannot encode command: {}", e)))?;
        let response = self
            .connection
            .database(database)
            .run_command(command)
            .await
            .map_err(|e| ProbeError::Command(e.to_string()))?;
        let value = extract_number(&convert::to_json(response), &step.extract)?;
        log::debug!(
            "probe reading database={} metric={} value={}",
            database,
            step.metric_name,
            value
        );
        Ok(ProbeReading {
            metric_name: step.metric_name.clone(),
            value,
            unit: None,
        })
    }
}
