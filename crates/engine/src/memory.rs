//! In-memory collaborators for tests and dry runs.
//!
//! [`InMemoryDatabase`] stands in for a server: it answers existence
//! queries, executes index commands against its own catalog, serves metrics
//! and probe readings, counts every call, and can be told to fail.
//! [`ScriptedSuggestionEngine`] returns canned suggestions.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mongotune_core::{
    CollectionStats, DatabaseStats, IndexStats, LatencyStats, OptimizationSuggestion, ServerStats,
    ValidationStep,
};
use tokio::sync::Mutex;

use crate::executor::{CommandExecutor, ExecutorError, NativeCommand};
use crate::metrics::{MetricsError, MetricsProvider};
use crate::probe::{DiagnosticProbe, ProbeError, ProbeReading};
use crate::suggest::{PromptContext, SuggestionEngine, SuggestionError};

/// The index every collection starts with.
pub const ID_INDEX: &str = "_id_";

// ──────────────────────────────────────────────
// InMemoryDatabase
// ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct Catalog {
    /// (database, collection) -> index names
    collections: BTreeMap<(String, String), BTreeSet<String>>,
    latency: LatencyStats,
    probe_values: HashMap<String, f64>,
    /// 1-based `run` call numbers that fail.
    failing_runs: HashSet<usize>,
    /// 1-based `run` call numbers that report success without effect.
    silent_runs: HashSet<usize>,
    failing_metrics: HashSet<String>,
}

/// Call counts observed by an [`InMemoryDatabase`].
#[derive(Debug, Default)]
pub struct CallCounts {
    runs: AtomicUsize,
    existence_checks: AtomicUsize,
    probe_reads: AtomicUsize,
    server_stats: AtomicUsize,
}

impl CallCounts {
    /// Native commands executed, successful or not.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// `collection_exists` and `index_names` calls.
    pub fn existence_checks(&self) -> usize {
        self.existence_checks.load(Ordering::SeqCst)
    }

    pub fn probe_reads(&self) -> usize {
        self.probe_reads.load(Ordering::SeqCst)
    }

    pub fn server_stats(&self) -> usize {
        self.server_stats.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    catalog: Mutex<Catalog>,
    calls: CallCounts,
    /// Commands executed successfully, in order.
    executed: Mutex<Vec<NativeCommand>>,
    delay: Option<Duration>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection with its `_id_` index.
    pub fn with_collection(mut self, database: &str, collection: &str) -> Self {
        self.catalog
            .get_mut()
            .collections
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .insert(ID_INDEX.to_string());
        self
    }

    /// Add an index, creating the collection if needed.
    pub fn with_index(mut self, database: &str, collection: &str, name: &str) -> Self {
        let indexes = self
            .catalog
            .get_mut()
            .collections
            .entry((database.to_string(), collection.to_string()))
            .or_default();
        indexes.insert(ID_INDEX.to_string());
        indexes.insert(name.to_string());
        self
    }

    pub fn with_latency(mut self, latency: LatencyStats) -> Self {
        self.catalog.get_mut().latency = latency;
        self
    }

    /// Value the probe reports for `metric`.
    pub fn with_probe_value(mut self, metric: &str, value: f64) -> Self {
        self.catalog
            .get_mut()
            .probe_values
            .insert(metric.to_string(), value);
        self
    }

    /// Sleep this long in every server-stats read, so concurrent workers
    /// overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the `n`th `run` call (1-based).
    pub fn fail_run(mut self, n: usize) -> Self {
        self.catalog.get_mut().failing_runs.insert(n);
        self
    }

    /// Make the `n`th `run` call (1-based) succeed without changing anything.
    pub fn silent_run(mut self, n: usize) -> Self {
        self.catalog.get_mut().silent_runs.insert(n);
        self
    }

    /// Fail every metrics read for `database`.
    pub fn fail_metrics_for(mut self, database: &str) -> Self {
        self.catalog
            .get_mut()
            .failing_metrics
            .insert(database.to_string());
        self
    }

    pub async fn set_latency(&self, latency: LatencyStats) {
        self.catalog.lock().await.latency = latency;
    }

    pub async fn set_probe_value(&self, metric: &str, value: f64) {
        self.catalog
            .lock()
            .await
            .probe_values
            .insert(metric.to_string(), value);
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    pub async fn executed(&self) -> Vec<NativeCommand> {
        self.executed.lock().await.clone()
    }

    pub async fn has_index(&self, database: &str, collection: &str, name: &str) -> bool {
        self.catalog
            .lock()
            .await
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .is_some_and(|idx| idx.contains(name))
    }

    async fn metrics_guard(&self, database: &str, what: &str) -> Result<(), MetricsError> {
        if self.catalog.lock().await.failing_metrics.contains(database) {
            return Err(MetricsError::read(what, format!("injected failure for {}", database)));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandExecutor for InMemoryDatabase {
    async fn collection_exists(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<bool, ExecutorError> {
        self.calls.existence_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .catalog
            .lock()
            .await
            .collections
            .contains_key(&(database.to_string(), collection.to_string())))
    }

    async fn index_names(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<String>, ExecutorError> {
        self.calls.existence_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .catalog
            .lock()
            .await
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .map(|idx| idx.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn run(&self, database: &str, command: &NativeCommand) -> Result<(), ExecutorError> {
        let n = self.calls.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let mut catalog = self.catalog.lock().await;
        if catalog.failing_runs.contains(&n) {
            return Err(ExecutorError::Command(format!("injected failure on call {}", n)));
        }
        if catalog.silent_runs.contains(&n) {
            return Ok(());
        }
        let key = (database.to_string(), command.collection().to_string());
        let indexes = catalog
            .collections
            .get_mut(&key)
            .ok_or_else(|| ExecutorError::Command(format!("ns not found: {}.{}", key.0, key.1)))?;
        match command {
            NativeCommand::CreateIndexes { name, .. } => {
                indexes.insert(name.clone());
            }
            NativeCommand::DropIndexes { name, .. } => {
                if !indexes.remove(name) {
                    return Err(ExecutorError::Command(format!("index not found with name [{}]", name)));
                }
            }
        }
        drop(catalog);
        self.executed.lock().await.push(command.clone());
        Ok(())
    }
}

#[async_trait]
impl MetricsProvider for InMemoryDatabase {
    async fn server_stats(&self) -> Result<ServerStats, MetricsError> {
        self.calls.server_stats.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ServerStats {
            host: "memory".to_string(),
            version: "in-memory".to_string(),
            latency: self.catalog.lock().await.latency.clone(),
            ..ServerStats::default()
        })
    }

    async fn database_stats(&self, database: &str) -> Result<DatabaseStats, MetricsError> {
        self.metrics_guard(database, "database stats").await?;
        let catalog = self.catalog.lock().await;
        let mut stats = DatabaseStats {
            name: database.to_string(),
            ..DatabaseStats::default()
        };
        for ((db, _), indexes) in &catalog.collections {
            if db == database {
                stats.collections += 1;
                stats.index_count += indexes.len() as i64;
            }
        }
        Ok(stats)
    }

    async fn collection_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<CollectionStats, MetricsError> {
        self.metrics_guard(database, "collection stats").await?;
        Ok(CollectionStats {
            name: collection.to_string(),
            ..CollectionStats::default()
        })
    }

    async fn index_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<Vec<IndexStats>, MetricsError> {
        self.metrics_guard(database, "index stats").await?;
        let names = self
            .catalog
            .lock()
            .await
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(names
            .into_iter()
            .map(|name| IndexStats {
                name,
                ..IndexStats::default()
            })
            .collect())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, MetricsError> {
        self.metrics_guard(database, "collections").await?;
        Ok(self
            .catalog
            .lock()
            .await
            .collections
            .keys()
            .filter(|(db, _)| db == database)
            .map(|(_, coll)| coll.clone())
            .collect())
    }
}

#[async_trait]
impl DiagnosticProbe for InMemoryDatabase {
    async fn read(
        &self,
        _database: &str,
        step: &ValidationStep,
    ) -> Result<ProbeReading, ProbeError> {
        self.calls.probe_reads.fetch_add(1, Ordering::SeqCst);
        let value = self
            .catalog
            .lock()
            .await
            .probe_values
            .get(&step.metric_name)
            .copied()
            .ok_or_else(|| ProbeError::Command(format!("no reading for '{}'", step.metric_name)))?;
        Ok(ProbeReading {
            metric_name: step.metric_name.clone(),
            value,
            unit: None,
        })
    }
}

// ──────────────────────────────────────────────
// ScriptedSuggestionEngine
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Script {
    Answer(OptimizationSuggestion),
    Fail(String),
    Panic,
}

/// Answers initial and follow-up requests with fixed suggestions, optionally
/// overridden per database.
#[derive(Debug)]
pub struct ScriptedSuggestionEngine {
    initial: OptimizationSuggestion,
    follow_up: OptimizationSuggestion,
    overrides: HashMap<String, Script>,
    requests: AtomicUsize,
    follow_ups: AtomicUsize,
}

impl ScriptedSuggestionEngine {
    pub fn new(initial: OptimizationSuggestion, follow_up: OptimizationSuggestion) -> Self {
        ScriptedSuggestionEngine {
            initial,
            follow_up,
            overrides: HashMap::new(),
            requests: AtomicUsize::new(0),
            follow_ups: AtomicUsize::new(0),
        }
    }

    /// Answer initial requests for `database` with `suggestion`.
    pub fn with_initial_for(mut self, database: &str, suggestion: OptimizationSuggestion) -> Self {
        self.overrides
            .insert(database.to_string(), Script::Answer(suggestion));
        self
    }

    /// Fail every request for `database`.
    pub fn failing_for(mut self, database: &str, message: &str) -> Self {
        self.overrides
            .insert(database.to_string(), Script::Fail(message.to_string()));
        self
    }

    /// Panic on every request for `database`.
    pub fn panicking_for(mut self, database: &str) -> Self {
        self.overrides.insert(database.to_string(), Script::Panic);
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn follow_ups(&self) -> usize {
        self.follow_ups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SuggestionEngine for ScriptedSuggestionEngine {
    async fn generate(
        &self,
        context: &PromptContext,
    ) -> Result<OptimizationSuggestion, SuggestionError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let follow_up = context.is_follow_up();
        if follow_up {
            self.follow_ups.fetch_add(1, Ordering::SeqCst);
        }
        match self.overrides.get(&context.database) {
            Some(Script::Fail(message)) => Err(SuggestionError::Request(message.clone())),
            Some(Script::Panic) => panic!("scripted panic for {}", context.database),
            Some(Script::Answer(s)) if !follow_up => Ok(s.clone()),
            _ if follow_up => Ok(self.follow_up.clone()),
            _ => Ok(self.initial.clone()),
        }
    }
}
