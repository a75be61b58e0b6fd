//! Runs the optimization cycle for many databases with bounded parallelism.
//!
//! Each database gets its own tokio task. A semaphore of `max_parallel`
//! permits is acquired inside the task, so at most that many cycles are in
//! flight at once; the rest wait for admission. Failures, including panics,
//! stay inside their own outcome.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mongotune_core::{OptimizerError, Settings};
use mongotune_storage::{OptimizationRecord, RecordStore};
use tokio::sync::Semaphore;

use crate::cancel::CancellationToken;
use crate::history::History;
use crate::measurement::{Measurement, MeasurementError};
use crate::metrics::{collect_report, MetricsError, MetricsProvider};
use crate::optimizer::Optimizer;
use crate::policy::{ActionPolicy, ActionType, AlertSink};
use crate::suggest::{PromptContext, SuggestionEngine, SuggestionError};

// ──────────────────────────────────────────────
// Errors and outcomes
// ──────────────────────────────────────────────

/// Why one database's cycle did not complete.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("failed to collect metrics: {0}")]
    Metrics(#[from] MetricsError),
    #[error("failed to get optimization suggestion: {0}")]
    Suggestion(#[from] SuggestionError),
    #[error("failed to apply optimization: {0}")]
    Apply(#[source] OptimizerError),
    #[error("optimization failed and rollback failed: {apply} (rollback: {rollback})")]
    CompoundFailure {
        #[source]
        apply: OptimizerError,
        rollback: OptimizerError,
    },
    #[error("optimization failed but rolled back successfully: {0}")]
    RolledBack(#[source] OptimizerError),
    #[error("failed to measure optimization: {0}")]
    Measurement(#[from] MeasurementError),
    #[error("failed to validate optimization: {0}")]
    Validation(#[source] OptimizerError),
    #[error("{action} action failed: {description}")]
    Action {
        action: ActionType,
        description: String,
    },
    #[error("cycle cancelled")]
    Cancelled,
    #[error("worker panicked: {0}")]
    Panicked(String),
}

#[derive(Debug)]
pub struct DatabaseOutcome {
    pub database_name: String,
    pub success: bool,
    pub error: Option<CycleError>,
    /// Validated improvement percentage; 0 when the cycle did not get that far.
    pub improvement: f64,
    pub duration: Duration,
}

/// Every outcome of one orchestration run, in no particular order.
#[derive(Debug, Default)]
pub struct OrchestrationReport {
    pub outcomes: Vec<DatabaseOutcome>,
    pub duration: Duration,
}

impl OrchestrationReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failures(&self) -> usize {
        self.total() - self.successes()
    }

    pub fn outcome(&self, database: &str) -> Option<&DatabaseOutcome> {
        self.outcomes.iter().find(|o| o.database_name == database)
    }

    /// Human-readable comparative summary, one line per database sorted by
    /// name.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Optimization summary: {} databases, {} succeeded, {} failed ({:.1}s)",
            self.total(),
            self.successes(),
            self.failures(),
            self.duration.as_secs_f64()
        );
        let mut sorted: Vec<&DatabaseOutcome> = self.outcomes.iter().collect();
        sorted.sort_by(|a, b| a.database_name.cmp(&b.database_name));
        for o in sorted {
            match &o.error {
                None => {
                    let _ = writeln!(
                        out,
                        "  {:<24} ok      improvement={:>7.2}%  duration={:.1}s",
                        o.database_name,
                        o.improvement,
                        o.duration.as_secs_f64()
                    );
                }
                Some(e) => {
                    let _ = writeln!(
                        out,
                        "  {:<24} FAILED  {}  duration={:.1}s",
                        o.database_name,
                        e,
                        o.duration.as_secs_f64()
                    );
                }
            }
        }
        out
    }
}

// ──────────────────────────────────────────────
// Admission
// ──────────────────────────────────────────────

/// Notified when a worker passes the admission gate and when it leaves.
pub trait AdmissionObserver: Send + Sync {
    fn admitted(&self, database: &str);
    fn released(&self, database: &str);
}

/// Counts active workers and remembers the peak.
#[derive(Debug, Default)]
pub struct ActiveWorkers {
    active: AtomicUsize,
    peak: AtomicUsize,
    admitted: AtomicUsize,
}

impl ActiveWorkers {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Workers admitted so far.
    pub fn total_admitted(&self) -> usize {
        self.admitted.load(Ordering::SeqCst)
    }
}

impl AdmissionObserver for ActiveWorkers {
    fn admitted(&self, _database: &str) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.admitted.fetch_add(1, Ordering::SeqCst);
    }

    fn released(&self, _database: &str) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reports release on drop, so panicking workers are released too.
struct Admission<'a> {
    observer: Option<&'a dyn AdmissionObserver>,
    database: &'a str,
}

impl<'a> Admission<'a> {
    fn enter(observer: Option<&'a dyn AdmissionObserver>, database: &'a str) -> Self {
        if let Some(o) = observer {
            o.admitted(database);
        }
        Admission { observer, database }
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if let Some(o) = self.observer {
            o.released(self.database);
        }
    }
}

/// Split a comma-separated database list. A quote (single or double) opening
/// a field protects commas up to its closing quote; a quote anywhere else is
/// part of the name. Names are trimmed, unquoted and de-duplicated in
/// first-seen order.
pub fn parse_database_list(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in raw.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') if current.trim().is_empty() => quote = Some(c),
            (None, ',') => parts.push(std::mem::take(&mut current)),
            (None, c) => current.push(c),
        }
    }
    parts.push(current);

    let mut seen = HashSet::new();
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

// ──────────────────────────────────────────────
// Orchestrator
// ──────────────────────────────────────────────

#[derive(Clone)]
struct Worker {
    metrics: Arc<dyn MetricsProvider>,
    engine: Arc<dyn SuggestionEngine>,
    optimizer: Arc<dyn Optimizer>,
    store: Arc<dyn RecordStore>,
    policy: Arc<ActionPolicy>,
    observer: Option<Arc<dyn AdmissionObserver>>,
    enable_rollback: bool,
    compare_only: bool,
}

pub struct Orchestrator {
    metrics: Arc<dyn MetricsProvider>,
    engine: Arc<dyn SuggestionEngine>,
    optimizer: Arc<dyn Optimizer>,
    store: Arc<dyn RecordStore>,
    alerts: Option<Arc<dyn AlertSink>>,
    observer: Option<Arc<dyn AdmissionObserver>>,
    max_parallel: usize,
    enable_rollback: bool,
    compare_only: bool,
    threshold: f64,
}

impl Orchestrator {
    pub fn new(
        settings: &Settings,
        metrics: Arc<dyn MetricsProvider>,
        engine: Arc<dyn SuggestionEngine>,
        optimizer: Arc<dyn Optimizer>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Orchestrator {
            metrics,
            engine,
            optimizer,
            store,
            alerts: None,
            observer: None,
            max_parallel: settings.max_parallel.max(1),
            enable_rollback: settings.enable_rollback,
            compare_only: settings.compare_only,
            threshold: settings.improvement_threshold,
        }
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    pub fn with_admission_observer(mut self, observer: Arc<dyn AdmissionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    fn worker(&self) -> Worker {
        let mut policy = ActionPolicy::new(self.threshold)
            .with_optimizer(self.optimizer.clone())
            .with_store(self.store.clone());
        if let Some(sink) = &self.alerts {
            policy = policy.with_alert_sink(sink.clone());
        }
        Worker {
            metrics: self.metrics.clone(),
            engine: self.engine.clone(),
            optimizer: self.optimizer.clone(),
            store: self.store.clone(),
            policy: Arc::new(policy),
            observer: self.observer.clone(),
            enable_rollback: self.enable_rollback,
            compare_only: self.compare_only,
        }
    }

    /// Run one cycle per database and wait for all of them.
    pub async fn run(&self, databases: &[String], token: &CancellationToken) -> OrchestrationReport {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let worker = self.worker();

        log::info!(
            "starting optimization run databases={} max_parallel={} compare_only={}",
            databases.len(),
            self.max_parallel,
            self.compare_only
        );

        let mut handles = Vec::with_capacity(databases.len());
        for database in databases {
            let worker = worker.clone();
            let semaphore = semaphore.clone();
            let token = token.clone();
            let name = database.clone();
            let spawned = Instant::now();
            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    p = semaphore.acquire_owned() => p.ok(),
                    _ = token.cancelled() => None,
                };
                let Some(_permit) = permit else {
                    return (Err(CycleError::Cancelled), Duration::ZERO);
                };
                let _admission = Admission::enter(worker.observer.as_deref(), &name);
                let begun = Instant::now();
                let result = worker.cycle(&name, &token).await;
                (result, begun.elapsed())
            });
            handles.push((database.clone(), spawned, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (database_name, spawned, handle) in handles {
            let outcome = match handle.await {
                Ok((Ok(improvement), duration)) => DatabaseOutcome {
                    database_name,
                    success: true,
                    error: None,
                    improvement,
                    duration,
                },
                Ok((Err(e), duration)) => DatabaseOutcome {
                    database_name,
                    success: false,
                    error: Some(e),
                    improvement: 0.0,
                    duration,
                },
                Err(join) => {
                    let message = if join.is_panic() {
                        let payload = join.into_panic();
                        payload
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string())
                    } else {
                        join.to_string()
                    };
                    DatabaseOutcome {
                        database_name,
                        success: false,
                        error: Some(CycleError::Panicked(message)),
                        improvement: 0.0,
                        duration: spawned.elapsed(),
                    }
                }
            };
            match &outcome.error {
                None => log::info!(
                    "database optimization finished database={} improvement={:.2} duration_ms={}",
                    outcome.database_name,
                    outcome.improvement,
                    outcome.duration.as_millis()
                ),
                Some(e) => log::error!(
                    "database optimization failed database={} error={} duration_ms={}",
                    outcome.database_name,
                    e,
                    outcome.duration.as_millis()
                ),
            }
            outcomes.push(outcome);
        }

        let report = OrchestrationReport {
            outcomes,
            duration: started.elapsed(),
        };
        log::info!(
            "optimization run complete total={} successes={} failures={} duration_ms={}",
            report.total(),
            report.successes(),
            report.failures(),
            report.duration.as_millis()
        );
        report
    }
}

impl Worker {
    /// One observe → suggest → apply → measure → validate cycle.
    async fn cycle(&self, database: &str, token: &CancellationToken) -> Result<f64, CycleError> {
        log::info!("starting optimization cycle database={}", database);
        let before = Arc::new(collect_report(self.metrics.as_ref(), database, token).await?);

        if self.compare_only {
            let record = OptimizationRecord::new(database).with_reports(Some(before), None);
            if let Err(e) = self.store.save(record).await {
                log::error!("failed to save comparison record database={} error={}", database, e);
            }
            log::info!("compare-only run recorded database={}", database);
            return Ok(0.0);
        }

        let mut history = History::new(database).with_before_report(before.clone());

        let context = PromptContext::initial(database, before);
        let generated = tokio::select! {
            r = self.engine.generate(&context) => r,
            _ = token.cancelled() => return Err(CycleError::Cancelled),
        };
        let suggestion = generated?;
        history.add_optimization(suggestion.clone());

        if let Err(apply) = self.optimizer.apply(database, &suggestion, token).await {
            if !self.enable_rollback {
                return Err(CycleError::Apply(apply));
            }
            log::warn!(
                "apply failed, rolling back database={} applied={} error={}",
                database,
                apply.progress,
                apply
            );
            // only the operations that were applied are reverted
            let mut applied = suggestion.clone();
            applied.solution.operations.truncate(apply.progress);
            return match self.optimizer.rollback(database, &applied, token).await {
                Ok(()) => Err(CycleError::RolledBack(apply)),
                Err(rollback) => Err(CycleError::CompoundFailure { apply, rollback }),
            };
        }

        let after = collect_report(self.metrics.as_ref(), database, token).await?;
        history.set_after_report(Arc::new(after));

        let measurement = Measurement::new(self.engine.clone())
            .with_store(self.store.clone())
            .with_policy(self.policy.clone());
        let outcome = measurement.measure_and_store(&mut history, token).await?;
        if let Some(result) = outcome.action.filter(|r| !r.success) {
            return Err(CycleError::Action {
                action: result.action,
                description: result.description,
            });
        }

        let validation = self
            .optimizer
            .validate(database, &suggestion, token)
            .await
            .map_err(CycleError::Validation)?;
        Ok(validation.improvement)
    }
}
