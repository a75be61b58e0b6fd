//! Apply / Validate / Rollback over a suggestion's operation list.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mongotune_core::{
    Category, ErrorKind, IndexOperation, OptimizationSuggestion, OptimizerError, RollbackOrder,
};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::command::{invert, CommandRunner};
use crate::executor::CommandExecutor;
use crate::improvement::{mean, relative_improvement};
use crate::probe::DiagnosticProbe;

// ──────────────────────────────────────────────
// ValidationResult
// ──────────────────────────────────────────────

/// Before/after figures for one matched metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub before: f64,
    pub after: f64,
    pub unit: Option<String>,
    pub threshold: Option<f64>,
    /// False when `before` was zero; such metrics are left out of the mean.
    pub reliable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub category: Category,
    pub success: bool,
    /// Mean percentage improvement over reliable matched metrics.
    pub improvement: f64,
    pub metrics: BTreeMap<String, MetricComparison>,
}

// ──────────────────────────────────────────────
// Optimizer
// ──────────────────────────────────────────────

/// Applies, validates and reverts suggestions against one server.
///
/// Implementations keep no per-suggestion state between calls.
#[async_trait]
pub trait Optimizer: Send + Sync {
    /// Apply every operation in list order, stopping at the first failure.
    /// The error's `progress` is the number of operations already applied.
    async fn apply(
        &self,
        database: &str,
        suggestion: &OptimizationSuggestion,
        token: &CancellationToken,
    ) -> Result<(), OptimizerError>;

    /// Measure the suggestion's validation steps against its problem metrics.
    async fn validate(
        &self,
        database: &str,
        suggestion: &OptimizationSuggestion,
        token: &CancellationToken,
    ) -> Result<ValidationResult, OptimizerError>;

    /// Undo every operation. The error's `progress` is the number of
    /// operations already reverted.
    async fn rollback(
        &self,
        database: &str,
        suggestion: &OptimizationSuggestion,
        token: &CancellationToken,
    ) -> Result<(), OptimizerError>;
}

fn not_implemented(database: &str, category: Category) -> OptimizerError {
    OptimizerError::new(
        ErrorKind::Unknown,
        format!("{} optimization not implemented", category),
    )
    .with_database(database)
}

/// The index-level optimizer.
pub struct IndexOptimizer {
    runner: CommandRunner,
    probe: Arc<dyn DiagnosticProbe>,
    rollback_order: RollbackOrder,
}

impl IndexOptimizer {
    pub fn new(executor: Arc<dyn CommandExecutor>, probe: Arc<dyn DiagnosticProbe>) -> Self {
        IndexOptimizer {
            runner: CommandRunner::new(executor),
            probe,
            rollback_order: RollbackOrder::default(),
        }
    }

    pub fn with_rollback_order(mut self, order: RollbackOrder) -> Self {
        self.rollback_order = order;
        self
    }

    pub fn rollback_order(&self) -> RollbackOrder {
        self.rollback_order
    }

    fn rollback_sequence<'a>(&self, ops: &'a [IndexOperation]) -> Vec<&'a IndexOperation> {
        match self.rollback_order {
            RollbackOrder::Reverse => ops.iter().rev().collect(),
            RollbackOrder::Forward => ops.iter().collect(),
        }
    }
}

/// Re-label a failure during rollback, keeping the diagnostics of the
/// operation that failed.
fn rollback_error(
    database: &str,
    err: OptimizerError,
    reverted: usize,
    total: usize,
) -> OptimizerError {
    if err.kind == ErrorKind::Cancelled {
        return err.with_progress(reverted);
    }
    let mut wrapped = OptimizerError::new(
        ErrorKind::Rollback,
        format!(
            "rollback failed after reverting {} of {} operations",
            reverted, total
        ),
    )
    .with_database(database)
    .with_progress(reverted);
    wrapped.collection = err.collection.clone();
    wrapped.command = err.command.clone();
    wrapped.with_source(err)
}

#[async_trait]
impl Optimizer for IndexOptimizer {
    async fn apply(
        &self,
        database: &str,
        suggestion: &OptimizationSuggestion,
        token: &CancellationToken,
    ) -> Result<(), OptimizerError> {
        log::info!(
            "applying optimization database={} category={} impact={} confidence={:.2} operations={}",
            database,
            suggestion.category,
            suggestion.impact,
            suggestion.confidence,
            suggestion.operations().len()
        );

        match suggestion.category {
            Category::Index | Category::Optimize => {}
            other => return Err(not_implemented(database, other)),
        }

        let kind = suggestion.category.error_kind();
        for (applied, op) in suggestion.operations().iter().enumerate() {
            if let Err(e) = self.runner.run_checked(database, op, kind, token).await {
                log::error!(
                    "failed to apply operation database={} action={} collection={} applied={} error={}",
                    database,
                    op.action,
                    op.collection,
                    applied,
                    e
                );
                return Err(e.with_progress(applied));
            }
        }

        log::info!(
            "applied optimization database={} category={}",
            database,
            suggestion.category
        );
        Ok(())
    }

    async fn validate(
        &self,
        database: &str,
        suggestion: &OptimizationSuggestion,
        token: &CancellationToken,
    ) -> Result<ValidationResult, OptimizerError> {
        let steps = suggestion.validation_steps()?;
        let mut metrics = BTreeMap::new();

        for step in &steps {
            token.check()?;
            let read = tokio::select! {
                r = self.probe.read(database, step) => r,
                _ = token.cancelled() => return Err(OptimizerError::cancelled().with_database(database)),
            };
            let reading = read.map_err(|e| {
                OptimizerError::validation(format!(
                    "validation step for '{}' failed",
                    step.metric_name
                ))
                .with_database(database)
                .with_command(serde_json::Value::Object(step.command.clone()).to_string())
                .with_source(e)
            })?;

            let Some(problem) = suggestion.problem_metric(&reading.metric_name) else {
                log::debug!(
                    "ignoring unmatched validation metric database={} metric={}",
                    database,
                    reading.metric_name
                );
                continue;
            };

            let pct = relative_improvement(problem.value, reading.value);
            if pct.is_none() {
                log::warn!(
                    "metric excluded from improvement database={} metric={} before={}",
                    database,
                    reading.metric_name,
                    problem.value
                );
            }
            // a repeated metric replaces the earlier reading
            metrics.insert(
                reading.metric_name.clone(),
                MetricComparison {
                    before: problem.value,
                    after: reading.value,
                    unit: problem.unit.clone().or(reading.unit),
                    threshold: problem.threshold,
                    reliable: pct.is_some(),
                },
            );
        }

        let improvements: Vec<f64> = metrics
            .values()
            .filter_map(|m: &MetricComparison| relative_improvement(m.before, m.after))
            .collect();
        let improvement = mean(&improvements);
        log::info!(
            "validated optimization database={} category={} improvement={:.2} matched={}",
            database,
            suggestion.category,
            improvement,
            metrics.len()
        );
        Ok(ValidationResult {
            category: suggestion.category,
            success: improvement > 0.0,
            improvement,
            metrics,
        })
    }

    async fn rollback(
        &self,
        database: &str,
        suggestion: &OptimizationSuggestion,
        token: &CancellationToken,
    ) -> Result<(), OptimizerError> {
        let ops = suggestion.operations();
        if ops.is_empty() {
            log::info!("nothing to roll back database={}", database);
            return Ok(());
        }
        match suggestion.category {
            Category::Index | Category::Optimize => {}
            other => return Err(not_implemented(database, other)),
        }

        log::warn!(
            "rolling back optimization database={} operations={} order={:?}",
            database,
            ops.len(),
            self.rollback_order
        );

        let total = ops.len();
        for (reverted, op) in self.rollback_sequence(ops).into_iter().enumerate() {
            let step = async {
                let inverse = invert(op)?;
                self.runner
                    .run_checked(database, &inverse, ErrorKind::Rollback, token)
                    .await
            };
            if let Err(e) = step.await {
                let err = rollback_error(database, e, reverted, total);
                log::error!("rollback aborted database={} error={}", database, err);
                return Err(err);
            }
        }

        log::info!("rolled back optimization database={} operations={}", database, total);
        Ok(())
    }
}
