//! Follow-up assessment of an applied suggestion.

use std::sync::Arc;

use mongotune_core::{OptimizationSuggestion, Report};
use mongotune_storage::{OptimizationRecord, RecordStore};

use crate::cancel::CancellationToken;
use crate::history::History;
use crate::improvement::{mean, relative_improvement};
use crate::policy::{ActionPolicy, ActionResult};
use crate::suggest::{PromptContext, SuggestionEngine, SuggestionError};

#[derive(Debug, thiserror::Error)]
pub enum MeasurementError {
    #[error("before report is required")]
    MissingBeforeReport,
    #[error("after report is required")]
    MissingAfterReport,
    #[error("no optimization found in history")]
    NoOptimization,
    #[error("measurement cancelled")]
    Cancelled,
    #[error("failed to reassess optimization: {0}")]
    Suggestion(#[from] SuggestionError),
}

/// Mean percentage improvement per operation class.
///
/// The baseline is the before report's lifetime average; the comparison is
/// the average of only the operations that ran between the two reports.
/// Classes without a non-zero baseline or without operations in the window
/// are skipped. 0 when nothing is comparable.
pub fn calculate_improvement(before: &Report, after: &Report) -> f64 {
    let window = after.window_metrics(before);
    let deltas: Vec<f64> = before
        .key_metrics()
        .into_iter()
        .filter_map(|(name, b)| relative_improvement(b, *window.get(name)?))
        .collect();
    mean(&deltas)
}

/// The reassessed suggestion and, when a policy is attached, what it did.
#[derive(Debug, Clone)]
pub struct MeasurementOutcome {
    pub suggestion: OptimizationSuggestion,
    pub action: Option<ActionResult>,
}

pub struct Measurement {
    engine: Arc<dyn SuggestionEngine>,
    store: Option<Arc<dyn RecordStore>>,
    policy: Option<Arc<ActionPolicy>>,
}

impl Measurement {
    pub fn new(engine: Arc<dyn SuggestionEngine>) -> Self {
        Measurement {
            engine,
            store: None,
            policy: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_policy(mut self, policy: Arc<ActionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Ask the suggestion engine to reassess the latest optimization against
    /// both reports, record the preliminary result, and hand the response to
    /// the action policy.
    pub async fn measure(
        &self,
        history: &History,
        token: &CancellationToken,
    ) -> Result<MeasurementOutcome, MeasurementError> {
        let before = history
            .before_report()
            .ok_or(MeasurementError::MissingBeforeReport)?;
        let after = history
            .after_report()
            .ok_or(MeasurementError::MissingAfterReport)?;
        let latest = history
            .latest_optimization()
            .ok_or(MeasurementError::NoOptimization)?;
        let database = history.database_name();

        let context =
            PromptContext::follow_up(database, latest.clone(), before.clone(), after.clone());
        let generated = tokio::select! {
            r = self.engine.generate(&context) => r,
            _ = token.cancelled() => return Err(MeasurementError::Cancelled),
        };
        let suggestion = generated?;

        log::info!(
            "reassessed optimization database={} category={} impact={} confidence={:.2}",
            database,
            suggestion.category,
            suggestion.impact,
            suggestion.confidence
        );

        if let Some(store) = &self.store {
            let mut record = OptimizationRecord::new(database)
                .with_reports(Some(before.clone()), Some(after.clone()))
                .with_suggestion(suggestion.clone());
            record.applied = true;
            record.success = true;
            if let Err(e) = store.save(record).await {
                log::error!("failed to save measurement record database={} error={}", database, e);
            }
        }

        let action = match &self.policy {
            Some(policy) => {
                let result = policy.process(history, &suggestion, token).await;
                if !result.success {
                    log::error!(
                        "action failed database={} action={} description={}",
                        database,
                        result.action,
                        result.description
                    );
                }
                Some(result)
            }
            None => None,
        };

        Ok(MeasurementOutcome { suggestion, action })
    }

    /// Like [`measure`](Self::measure), then append the reassessed
    /// suggestion to `history`.
    pub async fn measure_and_store(
        &self,
        history: &mut History,
        token: &CancellationToken,
    ) -> Result<MeasurementOutcome, MeasurementError> {
        let outcome = self.measure(history, token).await?;
        history.add_optimization(outcome.suggestion.clone());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mongotune_core::OpLatency;

    /// Counters as (total latency, ops) pairs for reads and writes.
    fn report(reads: (f64, f64), writes: (f64, f64)) -> Report {
        let mut r = Report::new("shop");
        r.server.latency.reads = OpLatency::new(reads.0, reads.1);
        r.server.latency.writes = OpLatency::new(writes.0, writes.1);
        r
    }

    #[test]
    fn window_average_is_compared_with_the_before_average() {
        // 1000 reads at 1000us, then 100 more at 10us each
        let before = report((1_000_000.0, 1000.0), (0.0, 0.0));
        let after = report((1_001_000.0, 1100.0), (0.0, 0.0));
        assert!((calculate_improvement(&before, &after) - 99.0).abs() < 1e-9);
    }

    #[test]
    fn improvement_is_mean_over_shared_classes() {
        let before = report((200_000.0, 1000.0), (100_000.0, 1000.0));
        // reads window 100us (+50%), writes window 150us (-50%)
        let after = report((210_000.0, 1100.0), (115_000.0, 1100.0));
        assert_eq!(calculate_improvement(&before, &after), 0.0);

        // writes window 50us (+50%)
        let after = report((210_000.0, 1100.0), (105_000.0, 1100.0));
        assert_eq!(calculate_improvement(&before, &after), 50.0);
    }

    #[test]
    fn classes_missing_on_either_side_are_ignored() {
        // no writes before; reads window 150us
        let before = report((200_000.0, 1000.0), (0.0, 0.0));
        let after = report((215_000.0, 1100.0), (8_000.0, 100.0));
        assert_eq!(calculate_improvement(&before, &after), 25.0);

        // no reads in the window
        let after = report((200_000.0, 1000.0), (8_000.0, 100.0));
        assert_eq!(calculate_improvement(&before, &after), 0.0);
    }

    #[test]
    fn no_comparable_metrics_is_zero() {
        assert_eq!(calculate_improvement(&Report::new("a"), &Report::new("a")), 0.0);
    }
}
