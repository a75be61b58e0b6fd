//! Action Policy: turn a measured improvement into keep / alert / revert /
//! extend, and carry the decision out.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mongotune_core::{Category, OptimizationSuggestion};
use mongotune_storage::{OptimizationRecord, RecordStore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

use crate::cancel::CancellationToken;
use crate::history::History;
use crate::measurement::calculate_improvement;
use crate::optimizer::Optimizer;

/// Default minimum improvement percentage, below which an alert is raised.
pub const DEFAULT_THRESHOLD: f64 = 5.0;

// ──────────────────────────────────────────────
// ActionType
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    None,
    Alert,
    Rollback,
    Optimize,
    /// An action name this policy does not recognise, kept verbatim.
    Unknown(String),
}

impl ActionType {
    /// Parse an action name. Unrecognised names become `Unknown(raw)`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => ActionType::None,
            "alert" => ActionType::Alert,
            "rollback" => ActionType::Rollback,
            "optimize" => ActionType::Optimize,
            _ => ActionType::Unknown(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionType::None => "none",
            ActionType::Alert => "alert",
            ActionType::Rollback => "rollback",
            ActionType::Optimize => "optimize",
            ActionType::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ActionType::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(rename = "type")]
    pub action: ActionType,
    pub success: bool,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

// ──────────────────────────────────────────────
// AlertSink
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("alert delivery failed: {0}")]
pub struct AlertError(pub String);

/// Where below-threshold alerts are delivered.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, database: &str, message: &str) -> Result<(), AlertError>;
}

// ──────────────────────────────────────────────
// ActionPolicy
// ──────────────────────────────────────────────

/// Read the reassessed improvement from a suggestion's problem metrics: the
/// first metric whose name mentions "improvement" or "performance".
pub fn improvement_from_suggestion(suggestion: &OptimizationSuggestion) -> Option<f64> {
    suggestion
        .problem
        .metrics
        .iter()
        .find(|m| {
            let name = m.name.to_ascii_lowercase();
            name.contains("improvement") || name.contains("performance")
        })
        .map(|m| m.value)
        .filter(|v| v.is_finite())
}

pub struct ActionPolicy {
    threshold: f64,
    optimizer: Option<Arc<dyn Optimizer>>,
    store: Option<Arc<dyn RecordStore>>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        ActionPolicy::new(DEFAULT_THRESHOLD)
    }
}

impl ActionPolicy {
    pub fn new(threshold: f64) -> Self {
        ActionPolicy {
            threshold,
            optimizer: None,
            store: None,
            alerts: None,
        }
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn Optimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Map an improvement to an action. The checks run in a fixed order:
    /// regression, below threshold, extension request, otherwise keep.
    pub fn decide(&self, suggestion: &OptimizationSuggestion, improvement: f64) -> ActionType {
        if improvement < 0.0 {
            ActionType::Rollback
        } else if improvement < self.threshold {
            ActionType::Alert
        } else if suggestion.category == Category::Optimize {
            ActionType::Optimize
        } else {
            ActionType::None
        }
    }

    /// Derive the improvement for a reassessed suggestion, then decide and
    /// execute.
    ///
    /// The suggestion's own improvement metric wins; without one, the
    /// history's before and after reports are differenced.
    pub async fn process(
        &self,
        history: &History,
        suggestion: &OptimizationSuggestion,
        token: &CancellationToken,
    ) -> ActionResult {
        let improvement = improvement_from_suggestion(suggestion).unwrap_or_else(|| {
            match (history.before_report(), history.after_report()) {
                (Some(before), Some(after)) => calculate_improvement(before, after),
                _ => 0.0,
            }
        });
        log::info!(
            "processing measurement database={} category={} confidence={:.2} improvement={:.2}",
            history.database_name(),
            suggestion.category,
            suggestion.confidence,
            improvement
        );
        let action = self.decide(suggestion, improvement);
        self.execute(history, action, suggestion, improvement, token)
            .await
    }

    /// Carry out `action` and, if a store is configured, record the outcome.
    ///
    /// Rollback reverts the latest optimization in `history` (falling back
    /// to `suggestion` when the history is empty); Optimize applies
    /// `suggestion`.
    pub async fn execute(
        &self,
        history: &History,
        action: ActionType,
        suggestion: &OptimizationSuggestion,
        improvement: f64,
        token: &CancellationToken,
    ) -> ActionResult {
        let database = history.database_name();
        let (action, success, description) = match action {
            ActionType::None => {
                log::info!(
                    "no further action required database={} improvement={:.2} category={}",
                    database,
                    improvement,
                    suggestion.category
                );
                (ActionType::None, true, "No action required".to_string())
            }
            ActionType::Alert => {
                let message = format!(
                    "Optimization improvement of {:.2}% below threshold of {:.2}%",
                    improvement, self.threshold
                );
                log::warn!(
                    "improvement below threshold database={} improvement={:.2} threshold={:.2} category={}",
                    database,
                    improvement,
                    self.threshold,
                    suggestion.category
                );
                if let Some(sink) = &self.alerts {
                    if let Err(e) = sink.send(database, &message).await {
                        log::error!("failed to deliver alert database={} error={}", database, e);
                    }
                }
                (ActionType::Alert, true, format!("Alert sent: {}", message))
            }
            ActionType::Rollback => match &self.optimizer {
                Some(optimizer) => {
                    log::warn!(
                        "performing rollback due to degradation database={} improvement={:.2}",
                        database,
                        improvement
                    );
                    let target = history.latest_optimization().unwrap_or(suggestion);
                    match optimizer.rollback(database, target, token).await {
                        Ok(()) => (
                            ActionType::Rollback,
                            true,
                            format!(
                                "Rollback completed successfully due to performance degradation of {:.2}%",
                                improvement
                            ),
                        ),
                        Err(e) => {
                            log::error!("rollback failed database={} error={}", database, e);
                            (ActionType::Rollback, false, format!("Rollback failed: {}", e))
                        }
                    }
                }
                None => {
                    log::error!("cannot roll back without an optimizer database={}", database);
                    (
                        ActionType::Rollback,
                        false,
                        "Rollback required but optimizer not available".to_string(),
                    )
                }
            },
            ActionType::Optimize => match &self.optimizer {
                Some(optimizer) => {
                    log::info!(
                        "applying additional optimization database={} category={}",
                        database,
                        suggestion.category
                    );
                    match optimizer.apply(database, suggestion, token).await {
                        Ok(()) => (
                            ActionType::Optimize,
                            true,
                            "Additional optimization applied successfully".to_string(),
                        ),
                        Err(e) => {
                            log::error!(
                                "additional optimization failed database={} error={}",
                                database,
                                e
                            );
                            (
                                ActionType::Optimize,
                                false,
                                format!("Additional optimization failed: {}", e),
                            )
                        }
                    }
                }
                None => {
                    log::error!("cannot optimize without an optimizer database={}", database);
                    (
                        ActionType::Optimize,
                        false,
                        "Additional optimization required but optimizer not available".to_string(),
                    )
                }
            },
            ActionType::Unknown(raw) => {
                log::error!("unknown action type database={} action={}", database, raw);
                (
                    ActionType::Unknown(raw.clone()),
                    false,
                    format!("Unknown action type: {}", raw),
                )
            }
        };

        if let Some(store) = &self.store {
            let rollback = action == ActionType::Rollback;
            let mut record = OptimizationRecord::new(database)
                .with_reports(history.before_report().cloned(), history.after_report().cloned())
                .with_suggestion(suggestion.clone());
            record.applied = true;
            record.success = success;
            record.improvement = improvement;
            record.rollback_required = rollback;
            record.rollback_success = rollback && success;
            if let Err(e) = store.save(record).await {
                log::error!("failed to save optimization record database={} error={}", database, e);
            }
        }

        ActionResult {
            action,
            success,
            description,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}
