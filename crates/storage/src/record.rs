use std::sync::Arc;

use mongotune_core::{OptimizationSuggestion, Report};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The outcome of one optimization attempt against one database.
///
/// Reports are shared with the history that produced them; the store takes
/// ownership of the record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub database_name: String,
    pub before_report: Option<Arc<Report>>,
    pub after_report: Option<Arc<Report>>,
    pub suggestion: Option<OptimizationSuggestion>,
    pub applied: bool,
    pub success: bool,
    #[serde(rename = "improvement_pct")]
    pub improvement: f64,
    pub rollback_required: bool,
    pub rollback_success: bool,
}

impl OptimizationRecord {
    /// A fresh record with a random id and the current time.
    pub fn new(database_name: impl Into<String>) -> Self {
        OptimizationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: OffsetDateTime::now_utc(),
            database_name: database_name.into(),
            before_report: None,
            after_report: None,
            suggestion: None,
            applied: false,
            success: false,
            improvement: 0.0,
            rollback_required: false,
            rollback_success: false,
        }
    }

    pub fn with_reports(mut self, before: Option<Arc<Report>>, after: Option<Arc<Report>>) -> Self {
        self.before_report = before;
        self.after_report = after;
        self
    }

    pub fn with_suggestion(mut self, suggestion: OptimizationSuggestion) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    /// One-line summary used by the `history` command and log output.
    pub fn summary(&self) -> String {
        let ts = self
            .timestamp
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| self.timestamp.unix_timestamp().to_string());
        let category = self
            .suggestion
            .as_ref()
            .map(|s| s.category.as_str())
            .unwrap_or("-");
        format!(
            "{} {} db={} category={} applied={} success={} improvement={:.2}% rollback={}",
            ts,
            self.id,
            self.database_name,
            category,
            self.applied,
            self.success,
            self.improvement,
            if self.rollback_required {
                if self.rollback_success {
                    "ok"
                } else {
                    "failed"
                }
            } else {
                "-"
            }
        )
    }
}
