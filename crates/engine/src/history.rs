use std::sync::Arc;

use mongotune_core::{OptimizationSuggestion, Report};

/// What happened to one database during a run: the reports on either side
/// of the change and every suggestion applied, oldest first.
#[derive(Debug, Clone, Default)]
pub struct History {
    database_name: String,
    before_report: Option<Arc<Report>>,
    after_report: Option<Arc<Report>>,
    optimizations: Vec<OptimizationSuggestion>,
}

impl History {
    pub fn new(database_name: impl Into<String>) -> Self {
        History {
            database_name: database_name.into(),
            ..History::default()
        }
    }

    pub fn with_before_report(mut self, report: Arc<Report>) -> Self {
        self.before_report = Some(report);
        self
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn before_report(&self) -> Option<&Arc<Report>> {
        self.before_report.as_ref()
    }

    pub fn after_report(&self) -> Option<&Arc<Report>> {
        self.after_report.as_ref()
    }

    pub fn set_after_report(&mut self, report: Arc<Report>) {
        self.after_report = Some(report);
    }

    pub fn add_optimization(&mut self, suggestion: OptimizationSuggestion) {
        log::info!(
            "added optimization to history database={} category={} impact={} confidence={:.2}",
            self.database_name,
            suggestion.category,
            suggestion.impact,
            suggestion.confidence
        );
        self.optimizations.push(suggestion);
    }

    pub fn latest_optimization(&self) -> Option<&OptimizationSuggestion> {
        self.optimizations.last()
    }

    pub fn optimizations(&self) -> &[OptimizationSuggestion] {
        &self.optimizations
    }

    pub fn optimization_count(&self) -> usize {
        self.optimizations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(description: &str) -> OptimizationSuggestion {
        serde_json::from_value(serde_json::json!({
            "category": "index",
            "impact": "low",
            "confidence": 0.5,
            "problem": {"description": description, "metrics": [], "first_seen": "2026-10-01T00:00:00Z", "severity": "low"},
            "solution": {"description": "none", "operations": []},
            "validation": []
        }))
        .unwrap()
    }

    #[test]
    fn empty_history_has_no_latest() {
        let h = History::new("shop");
        assert!(h.latest_optimization().is_none());
        assert!(h.before_report().is_none());
        assert_eq!(h.optimization_count(), 0);
    }

    #[test]
    fn latest_is_last_appended() {
        let mut h = History::new("shop");
        h.add_optimization(suggestion("first"));
        h.add_optimization(suggestion("second"));
        assert_eq!(h.optimization_count(), 2);
        assert_eq!(h.latest_optimization().unwrap().problem.description, "second");
        assert_eq!(h.optimizations()[0].problem.description, "first");
    }

    #[test]
    fn reports_are_shared() {
        let before = Arc::new(Report::new("shop"));
        let mut h = History::new("shop").with_before_report(before.clone());
        h.set_after_report(Arc::new(Report::new("shop")));
        assert!(Arc::ptr_eq(h.before_report().unwrap(), &before));
        assert!(h.after_report().is_some());
    }
}
