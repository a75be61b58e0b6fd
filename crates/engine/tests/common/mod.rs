//! Shared fixtures for the engine integration suites.

#![allow(dead_code)]

use mongotune_core::{Category, IndexOperation, OptimizationSuggestion};
use serde_json::json;

/// A suggestion of `category` carrying `operations` and no validation steps.
pub fn suggestion(category: &str, operations: Vec<IndexOperation>) -> OptimizationSuggestion {
    let mut s: OptimizationSuggestion = serde_json::from_value(json!({
        "category": category,
        "impact": "medium",
        "confidence": 0.8,
        "problem": {
            "description": "collection scan on orders",
            "metrics": [
                {"name": "query_time_ms", "value": 100.0, "unit": "ms"}
            ],
            "first_seen": "2026-10-01T00:00:00Z",
            "severity": "medium"
        },
        "solution": {"description": "index the filter fields", "operations": []},
        "validation": []
    }))
    .expect("fixture suggestion");
    s.solution.operations = operations;
    s
}

pub fn index_suggestion(operations: Vec<IndexOperation>) -> OptimizationSuggestion {
    suggestion("index", operations)
}

/// A validation-step descriptor reading `metric`.
pub fn step(metric: &str) -> String {
    json!({
        "metric_name": metric,
        "command": {"explain": {"find": "orders", "filter": {"sku": "x"}}},
        "extract": ["executionStats", "executionTimeMillis"]
    })
    .to_string()
}

/// Add a problem metric with the given before-value.
pub fn with_metric(mut s: OptimizationSuggestion, name: &str, before: f64) -> OptimizationSuggestion {
    s.problem.metrics.push(
        serde_json::from_value(json!({"name": name, "value": before})).expect("fixture metric"),
    );
    s
}

/// A follow-up answer reporting `improvement` percent.
pub fn reassessment(category: Category, improvement: f64) -> OptimizationSuggestion {
    let mut s = suggestion(category.as_str(), Vec::new());
    s.problem.metrics = vec![serde_json::from_value(
        json!({"name": "performance_improvement", "value": improvement, "unit": "%"}),
    )
    .expect("fixture metric")];
    s
}
