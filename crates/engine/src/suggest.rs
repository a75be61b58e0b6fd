//! The recommendation-service seam and the prompts sent to it.
//!
//! Templates are fixed `&'static str` values; rendering substitutes named
//! `{placeholder}` markers. Nothing is parsed or cached at runtime.

use std::sync::Arc;

use async_trait::async_trait;
use mongotune_core::{OptimizationSuggestion, OptimizerError, Report};

// ──────────────────────────────────────────────
// Templates
// ──────────────────────────────────────────────

pub const SYSTEM_TEMPLATE: &str = "\
You are a MongoDB performance expert.
You MUST generate responses STRICTLY conforming to the provided JSON schema.

Requirements:
- Analyze the provided MongoDB metrics and suggest optimizations.
- Focus on ONE optimization category per suggestion.
- For 'solution.operations', give the parameters of each action:
  - createIndex: 'collection', 'keys', and optionally 'options.name' or other options.
  - dropIndex: 'collection' and 'name'. Include the index 'keys' so the drop can be reverted.
- Do not provide raw MongoDB commands or shell syntax.
- Each 'validation' entry is a JSON object encoded as a string:
  {\"metric_name\": ..., \"command\": {...}, \"extract\": [path, to, number]}.
- Explain the problem and the reasoning behind the solution.
- The whole output is a single JSON object matching the schema.";

pub const INITIAL_TEMPLATE: &str = "\
Please analyze the following metrics for database '{database}' and suggest an optimization.

{report}";

pub const FOLLOW_UP_TEMPLATE: &str = "\
Below are two performance reports for database '{database}', plus the optimization that was applied between them.

Compare the before and after metrics to determine whether the optimization was beneficial.
Report the measured change as a problem metric named 'performance_improvement' (percent, positive is better).

Then generate a new suggestion which either:
1. Reverts the previous optimization, if it showed no improvement or a degradation
2. Refines the existing optimization (category 'optimize'), if it showed improvement
3. Proposes a new optimization

Before:

{before}

Optimizations:

{optimizations}

After:

{after}";

fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}

// ──────────────────────────────────────────────
// PromptContext
// ──────────────────────────────────────────────

/// Everything the recommendation service is shown for one request.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub database: String,
    pub before: Arc<Report>,
    /// Present for follow-up assessments.
    pub after: Option<Arc<Report>>,
    /// The suggestion being assessed, for follow-ups.
    pub latest: Option<OptimizationSuggestion>,
}

/// A rendered system + user message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl PromptContext {
    /// The first request for a database: the before-report only.
    pub fn initial(database: impl Into<String>, before: Arc<Report>) -> Self {
        PromptContext {
            database: database.into(),
            before,
            after: None,
            latest: None,
        }
    }

    /// A re-assessment of `latest` given both reports.
    pub fn follow_up(
        database: impl Into<String>,
        latest: OptimizationSuggestion,
        before: Arc<Report>,
        after: Arc<Report>,
    ) -> Self {
        PromptContext {
            database: database.into(),
            before,
            after: Some(after),
            latest: Some(latest),
        }
    }

    pub fn is_follow_up(&self) -> bool {
        self.after.is_some()
    }

    pub fn render(&self) -> Prompt {
        let user = match &self.after {
            None => render(
                INITIAL_TEMPLATE,
                &[
                    ("database", &self.database),
                    ("report", &self.before.to_json_string()),
                ],
            ),
            Some(after) => {
                let optimizations = self
                    .latest
                    .as_ref()
                    .and_then(|s| serde_json::to_string_pretty(s).ok())
                    .unwrap_or_else(|| "[]".to_string());
                render(
                    FOLLOW_UP_TEMPLATE,
                    &[
                        ("database", &self.database),
                        ("before", &self.before.to_json_string()),
                        ("optimizations", &optimizations),
                        ("after", &after.to_json_string()),
                    ],
                )
            }
        };
        Prompt {
            system: SYSTEM_TEMPLATE.to_string(),
            user,
        }
    }
}

// ──────────────────────────────────────────────
// SuggestionEngine
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SuggestionError {
    /// The request to the service failed.
    #[error("suggestion request failed: {0}")]
    Request(String),
    /// The service answered with nothing usable.
    #[error("suggestion response was empty")]
    Empty,
    /// The response did not decode into a valid suggestion.
    #[error("invalid suggestion: {0}")]
    Invalid(#[from] OptimizerError),
    /// The engine is not configured (missing API key, bad URL).
    #[error("suggestion engine not configured: {0}")]
    NotConfigured(String),
}

/// Produces structured optimization suggestions.
///
/// Implementations make exactly one attempt per call.
#[async_trait]
pub trait SuggestionEngine: Send + Sync {
    async fn generate(
        &self,
        context: &PromptContext,
    ) -> Result<OptimizationSuggestion, SuggestionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_prompt_embeds_report() {
        let mut report = Report::new("shop");
        report.server.host = "db-1:27017".into();
        let prompt = PromptContext::initial("shop", Arc::new(report)).render();
        assert!(prompt.user.contains("database 'shop'"));
        assert!(prompt.user.contains("db-1:27017"));
        assert!(!prompt.user.contains("{report}"));
        assert!(prompt.system.contains("JSON schema"));
    }

    #[test]
    fn follow_up_prompt_fills_every_placeholder() {
        let suggestion: OptimizationSuggestion = serde_json::from_value(serde_json::json!({
            "category": "index",
            "impact": "low",
            "confidence": 0.5,
            "problem": {"description": "scan", "metrics": [], "first_seen": "2026-10-01T00:00:00Z", "severity": "low"},
            "solution": {"description": "add index on sku", "operations": []},
            "validation": []
        }))
        .unwrap();
        let ctx = PromptContext::follow_up(
            "shop",
            suggestion,
            Arc::new(Report::new("shop")),
            Arc::new(Report::new("shop")),
        );
        assert!(ctx.is_follow_up());
        let prompt = ctx.render();
        for placeholder in ["{before}", "{after}", "{optimizations}", "{database}"] {
            assert!(!prompt.user.contains(placeholder), "{placeholder} left in prompt");
        }
        assert!(prompt.user.contains("add index on sku"));
    }
}
