//! The embedded JSON Schema for optimization suggestions.
//!
//! The same document is sent to the recommendation service as the
//! structured-output contract and used to check its responses.

use std::sync::OnceLock;

const SUGGESTION_SCHEMA: &str = include_str!("../schema/suggestion-schema.json");

static SCHEMA_VALUE: OnceLock<serde_json::Value> = OnceLock::new();
static VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// The suggestion schema as a JSON value.
pub fn suggestion_schema() -> &'static serde_json::Value {
    SCHEMA_VALUE.get_or_init(|| {
        serde_json::from_str(SUGGESTION_SCHEMA).unwrap_or(serde_json::Value::Null)
    })
}

/// Check a decoded JSON document against the suggestion schema.
///
/// Returns every violation message.
pub fn check_suggestion(instance: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = VALIDATOR.get_or_init(|| {
        jsonschema::validator_for(suggestion_schema())
            .map_err(|e| format!("failed to compile suggestion schema: {}", e))
    });
    let validator = match validator {
        Ok(v) => v,
        Err(msg) => return Err(vec![msg.clone()]),
    };

    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_schema_parses() {
        assert!(suggestion_schema().is_object());
        assert_eq!(
            suggestion_schema()["title"],
            serde_json::json!("OptimizationSuggestion")
        );
    }

    #[test]
    fn reports_every_violation() {
        let doc = serde_json::json!({"category": "sharding", "impact": "huge"});
        let errors = check_suggestion(&doc).unwrap_err();
        assert!(errors.len() >= 2, "{:?}", errors);
    }
}
