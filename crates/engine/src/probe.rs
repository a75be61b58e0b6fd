use async_trait::async_trait;
use mongotune_core::ValidationStep;

/// A post-change measurement of one named metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReading {
    pub metric_name: String,
    pub value: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("diagnostic command failed: {0}")]
    Command(String),
    #[error("no number at path '{path}' in diagnostic response")]
    Extract { path: String },
}

/// Runs a validation step's diagnostic command and reads the metric it names.
#[async_trait]
pub trait DiagnosticProbe: Send + Sync {
    async fn read(&self, database: &str, step: &ValidationStep)
        -> Result<ProbeReading, ProbeError>;
}

/// Follow `path` through nested objects and read the number found there.
pub fn extract_number(value: &serde_json::Value, path: &[String]) -> Result<f64, ProbeError> {
    let missing = || ProbeError::Extract {
        path: path.join("."),
    };
    let mut current = value;
    for key in path {
        current = current.as_object().and_then(|o| o.get(key)).ok_or_else(missing)?;
    }
    current.as_f64().ok_or_else(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_nested_numbers() {
        let doc = serde_json::json!({"opLatencies": {"reads": {"latency": 5400, "ops": 9}}});
        assert_eq!(
            extract_number(&doc, &path(&["opLatencies", "reads", "latency"])).unwrap(),
            5400.0
        );
    }

    #[test]
    fn missing_or_non_numeric_is_extract_error() {
        let doc = serde_json::json!({"a": {"b": "text"}});
        assert!(matches!(
            extract_number(&doc, &path(&["a", "b"])),
            Err(ProbeError::Extract { .. })
        ));
        assert!(matches!(
            extract_number(&doc, &path(&["a", "c"])),
            Err(ProbeError::Extract { path }) if path == "a.c"
        ));
    }

    #[test]
    fn empty_path_reads_root() {
        assert_eq!(extract_number(&serde_json::json!(3.5), &[]).unwrap(), 3.5);
    }
}
