//! Structured optimization suggestions and the index operations they carry.
//!
//! A suggestion is decoded straight from the recommendation service's JSON
//! text: schema check, typed deserialisation, then semantic validation.
//! Nothing is decoded into an untyped value and re-encoded.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ErrorKind, OptimizerError};
use crate::schema;

// ──────────────────────────────────────────────
// Enumerations
// ──────────────────────────────────────────────

/// The kind of change a suggestion proposes.
///
/// `Optimize` is emitted by follow-up assessments to ask for the change to
/// be extended; it carries index operations like `Index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Index,
    Query,
    Schema,
    Configuration,
    Optimize,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Index => "index",
            Category::Query => "query",
            Category::Schema => "schema",
            Category::Configuration => "configuration",
            Category::Optimize => "optimize",
        }
    }

    /// The error kind used when executing an operation of this category fails.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Category::Index | Category::Optimize => ErrorKind::Index,
            Category::Query => ErrorKind::Query,
            Category::Schema => ErrorKind::Schema,
            Category::Configuration => ErrorKind::Config,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Low / medium / high, used for impact, effort and risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

// ──────────────────────────────────────────────
// Problem
// ──────────────────────────────────────────────

/// A named measurement that evidences the problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemMetric {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub description: String,
    #[serde(default)]
    pub metrics: Vec<ProblemMetric>,
    /// When the issue was first detected (ISO 8601 / RFC 3339 text).
    pub first_seen: String,
    pub severity: Severity,
}

impl Problem {
    /// Parse `first_seen` as an RFC 3339 timestamp.
    pub fn first_seen_at(&self) -> Option<time::OffsetDateTime> {
        time::OffsetDateTime::parse(
            &self.first_seen,
            &time::format_description::well_known::Rfc3339,
        )
        .ok()
    }
}

// ──────────────────────────────────────────────
// Index keys
// ──────────────────────────────────────────────

/// Direction or type of one field in an index key specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Ascending,
    Descending,
    /// A special index type such as `"text"`, `"hashed"` or `"2dsphere"`.
    Kind(String),
}

impl fmt::Display for KeyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDirection::Ascending => write!(f, "1"),
            KeyDirection::Descending => write!(f, "-1"),
            KeyDirection::Kind(kind) => write!(f, "{}", kind),
        }
    }
}

impl Serialize for KeyDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            KeyDirection::Ascending => serializer.serialize_i32(1),
            KeyDirection::Descending => serializer.serialize_i32(-1),
            KeyDirection::Kind(kind) => serializer.serialize_str(kind),
        }
    }
}

impl<'de> Deserialize<'de> for KeyDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DirectionVisitor;

        impl<'de> Visitor<'de> for DirectionVisitor {
            type Value = KeyDirection;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("1, -1 or an index type name")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<KeyDirection, E> {
                match v {
                    1 => Ok(KeyDirection::Ascending),
                    -1 => Ok(KeyDirection::Descending),
                    other => Err(E::custom(format!(
                        "index direction must be 1 or -1, got {}",
                        other
                    ))),
                }
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<KeyDirection, E> {
                match v {
                    1 => Ok(KeyDirection::Ascending),
                    other => Err(E::custom(format!(
                        "index direction must be 1 or -1, got {}",
                        other
                    ))),
                }
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<KeyDirection, E> {
                if v == 1.0 {
                    Ok(KeyDirection::Ascending)
                } else if v == -1.0 {
                    Ok(KeyDirection::Descending)
                } else {
                    Err(E::custom(format!(
                        "index direction must be 1 or -1, got {}",
                        v
                    )))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<KeyDirection, E> {
                if v.is_empty() {
                    return Err(E::custom("index type name must not be empty"));
                }
                Ok(KeyDirection::Kind(v.to_string()))
            }
        }

        deserializer.deserialize_any(DirectionVisitor)
    }
}

/// An ordered field → direction mapping. Field order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexKeys(Vec<(String, KeyDirection)>);

impl IndexKeys {
    pub fn new() -> Self {
        IndexKeys(Vec::new())
    }

    /// Append a field. A field that is already present is left unchanged.
    pub fn push(mut self, field: impl Into<String>, direction: KeyDirection) -> Self {
        let field = field.into();
        if !self.0.iter().any(|(f, _)| *f == field) {
            self.0.push((field, direction));
        }
        self
    }

    pub fn asc(self, field: impl Into<String>) -> Self {
        self.push(field, KeyDirection::Ascending)
    }

    pub fn desc(self, field: impl Into<String>) -> Self {
        self.push(field, KeyDirection::Descending)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyDirection)> {
        self.0.iter().map(|(f, d)| (f.as_str(), d))
    }

    /// The name the server generates for an index over these keys,
    /// e.g. `{a: 1, b: -1}` → `a_1_b_-1`.
    pub fn default_index_name(&self) -> String {
        self.0
            .iter()
            .map(|(field, dir)| format!("{}_{}", field, dir))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl Serialize for IndexKeys {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, dir) in &self.0 {
            map.serialize_entry(field, dir)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IndexKeys {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeysVisitor;

        impl<'de> Visitor<'de> for KeysVisitor {
            type Value = IndexKeys;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping field names to index directions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<IndexKeys, A::Error> {
                let mut entries: Vec<(String, KeyDirection)> = Vec::new();
                while let Some((field, dir)) = access.next_entry::<String, KeyDirection>()? {
                    if entries.iter().any(|(f, _)| *f == field) {
                        return Err(de::Error::custom(format!(
                            "duplicate index key field '{}'",
                            field
                        )));
                    }
                    entries.push((field, dir));
                }
                Ok(IndexKeys(entries))
            }
        }

        deserializer.deserialize_map(KeysVisitor)
    }
}

// ──────────────────────────────────────────────
// IndexOperation
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexAction {
    #[serde(rename = "createIndex")]
    CreateIndex,
    #[serde(rename = "dropIndex")]
    DropIndex,
}

impl fmt::Display for IndexAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexAction::CreateIndex => "createIndex",
            IndexAction::DropIndex => "dropIndex",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sparse: bool,
    #[serde(
        default,
        rename = "expireAfterSeconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_after_seconds: Option<i64>,
}

/// One reversible administrative action against a single collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexOperation {
    pub action: IndexAction,
    pub collection: String,
    #[serde(default, skip_serializing_if = "IndexKeys::is_empty")]
    pub keys: IndexKeys,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub options: IndexOptions,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl IndexOperation {
    pub fn create_index(collection: impl Into<String>, keys: IndexKeys) -> Self {
        IndexOperation {
            action: IndexAction::CreateIndex,
            collection: collection.into(),
            keys,
            name: None,
            options: IndexOptions::default(),
        }
    }

    pub fn drop_index(collection: impl Into<String>, name: impl Into<String>) -> Self {
        IndexOperation {
            action: IndexAction::DropIndex,
            collection: collection.into(),
            keys: IndexKeys::new(),
            name: Some(name.into()),
            options: IndexOptions::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// The index name this operation acts on.
    ///
    /// createIndex: `options.name`, else `name`, else the server-generated
    /// name for `keys`. dropIndex: `name`, else `options.name`. Returns
    /// `None` when no usable name can be derived.
    pub fn resolved_name(&self) -> Option<String> {
        match self.action {
            IndexAction::CreateIndex => non_empty(&self.options.name)
                .or_else(|| non_empty(&self.name))
                .map(str::to_string)
                .or_else(|| {
                    if self.keys.is_empty() {
                        None
                    } else {
                        Some(self.keys.default_index_name())
                    }
                }),
            IndexAction::DropIndex => non_empty(&self.name)
                .or_else(|| non_empty(&self.options.name))
                .map(str::to_string),
        }
    }

    /// Check the structural invariants of the operation.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.collection.trim().is_empty() {
            return Err(OptimizerError::validation(format!(
                "{} operation has an empty collection name",
                self.action
            )));
        }
        match self.action {
            IndexAction::CreateIndex if self.keys.is_empty() => Err(OptimizerError::validation(
                format!("createIndex on '{}' requires non-empty keys", self.collection),
            )
            .with_collection(&self.collection)),
            IndexAction::DropIndex if self.resolved_name().is_none() => {
                Err(OptimizerError::validation(format!(
                    "dropIndex on '{}' requires an index name",
                    self.collection
                ))
                .with_collection(&self.collection))
            }
            _ => Ok(()),
        }
    }
}

// ──────────────────────────────────────────────
// Solution
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationDetails {
    pub estimated_effort: Level,
    pub risk_level: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub description: String,
    #[serde(default)]
    pub operations: Vec<IndexOperation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<ImplementationDetails>,
}

// ──────────────────────────────────────────────
// ValidationStep
// ──────────────────────────────────────────────

/// A diagnostic probe descriptor: run `command` and read the number found
/// at `extract` in the response as the post-change value of `metric_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStep {
    pub metric_name: String,
    pub command: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub extract: Vec<String>,
}

impl ValidationStep {
    /// Parse one of a suggestion's opaque `validation` entries.
    pub fn parse(raw: &str) -> Result<Self, OptimizerError> {
        let step: ValidationStep = serde_json::from_str(raw).map_err(|e| {
            OptimizerError::validation(format!("invalid validation step '{}'", raw)).with_source(e)
        })?;
        if step.metric_name.trim().is_empty() {
            return Err(OptimizerError::validation(
                "validation step has an empty metric_name",
            ));
        }
        if step.command.is_empty() {
            return Err(OptimizerError::validation(format!(
                "validation step for '{}' has an empty command",
                step.metric_name
            )));
        }
        Ok(step)
    }
}

// ──────────────────────────────────────────────
// OptimizationSuggestion
// ──────────────────────────────────────────────

/// A machine-generated proposal for one optimization. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSuggestion {
    pub category: Category,
    pub impact: Level,
    pub confidence: f64,
    pub problem: Problem,
    pub solution: Solution,
    #[serde(default)]
    pub validation: Vec<String>,
}

impl OptimizationSuggestion {
    /// Decode a suggestion from the recommendation service's response text.
    ///
    /// Markdown code fences are stripped, the document is checked against
    /// the embedded JSON Schema, decoded into the typed struct and then
    /// checked with [`OptimizationSuggestion::validate`].
    pub fn from_json_str(text: &str) -> Result<Self, OptimizerError> {
        let body = strip_code_fences(text);
        let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
            OptimizerError::validation("suggestion is not valid JSON").with_source(e)
        })?;
        if let Err(errors) = schema::check_suggestion(&value) {
            return Err(OptimizerError::validation(format!(
                "suggestion does not match schema: {}",
                errors.join("; ")
            )));
        }
        let suggestion: OptimizationSuggestion = serde_json::from_value(value).map_err(|e| {
            OptimizerError::validation("suggestion could not be decoded").with_source(e)
        })?;
        suggestion.validate()?;
        Ok(suggestion)
    }

    /// Check the semantic invariants the schema cannot express.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(OptimizerError::validation(format!(
                "confidence must be within 0..=1, got {}",
                self.confidence
            )));
        }
        for op in &self.solution.operations {
            op.validate()?;
        }
        Ok(())
    }

    /// Parse every validation-step descriptor, failing on the first bad one.
    pub fn validation_steps(&self) -> Result<Vec<ValidationStep>, OptimizerError> {
        self.validation
            .iter()
            .map(|raw| ValidationStep::parse(raw))
            .collect()
    }

    /// Look up a problem metric by exact name.
    pub fn problem_metric(&self, name: &str) -> Option<&ProblemMetric> {
        self.problem.metrics.iter().find(|m| m.name == name)
    }

    pub fn operations(&self) -> &[IndexOperation] {
        &self.solution.operations
    }
}

/// Strip markdown code fences (```json ... ```) from a response string.
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();

    if let Some(stripped) = trimmed.strip_prefix("```json") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(stripped) = trimmed.strip_prefix("```") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }

    trimmed
}
