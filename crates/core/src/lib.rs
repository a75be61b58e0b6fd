#![allow(clippy::result_large_err)]
//! mongotune-core: data model for the optimization lifecycle.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`OptimizationSuggestion`] -- a schema-validated change proposal
//! - [`IndexOperation`], [`IndexKeys`] -- the reversible operations it carries
//! - [`Report`] -- a performance snapshot of one database
//! - [`OptimizerError`], [`ErrorKind`] -- the lifecycle error taxonomy
//! - [`Settings`] -- layered runtime configuration

pub mod error;
pub mod report;
pub mod schema;
pub mod settings;
pub mod suggestion;

// ── Convenience re-exports ───────────────────────────────────────────

pub use error::{ErrorKind, OptimizerError};
pub use report::{
    CollectionStats, ConnectionStats, DatabaseStats, IndexStats, LatencyStats, MemoryStats,
    OpCounters, OpLatency, Report, ServerStats,
};
pub use schema::{check_suggestion, suggestion_schema};
pub use settings::{ConfigError, LlmSettings, RollbackOrder, S3Settings, Settings, StorageType};
pub use suggestion::{
    strip_code_fences, Category, ImplementationDetails, IndexAction, IndexKeys, IndexOperation,
    IndexOptions, KeyDirection, Level, OptimizationSuggestion, Problem, ProblemMetric, Severity,
    Solution, Trend, ValidationStep,
};
