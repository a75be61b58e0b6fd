#![allow(clippy::result_large_err)]
//! mongotune-engine: the optimization lifecycle.
//!
//! The engine applies a suggested index change, validates its effect,
//! reverts it when needed, decides the next action from the measured
//! improvement, and runs that cycle across many databases at once.
//!
//! Every external system sits behind a trait:
//!
//! - [`CommandExecutor`] -- native index commands and existence checks
//! - [`MetricsProvider`] -- server, database, collection and index stats
//! - [`DiagnosticProbe`] -- post-change readings for validation steps
//! - [`SuggestionEngine`] -- the recommendation service
//! - [`RecordStore`](mongotune_storage::RecordStore) -- outcome records
//!
//! [`memory`] provides in-process implementations of the first four for
//! tests.

pub mod cancel;
pub mod command;
pub mod executor;
pub mod history;
pub mod improvement;
pub mod measurement;
pub mod memory;
pub mod metrics;
pub mod optimizer;
pub mod orchestrator;
pub mod policy;
pub mod probe;
pub mod suggest;

// ── Convenience re-exports ───────────────────────────────────────────

pub use cancel::CancellationToken;
pub use command::CommandRunner;
pub use executor::{CommandExecutor, ExecutorError, NativeCommand};
pub use history::History;
pub use measurement::{calculate_improvement, Measurement, MeasurementError, MeasurementOutcome};
pub use memory::{InMemoryDatabase, ScriptedSuggestionEngine};
pub use metrics::{collect_report, MetricsError, MetricsProvider};
pub use optimizer::{IndexOptimizer, MetricComparison, Optimizer, ValidationResult};
pub use orchestrator::{
    parse_database_list, ActiveWorkers, AdmissionObserver, CycleError, DatabaseOutcome,
    OrchestrationReport, Orchestrator,
};
pub use policy::{
    improvement_from_suggestion, ActionPolicy, ActionResult, ActionType, AlertError, AlertSink,
};
pub use probe::{extract_number, DiagnosticProbe, ProbeError, ProbeReading};
pub use suggest::{Prompt, PromptContext, SuggestionEngine, SuggestionError};
