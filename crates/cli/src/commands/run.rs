//! `run` and `multi`: wire the MongoDB adapters, record store and
//! recommendation client into an orchestrator and drive it.

use std::sync::Arc;

use async_trait::async_trait;
use mongotune_core::Settings;
use mongotune_engine::{
    AlertError, AlertSink, CancellationToken, IndexOptimizer, OrchestrationReport, Orchestrator,
};
use mongotune_mongo::{MongoCommandExecutor, MongoConnection, MongoMetricsProvider, MongoProbe};
use serde_json::json;

use super::{open_store, CommandError};
use crate::llm::OpenAiSuggestionEngine;
use crate::OutputFormat;

/// Delivers policy alerts to the log.
struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, database: &str, message: &str) -> Result<(), AlertError> {
        log::warn!("alert database={} message={}", database, message);
        Ok(())
    }
}

pub(crate) async fn cmd_run(
    settings: &Settings,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CommandError> {
    let database = settings
        .database
        .clone()
        .filter(|d| !d.trim().is_empty())
        .ok_or(CommandError::NoDatabase)?;
    run_cycles(settings, vec![database], output, quiet).await
}

pub(crate) async fn cmd_multi(
    settings: &Settings,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CommandError> {
    if settings.databases.is_empty() {
        return Err(CommandError::NoDatabases);
    }
    run_cycles(settings, settings.databases.clone(), output, quiet).await
}

async fn run_cycles(
    settings: &Settings,
    databases: Vec<String>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CommandError> {
    let store = open_store(settings).await?;
    let connection = MongoConnection::connect(&settings.mongo_uri).await?;

    let executor = Arc::new(MongoCommandExecutor::new(connection.clone()));
    let probe = Arc::new(MongoProbe::new(connection.clone()));
    let metrics = Arc::new(MongoMetricsProvider::new(connection));
    let optimizer =
        Arc::new(IndexOptimizer::new(executor, probe).with_rollback_order(settings.rollback_order));
    let engine = Arc::new(OpenAiSuggestionEngine::from_settings(&settings.llm, |key| {
        std::env::var(key).ok()
    }));
    log::info!(
        "starting optimization run databases={} max_parallel={} endpoint={} model={}",
        databases.len(),
        settings.max_parallel,
        engine.endpoint(),
        settings.llm.model
    );

    let orchestrator = Orchestrator::new(settings, metrics, engine, optimizer, store)
        .with_alert_sink(Arc::new(LogAlertSink));

    let token = CancellationToken::new();
    let interrupt = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, cancelling in-flight work");
            interrupt.cancel();
        }
    });

    let report = orchestrator.run(&databases, &token).await;
    watcher.abort();

    print_report(&report, output, quiet);

    if token.is_cancelled() {
        return Err(CommandError::Interrupted);
    }
    if report.failures() > 0 {
        return Err(CommandError::Failures {
            failed: report.failures(),
            total: report.total(),
        });
    }
    Ok(())
}

fn print_report(report: &OrchestrationReport, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Text => {
            if !quiet {
                print!("{}", report.render());
            }
        }
        OutputFormat::Json => println!("{}", report_json(report)),
    }
}

fn report_json(report: &OrchestrationReport) -> serde_json::Value {
    let mut outcomes: Vec<_> = report.outcomes.iter().collect();
    outcomes.sort_by(|a, b| a.database_name.cmp(&b.database_name));
    let databases: Vec<serde_json::Value> = outcomes
        .into_iter()
        .map(|o| {
            json!({
                "database": o.database_name,
                "success": o.success,
                "improvement_pct": o.improvement,
                "duration_secs": o.duration.as_secs_f64(),
                "error": o.error.as_ref().map(|e| e.to_string()),
            })
        })
        .collect();
    json!({
        "total": report.total(),
        "succeeded": report.successes(),
        "failed": report.failures(),
        "duration_secs": report.duration.as_secs_f64(),
        "databases": databases,
    })
}
