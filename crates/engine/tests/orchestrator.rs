//! Multi-database runs: admission bound, isolation, compare-only, failures.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{index_suggestion, reassessment, step};
use mongotune_core::{Category, ErrorKind, IndexKeys, IndexOperation, Settings};
use mongotune_engine::{
    collect_report, ActionType, ActiveWorkers, CancellationToken, CycleError, InMemoryDatabase,
    IndexOptimizer, MetricsError, Orchestrator, ScriptedSuggestionEngine,
};
use mongotune_storage::{InMemoryRecordStore, RecordStore};

fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("db{}", i)).collect()
}

fn database_with(dbs: &[String]) -> InMemoryDatabase {
    dbs.iter()
        .fold(InMemoryDatabase::new(), |db, name| db.with_collection(name, "orders"))
}

fn create_sku() -> IndexOperation {
    IndexOperation::create_index("orders", IndexKeys::new().asc("sku"))
}

struct Harness {
    db: Arc<InMemoryDatabase>,
    engine: Arc<ScriptedSuggestionEngine>,
    store: Arc<InMemoryRecordStore>,
    workers: Arc<ActiveWorkers>,
    orchestrator: Orchestrator,
}

fn harness(settings: &Settings, db: InMemoryDatabase, engine: ScriptedSuggestionEngine) -> Harness {
    let db = Arc::new(db);
    let engine = Arc::new(engine);
    let store = Arc::new(InMemoryRecordStore::new());
    let workers = Arc::new(ActiveWorkers::default());
    let optimizer = Arc::new(
        IndexOptimizer::new(db.clone(), db.clone()).with_rollback_order(settings.rollback_order),
    );
    let orchestrator = Orchestrator::new(
        settings,
        db.clone(),
        engine.clone(),
        optimizer,
        store.clone(),
    )
    .with_admission_observer(workers.clone());
    Harness {
        db,
        engine,
        store,
        workers,
        orchestrator,
    }
}

fn default_engine() -> ScriptedSuggestionEngine {
    ScriptedSuggestionEngine::new(
        index_suggestion(vec![create_sku()]),
        reassessment(Category::Index, 20.0),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_more_than_max_parallel_workers() {
    let dbs = names(5);
    let settings = Settings {
        max_parallel: 2,
        ..Settings::default()
    };
    let h = harness(
        &settings,
        database_with(&dbs).with_delay(Duration::from_millis(30)),
        default_engine(),
    );

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    assert_eq!(report.total(), 5);
    assert_eq!(report.successes(), 5, "{}", report.render());
    assert!(h.workers.peak() <= 2);
    assert!(h.workers.peak() >= 1);
    assert_eq!(h.workers.total_admitted(), 5);
    assert_eq!(h.workers.active(), 0);
    for name in &dbs {
        assert!(report.outcome(name).is_some());
        assert!(h.db.has_index(name, "orders", "sku_1").await);
    }
}

#[tokio::test]
async fn compare_only_saves_one_unapplied_record_per_database() {
    let dbs = names(3);
    let settings = Settings {
        compare_only: true,
        ..Settings::default()
    };
    let h = harness(&settings, database_with(&dbs), default_engine());

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    assert_eq!(report.successes(), 3);
    assert_eq!(h.engine.requests(), 0);
    assert_eq!(h.db.calls().runs(), 0);
    for name in &dbs {
        let records = h.store.list_by_database(name).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].applied);
        assert!(records[0].before_report.is_some());
        assert!(records[0].after_report.is_none());
        assert!(records[0].suggestion.is_none());
    }
}

#[tokio::test]
async fn one_failing_database_does_not_abort_its_siblings() {
    let dbs = names(3);
    let h = harness(
        &Settings::default(),
        database_with(&dbs).fail_metrics_for("db1"),
        default_engine(),
    );

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    assert_eq!(report.total(), 3);
    assert_eq!(report.failures(), 1);
    let failed = report.outcome("db1").unwrap();
    assert!(matches!(failed.error, Some(CycleError::Metrics(_))));
    assert!(report.outcome("db0").unwrap().success);
    assert!(report.outcome("db2").unwrap().success);
}

#[tokio::test]
async fn panicking_worker_becomes_a_failed_outcome() {
    let dbs = names(2);
    let h = harness(
        &Settings::default(),
        database_with(&dbs),
        default_engine().panicking_for("db0"),
    );

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    let failed = report.outcome("db0").unwrap();
    assert!(!failed.success);
    match &failed.error {
        Some(CycleError::Panicked(message)) => assert!(message.contains("db0")),
        other => panic!("expected a panic outcome, got {:?}", other),
    }
    assert!(report.outcome("db1").unwrap().success);
    assert_eq!(h.workers.active(), 0);
}

#[tokio::test]
async fn failed_apply_and_failed_rollback_is_a_compound_failure() {
    let dbs = vec!["shop".to_string()];
    // run 1 creates a_1, run 2 fails creating b_1, run 3 fails dropping a_1
    let engine = ScriptedSuggestionEngine::new(
        index_suggestion(vec![
            IndexOperation::create_index("orders", IndexKeys::new().asc("a")),
            IndexOperation::create_index("orders", IndexKeys::new().asc("b")),
        ]),
        reassessment(Category::Index, 20.0),
    );
    let h = harness(
        &Settings::default(),
        database_with(&dbs).fail_run(2).fail_run(3),
        engine,
    );

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    let outcome = report.outcome("shop").unwrap();
    match &outcome.error {
        Some(CycleError::CompoundFailure { apply, rollback }) => {
            assert_eq!(apply.progress, 1);
            assert_eq!(rollback.kind, ErrorKind::Rollback);
            let text = outcome.error.as_ref().unwrap().to_string();
            assert!(text.contains("optimization failed and rollback failed"));
            assert!(text.contains("(rollback:"));
        }
        other => panic!("expected a compound failure, got {:?}", other),
    }
    assert!(h.db.has_index("shop", "orders", "a_1").await);
}

#[tokio::test]
async fn failed_apply_reverts_only_the_applied_operations() {
    let dbs = vec!["shop".to_string()];
    let engine = ScriptedSuggestionEngine::new(
        index_suggestion(vec![
            IndexOperation::create_index("orders", IndexKeys::new().asc("a")),
            IndexOperation::create_index("orders", IndexKeys::new().asc("b")),
        ]),
        reassessment(Category::Index, 20.0),
    );
    let h = harness(&Settings::default(), database_with(&dbs).fail_run(2), engine);

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    assert!(matches!(
        report.outcome("shop").unwrap().error,
        Some(CycleError::RolledBack(_))
    ));
    assert!(!h.db.has_index("shop", "orders", "a_1").await);
    assert!(!h.db.has_index("shop", "orders", "b_1").await);
    assert_eq!(h.engine.follow_ups(), 0);
}

#[tokio::test]
async fn failed_apply_without_rollback_leaves_the_partial_change() {
    let dbs = vec!["shop".to_string()];
    let engine = ScriptedSuggestionEngine::new(
        index_suggestion(vec![
            IndexOperation::create_index("orders", IndexKeys::new().asc("a")),
            IndexOperation::create_index("missing", IndexKeys::new().asc("x")),
        ]),
        reassessment(Category::Index, 20.0),
    );
    let settings = Settings {
        enable_rollback: false,
        ..Settings::default()
    };
    let h = harness(&settings, database_with(&dbs), engine);

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    assert!(matches!(
        report.outcome("shop").unwrap().error,
        Some(CycleError::Apply(_))
    ));
    assert!(h.db.has_index("shop", "orders", "a_1").await);
}

#[tokio::test]
async fn full_cycle_records_measurement_and_reports_validated_improvement() {
    let dbs = vec!["shop".to_string()];
    let mut initial = index_suggestion(vec![create_sku()]);
    initial.validation = vec![step("query_time_ms")];
    let engine = ScriptedSuggestionEngine::new(initial, reassessment(Category::Index, 20.0));
    let h = harness(
        &Settings::default(),
        database_with(&dbs).with_probe_value("query_time_ms", 25.0),
        engine,
    );

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    let outcome = report.outcome("shop").unwrap();
    assert!(outcome.success, "{}", report.render());
    assert!((outcome.improvement - 75.0).abs() < 1e-9);
    assert_eq!(h.engine.follow_ups(), 1);
    // preliminary measurement record plus the policy's record
    assert_eq!(h.store.list_by_database("shop").await.unwrap().len(), 2);
    assert!(report.render().contains("shop"));
}

#[tokio::test]
async fn regression_triggers_rollback_through_the_policy() {
    let dbs = vec!["shop".to_string()];
    let engine = ScriptedSuggestionEngine::new(
        index_suggestion(vec![create_sku()]),
        reassessment(Category::Index, -15.0),
    );
    let h = harness(&Settings::default(), database_with(&dbs), engine);

    h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    assert!(!h.db.has_index("shop", "orders", "sku_1").await);
    let records = h.store.list_by_database("shop").await.unwrap();
    assert!(records.iter().any(|r| r.rollback_required && r.rollback_success));
}

#[tokio::test]
async fn failed_policy_rollback_fails_the_cycle() {
    let dbs = vec!["shop".to_string()];
    let engine = ScriptedSuggestionEngine::new(
        index_suggestion(vec![create_sku()]),
        reassessment(Category::Index, -15.0),
    );
    // run 1 applies, run 2 is the policy's rollback
    let h = harness(&Settings::default(), database_with(&dbs).fail_run(2), engine);

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    let outcome = report.outcome("shop").unwrap();
    assert!(!outcome.success);
    match &outcome.error {
        Some(CycleError::Action {
            action,
            description,
        }) => {
            assert_eq!(*action, ActionType::Rollback);
            assert!(description.starts_with("Rollback failed"));
        }
        other => panic!("expected an action failure, got {:?}", other),
    }
    assert!(h.db.has_index("shop", "orders", "sku_1").await);
    let records = h.store.list_by_database("shop").await.unwrap();
    assert!(records.iter().any(|r| r.rollback_required && !r.rollback_success));
}

#[tokio::test]
async fn failed_policy_optimize_fails_the_cycle() {
    let dbs = vec!["shop".to_string()];
    let mut follow_up = reassessment(Category::Optimize, 30.0);
    follow_up.solution.operations =
        vec![IndexOperation::create_index("orders", IndexKeys::new().desc("created_at"))];
    let engine = ScriptedSuggestionEngine::new(index_suggestion(vec![create_sku()]), follow_up);
    let h = harness(&Settings::default(), database_with(&dbs).fail_run(2), engine);

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    let outcome = report.outcome("shop").unwrap();
    assert!(!outcome.success);
    assert!(matches!(
        &outcome.error,
        Some(CycleError::Action { action: ActionType::Optimize, .. })
    ));
    assert!(outcome
        .error
        .as_ref()
        .unwrap()
        .to_string()
        .starts_with("optimize action failed"));
    assert!(!h.db.has_index("shop", "orders", "created_at_-1").await);
}

#[tokio::test]
async fn cancelled_run_fails_every_database() {
    let dbs = names(3);
    let h = harness(&Settings::default(), database_with(&dbs), default_engine());
    let token = CancellationToken::new();
    token.cancel();

    let report = h.orchestrator.run(&dbs, &token).await;

    assert_eq!(report.total(), 3);
    assert_eq!(report.failures(), 3);
    assert_eq!(h.db.calls().runs(), 0);
}

#[tokio::test]
async fn collect_report_gathers_every_collection() {
    let db = InMemoryDatabase::new()
        .with_collection("shop", "orders")
        .with_index("shop", "products", "sku_1")
        .with_collection("other", "logs");

    let report = collect_report(&db, "shop", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.database, "shop");
    assert_eq!(report.collections.len(), 2);
    assert_eq!(report.index_names("products"), vec!["_id_", "sku_1"]);
    assert_eq!(report.database_stats.collections, 2);

    let failing = InMemoryDatabase::new()
        .with_collection("shop", "orders")
        .fail_metrics_for("shop");
    let err = collect_report(&failing, "shop", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MetricsError::Read { .. }));
}

#[tokio::test]
async fn optimize_reassessment_extends_the_change() {
    let dbs = vec!["shop".to_string()];
    let mut follow_up = reassessment(Category::Optimize, 30.0);
    follow_up.solution.operations =
        vec![IndexOperation::create_index("orders", IndexKeys::new().desc("created_at"))];
    let engine = ScriptedSuggestionEngine::new(index_suggestion(vec![create_sku()]), follow_up);
    let h = harness(&Settings::default(), database_with(&dbs), engine);

    let report = h.orchestrator.run(&dbs, &CancellationToken::new()).await;

    assert!(report.outcome("shop").unwrap().success);
    assert!(h.db.has_index("shop", "orders", "sku_1").await);
    assert!(h.db.has_index("shop", "orders", "created_at_-1").await);
}
