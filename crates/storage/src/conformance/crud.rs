use std::future::Future;
use std::sync::Arc;

use mongotune_core::{OpLatency, Report};

use super::{make_record, TestResult};
use crate::RecordStore;

pub(super) async fn run_crud_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "crud",
            "save_then_get_returns_record",
            save_then_get_returns_record(factory).await,
        ),
        TestResult::from_result(
            "crud",
            "save_preserves_all_fields",
            save_preserves_all_fields(factory).await,
        ),
        TestResult::from_result(
            "crud",
            "resave_same_id_replaces",
            resave_same_id_replaces(factory).await,
        ),
    ]
}

async fn save_then_get_returns_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.save(make_record("rec-1", "shop", 0))
        .await
        .map_err(|e| format!("save: {e}"))?;
    let got = s.get("rec-1").await.map_err(|e| format!("get: {e}"))?;
    if got.database_name != "shop" {
        return Err(format!("expected database 'shop', got '{}'", got.database_name));
    }
    Ok(())
}

async fn save_preserves_all_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut before = Report::new("shop");
    before.server.latency.reads = OpLatency::new(1_200_000.0, 1000.0);
    let mut after = Report::new("shop");
    after.server.latency.reads = OpLatency::new(1_260_000.0, 1100.0);

    let mut record = make_record("rec-full", "shop", 5).with_reports(
        Some(Arc::new(before)),
        Some(Arc::new(after)),
    );
    record.applied = true;
    record.success = true;
    record.improvement = 50.0;
    record.rollback_required = true;
    record.rollback_success = true;

    s.save(record.clone())
        .await
        .map_err(|e| format!("save: {e}"))?;
    let got = s.get("rec-full").await.map_err(|e| format!("get: {e}"))?;
    if got != record {
        return Err(format!("record changed in storage:\n  saved {record:?}\n  got   {got:?}"));
    }
    Ok(())
}

async fn resave_same_id_replaces<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut record = make_record("rec-1", "shop", 0);
    s.save(record.clone())
        .await
        .map_err(|e| format!("save: {e}"))?;
    record.improvement = 7.5;
    s.save(record).await.map_err(|e| format!("resave: {e}"))?;

    let all = s.list().await.map_err(|e| format!("list: {e}"))?;
    if all.len() != 1 {
        return Err(format!("expected 1 record after resave, got {}", all.len()));
    }
    if all[0].improvement != 7.5 {
        return Err(format!("expected improvement 7.5, got {}", all[0].improvement));
    }
    Ok(())
}
