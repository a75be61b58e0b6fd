use std::future::Future;

use time::Duration;

use super::{base_time, ids, make_record, TestResult};
use crate::RecordStore;

pub(super) async fn run_retention_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "retention",
            "delete_older_than_removes_only_expired",
            delete_older_than_removes_only_expired(factory).await,
        ),
        TestResult::from_result(
            "retention",
            "record_at_cutoff_is_kept",
            record_at_cutoff_is_kept(factory).await,
        ),
        TestResult::from_result(
            "retention",
            "delete_on_empty_store_is_zero",
            delete_on_empty_store_is_zero(factory).await,
        ),
    ]
}

async fn delete_older_than_removes_only_expired<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let day = 24 * 60 * 60;
    s.save(make_record("ancient", "shop", 0))
        .await
        .map_err(|e| format!("save: {e}"))?;
    s.save(make_record("old-crm", "crm", day))
        .await
        .map_err(|e| format!("save: {e}"))?;
    s.save(make_record("fresh", "shop", 100 * day))
        .await
        .map_err(|e| format!("save: {e}"))?;

    let cutoff = base_time() + Duration::days(10);
    let deleted = s
        .delete_older_than(cutoff)
        .await
        .map_err(|e| format!("delete_older_than: {e}"))?;
    if deleted != 2 {
        return Err(format!("expected 2 deleted, got {deleted}"));
    }
    let remaining = s.list().await.map_err(|e| format!("list: {e}"))?;
    if ids(&remaining) != ["fresh"] {
        return Err(format!("expected [fresh] to remain, got {:?}", ids(&remaining)));
    }
    Ok(())
}

async fn record_at_cutoff_is_kept<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.save(make_record("edge", "shop", 0))
        .await
        .map_err(|e| format!("save: {e}"))?;
    let deleted = s
        .delete_older_than(base_time())
        .await
        .map_err(|e| format!("delete_older_than: {e}"))?;
    if deleted != 0 {
        return Err(format!("record exactly at cutoff was deleted ({deleted})"));
    }
    Ok(())
}

async fn delete_on_empty_store_is_zero<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let deleted = s
        .delete_older_than(base_time())
        .await
        .map_err(|e| format!("delete_older_than: {e}"))?;
    if deleted != 0 {
        return Err(format!("expected 0 deleted, got {deleted}"));
    }
    Ok(())
}
