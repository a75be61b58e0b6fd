use std::future::Future;

use super::{ids, make_record, TestResult};
use crate::RecordStore;

pub(super) async fn run_ordering_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "ordering",
            "list_is_newest_first",
            list_is_newest_first(factory).await,
        ),
        TestResult::from_result(
            "ordering",
            "list_by_database_filters_and_orders",
            list_by_database_filters_and_orders(factory).await,
        ),
        TestResult::from_result(
            "ordering",
            "latest_spans_databases",
            latest_spans_databases(factory).await,
        ),
    ]
}

/// Records saved out of timestamp order still list newest first.
async fn list_is_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (id, offset) in [("middle", 60), ("oldest", 0), ("newest", 120)] {
        s.save(make_record(id, "shop", offset))
            .await
            .map_err(|e| format!("save {id}: {e}"))?;
    }
    let all = s.list().await.map_err(|e| format!("list: {e}"))?;
    let got = ids(&all);
    if got != ["newest", "middle", "oldest"] {
        return Err(format!("expected [newest, middle, oldest], got {got:?}"));
    }
    Ok(())
}

async fn list_by_database_filters_and_orders<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.save(make_record("shop-1", "shop", 0))
        .await
        .map_err(|e| format!("save: {e}"))?;
    s.save(make_record("crm-1", "crm", 30))
        .await
        .map_err(|e| format!("save: {e}"))?;
    s.save(make_record("shop-2", "shop", 60))
        .await
        .map_err(|e| format!("save: {e}"))?;

    let shop = s
        .list_by_database("shop")
        .await
        .map_err(|e| format!("list_by_database: {e}"))?;
    let got = ids(&shop);
    if got != ["shop-2", "shop-1"] {
        return Err(format!("expected [shop-2, shop-1], got {got:?}"));
    }
    Ok(())
}

async fn latest_spans_databases<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.save(make_record("shop-1", "shop", 0))
        .await
        .map_err(|e| format!("save: {e}"))?;
    s.save(make_record("crm-1", "crm", 90))
        .await
        .map_err(|e| format!("save: {e}"))?;
    let latest = s.latest().await.map_err(|e| format!("latest: {e}"))?;
    if latest.id != "crm-1" {
        return Err(format!("expected latest 'crm-1', got '{}'", latest.id));
    }
    Ok(())
}
