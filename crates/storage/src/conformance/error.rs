use std::future::Future;

use super::TestResult;
use crate::{RecordStore, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "error",
            "get_nonexistent_is_not_found",
            get_nonexistent_is_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "latest_on_empty_store_is_empty",
            latest_on_empty_store_is_empty(factory).await,
        ),
        TestResult::from_result(
            "error",
            "list_empty_store",
            list_empty_store(factory).await,
        ),
        TestResult::from_result(
            "error",
            "list_by_unknown_database_is_empty",
            list_by_unknown_database_is_empty(factory).await,
        ),
    ]
}

async fn get_nonexistent_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get("missing-id").await {
        Err(StorageError::RecordNotFound { id }) if id == "missing-id" => Ok(()),
        other => Err(format!("expected RecordNotFound(missing-id), got {:?}", other)),
    }
}

async fn latest_on_empty_store_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.latest().await {
        Err(StorageError::Empty) => Ok(()),
        other => Err(format!("expected Empty, got {:?}", other)),
    }
}

async fn list_empty_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let all = s.list().await.map_err(|e| format!("list: {e}"))?;
    if !all.is_empty() {
        return Err(format!("expected empty list, got {} records", all.len()));
    }
    Ok(())
}

async fn list_by_unknown_database_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let records = s
        .list_by_database("nowhere")
        .await
        .map_err(|e| format!("list_by_database: {e}"))?;
    if !records.is_empty() {
        return Err(format!("expected no records, got {}", records.len()));
    }
    Ok(())
}
