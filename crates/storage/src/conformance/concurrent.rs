use std::future::Future;
use std::sync::Arc;

use super::{make_record, TestResult};
use crate::{RecordStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_saves_all_retained",
            concurrent_saves_all_retained(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_saves_across_databases",
            concurrent_saves_across_databases(factory).await,
        ),
    ]
}

// ── Concurrent saves to one database: none lost ─────────────────────────────

/// N tasks save distinct records into the same database at once, as the
/// orchestrator's workers do. Every record must be readable afterwards.
async fn concurrent_saves_all_retained<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.save(make_record(&format!("rec-{i}"), "shop", i as i64))
                .await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e: StorageError| format!("task {i} failed: {e}"))?;
    }

    let records = storage
        .list_by_database("shop")
        .await
        .map_err(|e| format!("list_by_database: {e}"))?;
    if records.len() != N {
        return Err(format!("expected {N} records, got {}", records.len()));
    }
    for i in 0..N {
        storage
            .get(&format!("rec-{i}"))
            .await
            .map_err(|e| format!("get rec-{i}: {e}"))?;
    }
    Ok(())
}

// ── Concurrent saves to different databases ─────────────────────────────────

async fn concurrent_saves_across_databases<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.save(make_record(&format!("rec-{i}"), &format!("db-{i}"), 0))
                .await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e: StorageError| format!("task {i} failed: {e}"))?;
    }

    for i in 0..N {
        let records = storage
            .list_by_database(&format!("db-{i}"))
            .await
            .map_err(|e| format!("list_by_database db-{i}: {e}"))?;
        if records.len() != 1 {
            return Err(format!("db-{i}: expected 1 record, got {}", records.len()));
        }
    }
    let all = storage.list().await.map_err(|e| format!("list: {e}"))?;
    if all.len() != N {
        return Err(format!("expected {N} records in total, got {}", all.len()));
    }
    Ok(())
}
