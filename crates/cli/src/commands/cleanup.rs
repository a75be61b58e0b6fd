use mongotune_core::Settings;
use mongotune_storage::RecordStore;
use time::OffsetDateTime;

use super::{open_store, CommandError};
use crate::OutputFormat;

/// Records strictly older than this instant are deleted.
pub(crate) fn retention_cutoff(now: OffsetDateTime, retention_days: u32) -> OffsetDateTime {
    now - time::Duration::days(i64::from(retention_days))
}

pub(crate) async fn cmd_cleanup(
    settings: &Settings,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CommandError> {
    let store = open_store(settings).await?;
    let retention_days = settings.effective_retention_days();
    let cutoff = retention_cutoff(OffsetDateTime::now_utc(), retention_days);
    let deleted = store.delete_older_than(cutoff).await?;
    match output {
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "Deleted {} record(s) older than {} days.",
                    deleted, retention_days
                );
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "deleted": deleted,
                    "retention_days": retention_days,
                })
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongotune_storage::{InMemoryRecordStore, OptimizationRecord};
    use time::macros::datetime;

    #[test]
    fn cutoff_subtracts_whole_days() {
        let now = datetime!(2026-10-19 12:00 UTC);
        assert_eq!(retention_cutoff(now, 90), datetime!(2026-07-21 12:00 UTC));
        assert_eq!(retention_cutoff(now, 0), now);
    }

    #[tokio::test]
    async fn only_records_past_the_window_are_removed() {
        let store = InMemoryRecordStore::new();
        let now = OffsetDateTime::now_utc();
        let mut old = OptimizationRecord::new("shop");
        old.timestamp = now - time::Duration::days(120);
        let mut recent = OptimizationRecord::new("shop");
        recent.timestamp = now - time::Duration::days(10);
        store.save(old).await.unwrap();
        store.save(recent.clone()).await.unwrap();

        let deleted = store
            .delete_older_than(retention_cutoff(now, 90))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        let left = store.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, recent.id);
    }
}
