use mongotune_core::Settings;
use mongotune_storage::{OptimizationRecord, RecordStore};
use serde_json::json;

use super::{open_store, CommandError};
use crate::OutputFormat;

/// Print stored records, newest first, optionally for one database.
pub(crate) async fn cmd_history(
    settings: &Settings,
    database: Option<&str>,
    limit: usize,
    output: OutputFormat,
) -> Result<(), CommandError> {
    let store = open_store(settings).await?;
    let records = load(store.as_ref(), database, limit).await?;
    match output {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No optimization records found.");
            }
            for record in &records {
                println!("{}", record.summary());
            }
        }
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = records.iter().map(entry).collect();
            println!("{}", serde_json::Value::Array(entries));
        }
    }
    Ok(())
}

pub(crate) async fn load(
    store: &dyn RecordStore,
    database: Option<&str>,
    limit: usize,
) -> Result<Vec<OptimizationRecord>, CommandError> {
    let mut records = match database {
        Some(db) => store.list_by_database(db).await?,
        None => store.list().await?,
    };
    records.truncate(limit);
    Ok(records)
}

/// Summary fields only; reports stay on disk.
fn entry(record: &OptimizationRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "timestamp": record
            .timestamp
            .format(&time::format_description::well_known::Rfc3339)
            .ok(),
        "database": record.database_name,
        "category": record.suggestion.as_ref().map(|s| s.category.as_str()),
        "applied": record.applied,
        "success": record.success,
        "improvement_pct": record.improvement,
        "rollback_required": record.rollback_required,
        "rollback_success": record.rollback_success,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongotune_storage::InMemoryRecordStore;

    #[tokio::test]
    async fn load_filters_by_database_and_limits() {
        let store = InMemoryRecordStore::new();
        for db in ["shop", "shop", "shop", "billing"] {
            store.save(OptimizationRecord::new(db)).await.unwrap();
        }
        assert_eq!(load(&store, Some("shop"), 2).await.unwrap().len(), 2);
        assert_eq!(load(&store, Some("billing"), 10).await.unwrap().len(), 1);
        assert_eq!(load(&store, None, 10).await.unwrap().len(), 4);
        assert!(load(&store, Some("missing"), 10).await.unwrap().is_empty());
    }

    #[test]
    fn json_entry_omits_reports() {
        let mut record = OptimizationRecord::new("shop");
        record.applied = true;
        record.improvement = 12.5;
        let value = entry(&record);
        assert_eq!(value["database"], "shop");
        assert_eq!(value["improvement_pct"], 12.5);
        assert!(value["category"].is_null());
        assert!(value.get("before_report").is_none());
    }
}
