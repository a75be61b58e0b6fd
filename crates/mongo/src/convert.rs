//! BSON ↔ JSON bridging and decoding of diagnostic command responses.

use mongodb::bson::{self, Bson, Document};
use mongotune_core::{
    CollectionStats, DatabaseStats, IndexStats, LatencyStats, OpLatency, ServerStats,
};
use serde_json::Value;

/// Convert a JSON object into a command document, keeping key order.
pub fn to_document(value: &Value) -> Result<Document, bson::ser::Error> {
    bson::to_document(value)
}

/// Relaxed extended JSON: plain numbers for every numeric BSON type.
pub fn to_json(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

fn at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |v, key| v.as_object().and_then(|o| o.get(*key)))
}

fn number(value: &Value, path: &[&str]) -> f64 {
    at(value, path).and_then(Value::as_f64).unwrap_or(0.0)
}

fn int(value: &Value, path: &[&str]) -> i64 {
    at(value, path)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

fn string(value: &Value, path: &[&str]) -> String {
    at(value, path)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn boolean(value: &Value, path: &[&str]) -> bool {
    at(value, path).and_then(Value::as_bool).unwrap_or(false)
}

/// Raw cumulative counters for one `opLatencies` class.
fn op_latency(status: &Value, class: &str) -> OpLatency {
    OpLatency::new(
        number(status, &["opLatencies", class, "latency"]),
        number(status, &["opLatencies", class, "ops"]),
    )
}

/// Decode a `serverStatus` response.
pub fn server_stats(status: &Value) -> ServerStats {
    let mut stats = ServerStats {
        host: string(status, &["host"]),
        version: string(status, &["version"]),
        uptime_secs: number(status, &["uptime"]),
        latency: LatencyStats {
            reads: op_latency(status, "reads"),
            writes: op_latency(status, "writes"),
            commands: op_latency(status, "commands"),
        },
        ..ServerStats::default()
    };
    stats.connections.current = int(status, &["connections", "current"]);
    stats.connections.available = int(status, &["connections", "available"]);
    stats.connections.total_created = int(status, &["connections", "totalCreated"]);
    stats.memory.resident_mb = int(status, &["mem", "resident"]);
    stats.memory.virtual_mb = int(status, &["mem", "virtual"]);
    stats.memory.page_faults = int(status, &["extra_info", "page_faults"]);
    let ops = &mut stats.opcounters;
    ops.insert = int(status, &["opcounters", "insert"]);
    ops.query = int(status, &["opcounters", "query"]);
    ops.update = int(status, &["opcounters", "update"]);
    ops.delete = int(status, &["opcounters", "delete"]);
    ops.getmore = int(status, &["opcounters", "getmore"]);
    ops.command = int(status, &["opcounters", "command"]);
    stats
}

/// Decode a `dbStats` response.
pub fn database_stats(database: &str, stats: &Value) -> DatabaseStats {
    DatabaseStats {
        name: database.to_string(),
        collections: int(stats, &["collections"]),
        objects: int(stats, &["objects"]),
        data_size: number(stats, &["dataSize"]),
        storage_size: number(stats, &["storageSize"]),
        index_size: number(stats, &["indexSize"]),
        index_count: int(stats, &["indexes"]),
    }
}

/// Decode a `collStats` response.
pub fn collection_stats(collection: &str, stats: &Value) -> CollectionStats {
    let index_sizes = at(stats, &["indexSizes"])
        .and_then(Value::as_object)
        .map(|sizes| {
            sizes
                .iter()
                .filter_map(|(name, v)| v.as_f64().map(|size| (name.clone(), size)))
                .collect()
        })
        .unwrap_or_default();
    CollectionStats {
        name: collection.to_string(),
        size: number(stats, &["size"]),
        count: int(stats, &["count"]),
        avg_obj_size: number(stats, &["avgObjSize"]),
        storage_size: number(stats, &["storageSize"]),
        capped: boolean(stats, &["capped"]),
        index_sizes,
    }
}

/// Decode one `$indexStats` output document.
pub fn index_stats(entry: &Value) -> IndexStats {
    IndexStats {
        name: string(entry, &["name"]),
        key_pattern: at(entry, &["key"])
            .map(Value::to_string)
            .unwrap_or_else(|| "{}".to_string()),
        accesses: int(entry, &["accesses", "ops"]),
        unique: boolean(entry, &["spec", "unique"]),
        sparse: boolean(entry, &["spec", "sparse"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use serde_json::json;

    #[test]
    fn command_documents_keep_key_order() {
        let doc = to_document(&json!({"createIndexes": "orders", "indexes": [{"key": {"b": 1, "a": -1}, "name": "b_1_a_-1"}]}))
            .unwrap();
        assert_eq!(doc.keys().next().map(String::as_str), Some("createIndexes"));
        let key = doc.get_array("indexes").unwrap()[0]
            .as_document()
            .unwrap()
            .get_document("key")
            .unwrap();
        assert_eq!(key.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn numeric_bson_types_become_plain_json_numbers() {
        let value = to_json(doc! {"a": 1_i32, "b": 2_i64, "c": 2.5});
        assert_eq!(value, json!({"a": 1, "b": 2, "c": 2.5}));
    }

    #[test]
    fn server_status_keeps_raw_latency_counters() {
        let status = json!({
            "host": "db-1:27017",
            "version": "7.0.4",
            "uptime": 3600.0,
            "connections": {"current": 12, "available": 800, "totalCreated": 40},
            "opcounters": {"query": 1500, "insert": 20},
            "opLatencies": {
                "reads": {"latency": 90000, "ops": 300},
                "writes": {"latency": 0, "ops": 0}
            }
        });
        let stats = server_stats(&status);
        assert_eq!(stats.host, "db-1:27017");
        assert_eq!(stats.connections.available, 800);
        assert_eq!(stats.opcounters.query, 1500);
        assert_eq!(stats.latency.reads, OpLatency::new(90000.0, 300.0));
        assert_eq!(stats.latency.reads.average(), Some(300.0));
        assert_eq!(stats.latency.writes.average(), None);
    }

    #[test]
    fn index_stats_reads_accesses_and_spec() {
        let entry = json!({
            "name": "sku_1",
            "key": {"sku": 1},
            "accesses": {"ops": 42, "since": "2026-10-01T00:00:00Z"},
            "spec": {"unique": true}
        });
        let stats = index_stats(&entry);
        assert_eq!(stats.name, "sku_1");
        assert_eq!(stats.key_pattern, r#"{"sku":1}"#);
        assert_eq!(stats.accesses, 42);
        assert!(stats.unique);
        assert!(!stats.sparse);
    }

    #[test]
    fn collection_stats_collects_index_sizes() {
        let stats = collection_stats(
            "orders",
            &json!({"size": 2048.0, "count": 10, "indexSizes": {"_id_": 4096, "sku_1": 2048}}),
        );
        assert_eq!(stats.count, 10);
        assert_eq!(stats.index_sizes.len(), 2);
        assert_eq!(stats.index_sizes["sku_1"], 2048.0);
    }
}
