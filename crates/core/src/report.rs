//! Performance report snapshots.
//!
//! A `Report` is collected once per database per phase (before / after) and
//! shared by `Arc` between the history, the measurement step and the record
//! handed to storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub current: i64,
    pub available: i64,
    pub total_created: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub resident_mb: i64,
    pub virtual_mb: i64,
    pub page_faults: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpCounters {
    pub insert: i64,
    pub query: i64,
    pub update: i64,
    pub delete: i64,
    pub getmore: i64,
    pub command: i64,
}

/// Cumulative latency counters for one operation class, as `serverStatus`
/// reports them under `opLatencies`: total time spent and number of
/// operations since the server started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpLatency {
    pub total_micros: f64,
    pub ops: f64,
}

impl OpLatency {
    pub fn new(total_micros: f64, ops: f64) -> Self {
        OpLatency { total_micros, ops }
    }

    /// Mean latency since server start. `None` before any operation.
    pub fn average(&self) -> Option<f64> {
        if self.ops > 0.0 {
            Some(self.total_micros / self.ops).filter(|v| v.is_finite())
        } else {
            None
        }
    }

    /// Mean latency of the operations that ran between `earlier` and this
    /// snapshot.
    ///
    /// Counters that went backwards mean the server restarted in between;
    /// everything counted since then belongs to the window, so this
    /// snapshot's own average is used. `None` when no operation ran.
    pub fn window_since(&self, earlier: &OpLatency) -> Option<f64> {
        let ops = self.ops - earlier.ops;
        let total = self.total_micros - earlier.total_micros;
        if ops < 0.0 || total < 0.0 {
            return self.average();
        }
        if ops == 0.0 {
            return None;
        }
        Some(total / ops).filter(|v| v.is_finite())
    }
}

/// Latency counters per operation class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub reads: OpLatency,
    pub writes: OpLatency,
    pub commands: OpLatency,
}

impl LatencyStats {
    /// Each class with the metric name it is reported under.
    pub fn classes(&self) -> [(&'static str, &OpLatency); 3] {
        [
            ("read_latency_micros", &self.reads),
            ("write_latency_micros", &self.writes),
            ("command_latency_micros", &self.commands),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub host: String,
    pub version: String,
    pub uptime_secs: f64,
    pub connections: ConnectionStats,
    pub memory: MemoryStats,
    pub opcounters: OpCounters,
    pub latency: LatencyStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub name: String,
    pub collections: i64,
    pub objects: i64,
    pub data_size: f64,
    pub storage_size: f64,
    pub index_size: f64,
    pub index_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub size: f64,
    pub count: i64,
    pub avg_obj_size: f64,
    pub storage_size: f64,
    pub capped: bool,
    #[serde(default)]
    pub index_sizes: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: String,
    /// The key pattern rendered as JSON text.
    pub key_pattern: String,
    pub accesses: i64,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
}

/// A point-in-time performance snapshot of one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(with = "time::serde::rfc3339")]
    pub collected_at: OffsetDateTime,
    pub database: String,
    pub server: ServerStats,
    pub database_stats: DatabaseStats,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionStats>,
    #[serde(default)]
    pub indexes: BTreeMap<String, Vec<IndexStats>>,
}

impl Report {
    pub fn new(database: impl Into<String>) -> Self {
        Report {
            collected_at: OffsetDateTime::now_utc(),
            database: database.into(),
            server: ServerStats::default(),
            database_stats: DatabaseStats::default(),
            collections: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Mean latency per operation class since server start.
    ///
    /// The underlying counters are cumulative, so this is a lifetime
    /// average. Compare snapshots with [`window_metrics`](Self::window_metrics).
    /// Classes with no operations, or a zero average, are omitted.
    pub fn key_metrics(&self) -> BTreeMap<&'static str, f64> {
        self.server
            .latency
            .classes()
            .into_iter()
            .filter_map(|(name, class)| {
                class.average().filter(|v| *v > 0.0).map(|v| (name, v))
            })
            .collect()
    }

    /// Mean latency per operation class over the operations that ran
    /// between `earlier` and this report. Classes with no operations in the
    /// window are omitted.
    pub fn window_metrics(&self, earlier: &Report) -> BTreeMap<&'static str, f64> {
        let previous = earlier.server.latency.classes();
        self.server
            .latency
            .classes()
            .into_iter()
            .zip(previous)
            .filter_map(|((name, now), (_, then))| now.window_since(then).map(|v| (name, v)))
            .collect()
    }

    pub fn index_names(&self, collection: &str) -> Vec<&str> {
        self.indexes
            .get(collection)
            .map(|idx| idx.iter().map(|i| i.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Compact JSON rendering used when embedding the report in prompts.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
