//! CLI integration tests.
//!
//! Uses `assert_cmd` to spawn the `mongotune` binary and verify exit codes,
//! stdout content, and stderr content. Every test runs inside a fresh
//! temporary directory with the configuration environment cleared, so no
//! local `mongotune.toml` or shell variable leaks in.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use mongotune_storage::{FileRecordStore, OptimizationRecord, RecordStore};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const CONFIG_ENV: &[&str] = &[
    "MONGO_URI",
    "MONGO_DB",
    "STORAGE_PATH",
    "STORAGE_TYPE",
    "S3_BUCKET",
    "S3_REGION",
    "S3_PREFIX",
    "S3_RETENTION_DAYS",
    "S3_CREDENTIALS_FILE",
    "LOG_LEVEL",
    "IMPROVEMENT_THRESHOLD",
    "ENABLE_ROLLBACK",
    "MAX_PARALLEL",
    "MONGOTUNE_LOG",
];

/// Helper: create a Command for the `mongotune` binary, rooted at `dir`.
fn mongotune(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("mongotune");
    cmd.current_dir(dir);
    for key in CONFIG_ENV {
        cmd.env_remove(key);
    }
    cmd
}

/// Write records into a file store under `dir/data`.
fn seed(dir: &Path, records: Vec<OptimizationRecord>) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let store = FileRecordStore::open(dir.join("data")).await.unwrap();
        for record in records {
            store.save(record).await.unwrap();
        }
    });
}

fn record(database: &str, age_days: i64, improvement: f64) -> OptimizationRecord {
    let mut record = OptimizationRecord::new(database);
    record.timestamp = time::OffsetDateTime::now_utc() - time::Duration::days(age_days);
    record.applied = true;
    record.success = improvement > 0.0;
    record.improvement = improvement;
    record
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("multi"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("cleanup"));
}

#[test]
fn version_exits_0() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mongotune"));
}

#[test]
fn unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path()).arg("tune").assert().failure();
}

// ──────────────────────────────────────────────
// 2. Configuration errors
// ──────────────────────────────────────────────

#[test]
fn missing_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .args(["--config", "absent.toml", "history"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error reading config file"));
}

#[test]
fn zero_max_parallel_is_rejected() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .args(["multi", "--databases", "a,b", "--max-parallel", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_parallel"));
}

#[test]
fn bad_environment_value_is_rejected() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .env("IMPROVEMENT_THRESHOLD", "lots")
        .arg("history")
        .assert()
        .failure()
        .stderr(predicate::str::contains("improvement_threshold"));
}

#[test]
fn run_without_database_fails() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no database given"));
}

#[test]
fn multi_without_databases_fails() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .arg("multi")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no databases given"));
}

#[test]
fn json_errors_are_objects() {
    let dir = TempDir::new().unwrap();
    let output = mongotune(dir.path())
        .args(["--output", "json", "run"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    let value: serde_json::Value = serde_json::from_str(stderr.trim()).unwrap();
    assert!(value["error"].as_str().unwrap().contains("no database"));
}

#[test]
fn quiet_suppresses_error_text() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .args(["--quiet", "run"])
        .assert()
        .failure()
        .stderr(predicate::str::is_empty());
}

#[test]
fn s3_storage_without_bucket_is_rejected() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .args(["history", "--storage-type", "s3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("s3.bucket"));
}

#[test]
fn unknown_storage_type_flag_fails() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .args(["history", "--storage-type", "tape"])
        .assert()
        .failure();
}

#[test]
fn s3_retention_from_environment_must_be_a_number() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .env("S3_RETENTION_DAYS", "forever")
        .arg("cleanup")
        .assert()
        .failure()
        .stderr(predicate::str::contains("s3.retention_days"));
}

#[test]
fn config_file_in_working_directory_is_picked_up() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("mongotune.toml"), "database = \"\"\nmax_parallel = 0\n")
        .unwrap();
    mongotune(dir.path())
        .arg("history")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_parallel"));
}

// ──────────────────────────────────────────────
// 3. History
// ──────────────────────────────────────────────

#[test]
fn history_on_empty_store() {
    let dir = TempDir::new().unwrap();
    mongotune(dir.path())
        .args(["history", "--storage-path", "data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No optimization records found."));
}

#[test]
fn history_lists_newest_first() {
    let dir = TempDir::new().unwrap();
    seed(
        dir.path(),
        vec![record("shop", 3, 12.5), record("shop", 1, 40.0), record("billing", 2, -3.0)],
    );
    let output = mongotune(dir.path())
        .args(["history", "--storage-path", "data"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("improvement=40.00%"));
    assert!(lines[1].contains("db=billing"));
    assert!(lines[2].contains("improvement=12.50%"));
}

#[test]
fn history_filters_and_limits_as_json() {
    let dir = TempDir::new().unwrap();
    seed(
        dir.path(),
        vec![
            record("shop", 3, 1.0),
            record("shop", 2, 2.0),
            record("shop", 1, 3.0),
            record("billing", 1, 9.0),
        ],
    );
    let output = mongotune(dir.path())
        .args([
            "--output",
            "json",
            "history",
            "--storage-path",
            "data",
            "--database",
            "shop",
            "--limit",
            "2",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = value.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["improvement_pct"], 3.0);
    assert_eq!(entries[1]["improvement_pct"], 2.0);
    assert!(entries.iter().all(|e| e["database"] == "shop"));
}

#[test]
fn explicit_file_storage_type_reads_the_directory() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), vec![record("shop", 1, 5.0)]);
    mongotune(dir.path())
        .args(["history", "--storage-type", "file", "--storage-path", "data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("db=shop"));
}

#[test]
fn storage_path_comes_from_environment() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), vec![record("shop", 1, 5.0)]);
    mongotune(dir.path())
        .env("STORAGE_PATH", dir.path().join("data"))
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("db=shop"));
}

// ──────────────────────────────────────────────
// 4. Cleanup
// ──────────────────────────────────────────────

#[test]
fn cleanup_removes_records_past_retention() {
    let dir = TempDir::new().unwrap();
    seed(
        dir.path(),
        vec![record("shop", 200, 1.0), record("shop", 100, 2.0), record("shop", 5, 3.0)],
    );
    mongotune(dir.path())
        .args(["cleanup", "--storage-path", "data", "--retention-days", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 2 record(s) older than 30 days."));

    mongotune(dir.path())
        .args(["--output", "json", "history", "--storage-path", "data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"improvement_pct\":3.0"));
}

#[test]
fn s3_retention_is_ignored_for_file_storage() {
    let dir = TempDir::new().unwrap();
    seed(dir.path(), vec![record("shop", 10, 1.0), record("shop", 1, 2.0)]);
    let output = mongotune(dir.path())
        .args([
            "--output",
            "json",
            "cleanup",
            "--storage-path",
            "data",
            "--s3-retention-days",
            "3",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["deleted"], 0);
    assert_eq!(value["retention_days"], 90);
}

#[test]
fn cleanup_uses_configured_retention() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("mongotune.toml"),
        "storage_path = \"data\"\nretention_days = 7\n",
    )
    .unwrap();
    seed(dir.path(), vec![record("shop", 10, 1.0), record("shop", 1, 2.0)]);
    let output = mongotune(dir.path())
        .args(["--output", "json", "cleanup"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["deleted"], 1);
    assert_eq!(value["retention_days"], 7);
}
