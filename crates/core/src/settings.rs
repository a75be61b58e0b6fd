//! Runtime settings for an optimization run.
//!
//! Settings are layered: defaults, then an optional TOML file (parsed by the
//! binary), then environment variables via [`Settings::apply_env_with`], then
//! command-line flags. The result is passed by reference into constructors;
//! nothing reads the environment after start-up.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Order in which a suggestion's operations are undone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackOrder {
    /// Last operation first.
    #[default]
    Reverse,
    /// Operation list order.
    Forward,
}

impl std::str::FromStr for RollbackOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reverse" => Ok(RollbackOrder::Reverse),
            "forward" => Ok(RollbackOrder::Forward),
            other => Err(ConfigError::Invalid {
                key: "rollback_order",
                reason: format!("expected 'reverse' or 'forward', got '{}'", other),
            }),
        }
    }
}

/// Backend holding the optimization records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// One JSON file per record under `storage_path`.
    #[default]
    File,
    /// One JSON object per record in an S3 bucket.
    S3,
}

impl std::str::FromStr for StorageType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageType::File),
            "s3" => Ok(StorageType::S3),
            other => Err(ConfigError::Invalid {
                key: "storage_type",
                reason: format!("expected 'file' or 's3', got '{}'", other),
            }),
        }
    }
}

/// Where and how records are kept when `storage_type` is `s3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Key prefix every record object is written under.
    pub prefix: String,
    /// Overrides `retention_days` for cleanup of the bucket.
    pub retention_days: Option<u32>,
    /// AWS shared-credentials file. Unset means the default provider chain.
    pub credentials_file: Option<PathBuf>,
}

impl Default for S3Settings {
    fn default() -> Self {
        S3Settings {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            prefix: "optimization-records/".to_string(),
            retention_days: None,
            credentials_file: None,
        }
    }
}

/// Connection details for the OpenAI-compatible recommendation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mongo_uri: String,
    /// Single target database for `run`.
    pub database: Option<String>,
    /// Target databases for `multi`.
    pub databases: Vec<String>,
    pub storage_type: StorageType,
    pub storage_path: PathBuf,
    pub s3: S3Settings,
    pub log_level: String,
    /// Minimum improvement percentage that counts as success.
    pub improvement_threshold: f64,
    pub enable_rollback: bool,
    pub max_parallel: usize,
    /// Collect before-reports only; never apply anything.
    pub compare_only: bool,
    pub rollback_order: RollbackOrder,
    pub retention_days: u32,
    pub llm: LlmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            database: None,
            databases: Vec::new(),
            storage_type: StorageType::File,
            storage_path: PathBuf::from("./data"),
            s3: S3Settings::default(),
            log_level: "info".to_string(),
            improvement_threshold: 5.0,
            enable_rollback: true,
            max_parallel: 2,
            compare_only: false,
            rollback_order: RollbackOrder::Reverse,
            retention_days: 90,
            llm: LlmSettings::default(),
        }
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

impl Settings {
    /// Retention window for `cleanup`: the S3 override when records live in
    /// a bucket, `retention_days` otherwise.
    pub fn effective_retention_days(&self) -> u32 {
        match self.storage_type {
            StorageType::S3 => self.s3.retention_days.unwrap_or(self.retention_days),
            StorageType::File => self.retention_days,
        }
    }

    /// Overlay environment variables read through `lookup`.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production and a map in
    /// tests. Unset or empty variables leave the current value in place.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MONGO_URI") {
            self.mongo_uri = v;
        }
        if let Some(v) = get("MONGO_DB") {
            self.database = Some(v);
        }
        if let Some(v) = get("STORAGE_PATH") {
            self.storage_path = PathBuf::from(v);
        }
        if let Some(v) = get("STORAGE_TYPE") {
            self.storage_type = v.parse()?;
        }
        if let Some(v) = get("S3_BUCKET") {
            self.s3.bucket = v;
        }
        if let Some(v) = get("S3_REGION") {
            self.s3.region = v;
        }
        if let Some(v) = get("S3_PREFIX") {
            self.s3.prefix = v;
        }
        if let Some(v) = get("S3_RETENTION_DAYS") {
            self.s3.retention_days = Some(v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "s3.retention_days",
                reason: format!("expected a number of days, got '{}'", v),
            })?);
        }
        if let Some(v) = get("S3_CREDENTIALS_FILE") {
            self.s3.credentials_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("IMPROVEMENT_THRESHOLD") {
            self.improvement_threshold =
                v.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "improvement_threshold",
                    reason: format!("expected a number, got '{}'", v),
                })?;
        }
        if let Some(v) = get("ENABLE_ROLLBACK") {
            self.enable_rollback = parse_bool("enable_rollback", &v)?;
        }
        if let Some(v) = get("MAX_PARALLEL") {
            self.max_parallel = v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "max_parallel",
                reason: format!("expected a positive integer, got '{}'", v),
            })?;
        }
        Ok(())
    }

    /// Check required fields and ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mongo_uri.trim().is_empty() {
            return Err(ConfigError::Missing("mongo_uri"));
        }
        match self.storage_type {
            StorageType::File if self.storage_path.as_os_str().is_empty() => {
                return Err(ConfigError::Missing("storage_path"));
            }
            StorageType::S3 if self.s3.bucket.trim().is_empty() => {
                return Err(ConfigError::Missing("s3.bucket"));
            }
            StorageType::S3 if self.s3.region.trim().is_empty() => {
                return Err(ConfigError::Missing("s3.region"));
            }
            _ => {}
        }
        if !self.improvement_threshold.is_finite() {
            return Err(ConfigError::Invalid {
                key: "improvement_threshold",
                reason: "must be a finite number".to_string(),
            });
        }
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid {
                key: "max_parallel",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
