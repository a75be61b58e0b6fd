//! Settings loading: TOML file, then environment, then command-line flags.

use std::path::{Path, PathBuf};

use mongotune_core::{ConfigError, RollbackOrder, Settings, StorageType};

/// Default config file looked up in the working directory when `--config`
/// is not given.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "mongotune.toml";

#[derive(Debug, thiserror::Error)]
pub(crate) enum LoadError {
    #[error("error reading config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}

/// Flag values that override the file and environment. `None` leaves the
/// lower layer in place.
#[derive(Debug, Default, Clone)]
pub(crate) struct Overrides {
    pub mongo_uri: Option<String>,
    pub database: Option<String>,
    pub databases: Option<Vec<String>>,
    pub storage_type: Option<StorageType>,
    pub storage_path: Option<PathBuf>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_prefix: Option<String>,
    pub s3_retention_days: Option<u32>,
    pub s3_credentials: Option<PathBuf>,
    pub log_level: Option<String>,
    pub threshold: Option<f64>,
    pub no_rollback: bool,
    pub max_parallel: Option<usize>,
    pub compare_only: bool,
    pub rollback_order: Option<RollbackOrder>,
    pub retention_days: Option<u32>,
    pub model: Option<String>,
}

impl Overrides {
    fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.mongo_uri {
            settings.mongo_uri = v;
        }
        if let Some(v) = self.database {
            settings.database = Some(v);
        }
        if let Some(v) = self.databases {
            settings.databases = v;
        }
        if let Some(v) = self.storage_type {
            settings.storage_type = v;
        }
        if let Some(v) = self.storage_path {
            settings.storage_path = v;
        }
        if let Some(v) = self.s3_bucket {
            settings.s3.bucket = v;
        }
        if let Some(v) = self.s3_region {
            settings.s3.region = v;
        }
        if let Some(v) = self.s3_prefix {
            settings.s3.prefix = v;
        }
        if let Some(v) = self.s3_retention_days {
            settings.s3.retention_days = Some(v);
        }
        if let Some(v) = self.s3_credentials {
            settings.s3.credentials_file = Some(v);
        }
        if let Some(v) = self.log_level {
            settings.log_level = v;
        }
        if let Some(v) = self.threshold {
            settings.improvement_threshold = v;
        }
        if self.no_rollback {
            settings.enable_rollback = false;
        }
        if let Some(v) = self.max_parallel {
            settings.max_parallel = v;
        }
        if self.compare_only {
            settings.compare_only = true;
        }
        if let Some(v) = self.rollback_order {
            settings.rollback_order = v;
        }
        if let Some(v) = self.retention_days {
            settings.retention_days = v;
        }
        if let Some(v) = self.model {
            settings.llm.model = v;
        }
    }
}

fn read_file(path: &Path) -> Result<Settings, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Build settings from every layer and validate the result.
///
/// An explicit `config` path must exist; the default file is optional.
pub(crate) fn load_with<F>(
    config: Option<&Path>,
    env: F,
    overrides: Overrides,
) -> Result<Settings, LoadError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match config {
        Some(path) => read_file(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                read_file(default)?
            } else {
                Settings::default()
            }
        }
    };
    settings.apply_env_with(env)?;
    overrides.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

pub(crate) fn load(config: Option<&Path>, overrides: Overrides) -> Result<Settings, LoadError> {
    load_with(config, |key| std::env::var(key).ok(), overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn flags_override_environment_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "mongo_uri = \"mongodb://file:27017\"\nmax_parallel = 3\nimprovement_threshold = 7.5\n\n[llm]\nmodel = \"gpt-4o-mini\""
        )
        .unwrap();
        let env: HashMap<&str, &str> = [("MONGO_URI", "mongodb://env:27017"), ("MAX_PARALLEL", "4")]
            .into_iter()
            .collect();
        let overrides = Overrides {
            max_parallel: Some(6),
            ..Overrides::default()
        };

        let settings = load_with(
            Some(file.path()),
            |k| env.get(k).map(|v| v.to_string()),
            overrides,
        )
        .unwrap();
        assert_eq!(settings.mongo_uri, "mongodb://env:27017");
        assert_eq!(settings.max_parallel, 6);
        assert_eq!(settings.improvement_threshold, 7.5);
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.retention_days, 90);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_with(
            Some(Path::new("/nonexistent/mongotune.toml")),
            no_env,
            Overrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }

    #[test]
    fn invalid_result_is_rejected() {
        let overrides = Overrides {
            max_parallel: Some(0),
            ..Overrides::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();
        let err = load_with(Some(&path), no_env, overrides).unwrap_err();
        assert!(matches!(err, LoadError::Invalid(ConfigError::Invalid { .. })));
    }

    #[test]
    fn no_rollback_and_compare_only_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "rollback_order = \"forward\"").unwrap();
        let settings = load_with(
            Some(&path),
            no_env,
            Overrides {
                no_rollback: true,
                compare_only: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        assert!(!settings.enable_rollback);
        assert!(settings.compare_only);
        assert_eq!(settings.rollback_order, RollbackOrder::Forward);
    }

    #[test]
    fn s3_flags_override_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(
            &path,
            "storage_type = \"s3\"\n\n[s3]\nbucket = \"from-file\"\nprefix = \"tuning/\"\n",
        )
        .unwrap();
        let settings = load_with(
            Some(&path),
            no_env,
            Overrides {
                s3_bucket: Some("from-flag".to_string()),
                s3_retention_days: Some(14),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.storage_type, StorageType::S3);
        assert_eq!(settings.s3.bucket, "from-flag");
        assert_eq!(settings.s3.prefix, "tuning/");
        assert_eq!(settings.s3.region, "us-east-1");
        assert_eq!(settings.effective_retention_days(), 14);
    }

    #[test]
    fn s3_storage_without_bucket_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "").unwrap();
        let err = load_with(
            Some(&path),
            no_env,
            Overrides {
                storage_type: Some(StorageType::S3),
                ..Overrides::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Invalid(ConfigError::Missing("s3.bucket"))));
    }
}
