use std::path::Path as FsPath;
use std::sync::Arc;

use async_trait::async_trait;
use mongotune_core::S3Settings;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::OptimizationRecord;
use crate::traits::RecordStore;

/// A `RecordStore` that keeps one JSON object per record in an object store.
///
/// Layout: `<prefix>/<database>/<record id>.json`, mirroring the directory
/// layout of [`FileRecordStore`](crate::FileRecordStore). Objects that
/// cannot be fetched or decoded are skipped with a warning when listing.
pub struct ObjectRecordStore {
    store: Arc<dyn ObjectStore>,
    root: Path,
    lock: RwLock<()>,
}

impl std::fmt::Debug for ObjectRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRecordStore")
            .field("store", &self.store.to_string())
            .field("root", &self.root.as_ref())
            .finish()
    }
}

/// Static keys read from an AWS shared-credentials file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

fn backend(e: object_store::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

impl ObjectRecordStore {
    /// Wrap an existing object store. `prefix` is split on `/`; empty
    /// segments are ignored.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        let root = Path::from_iter(prefix.split('/').filter(|s| !s.is_empty()));
        ObjectRecordStore {
            store,
            root,
            lock: RwLock::new(()),
        }
    }

    /// Connect to the bucket named in `settings` and check it can be listed.
    ///
    /// Credentials come from `settings.credentials_file` when set (profile
    /// `AWS_PROFILE`, else `default`), otherwise from the usual `AWS_*`
    /// environment variables.
    pub async fn s3(settings: &S3Settings) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region);
        if let Some(path) = &settings.credentials_file {
            let profile = std::env::var("AWS_PROFILE").unwrap_or_else(|_| "default".to_string());
            let creds = load_credentials(path, &profile).await?;
            builder = builder
                .with_access_key_id(creds.access_key_id)
                .with_secret_access_key(creds.secret_access_key);
            if let Some(token) = creds.session_token {
                builder = builder.with_token(token);
            }
        }
        let store = Self::new(Arc::new(builder.build().map_err(backend)?), &settings.prefix);

        store
            .store
            .list_with_delimiter(store.prefix())
            .await
            .map_err(|e| {
                StorageError::Backend(format!(
                    "cannot access bucket '{}': {}",
                    settings.bucket, e
                ))
            })?;
        log::info!(
            "opened object record store bucket={} region={} prefix={}",
            settings.bucket,
            settings.region,
            store.root.as_ref()
        );
        Ok(store)
    }

    fn prefix(&self) -> Option<&Path> {
        (!self.root.as_ref().is_empty()).then_some(&self.root)
    }

    fn database_dir(&self, database: &str) -> Result<Path, StorageError> {
        let trimmed = database.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\', '\0'])
        {
            return Err(StorageError::InvalidDatabaseName(database.to_string()));
        }
        Ok(self.root.child(trimmed))
    }

    fn record_path(dir: &Path, id: &str) -> Path {
        dir.child(format!("{}.json", id))
    }

    async fn database_dirs(&self) -> Result<Vec<Path>, StorageError> {
        let listing = self
            .store
            .list_with_delimiter(self.prefix())
            .await
            .map_err(backend)?;
        Ok(listing.common_prefixes)
    }

    /// Every decodable record under `dir`, paired with its object path.
    async fn read_dir_records(
        &self,
        dir: &Path,
    ) -> Result<Vec<(Path, OptimizationRecord)>, StorageError> {
        let listing = self
            .store
            .list_with_delimiter(Some(dir))
            .await
            .map_err(backend)?;

        let mut records = Vec::new();
        for meta in listing.objects {
            let path = meta.location;
            if !path.filename().is_some_and(|f| f.ends_with(".json")) {
                continue;
            }
            match self.read_record(&path).await {
                Ok(record) => records.push((path, record)),
                Err(e) => log::warn!("skipping unreadable record object path={} error={}", path, e),
            }
        }
        Ok(records)
    }

    async fn all_records(&self) -> Result<Vec<(Path, OptimizationRecord)>, StorageError> {
        let mut all = Vec::new();
        for dir in self.database_dirs().await? {
            all.extend(self.read_dir_records(&dir).await?);
        }
        Ok(all)
    }

    async fn read_record(&self, path: &Path) -> Result<OptimizationRecord, StorageError> {
        let data = self
            .store
            .get(path)
            .await
            .map_err(backend)?
            .bytes()
            .await
            .map_err(backend)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

fn newest_first(mut records: Vec<OptimizationRecord>) -> Vec<OptimizationRecord> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\', '\0']) && id != "." && id != ".."
}

#[async_trait]
impl RecordStore for ObjectRecordStore {
    async fn save(&self, record: OptimizationRecord) -> Result<(), StorageError> {
        if !valid_id(&record.id) {
            return Err(StorageError::Backend(format!(
                "record id '{}' is not usable as an object key",
                record.id
            )));
        }
        let dir = self.database_dir(&record.database_name)?;
        let data = serde_json::to_vec_pretty(&record)?;
        let path = Self::record_path(&dir, &record.id);

        // a single put is atomic, readers see the old object or the new one
        let _guard = self.lock.write().await;
        self.store
            .put(&path, PutPayload::from(data))
            .await
            .map_err(backend)?;

        log::info!(
            "saved optimization record id={} database={} improvement={:.2} success={} key={}",
            record.id,
            record.database_name,
            record.improvement,
            record.success,
            path
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<OptimizationRecord, StorageError> {
        let not_found = || StorageError::RecordNotFound { id: id.to_string() };
        if !valid_id(id) {
            return Err(not_found());
        }
        let _guard = self.lock.read().await;
        for dir in self.database_dirs().await? {
            let path = Self::record_path(&dir, id);
            match self.store.get(&path).await {
                Ok(found) => {
                    let data = found.bytes().await.map_err(backend)?;
                    return Ok(serde_json::from_slice(&data)?);
                }
                Err(object_store::Error::NotFound { .. }) => continue,
                Err(e) => return Err(backend(e)),
            }
        }
        Err(not_found())
    }

    async fn list(&self) -> Result<Vec<OptimizationRecord>, StorageError> {
        let _guard = self.lock.read().await;
        let records = self.all_records().await?.into_iter().map(|(_, r)| r).collect();
        Ok(newest_first(records))
    }

    async fn list_by_database(
        &self,
        database: &str,
    ) -> Result<Vec<OptimizationRecord>, StorageError> {
        let dir = match self.database_dir(database) {
            Ok(dir) => dir,
            Err(_) => return Ok(Vec::new()),
        };
        let _guard = self.lock.read().await;
        let records = self
            .read_dir_records(&dir)
            .await?
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        Ok(newest_first(records))
    }

    async fn latest(&self) -> Result<OptimizationRecord, StorageError> {
        self.list().await?.into_iter().next().ok_or(StorageError::Empty)
    }

    async fn delete_older_than(&self, cutoff: OffsetDateTime) -> Result<usize, StorageError> {
        let _guard = self.lock.write().await;
        let mut deleted = 0usize;
        for (path, record) in self.all_records().await? {
            if record.timestamp < cutoff {
                self.store.delete(&path).await.map_err(backend)?;
                deleted += 1;
            }
        }
        log::info!(
            "deleted old optimization records deleted={} store={} prefix={}",
            deleted,
            self.store,
            self.root.as_ref()
        );
        Ok(deleted)
    }
}

// ──────────────────────────────────────────────
// Shared-credentials file
// ──────────────────────────────────────────────

async fn load_credentials(path: &FsPath, profile: &str) -> Result<StaticCredentials, StorageError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    parse_credentials(&text, profile).ok_or_else(|| {
        StorageError::Backend(format!(
            "no access key pair for profile '{}' in {}",
            profile,
            path.display()
        ))
    })
}

/// Read the `[profile]` section of an INI-style AWS credentials file.
/// Returns `None` unless both the key id and the secret are present.
pub fn parse_credentials(text: &str, profile: &str) -> Option<StaticCredentials> {
    let mut in_profile = false;
    let mut key_id = None;
    let mut secret = None;
    let mut token = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(['#', ';']) {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "aws_access_key_id" => key_id = Some(value),
            "aws_secret_access_key" => secret = Some(value),
            "aws_session_token" => token = Some(value),
            _ => {}
        }
    }
    Some(StaticCredentials {
        access_key_id: key_id?,
        secret_access_key: secret?,
        session_token: token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn object_store_conformance() {
        let report = run_conformance_suite(|| async {
            ObjectRecordStore::new(Arc::new(InMemory::new()), "optimization-records/")
        })
        .await;
        assert!(report.failed == 0, "{report}");
    }

    #[tokio::test]
    async fn unprefixed_store_conformance() {
        let report =
            run_conformance_suite(|| async { ObjectRecordStore::new(Arc::new(InMemory::new()), "") })
                .await;
        assert!(report.failed == 0, "{report}");
    }

    #[tokio::test]
    async fn writes_one_object_per_record_under_prefix_and_database() {
        let backing = Arc::new(InMemory::new());
        let store = ObjectRecordStore::new(backing.clone(), "/tuning//records/");
        let record = OptimizationRecord::new("shop");
        let id = record.id.clone();
        store.save(record).await.unwrap();

        let key = Path::from(format!("tuning/records/shop/{id}.json"));
        let data = backing.get(&key).await.unwrap().bytes().await.unwrap();
        let decoded: OptimizationRecord = serde_json::from_slice(&data).unwrap();
        assert_eq!(decoded.database_name, "shop");
    }

    #[tokio::test]
    async fn corrupt_objects_are_skipped_when_listing() {
        let backing = Arc::new(InMemory::new());
        let store = ObjectRecordStore::new(backing.clone(), "records");
        store.save(OptimizationRecord::new("shop")).await.unwrap();
        backing
            .put(
                &Path::from("records/shop/garbage.json"),
                PutPayload::from_static(b"{not json"),
            )
            .await
            .unwrap();
        backing
            .put(&Path::from("records/shop/notes.txt"), PutPayload::from_static(b"hi"))
            .await
            .unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(store.list_by_database("shop").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_path_like_database_names() {
        let store = ObjectRecordStore::new(Arc::new(InMemory::new()), "records");
        let err = store
            .save(OptimizationRecord::new("a/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidDatabaseName(_)));
    }

    #[tokio::test]
    async fn records_outside_the_prefix_are_invisible() {
        let backing = Arc::new(InMemory::new());
        let other = ObjectRecordStore::new(backing.clone(), "other");
        other.save(OptimizationRecord::new("shop")).await.unwrap();

        let store = ObjectRecordStore::new(backing, "records");
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(store.latest().await, Err(StorageError::Empty)));
    }

    #[test]
    fn credentials_are_read_from_the_named_profile() {
        let text = "\
# shared credentials
[default]
aws_access_key_id = AKIADEFAULT
aws_secret_access_key = defaultsecret

[ci]
aws_access_key_id=AKIACI
aws_secret_access_key=cisecret
aws_session_token=citoken
";
        let default = parse_credentials(text, "default").unwrap();
        assert_eq!(default.access_key_id, "AKIADEFAULT");
        assert_eq!(default.secret_access_key, "defaultsecret");
        assert_eq!(default.session_token, None);

        let ci = parse_credentials(text, "ci").unwrap();
        assert_eq!(ci.access_key_id, "AKIACI");
        assert_eq!(ci.session_token.as_deref(), Some("citoken"));

        assert_eq!(parse_credentials(text, "prod"), None);
    }

    #[test]
    fn incomplete_profile_yields_no_credentials() {
        let text = "[default]\naws_access_key_id = AKIAONLY\n";
        assert_eq!(parse_credentials(text, "default"), None);
    }

    #[tokio::test]
    async fn missing_credentials_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_credentials(&dir.path().join("absent"), "default")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
