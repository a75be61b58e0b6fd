use std::path::{Path, PathBuf};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::OptimizationRecord;
use crate::traits::RecordStore;

/// A `RecordStore` that writes one JSON file per record.
///
/// Layout: `<base>/<database>/<record id>.json`. Files that cannot be read
/// or decoded are skipped with a warning when listing, so one corrupt file
/// does not hide the rest of the history.
#[derive(Debug)]
pub struct FileRecordStore {
    base: PathBuf,
    lock: RwLock<()>,
}

impl FileRecordStore {
    /// Open (creating if needed) a store rooted at `base`.
    pub async fn open(base: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base = base.into();
        tokio::fs::create_dir_all(&base)
            .await
            .map_err(|e| StorageError::io(&base, e))?;
        Ok(FileRecordStore {
            base,
            lock: RwLock::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    fn database_dir(&self, database: &str) -> Result<PathBuf, StorageError> {
        let trimmed = database.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\', '\0'])
        {
            return Err(StorageError::InvalidDatabaseName(database.to_string()));
        }
        Ok(self.base.join(trimmed))
    }

    async fn database_dirs(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base)
            .await
            .map_err(|e| StorageError::io(&self.base, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.base, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }

    /// Every decodable record under `dir`, paired with its file path.
    async fn read_dir_records(
        &self,
        dir: &Path,
    ) -> Result<Vec<(PathBuf, OptimizationRecord)>, StorageError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(dir, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(dir, e))?
        {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match read_record(&path).await {
                Ok(record) => records.push((path, record)),
                Err(e) => log::warn!("skipping unreadable record file path={} error={}", path.display(), e),
            }
        }
        Ok(records)
    }

    async fn all_records(&self) -> Result<Vec<(PathBuf, OptimizationRecord)>, StorageError> {
        let mut all = Vec::new();
        for dir in self.database_dirs().await? {
            all.extend(self.read_dir_records(&dir).await?);
        }
        Ok(all)
    }
}

async fn read_record(path: &Path) -> Result<OptimizationRecord, StorageError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    Ok(serde_json::from_slice(&data)?)
}

fn newest_first(mut records: Vec<OptimizationRecord>) -> Vec<OptimizationRecord> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\', '\0']) && id != "." && id != ".."
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn save(&self, record: OptimizationRecord) -> Result<(), StorageError> {
        if !valid_id(&record.id) {
            return Err(StorageError::Backend(format!(
                "record id '{}' is not usable as a file name",
                record.id
            )));
        }
        let dir = self.database_dir(&record.database_name)?;
        let data = serde_json::to_vec_pretty(&record)?;

        let _guard = self.lock.write().await;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        // Write then rename so readers never observe a half-written file.
        let path = dir.join(format!("{}.json", record.id));
        let tmp = dir.join(format!(".{}.json.tmp", record.id));
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        log::info!(
            "saved optimization record id={} database={} improvement={:.2} success={}",
            record.id,
            record.database_name,
            record.improvement,
            record.success
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
            let path = dir.join(format!("{}.json", id));
            match tokio::fs::try_exists(&path).await {
                Ok(true) => return read_record(&path).await,
                Ok(false) => continue,
                Err(e) => return Err(StorageError::io(&path, e)),
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
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| StorageError::io(&path, e))?;
                deleted += 1;
            }
        }
        log::info!(
            "deleted old optimization records deleted={} base={}",
            deleted,
            self.base.display()
        );
        Ok(deleted)
    }
}
