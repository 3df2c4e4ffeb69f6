use crate::config::StoreConfig;
use crate::profile::ProfileRecord;
use serde_yaml_ng as serde_yaml;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Errors raised while reading or writing the profile document
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("No streamer id left after {max}")]
    IdsExhausted { max: u64 },
}

/// Result of an upsert
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// Id of the stored record (assigned by the store on creation)
    pub id: u64,
    /// True when a new record was appended
    pub created: bool,
    /// True when the digital human needs preprocessing
    pub needs_preprocess: bool,
    /// The record exactly as persisted
    pub record: ProfileRecord,
}

/// Streamer profiles persisted as one YAML list
///
/// The document is read whole, changed in memory and written back whole.
/// Every read-modify-write cycle holds `write_lock`, so concurrent edits
/// can neither lose updates nor hand out the same id twice.
pub struct ProfileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProfileStore {
    /// Open the store, creating an empty document if none exists yet
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let path = config.streamer_config_path.clone();

        if tokio::fs::try_exists(&path).await.map_err(|e| io_error(&path, e))? {
            info!(path = %path.display(), "Using existing streamer profile store");
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }
            write_document(&path, &[]).await?;
            info!(path = %path.display(), "Created empty streamer profile store");
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in storage order, unfiltered
    pub async fn list_all(&self) -> Result<Vec<ProfileRecord>, StoreError> {
        self.load_all().await
    }

    /// The live record with this id, as a zero- or one-element list
    ///
    /// Id 0 means "nothing selected yet" and never matches.
    pub async fn get_by_id(&self, id: u64) -> Result<Vec<ProfileRecord>, StoreError> {
        if id == 0 {
            return Ok(Vec::new());
        }

        let records = self.load_all().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.id == id && !r.deleted)
            .take(1)
            .collect())
    }

    /// Replace the record with a matching id, or append it under a fresh id
    #[instrument(skip(self, record), fields(streamer_id = record.id))]
    pub async fn upsert(&self, mut record: ProfileRecord) -> Result<UpsertOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_all().await?;

        // Id 0 always asks for a new record; an existing record 0 is never overwritten
        let existing = if record.id == 0 {
            None
        } else {
            records.iter().position(|r| r.id == record.id)
        };

        let outcome = match existing {
            Some(index) => {
                debug!(index, "Existing id, replacing record");
                let needs_preprocess = records[index].base_video_path != record.base_video_path;
                records[index] = record.clone();
                UpsertOutcome {
                    id: record.id,
                    created: false,
                    needs_preprocess,
                    record,
                }
            }
            None => {
                record.id = next_id(&records)?;
                debug!(assigned_id = record.id, "New id, appending record");
                records.push(record.clone());
                UpsertOutcome {
                    id: record.id,
                    created: true,
                    needs_preprocess: true,
                    record,
                }
            }
        };

        self.save_all(&records).await?;

        if outcome.created {
            metrics::counter!("streamer.profiles.created").increment(1);
        } else {
            metrics::counter!("streamer.profiles.updated").increment(1);
        }

        info!(
            streamer_id = outcome.id,
            created = outcome.created,
            needs_preprocess = outcome.needs_preprocess,
            "Streamer profile saved"
        );

        Ok(outcome)
    }

    /// Remove the record with this id; false when no record had it
    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: u64) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_all().await?;

        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            debug!("No streamer profile with this id");
            return Ok(false);
        }

        self.save_all(&records).await?;
        metrics::counter!("streamer.profiles.deleted").increment(1);
        info!(streamer_id = id, "Streamer profile deleted");

        Ok(true)
    }

    /// Read the whole document
    pub async fn load_all(&self) -> Result<Vec<ProfileRecord>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.path, e)),
        };

        parse_document(&self.path, &contents)
    }

    /// Overwrite the whole document
    pub async fn save_all(&self, records: &[ProfileRecord]) -> Result<(), StoreError> {
        write_document(&self.path, records).await
    }

    /// Check the document can be read and parsed
    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.load_all().await.map(|_| ())
    }
}

/// Next id to hand out: one past the largest, or 0 for an empty store
fn next_id(records: &[ProfileRecord]) -> Result<u64, StoreError> {
    match records.iter().map(|r| r.id).max() {
        None => Ok(0),
        Some(max) => max
            .checked_add(1)
            .ok_or(StoreError::IdsExhausted { max }),
    }
}

fn parse_document(path: &Path, contents: &str) -> Result<Vec<ProfileRecord>, StoreError> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    let records: Option<Vec<ProfileRecord>> =
        serde_yaml::from_str(contents).map_err(|source| StoreError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(records.unwrap_or_default())
}

/// Write to a sibling temp file, then rename it over the target
async fn write_document(path: &Path, records: &[ProfileRecord]) -> Result<(), StoreError> {
    let yaml = serde_yaml::to_string(records).map_err(|source| StoreError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, yaml)
        .await
        .map_err(|e| io_error(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| io_error(path, e))?;

    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> ProfileStore {
        let config = StoreConfig {
            streamer_config_path: dir.path().join("configs").join("streamer_info.yaml"),
        };
        ProfileStore::open(&config).await.unwrap()
    }

    fn record(id: u64, name: &str, video: &str) -> ProfileRecord {
        ProfileRecord {
            id,
            name: name.to_string(),
            character_tags: vec!["warm".to_string()],
            base_video_path: video.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_open_creates_empty_document() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert!(store.path().exists());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_is_field_for_field() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut first = record(1, "乐乐喵", "/files/lele.mp4");
        first.tts_reference_sentence = "大家好".to_string();
        first.deleted = true;
        let records = vec![first, record(4, "Hui", "/files/hui.mp4")];

        store.save_all(&records).await.unwrap();

        assert_eq!(store.load_all().await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_reads_legacy_document() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let legacy = "- id: 1\n  name: Lele\n  character:\n  - lively\n  avater: /a.png\n  base_mp4_path: /v.mp4\n  delete: false\n";
        tokio::fs::write(store.path(), legacy).await.unwrap();

        let records = store.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].avatar_path, "/a.png");
        assert_eq!(records[0].character_tags, vec!["lively".to_string()]);
        assert!(records[0].tts_tag.is_empty());
    }

    #[tokio::test]
    async fn test_list_keeps_order_and_deleted_records() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut hidden = record(2, "b", "");
        hidden.deleted = true;
        let records = vec![record(5, "a", ""), hidden, record(1, "c", "")];
        store.save_all(&records).await.unwrap();

        assert_eq!(store.list_all().await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut hidden = record(2, "b", "");
        hidden.deleted = true;
        store
            .save_all(&[record(0, "zero", ""), record(1, "a", ""), hidden])
            .await
            .unwrap();

        let found = store.get_by_id(1).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a");

        assert!(store.get_by_id(0).await.unwrap().is_empty());
        assert!(store.get_by_id(2).await.unwrap().is_empty());
        assert!(store.get_by_id(99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_into_empty_store_assigns_zero() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let outcome = store.upsert(record(0, "first", "a.mp4")).await.unwrap();

        assert_eq!(outcome.id, 0);
        assert!(outcome.created);
        assert!(outcome.needs_preprocess);
        assert_eq!(store.list_all().await.unwrap()[0].id, 0);
    }

    #[tokio::test]
    async fn test_upsert_new_assigns_max_plus_one() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store
            .save_all(&[record(3, "a", ""), record(1, "b", "")])
            .await
            .unwrap();

        let outcome = store.upsert(record(0, "new", "")).await.unwrap();

        assert_eq!(outcome.id, 4);
        assert!(outcome.created);
        assert!(outcome.needs_preprocess);

        let records = store.list_all().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].id, 4);
        assert_eq!(records[2].name, "new");
    }

    #[tokio::test]
    async fn test_upsert_zero_never_overwrites_record_zero() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let first = store.upsert(record(0, "first", "a.mp4")).await.unwrap();
        let second = store.upsert(record(0, "second", "b.mp4")).await.unwrap();

        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);
        assert!(second.created);
        assert!(second.needs_preprocess);

        let stored: Vec<(u64, String)> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();
        assert_eq!(
            stored,
            vec![(0, "first".to_string()), (1, "second".to_string())]
        );
    }

    #[tokio::test]
    async fn test_upsert_reports_exhausted_ids() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let last = record(u64::MAX, "last", "");
        store.save_all(&[last.clone()]).await.unwrap();

        assert!(matches!(
            store.upsert(record(0, "overflow", "")).await,
            Err(StoreError::IdsExhausted { max: u64::MAX })
        ));
        assert_eq!(store.list_all().await.unwrap(), vec![last]);
    }

    #[tokio::test]
    async fn test_upsert_existing_overwrites_whole_record() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let mut original = record(1, "old", "same.mp4");
        original.tts_tag = "calm".to_string();
        store
            .save_all(&[original, record(2, "other", "other.mp4")])
            .await
            .unwrap();

        let replacement = record(1, "new", "same.mp4");
        let outcome = store.upsert(replacement.clone()).await.unwrap();

        assert_eq!(outcome.id, 1);
        assert!(!outcome.created);
        assert!(!outcome.needs_preprocess);

        let records = store.list_all().await.unwrap();
        assert_eq!(records[0], replacement);
        assert!(records[0].tts_tag.is_empty());
        assert_eq!(records[1], record(2, "other", "other.mp4"));
    }

    #[tokio::test]
    async fn test_upsert_detects_video_change() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.save_all(&[record(1, "a", "old.mp4")]).await.unwrap();

        let outcome = store.upsert(record(1, "a", "new.mp4")).await.unwrap();

        assert!(!outcome.created);
        assert!(outcome.needs_preprocess);
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store
            .save_all(&[record(1, "a", ""), record(2, "b", "")])
            .await
            .unwrap();

        assert!(store.delete_by_id(1).await.unwrap());
        let remaining = store.list_all().await.unwrap();
        assert_eq!(remaining, vec![record(2, "b", "")]);

        assert!(!store.delete_by_id(42).await.unwrap());
        assert_eq!(store.list_all().await.unwrap(), remaining);
    }

    #[tokio::test]
    async fn test_invalid_yaml_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        tokio::fs::write(store.path(), "- id: [not, a, number\n")
            .await
            .unwrap();

        assert!(matches!(
            store.list_all().await,
            Err(StoreError::Yaml { .. })
        ));
        assert!(store.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir).await);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .upsert(record(1000 + i, "host", ""))
                        .await
                        .unwrap()
                        .id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 8);
        assert_eq!(store.list_all().await.unwrap().len(), 8);
    }
}
