//! Date-scoped table cache.
//!
//! One Arrow IPC file per (layer, date), or per (scope, date, entity) for
//! fan-out sub-results. An entry for date D is reused for every request for
//! D until it is removed externally; staleness is never judged here.

use crate::codec;
use crate::error::CacheIoError;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use statlayer_core::Table;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

const EXTENSION: &str = "arrow";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    namespace: String,
    as_of: NaiveDate,
    entity: Option<String>,
}

impl CheckpointKey {
    /// Key for a whole layer's table.
    pub fn layer(name: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            namespace: name.into(),
            as_of,
            entity: None,
        }
    }

    /// Key for one entity's sub-result inside a fan-out.
    pub fn entity(
        namespace: impl Into<String>,
        as_of: NaiveDate,
        entity: impl std::fmt::Display,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            as_of,
            entity: Some(entity.to_string()),
        }
    }

    /// Key for the entity failures recorded alongside a layer's table.
    ///
    /// Layer names never contain '.', so this never collides with a layer
    /// or fan-out key.
    pub fn gaps(layer: impl AsRef<str>, as_of: NaiveDate) -> Self {
        Self {
            namespace: format!("{}.gaps", layer.as_ref()),
            as_of,
            entity: None,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// `<namespace>_<YYYY-MM-DD>[_<entity>]`
    pub fn stem(&self) -> String {
        let date = self.as_of.format("%Y-%m-%d");
        match &self.entity {
            Some(entity) => format!("{}_{}_{}", self.namespace, date, file_safe(entity)),
            None => format!("{}_{}", self.namespace, date),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem(), EXTENSION)
    }
}

impl std::fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stem())
    }
}

fn file_safe(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Read-through / write-through table cache.
///
/// Both directions may fail with [`CacheIoError`]; callers log it, record it
/// and carry on as if the cache were absent.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `Ok(None)` is a miss. A zero-row table is a hit.
    async fn get(&self, key: &CheckpointKey) -> Result<Option<Table>, CacheIoError>;

    async fn put(&self, key: &CheckpointKey, table: &Table) -> Result<(), CacheIoError>;

    /// Returns whether an entry existed.
    async fn remove(&self, key: &CheckpointKey) -> Result<bool, CacheIoError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// File-backed store
// ═══════════════════════════════════════════════════════════════════════════

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn temp_path_for(&self, key: &CheckpointKey) -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}-{}.tmp",
            key.stem(),
            std::process::id(),
            seq
        ))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, key: &CheckpointKey) -> Result<Option<Table>, CacheIoError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheIoError::new(key.stem(), "read failed").with_source(e));
            }
        };

        let table = codec::decode(&bytes)
            .map_err(|e| CacheIoError::new(key.stem(), "decode failed").with_source(e))?;
        debug!("Checkpoint {} loaded ({} rows)", key, table.num_rows());
        Ok(Some(table))
    }

    async fn put(&self, key: &CheckpointKey, table: &Table) -> Result<(), CacheIoError> {
        let bytes = codec::encode(table)
            .map_err(|e| CacheIoError::new(key.stem(), "encode failed").with_source(e))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheIoError::new(key.stem(), "create dir failed").with_source(e))?;

        // Write aside then rename: readers never see a partial file and
        // concurrent writers resolve to last-writer-wins.
        let temp = self.temp_path_for(key);
        if let Err(e) = tokio::fs::write(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CacheIoError::new(key.stem(), "write failed").with_source(e));
        }
        if let Err(e) = tokio::fs::rename(&temp, self.path_for(key)).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CacheIoError::new(key.stem(), "rename failed").with_source(e));
        }

        debug!("Checkpoint {} saved ({} rows)", key, table.num_rows());
        Ok(())
    }

    async fn remove(&self, key: &CheckpointKey) -> Result<bool, CacheIoError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheIoError::new(key.stem(), "remove failed").with_source(e)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// In-memory store
// ═══════════════════════════════════════════════════════════════════════════

/// In-memory store with call counters and switchable write failures.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: Arc<Mutex<HashMap<CheckpointKey, Table>>>,
    fail_writes: AtomicBool,
    hits: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent `put` fails, as an unwritable disk would.
    pub fn with_failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_failing_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, key: &CheckpointKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, key: &CheckpointKey) -> Result<Option<Table>, CacheIoError> {
        let found = self.entries.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(found)
    }

    async fn put(&self, key: &CheckpointKey, table: &Table) -> Result<(), CacheIoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheIoError::new(key.stem(), "store is read-only"));
        }
        self.entries.lock().insert(key.clone(), table.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &CheckpointKey) -> Result<bool, CacheIoError> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    #[test]
    fn test_key_file_names() {
        assert_eq!(
            CheckpointKey::layer("team_hitting", date()).file_name(),
            "team_hitting_2024-04-01.arrow"
        );
        assert_eq!(
            CheckpointKey::entity("pitcher_events", date(), 543037).file_name(),
            "pitcher_events_2024-04-01_543037.arrow"
        );
        assert_eq!(
            CheckpointKey::entity("splits", date(), "112/vsLHP").stem(),
            "splits_2024-04-01_112-vsLHP"
        );
        assert_eq!(
            CheckpointKey::gaps("probable_starters", date()).file_name(),
            "probable_starters.gaps_2024-04-01.arrow"
        );
    }

    #[test]
    fn test_keys_differ_by_date() {
        let next = date().succ_opt().unwrap();
        assert_ne!(
            CheckpointKey::layer("odds", date()),
            CheckpointKey::layer("odds", next)
        );
    }

    #[tokio::test]
    async fn test_memory_store_failing_writes() {
        let store = MemoryCheckpointStore::new().with_failing_writes();
        let key = CheckpointKey::layer("odds", date());

        assert!(store.put(&key, &Table::empty()).await.is_err());
        assert!(store.get(&key).await.unwrap().is_none());

        store.set_failing_writes(false);
        store.put(&key, &Table::empty()).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_some());
        assert_eq!(store.hits(), 1);
    }
}
