use crate::rss_utils::time;
use crate::traits::StateStore;
use crate::types::{FeedStatus, Item, PersistenceError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Persisted result of one live aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub cache_ts: f64,
    #[serde(default)]
    pub fetched_at: String,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub statuses: Vec<FeedStatus>,
}

impl CacheSnapshot {
    pub fn new(items: Vec<Item>, statuses: Vec<FeedStatus>) -> Self {
        Self {
            cache_ts: time::now_epoch(),
            fetched_at: time::human_now(),
            items,
            statuses,
        }
    }

    /// Valid while `now - cache_ts <= ttl`, boundary included.
    pub fn is_fresh_at(&self, now: f64, ttl_seconds: u64) -> bool {
        now - self.cache_ts <= ttl_seconds as f64
    }

    pub fn age_seconds(&self, now: f64) -> f64 {
        now - self.cache_ts
    }
}

/// Every item id ever observed. Only grows, unless the operator clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenLedger {
    ids: BTreeSet<String>,
}

impl SeenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// A new ledger holding this one's ids plus `ids`. Empty ids are skipped.
    pub fn merged<'a, I>(&self, ids: I) -> SeenLedger
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut next = self.clone();
        for id in ids {
            if !id.is_empty() {
                next.ids.insert(id.to_string());
            }
        }
        next
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

/// Cache and ledger as two JSON files.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    cache_path: PathBuf,
    seen_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(cache_path: impl Into<PathBuf>, seen_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            seen_path: seen_path.into(),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn seen_path(&self) -> &Path {
        &self.seen_path
    }

    fn read(path: &Path) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path, e)),
        }
    }

    /// Write through a sibling temp file and rename, so a crash never leaves
    /// a half-written file behind.
    fn write(path: &Path, contents: &str) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
        Ok(())
    }

    fn remove(path: &Path) -> Result<(), PersistenceError> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> PersistenceError {
    PersistenceError::Serialization {
        path: path.to_path_buf(),
        source,
    }
}

impl StateStore for JsonFileStore {
    fn load_cache(&self) -> Result<Option<CacheSnapshot>, PersistenceError> {
        let Some(raw) = Self::read(&self.cache_path)? else {
            debug!("No cache file at {}", self.cache_path.display());
            return Ok(None);
        };
        let snapshot: CacheSnapshot =
            serde_json::from_str(&raw).map_err(|e| json_error(&self.cache_path, e))?;
        Ok(Some(snapshot))
    }

    fn save_cache(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError> {
        let json =
            serde_json::to_string_pretty(snapshot).map_err(|e| json_error(&self.cache_path, e))?;
        Self::write(&self.cache_path, &json)?;
        debug!("Wrote cache with {} items to {}", snapshot.items.len(), self.cache_path.display());
        Ok(())
    }

    fn clear_cache(&self) -> Result<(), PersistenceError> {
        Self::remove(&self.cache_path)
    }

    fn load_seen(&self) -> Result<SeenLedger, PersistenceError> {
        let Some(raw) = Self::read(&self.seen_path)? else {
            return Ok(SeenLedger::new());
        };
        let ids: Vec<String> =
            serde_json::from_str(&raw).map_err(|e| json_error(&self.seen_path, e))?;
        Ok(SeenLedger::from_ids(ids))
    }

    fn save_seen(&self, ledger: &SeenLedger) -> Result<(), PersistenceError> {
        let ids: Vec<&str> = ledger.iter().collect();
        let json = serde_json::to_string_pretty(&ids).map_err(|e| json_error(&self.seen_path, e))?;
        Self::write(&self.seen_path, &json)?;
        debug!("Wrote {} seen ids to {}", ledger.len(), self.seen_path.display());
        Ok(())
    }

    fn clear_seen(&self) -> Result<(), PersistenceError> {
        Self::remove(&self.seen_path)
    }
}

/// Process-local store, for embedding without a filesystem and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cache: Mutex<Option<CacheSnapshot>>,
    seen: Mutex<SeenLedger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seen(seen: SeenLedger) -> Self {
        Self {
            cache: Mutex::new(None),
            seen: Mutex::new(seen),
        }
    }

    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        lock(&self.cache).clone()
    }

    pub fn seen(&self) -> SeenLedger {
        lock(&self.seen).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StateStore for MemoryStore {
    fn load_cache(&self) -> Result<Option<CacheSnapshot>, PersistenceError> {
        Ok(lock(&self.cache).clone())
    }

    fn save_cache(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError> {
        *lock(&self.cache) = Some(snapshot.clone());
        Ok(())
    }

    fn clear_cache(&self) -> Result<(), PersistenceError> {
        *lock(&self.cache) = None;
        Ok(())
    }

    fn load_seen(&self) -> Result<SeenLedger, PersistenceError> {
        Ok(lock(&self.seen).clone())
    }

    fn save_seen(&self, ledger: &SeenLedger) -> Result<(), PersistenceError> {
        *lock(&self.seen) = ledger.clone();
        Ok(())
    }

    fn clear_seen(&self) -> Result<(), PersistenceError> {
        *lock(&self.seen) = SeenLedger::new();
        Ok(())
    }
}
