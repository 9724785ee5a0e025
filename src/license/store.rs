//! Activation cache stores.
//!
//! A cache entry means "this license was confirmed valid when the entry was
//! written". Entries expire after their TTL and are then treated as absent,
//! which forces a fresh activation on the next check.
//!
//! Two stores are provided: [`MemoryCacheStore`] for tests and embedding, and
//! [`FileCacheStore`], a JSON document on disk for the CLI. Neither locks
//! across processes; two concurrent checks may both activate.

use crate::error::CacheError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A confirmed activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseCacheEntry {
    /// Cache key, normally the license key.
    pub key: String,
    /// The entry counts as absent from this instant on.
    pub valid_until: DateTime<Utc>,
}

impl LicenseCacheEntry {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

/// Key/value store with TTL semantics.
pub trait CacheStore: Send + Sync {
    /// The unexpired entry for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<LicenseCacheEntry>, CacheError>;

    /// Store an entry for `key` that expires `ttl` from now.
    fn set(&self, key: &str, ttl: Duration) -> Result<LicenseCacheEntry, CacheError>;

    /// Remove the entry for `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Process-local cache store.
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, LicenseCacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<LicenseCacheEntry>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let now = self.clock.now();
        match entries.get(key) {
            Some(entry) if entry.is_valid_at(now) => Ok(Some(entry.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, ttl: Duration) -> Result<LicenseCacheEntry, CacheError> {
        let entry = LicenseCacheEntry {
            key: key.to_string(),
            valid_until: self.clock.now() + ttl,
        };
        self.entries
            .lock()
            .map_err(|_| CacheError::Poisoned)?
            .insert(key.to_string(), entry.clone());
        Ok(entry)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Poisoned)?
            .remove(key);
        Ok(())
    }
}

// ── File store ───────────────────────────────────────────────────────────

/// Cache store persisted as a JSON object (`{ key: entry }`) in one file.
///
/// Every operation re-reads the file, so separate processes see each other's
/// writes. Writes go through a temp file and a rename.
pub struct FileCacheStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl FileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<HashMap<String, LicenseCacheEntry>, CacheError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| CacheError::Corrupt {
            path: self.path.clone(),
            detail: e.to_string(),
        })
    }

    /// Like [`Self::read`], but a corrupt file counts as empty. The flag is
    /// set when the file must be rewritten even if nothing else changes.
    fn read_for_update(&self) -> Result<(HashMap<String, LicenseCacheEntry>, bool), CacheError> {
        match self.read() {
            Ok(entries) => Ok((entries, false)),
            Err(CacheError::Corrupt { path, detail }) => {
                warn!(path = %path.display(), "Discarding corrupt license cache: {}", detail);
                Ok((HashMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn write(&self, entries: &HashMap<String, LicenseCacheEntry>) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(entries).map_err(|e| CacheError::Corrupt {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, json).map_err(io_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(io_err)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Result<Option<LicenseCacheEntry>, CacheError> {
        let _guard = self.lock.lock().map_err(|_| CacheError::Poisoned)?;
        let mut entries = self.read()?;
        let now = self.clock.now();
        match entries.get(key) {
            Some(entry) if entry.is_valid_at(now) => Ok(Some(entry.clone())),
            Some(_) => {
                debug!("Cache entry '{}' expired, pruning", key);
                entries.remove(key);
                self.write(&entries)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, ttl: Duration) -> Result<LicenseCacheEntry, CacheError> {
        let _guard = self.lock.lock().map_err(|_| CacheError::Poisoned)?;
        let (mut entries, _) = self.read_for_update()?;
        let entry = LicenseCacheEntry {
            key: key.to_string(),
            valid_until: self.clock.now() + ttl,
        };
        entries.insert(key.to_string(), entry.clone());
        self.write(&entries)?;
        Ok(entry)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let _guard = self.lock.lock().map_err(|_| CacheError::Poisoned)?;
        let (mut entries, corrupt) = self.read_for_update()?;
        if entries.remove(key).is_some() || corrupt {
            self.write(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A clock that only moves when told to.
    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc::now())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn exercise(store: &dyn CacheStore, clock: &ManualClock) {
        assert_eq!(store.get("svg2png").unwrap(), None);

        let entry = store.set("svg2png", Duration::days(30)).unwrap();
        assert_eq!(entry.key, "svg2png");
        assert_eq!(store.get("svg2png").unwrap(), Some(entry));

        clock.advance(Duration::days(29));
        assert!(store.get("svg2png").unwrap().is_some());

        clock.advance(Duration::days(1));
        assert_eq!(store.get("svg2png").unwrap(), None, "expired at exactly 30 days");

        store.set("svg2png", Duration::days(30)).unwrap();
        store.delete("svg2png").unwrap();
        assert_eq!(store.get("svg2png").unwrap(), None);
        store.delete("svg2png").unwrap();
    }

    #[test]
    fn memory_store_ttl() {
        let clock = ManualClock::new();
        let store = MemoryCacheStore::with_clock(clock.clone());
        exercise(&store, &clock);
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let store = FileCacheStore::with_clock(dir.path().join("cache/license.json"), clock.clone());
        exercise(&store, &clock);
    }

    #[test]
    fn file_store_is_shared_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("license.json");
        FileCacheStore::new(&path).set("k", Duration::days(1)).unwrap();
        assert!(FileCacheStore::new(&path).get("k").unwrap().is_some());
    }

    #[test]
    fn file_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("license.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileCacheStore::new(&path).get("k"),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn file_store_set_replaces_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("license.json");
        std::fs::write(&path, "{truncated").unwrap();
        let store = FileCacheStore::new(&path);

        store.set("k", Duration::days(1)).unwrap();
        assert!(store.get("k").unwrap().is_some());
    }

    #[test]
    fn file_store_delete_replaces_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("license.json");
        std::fs::write(&path, "{truncated").unwrap();
        let store = FileCacheStore::new(&path);

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn memory_store_len_survives_poisoned_lock() {
        let store = Arc::new(MemoryCacheStore::new());
        store.set("k", Duration::days(1)).unwrap();

        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert_eq!(store.len(), 1);
        assert!(matches!(store.get("k"), Err(CacheError::Poisoned)));
    }
}
