//! Persistent Store Module
//!
//! Named key-value container combining HashMap storage with LRU eviction,
//! a TTL backstop, and a JSON file that survives process restarts.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{LruIndex, StoreStats, StoredEntry, STORE_FILE_EXTENSION, STORE_FORMAT_VERSION};
use crate::error::{CacheError, Result};

// == On-Disk Layout ==
#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    entries: Vec<EntryRef<'a>>,
}

#[derive(Serialize)]
struct EntryRef<'a> {
    key: &'a str,
    #[serde(flatten)]
    entry: &'a StoredEntry,
}

#[derive(Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    entries: Vec<OwnedEntry>,
}

#[derive(Deserialize)]
struct OwnedEntry {
    key: String,
    #[serde(flatten)]
    entry: StoredEntry,
}

/// Returns the file backing the store `name` under `dir`.
pub fn store_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, STORE_FILE_EXTENSION))
}

// == Persistent Store ==
/// Disk-backed key-value store with LRU eviction and a TTL backstop.
///
/// Entries are ordered least- to most-recently used in the file so that
/// recency survives a restart. A store without a path lives in memory only.
#[derive(Debug)]
pub struct PersistentStore {
    name: String,
    path: Option<PathBuf>,
    entries: HashMap<String, StoredEntry>,
    lru: LruIndex,
    stats: StoreStats,
    /// Lifetime applied to entries written without an explicit TTL
    default_ttl: Option<Duration>,
}

impl PersistentStore {
    // == Constructors ==
    /// Creates a store backed by `{dir}/{name}.json`. Call [`load`](Self::load)
    /// to pick up existing entries.
    ///
    /// # Arguments
    /// * `dir` - Cache directory
    /// * `name` - Store name, used as the file stem
    /// * `max_entries` - Entry limit, 0 = unlimited
    /// * `default_ttl` - Backstop lifetime for entries, None = no backstop
    pub fn open(dir: &Path, name: &str, max_entries: usize, default_ttl: Option<Duration>) -> Self {
        let mut store = Self::in_memory(name, max_entries, default_ttl);
        store.path = Some(store_path(dir, name));
        store
    }

    /// Creates a store that never touches the disk.
    pub fn in_memory(name: &str, max_entries: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            entries: HashMap::new(),
            lru: LruIndex::new(max_entries),
            stats: StoreStats::new(),
            default_ttl,
        }
    }

    // == Name ==
    /// Returns the store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // == Path ==
    /// Returns the backing file, None for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // == Max Entries ==
    /// Returns the entry limit, 0 = unlimited.
    pub fn max_entries(&self) -> usize {
        self.lru.capacity()
    }

    // == Load ==
    /// Replaces the in-memory state with the file's contents.
    ///
    /// A missing, unreadable or corrupt file leaves the store empty; this
    /// never fails. Entries already past their backstop are dropped.
    pub async fn load(&mut self) {
        self.entries.clear();
        self.lru.clear();

        let Some(path) = self.path.clone() else {
            return;
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Store '{}': no file at {}, starting empty", self.name, path.display());
                return;
            }
            Err(e) => {
                warn!("Store '{}': failed to read {}: {}, starting empty", self.name, path.display(), e);
                return;
            }
        };

        let file: StoreFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                warn!("Store '{}': corrupt file {}: {}, starting empty", self.name, path.display(), e);
                return;
            }
        };

        if file.version != STORE_FORMAT_VERSION {
            warn!(
                "Store '{}': unsupported format version {} (expected {}), starting empty",
                self.name, file.version, STORE_FORMAT_VERSION
            );
            return;
        }

        let now = current_timestamp_ms();
        let mut dropped = 0;
        for OwnedEntry { key, entry } in file.entries {
            if entry.is_expired_at(now) {
                dropped += 1;
                continue;
            }
            self.insert_entry(key, entry);
        }
        self.stats.record_expirations(dropped);
        self.stats.set_total_entries(self.entries.len());

        info!(
            "Store '{}': loaded {} entries ({} expired dropped)",
            self.name,
            self.entries.len(),
            dropped
        );
    }

    // == Save ==
    /// Writes the in-memory state to disk.
    ///
    /// The file is written beside the target and renamed over it, so a crash
    /// mid-write leaves the previous version intact. No-op for in-memory stores.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let file = StoreFileRef {
            version: STORE_FORMAT_VERSION,
            entries: self
                .lru
                .oldest_first()
                .filter_map(|key| {
                    self.entries
                        .get(key)
                        .map(|entry| EntryRef { key: key.as_str(), entry })
                })
                .collect(),
        };
        let bytes = serde_json::to_vec(&file).map_err(CacheError::Encode)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::persistence(parent, e))?;
        }

        let tmp = path.with_extension(format!("{}.tmp", STORE_FILE_EXTENSION));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| CacheError::persistence(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| CacheError::persistence(path, e))?;

        debug!("Store '{}': saved {} entries", self.name, self.entries.len());
        Ok(())
    }

    // == Get ==
    /// Returns the live value for `key`, marking it most recently used.
    ///
    /// A backstop-expired entry is removed and reported as absent.
    pub fn get(&mut self, key: &str) -> Option<serde_json::Value> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Like [`get`](Self::get) but returns the whole entry.
    pub fn get_entry(&mut self, key: &str) -> Option<StoredEntry> {
        let expired = match self.entries.get(key) {
            None => {
                self.stats.record_miss();
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            self.drop_key(key);
            self.stats.record_expirations(1);
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.lru.touch(key);
        self.entries.get(key).cloned()
    }

    // == Peek ==
    /// Returns the live value for `key`, marking it most recently used,
    /// without counting a hit or miss.
    ///
    /// Callers reading several physical entries per lookup report the
    /// outcome once through [`record_lookup`](Self::record_lookup).
    pub fn peek(&mut self, key: &str) -> Option<serde_json::Value> {
        if self.entries.get(key)?.is_expired() {
            self.drop_key(key);
            self.stats.record_expirations(1);
            return None;
        }

        self.lru.touch(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Record Lookup ==
    /// Counts one lookup made through [`peek`](Self::peek).
    pub fn record_lookup(&mut self, hit: bool) {
        if hit {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
    }

    // == Contains ==
    /// Checks for a live entry without touching recency or counters.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    // == Set ==
    /// Stores a value using the store's default TTL.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let ttl = self.default_ttl;
        self.set_with_ttl(key, value, ttl);
    }

    /// Stores a value with an explicit lifetime, evicting least recently
    /// used entries if the store is over capacity.
    pub fn set_with_ttl(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) {
        let ttl_ms = ttl.map(|ttl| ttl.as_millis().min(u64::MAX as u128) as u64);
        self.insert_entry(key.into(), StoredEntry::new(value, ttl_ms));
        self.stats.set_total_entries(self.entries.len());
    }

    // == Remove ==
    /// Removes an entry. Returns true if it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let existed = self.drop_key(key);
        self.stats.set_total_entries(self.entries.len());
        existed
    }

    // == Clear ==
    /// Drops every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    // == Purge Expired ==
    /// Removes all backstop-expired entries and returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.drop_key(key);
        }

        self.stats.record_expirations(expired.len());
        self.stats.set_total_entries(self.entries.len());
        expired.len()
    }

    // == Stats ==
    /// Returns a snapshot of the store counters.
    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Keys ==
    /// Returns the stored keys in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    // == Length ==
    /// Returns the current number of entries in the store.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Internals ==
    fn insert_entry(&mut self, key: String, entry: StoredEntry) {
        let evicted = self.lru.touch(&key);
        self.entries.insert(key, entry);

        if !evicted.is_empty() {
            debug!("Store '{}': evicted {} entries", self.name, evicted.len());
            for old in &evicted {
                self.entries.remove(old);
            }
            self.stats.record_evictions(evicted.len());
        }
    }

    fn drop_key(&mut self, key: &str) -> bool {
        self.lru.forget(key);
        self.entries.remove(key).is_some()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;
    use tempfile::TempDir;

    #[test]
    fn test_store_set_and_get() {
        let mut store = PersistentStore::in_memory("t", 0, None);
        store.set("key1", json!({"a": 1}));
        assert_eq!(store.get("key1"), Some(json!({"a": 1})));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_falsy_values_are_present() {
        let mut store = PersistentStore::in_memory("t", 0, None);
        store.set("zero", json!(0));
        store.set("empty", json!(""));
        store.set("false", json!(false));
        store.set("null", json!(null));

        assert_eq!(store.get("zero"), Some(json!(0)));
        assert_eq!(store.get("empty"), Some(json!("")));
        assert_eq!(store.get("false"), Some(json!(false)));
        assert_eq!(store.get("null"), Some(json!(null)));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_store_remove() {
        let mut store = PersistentStore::in_memory("t", 0, None);
        store.set("key1", json!(1));
        assert!(store.remove("key1"));
        assert!(!store.remove("key1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = PersistentStore::in_memory("t", 3, None);
        store.set("key1", json!(1));
        store.set("key2", json!(2));
        store.set("key3", json!(3));

        // Touch key1 so key2 becomes the eviction candidate
        store.get("key1");
        store.set("key4", json!(4));

        assert_eq!(store.len(), 3);
        assert!(store.contains("key1"));
        assert!(!store.contains("key2"));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_unlimited_when_zero() {
        let mut store = PersistentStore::in_memory("t", 0, None);
        for i in 0..500 {
            store.set(format!("k{}", i), json!(i));
        }
        assert_eq!(store.len(), 500);
    }

    #[test]
    fn test_store_peek_skips_counters() {
        let mut store = PersistentStore::in_memory("t", 2, None);
        store.set("a", json!(1));
        store.set("b", json!(2));

        // Peeking refreshes recency: "b" becomes the eviction candidate
        assert_eq!(store.peek("a"), Some(json!(1)));
        assert_eq!(store.peek("missing"), None);
        store.set("c", json!(3));
        assert!(store.contains("a"));
        assert!(!store.contains("b"));

        let stats = store.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);

        store.record_lookup(true);
        store.record_lookup(false);
        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_store_ttl_backstop() {
        let mut store = PersistentStore::in_memory("t", 0, Some(Duration::from_millis(50)));
        store.set("short", json!("v"));
        store.set_with_ttl("long", json!("v"), Some(Duration::from_secs(60)));

        sleep(Duration::from_millis(80));

        assert_eq!(store.get("short"), None);
        assert_eq!(store.get("long"), Some(json!("v")));
        let stats = store.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_store_purge_expired() {
        let mut store = PersistentStore::in_memory("t", 0, None);
        store.set_with_ttl("a", json!(1), Some(Duration::from_millis(20)));
        store.set_with_ttl("b", json!(2), Some(Duration::from_millis(20)));
        store.set("c", json!(3));

        sleep(Duration::from_millis(40));

        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains("c"));
    }

    #[tokio::test]
    async fn test_store_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();

        let mut store = PersistentStore::open(dir.path(), "roundtrip", 0, None);
        store.load().await;
        store.set("a", json!([1, 2, 3]));
        store.set("b", json!({"nested": true}));
        store.save().await.unwrap();

        let mut reopened = PersistentStore::open(dir.path(), "roundtrip", 0, None);
        reopened.load().await;
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("a"), Some(json!([1, 2, 3])));
        assert_eq!(reopened.get("b"), Some(json!({"nested": true})));
    }

    #[tokio::test]
    async fn test_store_recency_survives_restart() {
        let dir = TempDir::new().unwrap();

        let mut store = PersistentStore::open(dir.path(), "recency", 2, None);
        store.set("a", json!(1));
        store.set("b", json!(2));
        store.get("a");
        store.save().await.unwrap();

        let mut reopened = PersistentStore::open(dir.path(), "recency", 2, None);
        reopened.load().await;
        // "b" is least recently used, so it goes first
        reopened.set("c", json!(3));
        assert!(reopened.contains("a"));
        assert!(!reopened.contains("b"));
        assert!(reopened.contains("c"));
    }

    #[tokio::test]
    async fn test_store_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = PersistentStore::open(dir.path(), "absent", 0, None);
        store.load().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(store_path(dir.path(), "corrupt"), b"{ not json").unwrap();

        let mut store = PersistentStore::open(dir.path(), "corrupt", 0, None);
        store.load().await;
        assert!(store.is_empty());

        // The store stays usable and overwrites the bad file
        store.set("k", json!("v"));
        store.save().await.unwrap();
        let mut reopened = PersistentStore::open(dir.path(), "corrupt", 0, None);
        reopened.load().await;
        assert_eq!(reopened.get("k"), Some(json!("v")));
    }

    #[tokio::test]
    async fn test_store_load_unknown_version_is_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            store_path(dir.path(), "future"),
            br#"{"version":99,"entries":[{"key":"k","value":1,"stored_at":0}]}"#,
        )
        .unwrap();

        let mut store = PersistentStore::open(dir.path(), "future", 0, None);
        store.load().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_load_drops_expired_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            store_path(dir.path(), "stale"),
            br#"{"version":1,"entries":[
                {"key":"old","value":1,"stored_at":0,"expires_at":1},
                {"key":"new","value":2,"stored_at":0}
            ]}"#,
        )
        .unwrap();

        let mut store = PersistentStore::open(dir.path(), "stale", 0, None);
        store.load().await;
        assert_eq!(store.len(), 1);
        assert!(store.contains("new"));
        assert_eq!(store.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_store_clear_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = PersistentStore::open(dir.path(), "cleared", 0, None);
        store.set("k", json!(1));
        store.save().await.unwrap();

        store.clear();
        store.save().await.unwrap();

        let mut reopened = PersistentStore::open(dir.path(), "cleared", 0, None);
        reopened.load().await;
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_save_is_noop() {
        let mut store = PersistentStore::in_memory("mem", 0, None);
        store.set("k", json!(1));
        store.save().await.unwrap();
        assert!(store.path().is_none());
    }

    #[tokio::test]
    async fn test_save_reports_unwritable_dir() {
        let dir = TempDir::new().unwrap();
        // A regular file where the cache directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();

        let mut store = PersistentStore::open(&blocker, "s", 0, None);
        store.set("k", json!(1));
        let result = store.save().await;
        assert!(matches!(result, Err(CacheError::Persistence { .. })));
    }
}
