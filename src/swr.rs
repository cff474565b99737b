//! Stale-While-Revalidate Cache
//!
//! Serves stored values by age:
//! - fresh (`age < min_time_to_stale`): returned as is
//! - stale (`min_time_to_stale <= age < max_time_to_live`): returned at once,
//!   refreshed in a background task
//! - expired (`age >= max_time_to_live`) or absent: the producer runs and the
//!   caller waits for its result
//!
//! Each logical key occupies two store entries, the value and its write
//! timestamp. Both are written together; if either is missing the key is
//! treated as absent.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, PersistentStore, StoreStats};
use crate::config::{Config, SwrOptions};
use crate::error::{CacheError, Result};
use crate::key::{derive_key, KeyArgs};
use crate::producer::Producer;
use crate::registry::ManagedCache;

/// Suffix of the store key holding a value's write timestamp
pub const STORED_AT_SUFFIX: &str = "#stored_at";

// == Freshness ==
/// Classification of a stored value by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Absent,
    Fresh,
    Stale,
    Expired,
}

impl Freshness {
    /// Classifies an entry written at `stored_at` (Unix ms) as seen at `now`.
    pub fn classify(
        stored_at: Option<u64>,
        now: u64,
        min_time_to_stale: Duration,
        max_time_to_live: Duration,
    ) -> Self {
        let Some(stored_at) = stored_at else {
            return Freshness::Absent;
        };

        let age = Duration::from_millis(now.saturating_sub(stored_at));
        if age >= max_time_to_live {
            Freshness::Expired
        } else if age >= min_time_to_stale {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// True when the caller has to wait for the producer.
    pub fn must_fetch(self) -> bool {
        matches!(self, Freshness::Absent | Freshness::Expired)
    }
}

// == SWR Cache ==
/// Stale-while-revalidate wrapper around an async producer.
///
/// Cheap to clone; clones share the same store.
pub struct SwrCache<A, V> {
    strategy: Strategy<A, V>,
}

enum Strategy<A, V> {
    /// Caching disabled: every call runs the producer
    PassThrough(Producer<A, V>),
    Cached(Arc<SwrState<A, V>>),
}

impl<A, V> Clone for SwrCache<A, V> {
    fn clone(&self) -> Self {
        let strategy = match &self.strategy {
            Strategy::PassThrough(producer) => Strategy::PassThrough(Arc::clone(producer)),
            Strategy::Cached(state) => Strategy::Cached(Arc::clone(state)),
        };
        Self { strategy }
    }
}

impl<A, V> SwrCache<A, V>
where
    A: KeyArgs + Send + 'static,
    V: Serialize + DeserializeOwned + Send + 'static,
{
    /// Wrapper that always calls the producer.
    pub fn pass_through(producer: Producer<A, V>) -> Self {
        Self {
            strategy: Strategy::PassThrough(producer),
        }
    }

    /// Creates the store for `options.name` and loads it from disk.
    pub(crate) async fn open(
        config: &Config,
        options: &SwrOptions,
        producer: Producer<A, V>,
    ) -> Self {
        // Value and timestamp count separately against the limit
        let capacity = options.max_entries.saturating_mul(2);
        let mut store = PersistentStore::open(
            &config.cache_dir,
            &options.name,
            capacity,
            Some(config.swr_backstop()),
        );
        store.load().await;

        let state = SwrState {
            name: options.name.clone(),
            producer,
            store: Mutex::new(store),
            min_time_to_stale: config.min_time_to_stale,
            max_time_to_live: config.max_time_to_live,
            generation: AtomicU64::new(0),
            revalidations: AtomicU64::new(0),
            revalidation_failures: AtomicU64::new(0),
            _types: PhantomData,
        };

        Self {
            strategy: Strategy::Cached(Arc::new(state)),
        }
    }

    /// Registry handle for this cache, None in pass-through mode.
    pub(crate) fn managed(&self) -> Option<Arc<dyn ManagedCache>> {
        match &self.strategy {
            Strategy::PassThrough(_) => None,
            Strategy::Cached(state) => Some(Arc::clone(state) as Arc<dyn ManagedCache>),
        }
    }

    // == Call ==
    /// Returns the value for `args` according to its freshness.
    ///
    /// Stale values trigger a background refresh on the current tokio runtime;
    /// its failures are logged and never reach this caller.
    pub async fn call(&self, args: A) -> Result<V> {
        match &self.strategy {
            Strategy::PassThrough(producer) => producer(args).await.map_err(CacheError::Producer),
            Strategy::Cached(state) => state.call(args).await,
        }
    }

    /// Drops the entry for `args`. Returns true if it existed.
    pub async fn remove(&self, args: &A) -> Result<bool> {
        match &self.strategy {
            Strategy::PassThrough(_) => Ok(false),
            Strategy::Cached(state) => state.remove(args).await,
        }
    }

    /// Drops every entry; the next call for any key runs the producer.
    pub async fn clear(&self) -> Result<()> {
        match &self.strategy {
            Strategy::PassThrough(_) => Ok(()),
            Strategy::Cached(state) => state.clear_store().await,
        }
    }

    /// Counters per logical key, not per physical store entry.
    pub async fn stats(&self) -> StoreStats {
        match &self.strategy {
            Strategy::PassThrough(_) => StoreStats::default(),
            Strategy::Cached(state) => logical_stats(&*state.store.lock().await),
        }
    }

    /// Background refreshes started so far.
    pub fn revalidations(&self) -> u64 {
        match &self.strategy {
            Strategy::PassThrough(_) => 0,
            Strategy::Cached(state) => state.revalidations.load(Ordering::Relaxed),
        }
    }

    /// Background refreshes whose producer failed.
    pub fn revalidation_failures(&self) -> u64 {
        match &self.strategy {
            Strategy::PassThrough(_) => 0,
            Strategy::Cached(state) => state.revalidation_failures.load(Ordering::Relaxed),
        }
    }

    pub fn is_caching(&self) -> bool {
        matches!(self.strategy, Strategy::Cached(_))
    }
}

// == Shared State ==
struct SwrState<A, V> {
    name: String,
    producer: Producer<A, V>,
    store: Mutex<PersistentStore>,
    min_time_to_stale: Duration,
    max_time_to_live: Duration,
    /// Bumped by every clear; writes started under an older generation are dropped
    generation: AtomicU64,
    revalidations: AtomicU64,
    revalidation_failures: AtomicU64,
    _types: PhantomData<fn(A) -> V>,
}

impl<A, V> SwrState<A, V>
where
    A: KeyArgs + Send + 'static,
    V: Serialize + DeserializeOwned + Send + 'static,
{
    async fn call(self: &Arc<Self>, args: A) -> Result<V> {
        let key = derive_key(&args)?;
        let cached = self.lookup(&key).await;

        let freshness = Freshness::classify(
            cached.as_ref().map(|(_, stored_at)| *stored_at),
            current_timestamp_ms(),
            self.min_time_to_stale,
            self.max_time_to_live,
        );

        match (freshness, cached) {
            (Freshness::Fresh, Some((value, _))) => Ok(value),
            (Freshness::Stale, Some((value, _))) => {
                self.spawn_revalidation(key, args);
                Ok(value)
            }
            _ => {
                debug!("SWR cache '{}': {:?} for {}, fetching", self.name, freshness, key);
                let generation = self.generation.load(Ordering::SeqCst);
                let value = (self.producer)(args).await.map_err(CacheError::Producer)?;
                if let Some(encoded) = self.encode(&value) {
                    self.write(&key, encoded, generation).await;
                }
                Ok(value)
            }
        }
    }

    /// Reads the value and its timestamp; any missing or undecodable half
    /// makes the whole key absent.
    async fn lookup(&self, key: &str) -> Option<(V, u64)> {
        let mut store = self.store.lock().await;
        let value = store.peek(key);
        let stored_at = store.peek(&stored_at_key(key)).and_then(|ts| ts.as_u64());

        let found = match (value, stored_at) {
            (Some(value), Some(stored_at)) => match serde_json::from_value(value) {
                Ok(value) => Some((value, stored_at)),
                Err(e) => {
                    warn!(
                        "{}",
                        CacheError::Decode {
                            name: self.name.clone(),
                            source: e,
                        }
                    );
                    None
                }
            },
            (None, None) => None,
            _ => {
                debug!("SWR cache '{}': half-evicted entry for {}, treating as absent", self.name, key);
                None
            }
        };
        store.record_lookup(found.is_some());
        found
    }

    fn spawn_revalidation(self: &Arc<Self>, key: String, args: A) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("SWR cache '{}': no tokio runtime, skipping revalidation of {}", self.name, key);
            return;
        };

        self.revalidations.fetch_add(1, Ordering::Relaxed);
        let generation = self.generation.load(Ordering::SeqCst);
        let state = Arc::clone(self);

        handle.spawn(async move {
            match (state.producer)(args).await {
                Ok(value) => {
                    let Some(encoded) = state.encode(&value) else {
                        return;
                    };
                    if state.write(&key, encoded, generation).await {
                        debug!("SWR cache '{}': revalidated {}", state.name, key);
                    }
                }
                Err(e) => {
                    state.revalidation_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("SWR cache '{}': revalidation of {} failed: {:#}", state.name, key, e);
                }
            }
        });
    }

    fn encode(&self, value: &V) -> Option<serde_json::Value> {
        match serde_json::to_value(value) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                warn!("SWR cache '{}': {}", self.name, CacheError::Encode(e));
                None
            }
        }
    }

    /// Stores value and timestamp together and saves. Returns false if the
    /// write was dropped because the cache was cleared since `generation`.
    async fn write(&self, key: &str, encoded: serde_json::Value, generation: u64) -> bool {
        let mut store = self.store.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("SWR cache '{}': dropping result for {} fetched before clear", self.name, key);
            return false;
        }

        store.set(key, encoded);
        store.set(stored_at_key(key), serde_json::Value::from(current_timestamp_ms()));
        if let Err(e) = store.save().await {
            warn!("SWR cache '{}': {}", self.name, e);
        }
        true
    }

    async fn remove(&self, args: &A) -> Result<bool> {
        let key = derive_key(args)?;
        let mut store = self.store.lock().await;
        let existed = store.remove(&key);
        let stamped = store.remove(&stored_at_key(&key));
        if existed || stamped {
            store.save().await?;
        }
        Ok(existed)
    }

    async fn clear_store(&self) -> Result<()> {
        let mut store = self.store.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        store.clear();
        store.save().await
    }
}

#[async_trait]
impl<A, V> ManagedCache for SwrState<A, V>
where
    A: KeyArgs + Send + 'static,
    V: Serialize + DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn clear(&self) -> Result<()> {
        self.clear_store().await
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut store = self.store.lock().await;
        let removed = store.purge_expired();
        if removed > 0 {
            store.save().await?;
        }
        Ok(removed)
    }

    async fn stats(&self) -> StoreStats {
        logical_stats(&*self.store.lock().await)
    }
}

fn stored_at_key(key: &str) -> String {
    format!("{}{}", key, STORED_AT_SUFFIX)
}

// == Logical Counts ==
/// Number of keys in an SWR store holding both a value and its timestamp.
pub fn logical_entries(store: &PersistentStore) -> usize {
    store
        .keys()
        .filter(|key| !key.ends_with(STORED_AT_SUFFIX))
        .filter(|key| store.contains(&stored_at_key(key)))
        .count()
}

/// Store counters rescaled from physical entries to logical keys.
fn logical_stats(store: &PersistentStore) -> StoreStats {
    let mut stats = store.stats();
    // Value and timestamp are written, touched and evicted as a pair
    stats.evictions = stats.evictions.div_ceil(2);
    stats.expirations = stats.expirations.div_ceil(2);
    stats.set_total_entries(logical_entries(store));
    stats
}
