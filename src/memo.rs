//! Memo Cache
//!
//! TTL-bounded memoization: a hit returns the stored value, a miss waits for
//! the producer and stores its result for `ttl`.
//!
//! Concurrent misses on the same key are not merged; each one runs the
//! producer and the last write wins.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{PersistentStore, StoreStats};
use crate::config::{Config, MemoOptions};
use crate::error::{CacheError, Result};
use crate::key::{derive_key, KeyArgs};
use crate::producer::Producer;
use crate::registry::ManagedCache;

// == Memo Cache ==
/// Memoizing wrapper around an async producer.
///
/// Cheap to clone; clones share the same store.
pub struct MemoCache<A, V> {
    strategy: Strategy<A, V>,
}

enum Strategy<A, V> {
    /// Caching disabled: every call runs the producer
    PassThrough(Producer<A, V>),
    Cached(Arc<MemoState<A, V>>),
}

impl<A, V> Clone for MemoCache<A, V> {
    fn clone(&self) -> Self {
        let strategy = match &self.strategy {
            Strategy::PassThrough(producer) => Strategy::PassThrough(Arc::clone(producer)),
            Strategy::Cached(state) => Strategy::Cached(Arc::clone(state)),
        };
        Self { strategy }
    }
}

impl<A, V> MemoCache<A, V>
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

    /// Creates the store for `options.name`, loading it from disk when
    /// `options.persist` is set.
    pub(crate) async fn open(
        config: &Config,
        options: &MemoOptions,
        producer: Producer<A, V>,
    ) -> Self {
        let ttl = options.ttl.unwrap_or(config.min_time_to_stale);
        let store = if options.persist {
            let mut store =
                PersistentStore::open(&config.cache_dir, &options.name, options.max_entries, Some(ttl));
            store.load().await;
            store
        } else {
            PersistentStore::in_memory(&options.name, options.max_entries, Some(ttl))
        };

        let state = MemoState {
            name: options.name.clone(),
            producer,
            store: Mutex::new(store),
            ttl,
            generation: AtomicU64::new(0),
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
    /// Returns the stored value for `args`, or runs the producer and stores
    /// its result. Falsy values (`0`, `""`, `false`, `None`) are hits.
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

    /// Drops every entry, persisting the empty store when persistent.
    pub async fn clear(&self) -> Result<()> {
        match &self.strategy {
            Strategy::PassThrough(_) => Ok(()),
            Strategy::Cached(state) => state.clear_store().await,
        }
    }

    pub async fn stats(&self) -> StoreStats {
        match &self.strategy {
            Strategy::PassThrough(_) => StoreStats::default(),
            Strategy::Cached(state) => state.store.lock().await.stats(),
        }
    }

    /// Entry lifetime, None in pass-through mode.
    pub fn ttl(&self) -> Option<Duration> {
        match &self.strategy {
            Strategy::PassThrough(_) => None,
            Strategy::Cached(state) => Some(state.ttl),
        }
    }

    pub fn is_caching(&self) -> bool {
        matches!(self.strategy, Strategy::Cached(_))
    }
}

// == Shared State ==
struct MemoState<A, V> {
    name: String,
    producer: Producer<A, V>,
    store: Mutex<PersistentStore>,
    ttl: Duration,
    /// Bumped by every clear; misses started under an older generation are not stored
    generation: AtomicU64,
    _types: PhantomData<fn(A) -> V>,
}

impl<A, V> MemoState<A, V>
where
    A: KeyArgs + Send + 'static,
    V: Serialize + DeserializeOwned + Send + 'static,
{
    async fn call(&self, args: A) -> Result<V> {
        let key = derive_key(&args)?;

        let hit = self.store.lock().await.get(&key);
        if let Some(stored) = hit {
            match serde_json::from_value(stored) {
                Ok(value) => return Ok(value),
                Err(e) => warn!(
                    "{}",
                    CacheError::Decode {
                        name: self.name.clone(),
                        source: e,
                    }
                ),
            }
        }

        debug!("Memo cache '{}': miss for {}", self.name, key);
        let generation = self.generation.load(Ordering::SeqCst);
        let value = (self.producer)(args).await.map_err(CacheError::Producer)?;

        match serde_json::to_value(&value) {
            Ok(encoded) => {
                let mut store = self.store.lock().await;
                if self.generation.load(Ordering::SeqCst) == generation {
                    store.set_with_ttl(key, encoded, Some(self.ttl));
                    if let Err(e) = store.save().await {
                        warn!("Memo cache '{}': {}", self.name, e);
                    }
                }
            }
            Err(e) => warn!("Memo cache '{}': {}", self.name, CacheError::Encode(e)),
        }

        Ok(value)
    }

    async fn remove(&self, args: &A) -> Result<bool> {
        let key = derive_key(args)?;
        let mut store = self.store.lock().await;
        let existed = store.remove(&key);
        if existed {
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
impl<A, V> ManagedCache for MemoState<A, V>
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
        self.store.lock().await.stats()
    }
}
