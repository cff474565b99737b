//! Cache Manager
//!
//! Application-level context that owns the configuration and the registry,
//! and creates memo and SWR caches bound to them.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{validate_name, Config, MemoOptions, SwrOptions};
use crate::error::{CacheError, Result};
use crate::key::KeyArgs;
use crate::memo::MemoCache;
use crate::producer::into_producer;
use crate::registry::{CacheRegistry, ClearReport};
use crate::swr::SwrCache;
use crate::tasks::spawn_cleanup_task;

// == Cache Manager ==
/// Creates caches and invalidates them in bulk.
///
/// Cheap to clone; clones share configuration and registry. Dropping every
/// clone releases the registry, which makes per-test managers independent.
#[derive(Debug, Clone)]
pub struct CacheManager {
    config: Arc<Config>,
    registry: CacheRegistry,
}

impl CacheManager {
    /// Creates a manager with an empty registry.
    ///
    /// Names are unique per manager, and each one maps to
    /// `{cache_dir}/{name}.json`. Give every live manager its own
    /// `cache_dir`: two managers sharing a directory and a name would each
    /// overwrite the other's file.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: CacheRegistry::new(),
        }
    }

    /// Creates a manager from `SWR_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    // == Wrap SWR ==
    /// Wraps `producer` in a stale-while-revalidate cache.
    ///
    /// With caching disabled the returned cache calls `producer` every time
    /// and is not registered.
    ///
    /// # Errors
    /// - `InvalidOptions` if the name is not usable as a file stem
    /// - `DuplicateName` if a cache with this name already exists
    pub async fn wrap_swr<A, V, F, Fut>(&self, producer: F, options: SwrOptions) -> Result<SwrCache<A, V>>
    where
        A: KeyArgs + Send + 'static,
        V: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        validate_name(&options.name)?;
        let producer = into_producer(producer);

        if !self.config.enabled {
            debug!("Caching disabled, '{}' is a pass-through", options.name);
            return Ok(SwrCache::pass_through(producer));
        }

        self.ensure_unregistered(&options.name).await?;
        let cache = SwrCache::open(&self.config, &options, producer).await;
        if let Some(managed) = cache.managed() {
            self.registry.register(managed).await?;
        }

        info!("Created SWR cache '{}'", options.name);
        Ok(cache)
    }

    // == Wrap Memo ==
    /// Wraps `producer` in a TTL memo cache.
    ///
    /// With caching disabled the returned cache calls `producer` every time
    /// and is not registered.
    ///
    /// # Errors
    /// - `InvalidOptions` if the name is not usable as a file stem
    /// - `DuplicateName` if a cache with this name already exists
    pub async fn wrap_memo<A, V, F, Fut>(&self, producer: F, options: MemoOptions) -> Result<MemoCache<A, V>>
    where
        A: KeyArgs + Send + 'static,
        V: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        validate_name(&options.name)?;
        let producer = into_producer(producer);

        if !self.config.enabled {
            debug!("Caching disabled, '{}' is a pass-through", options.name);
            return Ok(MemoCache::pass_through(producer));
        }

        self.ensure_unregistered(&options.name).await?;
        let cache = MemoCache::open(&self.config, &options, producer).await;
        if let Some(managed) = cache.managed() {
            self.registry.register(managed).await?;
        }

        info!("Created memo cache '{}' (persist={})", options.name, options.persist);
        Ok(cache)
    }

    // == Clear All ==
    /// Clears every cache created by this manager, in creation order.
    pub async fn clear_all_caches(&self) -> ClearReport {
        self.registry.clear_all().await
    }

    /// Starts the periodic backstop sweep over this manager's caches.
    pub fn spawn_cleanup_task(&self) -> JoinHandle<()> {
        spawn_cleanup_task(self.registry.clone(), self.config.cleanup_interval)
    }

    async fn ensure_unregistered(&self, name: &str) -> Result<()> {
        if self.registry.contains(name).await {
            return Err(CacheError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}
