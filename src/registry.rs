//! Cache Registry
//!
//! Ordered list of every cache instance created through a
//! [`CacheManager`](crate::CacheManager), used for bulk invalidation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::StoreStats;
use crate::error::{CacheError, Result};

// == Managed Cache ==
/// Operations the registry can run on any cache instance.
#[async_trait]
pub trait ManagedCache: Send + Sync {
    /// Unique cache name
    fn name(&self) -> &str;

    /// Drops every entry and persists the empty state.
    async fn clear(&self) -> Result<()>;

    /// Drops backstop-expired entries, persisting if any were removed.
    async fn purge_expired(&self) -> Result<usize>;

    /// Snapshot of the cache's counters, per logical key.
    async fn stats(&self) -> StoreStats;
}

// == Clear Report ==
/// Outcome of [`CacheRegistry::clear_all`].
#[derive(Debug, Default)]
pub struct ClearReport {
    /// Instances cleared successfully
    pub cleared: usize,
    /// Instances whose clear failed, by name
    pub failures: Vec<(String, CacheError)>,
}

impl ClearReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// == Cache Registry ==
/// Append-only, cloneable handle to the registered cache instances.
///
/// Instances stay registered for the lifetime of the registry.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    instances: Arc<RwLock<Vec<Arc<dyn ManagedCache>>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // == Register ==
    /// Appends an instance. Names must be unique within the registry.
    pub async fn register(&self, instance: Arc<dyn ManagedCache>) -> Result<()> {
        let mut instances = self.instances.write().await;
        if instances.iter().any(|i| i.name() == instance.name()) {
            return Err(CacheError::DuplicateName(instance.name().to_string()));
        }
        debug!("Registered cache '{}'", instance.name());
        instances.push(instance);
        Ok(())
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.instances.read().await.iter().any(|i| i.name() == name)
    }

    /// Registered names in registration order.
    pub async fn names(&self) -> Vec<String> {
        self.instances
            .read()
            .await
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    // == Clear All ==
    /// Clears every instance in registration order.
    ///
    /// A failing instance is logged and reported; the remaining instances
    /// are still cleared.
    pub async fn clear_all(&self) -> ClearReport {
        let instances = self.snapshot().await;
        let mut report = ClearReport::default();

        for instance in instances {
            match instance.clear().await {
                Ok(()) => report.cleared += 1,
                Err(e) => {
                    warn!("Failed to clear cache '{}': {}", instance.name(), e);
                    report.failures.push((instance.name().to_string(), e));
                }
            }
        }

        info!(
            "Cleared {} caches ({} failed)",
            report.cleared,
            report.failures.len()
        );
        report
    }

    // == Purge Expired ==
    /// Runs the TTL backstop on every instance and returns the number of
    /// entries removed.
    pub async fn purge_expired_all(&self) -> usize {
        let mut removed = 0;
        for instance in self.snapshot().await {
            match instance.purge_expired().await {
                Ok(count) => removed += count,
                Err(e) => warn!("Failed to purge cache '{}': {}", instance.name(), e),
            }
        }
        removed
    }

    /// Store counters of every instance, by name.
    pub async fn stats(&self) -> Vec<(String, StoreStats)> {
        let mut all = Vec::new();
        for instance in self.snapshot().await {
            all.push((instance.name().to_string(), instance.stats().await));
        }
        all
    }

    async fn snapshot(&self) -> Vec<Arc<dyn ManagedCache>> {
        self.instances.read().await.clone()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry").finish_non_exhaustive()
    }
}
