//! TTL Backstop Sweep
//!
//! Background task that periodically drops backstop-expired entries from
//! every registered cache, so abandoned keys do not accumulate on disk.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::registry::CacheRegistry;

/// Spawns a background task that periodically purges expired entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps. Caches registered after the task starts are picked up
/// on the next sweep.
///
/// # Arguments
/// * `registry` - Registry whose caches are swept
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(manager.registry().clone(), Duration::from_secs(300));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(registry: CacheRegistry, interval: Duration) -> JoinHandle<()> {
    // A zero interval would spin
    let interval = interval.max(Duration::from_millis(10));

    tokio::spawn(async move {
        info!("Starting TTL backstop sweep with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let removed = registry.purge_expired_all().await;
            if removed > 0 {
                info!("TTL backstop sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL backstop sweep: no expired entries found");
            }
        }
    })
}
