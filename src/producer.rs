//! Producer Types
//!
//! Type-erased async value producers wrapped by memo and SWR caches.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

/// Future returned by a producer call.
pub type ProducerFuture<V> = BoxFuture<'static, anyhow::Result<V>>;

/// Shared handle to a producer taking the argument tuple `A`.
pub type Producer<A, V> = Arc<dyn Fn(A) -> ProducerFuture<V> + Send + Sync>;

/// Erases a closure returning a future into a [`Producer`].
///
/// # Example
/// ```ignore
/// let fetch = into_producer(|(id,): (u64,)| async move { load_user(id).await });
/// ```
pub fn into_producer<A, V, F, Fut>(f: F) -> Producer<A, V>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
{
    Arc::new(move |args: A| -> ProducerFuture<V> { f(args).boxed() })
}
