use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::hooks::panic_message;

use super::config::CacheConfig;
use super::store::{Lookup, TtlCache};

type MemoFn<K, V, E> = Arc<dyn Fn(K) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

/// Stored outcome; failures are kept only with `cache_errors`.
type Cached<V, E> = Result<V, Arc<E>>;

struct Inner<K, V, E> {
    func: MemoFn<K, V, E>,
    cfg: CacheConfig,
    store: Mutex<TtlCache<K, Cached<V, E>>>,
    refreshing: Mutex<HashSet<K>>,
}

impl<K, V, E> Inner<K, V, E>
where
    K: Eq + Hash + Clone,
{
    fn record(&self, key: K, outcome: &Cached<V, E>)
    where
        V: Clone,
    {
        if outcome.is_ok() || self.cfg.cache_errors {
            self.store.lock().insert(key, outcome.clone());
        }
    }
}

/// Async function whose results are cached per argument.
///
/// - A fresh entry is returned without calling the function.
/// - On a miss (or an expired entry without stale-while-revalidate) the function is
///   called and a success is stored with the configured TTL.
/// - With `stale_while_revalidate` an expired entry is returned immediately and one
///   background refresh per key replaces it; concurrent readers never start a second one.
/// - With `cache_errors` failures are stored too and re-raised until they expire, as the
///   same [`Arc`].
///
/// Concurrent misses each call the function; compose with [`Dedupe`](crate::Dedupe) to
/// coalesce them. Cheap to clone; clones share one cache.
///
/// # Example
/// ```rust
/// use corral::{CacheConfig, Memoized};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let square: Memoized<u64, u64, String> =
///         Memoized::new(CacheConfig::default(), |n: u64| async move { Ok(n * n) });
///
///     assert_eq!(square.get(12).await.unwrap(), 144);
///     assert!(square.is_cached(&12));
/// }
/// ```
pub struct Memoized<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

impl<K, V, E> Clone for Memoized<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> Memoized<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Wraps `f` with a cache configured by `cfg`.
    pub fn new<F, Fut>(cfg: CacheConfig, f: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                func: Arc::new(move |key| f(key).boxed()),
                store: Mutex::new(TtlCache::new(&cfg)),
                refreshing: Mutex::new(HashSet::new()),
                cfg,
            }),
        }
    }

    /// Returns the cached outcome for `key`, calling the function when needed.
    pub async fn get(&self, key: K) -> Result<V, Arc<E>> {
        let found = self.inner.store.lock().lookup(&key).cloned();
        match found {
            Lookup::Fresh(outcome) => return outcome,
            Lookup::Stale(outcome) if self.inner.cfg.stale_while_revalidate => {
                self.refresh_in_background(key);
                return outcome;
            }
            Lookup::Stale(_) | Lookup::Miss => {}
        }

        let outcome = (self.inner.func)(key.clone()).await.map_err(Arc::new);
        self.inner.record(key, &outcome);
        outcome
    }

    fn refresh_in_background(&self, key: K) {
        if !self.inner.refreshing.lock().insert(key.clone()) {
            return;
        }
        tracing::trace!("starting background refresh");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let call = AssertUnwindSafe(async { (inner.func)(key.clone()).await });
            match call.catch_unwind().await {
                Ok(outcome) => {
                    let outcome = outcome.map_err(Arc::new);
                    if outcome.is_err() && !inner.cfg.cache_errors {
                        tracing::debug!("background refresh failed, keeping stale entry");
                    }
                    inner.record(key.clone(), &outcome);
                }
                Err(payload) => {
                    tracing::warn!(
                        panic = %panic_message(payload.as_ref()),
                        "background refresh panicked, keeping stale entry"
                    );
                }
            }
            inner.refreshing.lock().remove(&key);
        });
    }

    /// True while a background refresh for `key` is running.
    pub fn is_refreshing(&self, key: &K) -> bool {
        self.inner.refreshing.lock().contains(key)
    }

    /// True if a fresh entry exists for `key`.
    pub fn is_cached(&self, key: &K) -> bool {
        self.inner.store.lock().contains(key)
    }

    /// Drops the entry for `key`.
    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.store.lock().remove(key).is_some()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.inner.store.lock().clear();
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.store.lock().len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.store.lock().is_empty()
    }
}
