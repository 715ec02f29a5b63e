use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::hooks::{self, HookResult};

use super::config::CacheConfig;

/// Observer called when an entry leaves the cache.
pub type EvictHook<K, V> = Arc<dyn Fn(&K, &V, EvictReason) -> HookResult + Send + Sync>;

/// Why an entry left the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictReason {
    /// Least recently used entry dropped to make room.
    Capacity,
    /// Entry outlived its TTL.
    Expired,
    /// Removed by `remove` or `clear`.
    Removed,
}

/// Result of [`TtlCache::lookup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup<V> {
    /// Present and within its TTL.
    Fresh(V),
    /// Present but expired; still stored.
    Stale(V),
    /// Not present.
    Miss,
}

impl<V: Clone> Lookup<&V> {
    /// Clones the referenced value.
    pub fn cloned(self) -> Lookup<V> {
        match self {
            Lookup::Fresh(v) => Lookup::Fresh(v.clone()),
            Lookup::Stale(v) => Lookup::Stale(v.clone()),
            Lookup::Miss => Lookup::Miss,
        }
    }
}

/// Hit/miss/eviction counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found a fresh entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries dropped for capacity or expiry.
    pub evictions: u64,
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
    /// Position in the recency index.
    tick: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Bounded key-value store with per-entry expiry and least-recently-used eviction.
///
/// Expired entries are dropped lazily: on `get`, on `prune`, or when room is needed.
/// Until then they still count towards [`len`](Self::len).
///
/// Not synchronized; wrap it in a mutex to share it.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use corral::{CacheConfig, TtlCache};
///
/// let mut cache = TtlCache::new(&CacheConfig { max_size: 2, ..CacheConfig::default() });
/// cache.insert("a", 1);
/// cache.insert("b", 2);
/// cache.get(&"a");
/// cache.insert("c", 3);
///
/// assert!(cache.contains(&"a"));
/// assert!(!cache.contains(&"b"), "least recently used entry is evicted");
/// ```
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    recency: BTreeMap<u64, K>,
    tick: u64,
    ttl: Option<Duration>,
    capacity: Option<usize>,
    on_evict: Option<EvictHook<K, V>>,
    stats: CacheStats,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty cache using `ttl` and `max_size` from `cfg`.
    pub fn new(cfg: &CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            ttl: cfg.expiry(),
            capacity: cfg.capacity(),
            on_evict: None,
            stats: CacheStats::default(),
        }
    }

    /// Sets an observer for capacity evictions, expirations and removals.
    pub fn on_evict<H>(mut self, hook: H) -> Self
    where
        H: Fn(&K, &V, EvictReason) -> HookResult + Send + Sync + 'static,
    {
        self.on_evict = Some(Arc::new(hook));
        self
    }

    /// Returns a fresh entry and marks it most recently used. An expired entry is dropped.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        match self.entries.get(key).map(|e| e.is_expired(Instant::now())) {
            None => {
                self.stats.misses += 1;
                None
            }
            Some(true) => {
                self.stats.misses += 1;
                self.evict(key, EvictReason::Expired);
                None
            }
            Some(false) => {
                self.stats.hits += 1;
                self.touch(key);
                self.entries.get(key).map(|e| &e.value)
            }
        }
    }

    /// Like [`get`](Self::get), but hands back expired entries as [`Lookup::Stale`]
    /// instead of dropping them.
    pub fn lookup(&mut self, key: &K) -> Lookup<&V> {
        let Some(expired) = self.entries.get(key).map(|e| e.is_expired(Instant::now())) else {
            self.stats.misses += 1;
            return Lookup::Miss;
        };

        if expired {
            self.stats.misses += 1;
        } else {
            self.stats.hits += 1;
        }
        self.touch(key);
        match self.entries.get(key) {
            Some(e) if expired => Lookup::Stale(&e.value),
            Some(e) => Lookup::Fresh(&e.value),
            None => Lookup::Miss,
        }
    }

    /// Returns a fresh entry without touching recency or counters.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| &e.value)
    }

    /// True if a fresh entry exists.
    pub fn contains(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    /// Inserts with the configured TTL. Returns the replaced value, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.put(key, value, self.ttl)
    }

    /// Inserts with an explicit TTL (`0s` = never expires).
    pub fn insert_with_ttl(&mut self, key: K, value: V, ttl: Duration) -> Option<V> {
        self.put(key, value, (!ttl.is_zero()).then_some(ttl))
    }

    fn put(&mut self, key: K, value: V, ttl: Option<Duration>) -> Option<V> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let tick = self.next_tick();

        if let Some(entry) = self.entries.get_mut(&key) {
            self.recency.remove(&entry.tick);
            self.recency.insert(tick, key.clone());
            entry.tick = tick;
            entry.expires_at = expires_at;
            return Some(std::mem::replace(&mut entry.value, value));
        }

        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity {
                self.prune();
            }
            while self.entries.len() >= capacity {
                let Some(lru) = self.recency.values().next().cloned() else {
                    break;
                };
                self.evict(&lru, EvictReason::Capacity);
            }
        }

        self.recency.insert(tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at,
                tick,
            },
        );
        None
    }

    /// Removes an entry, expired or not.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.evict(key, EvictReason::Removed)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        let keys: Vec<K> = self.recency.values().cloned().collect();
        for key in keys {
            self.evict(&key, EvictReason::Removed);
        }
    }

    /// Drops expired entries. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.evict(key, EvictReason::Expired);
        }
        expired.len()
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn next_tick(&mut self) -> u64 {
        let tick = self.tick;
        self.tick += 1;
        tick
    }

    fn touch(&mut self, key: &K) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            self.recency.insert(tick, key.clone());
            entry.tick = tick;
        }
    }

    fn evict(&mut self, key: &K, reason: EvictReason) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        if reason != EvictReason::Removed {
            self.stats.evictions += 1;
        }
        tracing::trace!(?reason, "cache entry evicted");

        if let Some(hook) = &self.on_evict {
            hooks::invoke("cache", "on_evict", || hook(key, &entry.value, reason));
        }
        Some(entry.value)
    }
}

impl<K, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::advance;

    fn cfg(ttl_ms: u64, max_size: usize) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_millis(ttl_ms),
            max_size,
            ..CacheConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let mut cache = TtlCache::new(&cfg(100, 0));
        advance(Duration::from_millis(1000)).await;
        cache.insert("k", 1);

        advance(Duration::from_millis(99)).await;
        assert_eq!(cache.get(&"k"), Some(&1));

        advance(Duration::from_millis(2)).await;
        assert_eq!(cache.peek(&"k"), None);
        assert_eq!(cache.len(), 1, "expired entries linger until touched");
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_reports_stale_entries() {
        let mut cache = TtlCache::new(&cfg(100, 0));
        cache.insert("k", "v");
        assert_eq!(cache.lookup(&"k"), Lookup::Fresh(&"v"));

        advance(Duration::from_millis(150)).await;
        assert_eq!(cache.lookup(&"k").cloned(), Lookup::Stale("v"));
        assert_eq!(cache.lookup(&"missing"), Lookup::Miss);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let mut cache = TtlCache::new(&cfg(0, 2)).on_evict(move |k: &&str, _: &i32, reason| {
            log.lock().push((*k, reason));
            Ok(())
        });

        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(&1));
        // peek does not count as use
        assert_eq!(cache.peek(&"b"), Some(&2));
        cache.insert("c", 3);

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(*evicted.lock(), vec![("b", EvictReason::Capacity)]);

        // Replacing an existing key never evicts.
        assert_eq!(cache.insert("a", 10), Some(1));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_and_explicit_ttl() {
        let mut cache = TtlCache::new(&cfg(50, 0));
        cache.insert("short", 1);
        cache.insert_with_ttl("long", 2, Duration::from_secs(10));
        cache.insert_with_ttl("forever", 3, Duration::ZERO);

        advance(Duration::from_millis(60)).await;
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.len(), 2);

        advance(Duration::from_secs(3600)).await;
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.peek(&"forever"), Some(&3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hook_failures_are_isolated() {
        let mut cache = TtlCache::new(&cfg(0, 1)).on_evict(|_: &u8, _: &u8, reason| {
            if reason == EvictReason::Removed {
                panic!("observer panicked");
            }
            Err("observer failed".into())
        });

        cache.insert(1, 1);
        cache.insert(2, 2);
        assert_eq!(cache.remove(&2), Some(2));
        cache.insert(3, 3);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }
}
