//! # Cache configuration.
//!
//! ## Sentinel values
//! - `ttl = 0s` → entries never expire
//! - `max_size = 0` → unbounded

use std::time::Duration;

/// Configuration for a [`TtlCache`](crate::TtlCache) or [`Memoized`](crate::Memoized) function.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Lifetime of an entry from insertion (`0s` = forever).
    pub ttl: Duration,
    /// Maximum number of entries; the least recently used one is evicted on overflow
    /// (`0` = unbounded).
    pub max_size: usize,
    /// Serve expired entries while a background refresh runs (memoized functions only).
    pub stale_while_revalidate: bool,
    /// Store failures too, re-raising them until they expire (memoized functions only).
    pub cache_errors: bool,
}

impl CacheConfig {
    /// Returns `ttl` as an `Option`.
    #[inline]
    pub fn expiry(&self) -> Option<Duration> {
        (!self.ttl.is_zero()).then_some(self.ttl)
    }

    /// Returns `max_size` as an `Option`.
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        (self.max_size != 0).then_some(self.max_size)
    }
}

impl Default for CacheConfig {
    /// Default configuration:
    ///
    /// - `ttl = 60s`
    /// - `max_size = 0` (unbounded)
    /// - `stale_while_revalidate = false`
    /// - `cache_errors = false`
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_size: 0,
            stale_while_revalidate: false,
            cache_errors: false,
        }
    }
}
