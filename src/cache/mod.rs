//! # TTL/LRU cache and memoized functions.
//!
//! - [`TtlCache`] synchronous store: per-entry expiry, least-recently-used eviction,
//!   `on_evict` observer.
//! - [`Memoized`] async function wrapper on top of a shared `TtlCache`, adding
//!   stale-while-revalidate and error caching.
//!
//! ```text
//! Memoized::get(k) ─► lookup(k) ─┬─ Fresh(v)            ─► v
//!                                ├─ Stale(v) + swr      ─► v, spawn refresh(k) once
//!                                └─ Miss / Stale(no swr) ─► f(k).await ─► store if Ok
//!                                                                       (or if cache_errors)
//! ```

mod config;
mod memo;
mod store;

pub use config::CacheConfig;
pub use memo::Memoized;
pub use store::{CacheStats, EvictHook, EvictReason, Lookup, TtlCache};
