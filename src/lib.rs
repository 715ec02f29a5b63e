//! # corral
//!
//! **Corral** is a small set of composable concurrency-control primitives for async Rust
//! on tokio.
//!
//! Each component is an independent, owned instance built from a `*Config` with
//! documented defaults. Components never share state with each other, so they compose
//! freely: queue a task that calls a coalesced function that retries with backoff.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller ──► op: FnOnce() -> Future<Result<T, E>>
//!                 │
//!     ┌───────────┼──────────────┬─────────────────┬───────────────────┐
//!     ▼           ▼              ▼                 ▼                   ▼
//! ┌─────────┐ ┌────────┐  ┌─────────────┐  ┌──────────────┐   ┌────────────┐
//! │TaskQueue│ │ Dedupe │  │ retry::run  │  │   Poller     │   │ Memoized / │
//! │priority,│ │ one    │  │ attempts +  │  │ repeat until │   │ TtlCache   │
//! │ceiling, │ │ call   │  │ backoff     │  │ predicate is │   │ TTL + LRU, │
//! │stats,   │ │ per key│  │             │  │ false        │   │ SWR        │
//! │idle sigs│ │        │  │             │  │              │   │            │
//! └────┬────┘ └───┬────┘  └──────┬──────┘  └──────┬───────┘   └─────┬──────┘
//!      │          │              └───► BackoffPolicy ◄──┘            │
//!      │          │                    (+ JitterPolicy, RandomSource)│
//!      ▼          ▼                                                  ▼
//!   TaskHandle  shared future                                 cached outcome
//!  (settles exactly once, with the op's result or a named structural error)
//! ```
//!
//! ### Shared rules
//! - State lives behind one mutex per instance; no critical section awaits.
//! - Every long wait races a [`CancellationToken`](tokio_util::sync::CancellationToken);
//!   an already-cancelled token short-circuits before any work starts.
//! - Hooks (`on_error`, `on_retry`, `on_evict`) may fail or panic; the failure is
//!   logged with `tracing::warn!` and otherwise ignored.
//! - Operational failures are returned verbatim; structural ones (cleared, aborted,
//!   stopped, timed out) are separate variants of each component's error enum.
//!
//! ## Features
//! | Area          | Description                                                          | Key types                                   |
//! |---------------|----------------------------------------------------------------------|---------------------------------------------|
//! | **Queue**     | Priority ordering, exact concurrency ceiling, pause/clear, idle signals | [`TaskQueue`], [`TaskHandle`], [`QueueStats`] |
//! | **Dedupe**    | Coalesce concurrent calls by key, abort, staleness sweep             | [`Dedupe`], [`DedupeBuilder`], [`ErrorSnapshot`] |
//! | **Retry**     | Bounded attempts with backoff, predicate and observer                | [`retry::run`], [`RetryConfig`]             |
//! | **Cache**     | TTL/LRU store, memoized functions with stale-while-revalidate        | [`TtlCache`], [`Memoized`]                  |
//! | **Poll**      | Repeat on a schedule until a predicate declines                      | [`Poller`], [`PollConfig`]                  |
//! | **Policies**  | Backoff strategies, jitter, injectable randomness                    | [`BackoffPolicy`], [`JitterPolicy`], [`RandomSource`] |
//! | **Errors**    | Typed, labelled errors per component                                 | [`QueueError`], [`DedupeError`], [`RetryError`], [`PollError`] |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use corral::{BackoffPolicy, QueueConfig, RetryConfig, TaskQueue, retry};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let queue: TaskQueue<String, String> = TaskQueue::new(QueueConfig::with_concurrency(2));
//!
//!     let handles: Vec<_> = (0..4)
//!         .map(|i| {
//!             queue.add_with_priority(
//!                 move || async move {
//!                     let cfg = RetryConfig::default()
//!                         .retries(2)
//!                         .backoff(BackoffPolicy::fixed(Duration::from_millis(1)));
//!                     retry::run(&cfg, |attempt| async move {
//!                         if attempt < 2 { Err("flaky") } else { Ok(format!("job {i}")) }
//!                     })
//!                     .await
//!                     .map_err(|e| e.to_string())
//!                 },
//!                 i,
//!             )
//!         })
//!         .collect();
//!
//!     for handle in handles {
//!         assert!(handle.await.is_ok());
//!     }
//!     queue.on_drain().await;
//!     assert_eq!(queue.stats().completed, 4);
//! }
//! ```
mod cache;
mod dedupe;
mod error;
mod hooks;
mod policies;
mod poll;
mod queue;
pub mod retry;

// ---- Public re-exports ----

pub use cache::{CacheConfig, CacheStats, EvictHook, EvictReason, Lookup, Memoized, TtlCache};
pub use dedupe::{Dedupe, DedupeBuilder, DedupeConfig, ErrorSnapshot};
pub use error::{DedupeError, PollError, QueueError, RetryError};
pub use hooks::{HookError, HookResult};
pub use policies::{
    BackoffPolicy, BackoffStrategy, JitterPolicy, RandomSource, SeededRandom, ThreadRandom,
};
pub use poll::{PollConfig, Poller};
pub use queue::{ErrorHook, Idle, QueueConfig, QueueStats, TaskHandle, TaskQueue, TaskQueueBuilder};
pub use retry::RetryConfig;
