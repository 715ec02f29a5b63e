//! # Priority task queue with bounded concurrency.
//!
//! ```text
//!  add(op, prio) ──► pending (lazily sorted: prio desc, then FIFO)
//!                        │ dispatch(): while !paused && !aborted && active < concurrency
//!                        ▼
//!                  tokio::spawn(op) ──► settle: stats, on_error hook, idle signals
//!                        │                         │
//!                        └────── TaskHandle ◄──────┘ (exactly once)
//! ```
//!
//! - [`TaskQueue`] cloneable handle to the queue.
//! - [`TaskQueueBuilder`] attaches the `on_error` hook and an abort token.
//! - [`TaskHandle`] future for one task's outcome.
//! - [`Idle`] future returned by `on_empty` / `on_drain`.
//! - [`QueueStats`] counters snapshot.

mod config;
mod core;
mod handle;
mod signal;
mod stats;

pub use config::QueueConfig;
pub use self::core::{ErrorHook, TaskQueue, TaskQueueBuilder};
pub use handle::TaskHandle;
pub use signal::Idle;
pub use stats::QueueStats;
