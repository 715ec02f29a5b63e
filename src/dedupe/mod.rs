//! # Call coalescing by key.
//!
//! ```text
//!  call(args) ──► key = prefix:json(args) ──► lock ─┬─ live record? ──► subscribe ──► Shared future
//!                                                   └─ none/stale  ──► register(gen) + spawn driver
//!
//!  driver: select(token.cancelled, catch_unwind(f(args)))
//!            └─► remove record if generation still matches ──► outcome to every subscriber
//! ```
//!
//! Check and register happen in one critical section, so two calls with the same key
//! never both invoke the wrapped function while a live record exists.
//!
//! A record stops accepting subscribers once it is older than `max_age` or `timeout`;
//! the next call supersedes it without cancelling it. Only [`Dedupe::abort`],
//! [`Dedupe::abort_all`], [`Dedupe::reset`] and the `max_age` sweep cancel invocations.

mod config;
mod core;
mod key;
mod record;
mod snapshot;
mod sweep;

pub use self::core::{Dedupe, DedupeBuilder};
pub use config::DedupeConfig;
pub use snapshot::ErrorSnapshot;
