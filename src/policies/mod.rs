//! Delay policies shared by the retry runner and the poller.
//!
//! ## Contents
//! - [`BackoffPolicy`]   how delays evolve (first / factor / max + strategy + jitter)
//! - [`BackoffStrategy`] shape of the growth curve (fixed / linear / exponential)
//! - [`JitterPolicy`]    randomization applied on top of the base delay
//! - [`RandomSource`]    injectable randomness, so jittered delays are reproducible in tests
//!
//! ## Quick wiring
//! ```text
//! RetryConfig { retries, backoff: BackoffPolicy, .. }
//!      └─► retry::run uses backoff.next(attempt) between attempts
//! PollConfig  { schedule: BackoffPolicy, .. }
//!      └─► Poller uses schedule.next(attempt) between polls
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=100ms, factor=2.0 (exponential), max=30s, jitter=None.
//! - `JitterPolicy::None` by default; `Equal` keeps each delay within `[base/2, base]`.

mod backoff;
mod jitter;
mod random;

pub use backoff::{BackoffPolicy, BackoffStrategy};
pub use jitter::JitterPolicy;
pub use random::{RandomSource, SeededRandom, ThreadRandom};
