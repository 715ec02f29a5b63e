//! # Dedupe configuration.
//!
//! ## Sentinel values
//! - `max_age = 0s` → records never go stale and no sweep runs
//! - `timeout = 0s` → records never time out

use std::time::Duration;

/// Configuration for a [`Dedupe`](crate::Dedupe) coalescer.
///
/// The key function is attached through [`DedupeBuilder::keyed`](crate::DedupeBuilder::keyed).
#[derive(Clone, Debug)]
pub struct DedupeConfig {
    /// Age after which an in-flight record is stale: new callers start a fresh
    /// invocation, and the background sweep aborts it (`0s` = never).
    pub max_age: Duration,

    /// Age after which an in-flight record no longer accepts subscribers (`0s` = never).
    /// The timed-out invocation keeps running for the callers already attached.
    pub timeout: Duration,

    /// Deliver the same error allocation to every subscriber. With `false` each
    /// subscriber receives its own clone.
    pub error_sharing: bool,

    /// Static namespace prepended to every derived key as `"{prefix}:{key}"`.
    pub prefix: Option<String>,
}

impl DedupeConfig {
    /// Returns `max_age` as an `Option`.
    #[inline]
    pub fn stale_after(&self) -> Option<Duration> {
        (!self.max_age.is_zero()).then_some(self.max_age)
    }

    /// Returns `timeout` as an `Option`.
    #[inline]
    pub fn join_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}

impl Default for DedupeConfig {
    /// Default configuration:
    ///
    /// - `max_age = 0s` (never stale)
    /// - `timeout = 0s` (never times out)
    /// - `error_sharing = true`
    /// - `prefix = None`
    fn default() -> Self {
        Self {
            max_age: Duration::ZERO,
            timeout: Duration::ZERO,
            error_sharing: true,
            prefix: None,
        }
    }
}
