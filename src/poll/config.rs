//! # Poller configuration.
//!
//! ## Sentinel values
//! - `max_attempts = 0` → unlimited

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::policies::BackoffPolicy;

/// Configuration for a [`Poller`](crate::Poller).
#[derive(Clone, Debug)]
pub struct PollConfig {
    /// Wait between attempts; `schedule.next(n - 1)` follows attempt `n`.
    /// Use [`BackoffPolicy::fixed`] for a plain interval.
    pub schedule: BackoffPolicy,
    /// Give up with [`PollError::MaxAttempts`](crate::PollError::MaxAttempts) after this
    /// many attempts (`0` = never).
    pub max_attempts: u32,
    /// Keep polling when the operation fails instead of returning its error.
    pub continue_on_error: bool,
    /// External cancellation; ends the run with [`PollError::Aborted`](crate::PollError::Aborted).
    pub signal: Option<CancellationToken>,
}

impl PollConfig {
    /// Fixed-interval polling with other fields defaulted.
    pub fn every(interval: Duration) -> Self {
        Self {
            schedule: BackoffPolicy::fixed(interval),
            ..Self::default()
        }
    }

    /// Returns `max_attempts` as an `Option`.
    #[inline]
    pub fn attempt_limit(&self) -> Option<u32> {
        (self.max_attempts != 0).then_some(self.max_attempts)
    }
}

impl Default for PollConfig {
    /// Default configuration:
    ///
    /// - `schedule = BackoffPolicy::fixed(1s)`
    /// - `max_attempts = 0` (unlimited)
    /// - `continue_on_error = false`
    /// - `signal = None`
    fn default() -> Self {
        Self {
            schedule: BackoffPolicy::fixed(Duration::from_secs(1)),
            max_attempts: 0,
            continue_on_error: false,
            signal: None,
        }
    }
}
