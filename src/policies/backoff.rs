//! # Backoff policy for retries and polling.
//!
//! [`BackoffPolicy`] controls how delays grow between attempts.
//! It is parameterized by:
//! - [`BackoffPolicy::first`] the initial delay;
//! - [`BackoffPolicy::max`] the maximum delay cap;
//! - [`BackoffPolicy::factor`] the growth factor;
//! - [`BackoffPolicy::strategy`] the growth curve;
//! - [`BackoffPolicy::jitter`] randomization applied last.
//!
//! The base delay for attempt `n` (0-indexed) is derived from `n` alone and clamped to `max`,
//! then jitter is applied. Jitter output never feeds back into later attempts, so delays
//! cannot drift downwards over a long run.
//!
//! | strategy      | base delay for attempt `n`        |
//! |---------------|-----------------------------------|
//! | `Fixed`       | `first`                           |
//! | `Linear`      | `first × (1 + factor × n)`        |
//! | `Exponential` | `first × factor^n`                |
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use corral::{BackoffPolicy, BackoffStrategy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_millis(75),
//!     factor: 2.0,
//!     strategy: BackoffStrategy::Exponential,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(50));
//! // 50ms × 2 = 100ms → capped at max=75ms
//! assert_eq!(backoff.next(1), Duration::from_millis(75));
//! ```

use std::time::Duration;

use super::jitter::{JitterPolicy, scale};
use super::random::{RandomSource, ThreadRandom};

/// Shape of the delay curve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Every attempt waits `first`.
    Fixed,
    /// Delay grows by `first × factor` per attempt.
    Linear,
    /// Delay is multiplied by `factor` per attempt.
    #[default]
    Exponential,
}

/// Delay policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry (attempt 0).
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Growth factor (`>= 1.0` recommended for `Exponential`).
    pub factor: f64,
    /// Growth curve.
    pub strategy: BackoffStrategy,
    /// Jitter policy to prevent thundering herd.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `first = 100ms`;
    /// - `max = 30s`;
    /// - `factor = 2.0`, exponential;
    /// - no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            strategy: BackoffStrategy::Exponential,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// A constant delay of `interval` on every attempt.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            first: interval,
            max: interval,
            factor: 1.0,
            strategy: BackoffStrategy::Fixed,
            jitter: JitterPolicy::None,
        }
    }

    /// Exponential growth from `first` by `factor`, capped at `max`.
    pub fn exponential(first: Duration, max: Duration, factor: f64) -> Self {
        Self {
            first,
            max,
            factor,
            strategy: BackoffStrategy::Exponential,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns a copy with the given jitter.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Base delay for `attempt` before jitter, clamped to [`BackoffPolicy::max`].
    ///
    /// Non-finite or negative intermediate values (huge attempts, odd factors) clamp to `max`.
    pub fn base(&self, attempt: u32) -> Duration {
        let multiplier = match self.strategy {
            BackoffStrategy::Fixed => 1.0,
            BackoffStrategy::Linear => 1.0 + self.factor * f64::from(attempt),
            BackoffStrategy::Exponential => {
                let exp = attempt.min(i32::MAX as u32) as i32;
                self.factor.powi(exp)
            }
        };

        let unclamped = self.first.as_nanos() as f64 * multiplier;
        if !unclamped.is_finite() || unclamped < 0.0 || unclamped > self.max.as_nanos() as f64 {
            return self.max;
        }
        scale(self.first, multiplier).min(self.max)
    }

    /// Computes the jittered delay for `attempt` using the thread-local generator.
    pub fn next(&self, attempt: u32) -> Duration {
        self.next_with(attempt, &ThreadRandom)
    }

    /// Computes the jittered delay for `attempt` drawing randomness from `rng`.
    pub fn next_with(&self, attempt: u32, rng: &dyn RandomSource) -> Duration {
        self.jitter.apply(self.base(attempt), rng)
    }
}
