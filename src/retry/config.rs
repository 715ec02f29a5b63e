//! # Retry configuration.
//!
//! `retries` counts *extra* attempts: `retries = 3` means at most four calls.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::hooks::HookResult;
use crate::policies::{BackoffPolicy, RandomSource, ThreadRandom};

pub(super) type RetryPredicate<E> = Arc<dyn Fn(&E, u32) -> bool + Send + Sync>;
pub(super) type RetryHook<E> = Arc<dyn Fn(&E, u32, Duration) -> HookResult + Send + Sync>;

/// Configuration for [`retry::run`](crate::retry::run).
///
/// # Example
/// ```
/// use std::time::Duration;
/// use corral::{BackoffPolicy, RetryConfig};
///
/// let cfg: RetryConfig<std::io::Error> = RetryConfig::default()
///     .retries(5)
///     .backoff(BackoffPolicy::exponential(
///         Duration::from_millis(50),
///         Duration::from_secs(2),
///         2.0,
///     ))
///     .should_retry(|err: &std::io::Error, _attempt| err.kind() != std::io::ErrorKind::PermissionDenied);
/// assert_eq!(cfg.retries, 5);
/// ```
pub struct RetryConfig<E> {
    /// Extra attempts after the first failure.
    pub retries: u32,
    /// Delay between attempts.
    pub backoff: BackoffPolicy,
    pub(super) should_retry: Option<RetryPredicate<E>>,
    pub(super) on_retry: Option<RetryHook<E>>,
    pub(super) signal: Option<CancellationToken>,
    pub(super) random: Arc<dyn RandomSource>,
}

impl<E> RetryConfig<E> {
    /// Sets the number of extra attempts.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the delay policy.
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Decides, from the failure and the 1-based attempt that produced it, whether to
    /// try again. Returning `false` ends the run with
    /// [`RetryError::Exhausted`](crate::RetryError::Exhausted).
    pub fn should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Observer called before each backoff wait with the failure, the attempt that
    /// produced it and the upcoming delay. Its failures are logged and ignored.
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(&E, u32, Duration) -> HookResult + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Aborts the run when `token` is cancelled, mid-attempt or mid-wait.
    pub fn with_signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }

    /// Replaces the jitter randomness.
    pub fn with_random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Arc::new(random);
        self
    }

    /// Attempts are counted in `u32`, so `retries(u32::MAX)` stops at `u32::MAX` attempts.
    pub(super) fn allows_retry(&self, err: &E, attempt: u32) -> bool {
        attempt <= self.retries
            && attempt < u32::MAX
            && self
                .should_retry
                .as_ref()
                .is_none_or(|predicate| predicate(err, attempt))
    }
}

impl<E> Default for RetryConfig<E> {
    /// Default configuration:
    ///
    /// - `retries = 3`
    /// - `backoff = BackoffPolicy::default()` (100ms, ×2, capped at 30s, no jitter)
    /// - retry on every error, no hook, no token, thread-local randomness
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: BackoffPolicy::default(),
            should_retry: None,
            on_retry: None,
            signal: None,
            random: Arc::new(ThreadRandom),
        }
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            retries: self.retries,
            backoff: self.backoff,
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
            signal: self.signal.clone(),
            random: Arc::clone(&self.random),
        }
    }
}

impl<E> fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("retries", &self.retries)
            .field("backoff", &self.backoff)
            .field("should_retry", &self.should_retry.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}
