//! # Task queue configuration.
//!
//! ## Sentinel values
//! - `concurrency = 0` → unlimited
//! - `timeout = 0s` → no per-task timeout

use std::time::Duration;

/// Configuration for a [`TaskQueue`](crate::TaskQueue).
///
/// Hooks and the cancellation token are attached through
/// [`TaskQueueBuilder`](crate::TaskQueueBuilder), not here.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Maximum number of operations running at once (`0` = unlimited).
    ///
    /// Can be changed later with [`TaskQueue::set_concurrency`](crate::TaskQueue::set_concurrency).
    pub concurrency: usize,

    /// Start dispatching immediately. With `false` the queue is created paused
    /// and nothing runs until [`TaskQueue::resume`](crate::TaskQueue::resume).
    pub autostart: bool,

    /// Per-task timeout (`0s` = none). A task exceeding it is dropped and its handle
    /// settles with [`QueueError::Timeout`](crate::QueueError::Timeout).
    pub timeout: Duration,
}

impl QueueConfig {
    /// Returns the concurrency ceiling with the `0` sentinel resolved.
    #[inline]
    pub fn concurrency_limit(&self) -> usize {
        if self.concurrency == 0 {
            usize::MAX
        } else {
            self.concurrency
        }
    }

    /// Returns the per-task timeout as an `Option`.
    #[inline]
    pub fn task_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Shorthand for a config with the given concurrency and other fields defaulted.
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }
}

impl Default for QueueConfig {
    /// Default configuration:
    ///
    /// - `concurrency = 0` (unlimited)
    /// - `autostart = true`
    /// - `timeout = 0s` (no timeout)
    fn default() -> Self {
        Self {
            concurrency: 0,
            autostart: true,
            timeout: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.concurrency_limit(), usize::MAX);
        assert_eq!(cfg.task_timeout(), None);

        let cfg = QueueConfig {
            concurrency: 3,
            timeout: Duration::from_millis(20),
            ..QueueConfig::default()
        };
        assert_eq!(cfg.concurrency_limit(), 3);
        assert_eq!(cfg.task_timeout(), Some(Duration::from_millis(20)));
    }
}
