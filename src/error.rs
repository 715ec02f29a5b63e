//! Error types returned by corral components.
//!
//! Every component separates two kinds of failure:
//!
//! - **operational**: the caller's own operation failed; its error is carried verbatim
//!   (`Operation(..)` variants);
//! - **structural**: the component settled the call itself (cleared, aborted, stopped,
//!   timed out, exhausted). These never wrap a caller error except
//!   [`RetryError::Exhausted`], which keeps the last failure as its cause.
//!
//! All enums provide `as_label` (stable snake_case label for logs/metrics) and
//! `is_structural`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// # Errors settled through a [`TaskQueue`](crate::TaskQueue) handle.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq)]
pub enum QueueError<E> {
    /// Task was removed by `clear()` (or by an abort) before it started.
    #[error("task cleared from queue before it started")]
    Cleared,

    /// Queue was aborted; the task was never admitted.
    #[error("queue aborted")]
    Aborted,

    /// Task exceeded the per-task timeout and was dropped.
    #[error("task timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Task panicked while running.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// The operation's own error.
    #[error("{0}")]
    Operation(E),
}

impl<E> QueueError<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use corral::QueueError;
    ///
    /// let err: QueueError<std::io::Error> = QueueError::Cleared;
    /// assert_eq!(err.as_label(), "queue_cleared");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Cleared => "queue_cleared",
            QueueError::Aborted => "queue_aborted",
            QueueError::Timeout { .. } => "queue_task_timeout",
            QueueError::Panicked { .. } => "queue_task_panicked",
            QueueError::Operation(_) => "queue_task_failed",
        }
    }

    /// True for every variant except [`QueueError::Operation`].
    pub fn is_structural(&self) -> bool {
        !matches!(self, QueueError::Operation(_))
    }

    /// Returns the operation's own error, if that is what this is.
    pub fn into_operation(self) -> Option<E> {
        match self {
            QueueError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// # Errors returned by a [`Dedupe`](crate::Dedupe) call.
///
/// Operational failures are shared behind an [`Arc`]: with error sharing enabled every
/// subscriber of one in-flight call receives the same allocation, otherwise each gets
/// its own clone.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DedupeError<E> {
    /// The in-flight call was aborted (`abort`, `abort_all`, `reset`, or the staleness sweep).
    #[error("in-flight call for key {key:?} was aborted")]
    Aborted {
        /// Coalescing key of the aborted call.
        key: String,
    },

    /// A coalescing key could not be derived from the arguments; nothing was started.
    #[error("cannot derive coalescing key: {reason}")]
    Key {
        /// Why key derivation failed.
        reason: String,
    },

    /// The wrapped function panicked.
    #[error("wrapped call panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// The wrapped function's own error.
    #[error("{0}")]
    Operation(Arc<E>),
}

impl<E> Clone for DedupeError<E> {
    fn clone(&self) -> Self {
        match self {
            DedupeError::Aborted { key } => DedupeError::Aborted { key: key.clone() },
            DedupeError::Key { reason } => DedupeError::Key {
                reason: reason.clone(),
            },
            DedupeError::Panicked { message } => DedupeError::Panicked {
                message: message.clone(),
            },
            DedupeError::Operation(e) => DedupeError::Operation(Arc::clone(e)),
        }
    }
}

impl<E> DedupeError<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DedupeError::Aborted { .. } => "dedupe_aborted",
            DedupeError::Key { .. } => "dedupe_key",
            DedupeError::Panicked { .. } => "dedupe_panicked",
            DedupeError::Operation(_) => "dedupe_failed",
        }
    }

    /// True for every variant except [`DedupeError::Operation`].
    pub fn is_structural(&self) -> bool {
        !matches!(self, DedupeError::Operation(_))
    }

    /// Returns the shared operational error, if any.
    pub fn operation(&self) -> Option<&Arc<E>> {
        match self {
            DedupeError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// # Errors returned by [`retry`](crate::retry::run).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// The cancellation token fired before the operation succeeded.
    #[error("retry aborted after {attempts} attempt(s)")]
    Aborted {
        /// Attempts started before the abort.
        attempts: u32,
    },

    /// Attempts ran out, or the retry predicate declined to retry.
    #[error("operation failed after {attempts} attempt(s): {error}")]
    Exhausted {
        /// Total attempts made.
        attempts: u32,
        /// The last operational failure.
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use corral::RetryError;
    ///
    /// let err = RetryError::Exhausted { attempts: 4, error: "boom" };
    /// assert_eq!(err.as_label(), "retry_exhausted");
    /// assert_eq!(err.attempts(), 4);
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RetryError::Aborted { .. } => "retry_aborted",
            RetryError::Exhausted { .. } => "retry_exhausted",
        }
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Aborted { attempts } | RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The original failure behind an exhausted retry.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { error, .. } => Some(error),
            RetryError::Aborted { .. } => None,
        }
    }

    /// Consumes the error and returns the original failure, if any.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted { error, .. } => Some(error),
            RetryError::Aborted { .. } => None,
        }
    }
}

/// # Errors returned by a [`Poller`](crate::Poller).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PollError<E> {
    /// [`Poller::stop`](crate::Poller::stop) was called.
    #[error("poller stopped after {attempts} attempt(s)")]
    Stopped {
        /// Attempts made before stopping.
        attempts: u32,
    },

    /// The external cancellation token fired.
    #[error("poller aborted after {attempts} attempt(s)")]
    Aborted {
        /// Attempts made before the abort.
        attempts: u32,
    },

    /// `max_attempts` was reached while the predicate still asked to continue.
    #[error("poller gave up after {attempts} attempt(s)")]
    MaxAttempts {
        /// The configured limit.
        attempts: u32,
    },

    /// The polled operation failed and `continue_on_error` is off.
    #[error("poll attempt {attempts} failed: {error}")]
    Operation {
        /// Attempt that failed (1-based).
        attempts: u32,
        /// The operation's own error.
        error: E,
    },
}

impl<E> PollError<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PollError::Stopped { .. } => "poll_stopped",
            PollError::Aborted { .. } => "poll_aborted",
            PollError::MaxAttempts { .. } => "poll_max_attempts",
            PollError::Operation { .. } => "poll_failed",
        }
    }

    /// True for every variant except [`PollError::Operation`].
    pub fn is_structural(&self) -> bool {
        !matches!(self, PollError::Operation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_labels_and_structure() {
        let cleared: QueueError<&str> = QueueError::Cleared;
        assert!(cleared.is_structural());
        assert_eq!(cleared.to_string(), "task cleared from queue before it started");

        let op: QueueError<&str> = QueueError::Operation("disk full");
        assert!(!op.is_structural());
        assert_eq!(op.to_string(), "disk full");
        assert_eq!(op.into_operation(), Some("disk full"));
    }

    #[test]
    fn test_dedupe_clone_shares_allocation() {
        let err: DedupeError<String> = DedupeError::Operation(Arc::new("nope".into()));
        let copy = err.clone();
        assert!(Arc::ptr_eq(
            err.operation().expect("operation"),
            copy.operation().expect("operation")
        ));
    }

    #[test]
    fn test_retry_exposes_cause() {
        let err = RetryError::Exhausted {
            attempts: 3,
            error: "timeout",
        };
        assert_eq!(err.last_error(), Some(&"timeout"));
        assert_eq!(err.to_string(), "operation failed after 3 attempt(s): timeout");
        assert_eq!(RetryError::<&str>::Aborted { attempts: 1 }.last_error(), None);
    }

    #[test]
    fn test_poll_labels() {
        let err: PollError<&str> = PollError::MaxAttempts { attempts: 5 };
        assert_eq!(err.as_label(), "poll_max_attempts");
        assert!(err.is_structural());
    }
}
