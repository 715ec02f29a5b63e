use std::future::Future;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::error::PollError;

use super::config::PollConfig;

/// Repeats an operation on a schedule until its result says stop.
///
/// Cheap to clone; clones share the stop switch, so one clone can stop a run awaited
/// through another.
///
/// ### Outcomes of [`run`](Self::run)
/// - `Ok(value)`: `should_continue(&value)` returned `false`.
/// - [`PollError::Operation`]: the operation failed and `continue_on_error` is off.
/// - [`PollError::MaxAttempts`]: the attempt limit was reached.
/// - [`PollError::Stopped`]: [`stop`](Self::stop) was called.
/// - [`PollError::Aborted`]: the configured token was cancelled.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use corral::{PollConfig, Poller};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let poller = Poller::new(PollConfig::every(Duration::from_millis(1)));
///     let done = poller
///         .run(|attempt| async move { Ok::<_, String>(attempt) }, |n| *n < 3)
///         .await;
///     assert_eq!(done.unwrap(), 3);
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Poller {
    cfg: PollConfig,
    stop: CancellationToken,
}

impl Poller {
    /// Creates a poller.
    pub fn new(cfg: PollConfig) -> Self {
        Self {
            cfg,
            stop: CancellationToken::new(),
        }
    }

    /// Stops the current and any future run of this poller (and its clones).
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// True once [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Polls `op` (given the 1-based attempt number) until `should_continue` rejects a result.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, mut should_continue: P) -> Result<T, PollError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&T) -> bool,
    {
        let external = self.cfg.signal.clone().unwrap_or_default();
        let mut attempt: u32 = 0;

        loop {
            if self.stop.is_cancelled() {
                return Err(PollError::Stopped { attempts: attempt });
            }
            if external.is_cancelled() {
                return Err(PollError::Aborted { attempts: attempt });
            }

            attempt += 1;
            let res = select! {
                biased;
                _ = self.stop.cancelled() => return Err(PollError::Stopped { attempts: attempt }),
                _ = external.cancelled() => return Err(PollError::Aborted { attempts: attempt }),
                res = op(attempt) => res,
            };

            match res {
                Ok(value) if !should_continue(&value) => return Ok(value),
                Ok(_) => {}
                Err(error) if !self.cfg.continue_on_error => {
                    return Err(PollError::Operation {
                        attempts: attempt,
                        error,
                    });
                }
                Err(_) => tracing::debug!(attempt, "poll attempt failed, continuing"),
            }

            if self.cfg.attempt_limit().is_some_and(|limit| attempt >= limit) {
                return Err(PollError::MaxAttempts { attempts: attempt });
            }

            let delay = self.cfg.schedule.next(attempt - 1);
            tracing::trace!(attempt, ?delay, "waiting for next poll");
            select! {
                biased;
                _ = self.stop.cancelled() => return Err(PollError::Stopped { attempts: attempt }),
                _ = external.cancelled() => return Err(PollError::Aborted { attempts: attempt }),
                _ = time::sleep(delay) => {}
            }
        }
    }
}
