use std::future::Future;

use tokio::{select, time};

use crate::error::RetryError;
use crate::hooks;

use super::config::RetryConfig;

/// Runs `op` until it succeeds, retries run out, or the token fires.
///
/// `op` receives the 1-based attempt number. After a failed attempt `n` the wait is
/// `cfg.backoff.next(n - 1)`, so the first retry waits `backoff.first`.
///
/// ### Outcomes
/// - `Ok(value)` from the first successful attempt.
/// - [`RetryError::Exhausted`] with the last failure once `retries` extra attempts are
///   spent or the predicate declines.
/// - [`RetryError::Aborted`] when the token fires, even mid-attempt or mid-wait. An
///   already-cancelled token returns before the first attempt.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use corral::{BackoffPolicy, RetryConfig, retry};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let cfg = RetryConfig::default()
///         .retries(2)
///         .backoff(BackoffPolicy::fixed(Duration::from_millis(1)));
///
///     let value = retry::run(&cfg, |attempt| async move {
///         if attempt < 3 { Err("not yet") } else { Ok(attempt) }
///     })
///     .await;
///     assert_eq!(value.unwrap(), 3);
/// }
/// ```
pub async fn run<T, E, F, Fut>(cfg: &RetryConfig<E>, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let token = cfg.signal.clone().unwrap_or_default();
    if token.is_cancelled() {
        return Err(RetryError::Aborted { attempts: 0 });
    }

    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let res = select! {
            biased;
            _ = token.cancelled() => return Err(RetryError::Aborted { attempts: attempt }),
            res = op(attempt) => res,
        };

        let err = match res {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !cfg.allows_retry(&err, attempt) {
            tracing::debug!(attempts = attempt, "retry exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                error: err,
            });
        }

        let delay = cfg.backoff.next_with(attempt - 1, cfg.random.as_ref());
        if let Some(hook) = &cfg.on_retry {
            hooks::invoke("retry", "on_retry", || hook(&err, attempt, delay));
        }
        tracing::debug!(attempt, ?delay, "attempt failed, backing off");

        select! {
            biased;
            _ = token.cancelled() => return Err(RetryError::Aborted { attempts: attempt }),
            _ = time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{BackoffPolicy, JitterPolicy, SeededRandom};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::{Instant, sleep};
    use tokio_util::sync::CancellationToken;

    fn fast() -> RetryConfig<String> {
        RetryConfig::default().backoff(BackoffPolicy::exponential(
            Duration::from_millis(100),
            Duration::from_secs(1),
            2.0,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures_with_growing_delays() {
        let started = Instant::now();
        let res = run(&fast(), |attempt| async move {
            if attempt < 3 {
                Err(format!("attempt {attempt} failed"))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(res.ok(), Some(3));
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_keeps_last_cause() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = run(&fast().retries(2), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure {attempt}")) }
        })
        .await;

        let err = res.unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.last_error().map(String::as_str), Some("failure 3"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unbounded_retries_stop_at_counter_limit() {
        let cfg = fast().retries(u32::MAX);
        let err = "boom".to_string();
        assert!(cfg.allows_retry(&err, 1));
        assert!(cfg.allows_retry(&err, u32::MAX - 1));
        assert!(!cfg.allows_retry(&err, u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_can_stop_early() {
        let cfg = fast().should_retry(|err: &String, _| !err.starts_with("fatal"));
        let res: Result<(), _> = run(&cfg, |_| async { Err("fatal: bad input".to_string()) }).await;
        assert!(matches!(res, Err(RetryError::Exhausted { attempts: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_delays_and_cannot_break_run() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let cfg = fast().retries(2).on_retry(move |_, attempt, delay| {
            log.lock().push((attempt, delay));
            Err("observer is broken".into())
        });

        let res: Result<(), _> = run(&cfg, |_| async { Err("down".to_string()) }).await;
        assert!(matches!(res, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(
            *seen.lock(),
            vec![
                (1, Duration::from_millis(100)),
                (2, Duration::from_millis(200))
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_during_backoff_prevents_next_attempt() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let cfg = fast().with_signal(token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let res: Result<(), _> = run(&cfg, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down".to_string()) }
        })
        .await;

        assert!(matches!(res, Err(RetryError::Aborted { attempts: 1 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_mid_attempt_and_pre_cancelled() {
        let token = CancellationToken::new();
        let cfg = fast().with_signal(token.clone());
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let res: Result<u32, _> = run(&cfg, |_| async {
            sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(res, Err(RetryError::Aborted { attempts: 1 })));

        let calls = AtomicU32::new(0);
        let res: Result<u32, _> = run(&cfg, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(1) }
        })
        .await;
        assert!(matches!(res, Err(RetryError::Aborted { attempts: 0 })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_jitter_stays_in_upper_half() {
        let cfg = RetryConfig::<String>::default()
            .retries(1)
            .backoff(
                BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(1), 2.0)
                    .with_jitter(JitterPolicy::Equal),
            )
            .with_random(SeededRandom::new(42));

        let started = Instant::now();
        let _ = run(&cfg, |_| async { Err::<(), _>("x".to_string()) }).await;
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(50) && waited <= Duration::from_millis(100));
    }
}
