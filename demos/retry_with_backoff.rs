//! # Example: retry_with_backoff
//!
//! A flaky operation retried with exponential backoff and equal jitter, an observer
//! printing each scheduled delay, and a [`Poller`] waiting for a job to finish.
//!
//! ## Flow
//! ```text
//! retry::run
//!   ├─► attempt 1 → Err("boom #1") → on_retry(delay ≈ 50..100ms) → sleep
//!   ├─► attempt 2 → Err("boom #2") → on_retry(delay ≈ 100..200ms) → sleep
//!   └─► attempt 3 → Ok
//!
//! Poller::run
//!   └─► poll status every 100ms until it reports "done"
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example retry_with_backoff
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use corral::{BackoffPolicy, JitterPolicy, PollConfig, Poller, RetryConfig, retry};
use tokio_util::sync::CancellationToken;

static JOB_PROGRESS: AtomicU32 = AtomicU32::new(0);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let token = CancellationToken::new();

    let cfg = RetryConfig::default()
        .retries(4)
        .backoff(
            BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(2), 2.0)
                .with_jitter(JitterPolicy::Equal),
        )
        .on_retry(|err: &String, attempt, delay| {
            println!("[retry] attempt {attempt} failed ({err}), next try in {delay:?}");
            Ok(())
        })
        .with_signal(token.clone());

    let value = retry::run(&cfg, |attempt| async move {
        println!("[flaky] attempt {attempt}");
        if attempt <= 2 {
            Err(format!("boom #{attempt}"))
        } else {
            Ok(attempt * 100)
        }
    })
    .await?;
    println!("[main] flaky returned {value}");

    let poller = Poller::new(PollConfig {
        max_attempts: 20,
        signal: Some(token.clone()),
        ..PollConfig::every(Duration::from_millis(100))
    });
    let status = poller
        .run(
            |attempt| async move {
                let progress = JOB_PROGRESS.fetch_add(25, Ordering::SeqCst) + 25;
                println!("[poll] attempt {attempt}: {progress}%");
                Ok::<_, String>(if progress >= 100 { "done" } else { "running" })
            },
            |status| *status != "done",
        )
        .await?;
    println!("[main] job status: {status}");
    Ok(())
}
