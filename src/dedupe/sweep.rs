use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Upper bound on the sweep period.
pub(super) const SWEEP_CEILING: Duration = Duration::from_secs(1);

pub(super) fn sweep_period(max_age: Duration) -> Duration {
    max_age.min(SWEEP_CEILING)
}

/// Runs `tick` every `period` until it returns `false`.
pub(super) fn spawn_sweeper<F>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !tick() {
                tracing::trace!("dedupe sweeper stopped");
                break;
            }
        }
    })
}
