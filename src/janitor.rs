use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::metrics::TRACKED_KEYS;
use crate::rate_limit::RateLimiter;

// Background sweep of stale limiter records. Owned by whoever starts it;
// dropping the handle or calling shutdown stops the task.
pub struct Janitor {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Janitor {
    pub fn spawn(limiter: RateLimiter, every: Duration, retention: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(limiter, every, retention, shutdown_rx));
        Self { shutdown_tx, task }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("janitor task ended abnormally: {e}");
        }
    }
}

async fn run(
    limiter: RateLimiter,
    every: Duration,
    retention: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(?every, ?retention, "janitor started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = limiter.sweep(retention);
                let tracked = limiter.stats().tracked_keys;
                TRACKED_KEYS.set(tracked as f64);
                if evicted > 0 {
                    tracing::debug!(evicted, tracked, "swept stale rate limit records");
                }
            }
            // a dropped handle closes the channel, which stops the loop too
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("janitor stopped");
}
