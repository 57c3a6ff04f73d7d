//! # EventTimer: periodic re-drive of the runner.
//!
//! Publishes [`EventKind::Tick`] every `interval` so deadlines are evaluated
//! even when the runtime is silent. Stops when its token is cancelled or the
//! queue is gone.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::events::{EventKind, EventSender};

/// Periodic `Tick` producer.
pub struct EventTimer {
    tx: EventSender,
    interval: Duration,
}

impl EventTimer {
    pub fn new(tx: EventSender, interval: Duration) -> Self {
        Self { tx, interval }
    }

    /// Runs the timer on its own task.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        let period = self.interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !self.tx.publish(EventKind::Tick) {
                            break;
                        }
                    }
                }
            }
        })
    }
}
