//! Timer-driven sweeps.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::sweep::Monitor;

/// Fires a sweep once per interval until shutdown.
///
/// Sweeps are spawned rather than awaited, so a slow sweep never delays the
/// next tick. On shutdown no new sweep is started and in-flight ones are
/// allowed to finish.
pub struct SweepScheduler {
    monitor: Monitor,
    interval: Duration,
}

impl SweepScheduler {
    pub fn new(monitor: Monitor, interval: Duration) -> Self {
        Self { monitor, interval }
    }

    /// Whether a worst-case sweep outlasts the interval, so that the next
    /// tick fires while the previous sweep is still running.
    pub fn may_overlap(&self) -> bool {
        self.monitor.settings().retry.budget() > self.interval
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "sweep scheduler started");
        if self.may_overlap() {
            warn!(
                budget = ?self.monitor.settings().retry.budget(),
                interval = ?self.interval,
                "worst-case check time exceeds the sweep interval, sweeps may overlap"
            );
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let monitor = self.monitor.clone();
                    in_flight.spawn(async move {
                        if let Err(e) = monitor.run_sweep().await {
                            error!(error = %e, "scheduled sweep failed");
                        }
                    });
                    debug!(in_flight = in_flight.len(), "scheduled sweep spawned");
                }
                Some(joined) = in_flight.join_next() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "scheduled sweep task aborted");
                    }
                }
                _ = shutdown.changed() => {
                    info!(in_flight = in_flight.len(), "sweep scheduler shutting down");
                    break;
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "scheduled sweep task aborted");
            }
        }
        info!("sweep scheduler stopped");
    }
}
