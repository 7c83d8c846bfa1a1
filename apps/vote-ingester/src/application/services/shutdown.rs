//! Shutdown Coordinator
//!
//! The only way to stop the pipeline from outside. A trigger sets the stop
//! flag first and then force-closes the active connection, so whichever
//! point the supervisor is at, it observes the flag on its next check.
//!
//! The watchdog closes the connection on a fixed period. Besides backing
//! up a trigger that raced a reconnect, this makes every session reload the
//! poll options, so newly created polls are tracked within one period.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::StopFlag;
use crate::infrastructure::stream::ConnectionManager;

/// Default watchdog period.
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(60);

/// Coordinates signal handling, the watchdog and the stop flag.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    stop: StopFlag,
    connections: Arc<ConnectionManager>,
    token: CancellationToken,
    watchdog_interval: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator sharing `stop` with the supervisor.
    #[must_use]
    pub fn new(
        stop: StopFlag,
        connections: Arc<ConnectionManager>,
        watchdog_interval: Duration,
    ) -> Self {
        Self {
            stop,
            connections,
            token: CancellationToken::new(),
            watchdog_interval,
        }
    }

    /// Token cancelled once shutdown is triggered.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The shared stop flag.
    #[must_use]
    pub const fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Request shutdown: set the flag, close the connection, wake waiters.
    ///
    /// Safe to call repeatedly; only the first call logs at info level.
    pub fn trigger(&self, reason: &str) {
        if self.stop.set() {
            tracing::info!(reason, "Stopping...");
        } else {
            tracing::debug!(reason, "Stop already requested");
        }
        self.connections.force_close();
        self.token.cancel();
    }

    /// Trigger shutdown when `signal` resolves.
    ///
    /// The task also ends, without triggering, once the token is cancelled
    /// some other way.
    pub fn spawn_signal_listener<F>(&self, signal: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = signal => coordinator.trigger("signal"),
                () = coordinator.token.cancelled() => {}
            }
        })
    }

    /// Start the periodic connection-closing watchdog.
    ///
    /// The first tick is one full period after start. Each tick closes the
    /// active connection, then the task exits if the stop flag is set.
    pub fn spawn_watchdog(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        let period = self.watchdog_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if coordinator.connections.force_close() {
                            tracing::debug!("Watchdog closed the stream connection");
                        }
                        if coordinator.stop.is_set() {
                            break;
                        }
                    }
                    () = coordinator.token.cancelled() => break,
                }
            }
            tracing::debug!("Watchdog stopped");
        })
    }
}
