//! Ingestion Pipeline
//!
//! Wires the supervisor, the publisher and the shutdown coordinator
//! together and runs them to completion:
//!
//! 1. Start the publisher, then the supervisor, on their own tasks.
//! 2. Start the signal listener and the watchdog.
//! 3. Wait for the supervisor to stop. Its exit closes the vote channel.
//! 4. Wait for the publisher to drain the channel and stop the queue.

use std::future::Future;

use tokio::sync::mpsc;

use super::{
    PublisherReport, ReconnectSupervisor, ShutdownCoordinator, SupervisorReport, VotePublisher,
};

/// Capacity of the vote hand-off channel.
pub const VOTE_CHANNEL_CAPACITY: usize = 1;

/// Totals for a complete run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Supervisor totals.
    pub supervisor: SupervisorReport,
    /// Publisher totals.
    pub publisher: PublisherReport,
}

/// The assembled ingestion pipeline.
#[derive(Debug)]
pub struct Pipeline {
    supervisor: ReconnectSupervisor,
    publisher: VotePublisher,
    coordinator: ShutdownCoordinator,
}

impl Pipeline {
    /// Assemble a pipeline. The supervisor and the coordinator must share
    /// the same stop flag and connection manager.
    #[must_use]
    pub const fn new(
        supervisor: ReconnectSupervisor,
        publisher: VotePublisher,
        coordinator: ShutdownCoordinator,
    ) -> Self {
        Self {
            supervisor,
            publisher,
            coordinator,
        }
    }

    /// Coordinator handle, for triggering shutdown from elsewhere.
    #[must_use]
    pub fn coordinator(&self) -> ShutdownCoordinator {
        self.coordinator.clone()
    }

    /// Run until shutdown completes.
    ///
    /// `shutdown_signal` resolving triggers shutdown. The future returned by
    /// this method resolves only after every vote emitted before the stop
    /// was handled by the publisher.
    pub async fn run<F>(self, shutdown_signal: F) -> PipelineReport
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            supervisor,
            publisher,
            coordinator,
        } = self;

        let (votes_tx, votes_rx) = mpsc::channel(VOTE_CHANNEL_CAPACITY);

        let publisher_done = publisher.spawn(votes_rx);
        let supervisor_done = supervisor.spawn(votes_tx);
        let signal_listener = coordinator.spawn_signal_listener(shutdown_signal);
        let watchdog = coordinator.spawn_watchdog();

        tracing::info!("Pipeline running");

        let supervisor = supervisor_done.await.unwrap_or_else(|_| {
            tracing::error!("Supervisor task ended without a report");
            SupervisorReport::default()
        });

        tracing::info!("Supervisor stopped, draining publisher");
        let publisher = publisher_done.await.unwrap_or_else(|_| {
            tracing::error!("Publisher task ended without a report");
            PublisherReport::default()
        });

        // The supervisor can also stop on its own when its retry policy
        // gives up; release the listener and the watchdog either way.
        coordinator.token().cancel();
        let _ = signal_listener.await;
        let _ = watchdog.await;

        tracing::info!(
            sessions = supervisor.sessions,
            messages = supervisor.messages,
            published = publisher.published,
            dropped = publisher.dropped,
            "Pipeline finished"
        );

        PipelineReport {
            supervisor,
            publisher,
        }
    }
}
