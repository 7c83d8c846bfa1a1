//! Reconnect Supervisor
//!
//! Drives stream sessions one after another until stopped.
//!
//! # States
//!
//! ```text
//! Idle ──► Streaming ──(session ends)──► Backoff ──(delay)──► Streaming ...
//!              │                            │
//!              └──────(stop flag set)───────┴──► Stopped
//! ```
//!
//! Each session reloads the poll options, opens a fresh connection, reads
//! messages until the stream ends for any reason, and sends one vote per
//! matched option on the hand-off channel. Sending waits for channel
//! capacity, so a slow publisher slows the reader down instead of losing
//! votes.
//!
//! The stop flag alone never interrupts a session or a backoff; only a
//! forced connection close does. A forced close during backoff ends the
//! wait early only when the stop flag is set.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};

use super::StopFlag;
use crate::application::ports::{Connection, MessageSource, OptionSource, StreamError};
use crate::domain::matcher::VoteMatcher;
use crate::domain::poll::{PollOptionSet, Vote};
use crate::infrastructure::metrics::{self, SessionEnd};
use crate::infrastructure::stream::{ConnectionManager, RetryPolicy};

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not started.
    Idle,
    /// A session is loading options, connecting or reading.
    Streaming,
    /// Waiting before the next session.
    Backoff,
    /// Terminal; no further sessions.
    Stopped,
}

impl SupervisorState {
    /// State name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
        }
    }
}

/// Totals reported when the supervisor stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Sessions that reached the connect step.
    pub sessions: u64,
    /// Messages decoded.
    pub messages: u64,
    /// Votes handed to the publisher.
    pub votes: u64,
}

enum SessionOutcome {
    Ended(SessionEnd),
    PublisherGone,
}

/// Reconnect supervisor.
pub struct ReconnectSupervisor {
    options: Arc<dyn OptionSource>,
    source: Arc<dyn MessageSource>,
    connections: Arc<ConnectionManager>,
    matcher: VoteMatcher,
    policy: Box<dyn RetryPolicy>,
    stop: StopFlag,
    state: watch::Sender<SupervisorState>,
    report: SupervisorReport,
}

impl std::fmt::Debug for ReconnectSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectSupervisor")
            .field("policy", &self.policy)
            .field("state", &*self.state.borrow())
            .field("stopped", &self.stop.is_set())
            .finish_non_exhaustive()
    }
}

impl ReconnectSupervisor {
    /// Create a supervisor.
    #[must_use]
    pub fn new(
        options: Arc<dyn OptionSource>,
        source: Arc<dyn MessageSource>,
        connections: Arc<ConnectionManager>,
        policy: Box<dyn RetryPolicy>,
        stop: StopFlag,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            options,
            source,
            connections,
            matcher: VoteMatcher::new(),
            policy,
            stop,
            state,
            report: SupervisorReport::default(),
        }
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Run the supervisor on its own task.
    ///
    /// `votes` is dropped when the supervisor stops, before the returned
    /// receiver resolves.
    pub fn spawn(self, votes: mpsc::Sender<Vote>) -> oneshot::Receiver<SupervisorReport> {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let report = self.run(votes).await;
            let _ = done_tx.send(report);
        });
        done_rx
    }

    /// Run sessions until the stop flag is set or the retry policy gives up.
    pub async fn run(mut self, votes: mpsc::Sender<Vote>) -> SupervisorReport {
        let mut force_closes = self.connections.subscribe_force_closes();

        loop {
            if self.stop.is_set() {
                break;
            }

            self.set_state(SupervisorState::Streaming);
            match self.run_session(&votes).await {
                SessionOutcome::Ended(end) => {
                    metrics::record_session_end(end);
                    tracing::info!(cause = end.as_str(), "Stream session ended");
                }
                SessionOutcome::PublisherGone => {
                    tracing::error!("Vote channel closed by publisher, stopping supervisor");
                    break;
                }
            }

            // Forced closes up to here belonged to the session that just ended.
            force_closes.borrow_and_update();
            if self.stop.is_set() {
                break;
            }

            let Some(delay) = self.policy.next_delay() else {
                tracing::warn!(
                    attempts = self.policy.attempt_count(),
                    "Retry policy exhausted, stopping supervisor"
                );
                break;
            };

            self.set_state(SupervisorState::Backoff);
            tracing::info!(delay_secs = delay.as_secs_f64(), "Waiting before reconnecting");
            self.backoff(delay, &mut force_closes).await;
        }

        drop(votes);
        self.set_state(SupervisorState::Stopped);
        tracing::info!(
            sessions = self.report.sessions,
            messages = self.report.messages,
            votes = self.report.votes,
            "Supervisor stopped"
        );
        self.report
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
        tracing::debug!(state = state.as_str(), "Supervisor state");
    }

    async fn backoff(&self, delay: Duration, force_closes: &mut watch::Receiver<u64>) {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return,
                changed = force_closes.changed() => {
                    if changed.is_err() {
                        (&mut sleep).await;
                        return;
                    }
                    if self.stop.is_set() {
                        tracing::debug!("Backoff interrupted by shutdown");
                        return;
                    }
                }
            }
        }
    }

    async fn run_session(&mut self, votes: &mpsc::Sender<Vote>) -> SessionOutcome {
        let keywords = match self.options.load().await {
            Ok(keywords) => keywords,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load poll options");
                return SessionOutcome::Ended(SessionEnd::Storage);
            }
        };
        let options = PollOptionSet::new(keywords);

        let connection = self.connections.connect();
        self.report.sessions += 1;
        metrics::record_session_started();

        // A shutdown that raced the connect has already force-closed the
        // previous connection, not this one.
        if self.stop.is_set() {
            self.connections.release(&connection);
            return SessionOutcome::Ended(SessionEnd::ForceClosed);
        }

        tracing::info!(
            connection_id = connection.id(),
            options = options.len(),
            "Stream session started"
        );

        let outcome = self.stream_votes(&options, &connection, votes).await;
        self.connections.release(&connection);
        outcome
    }

    async fn stream_votes(
        &mut self,
        options: &PollOptionSet,
        connection: &Connection,
        votes: &mpsc::Sender<Vote>,
    ) -> SessionOutcome {
        let opened = tokio::select! {
            biased;
            () = connection.closed() => Err(StreamError::Closed),
            opened = self.source.open(options, connection) => opened,
        };
        let mut messages = match opened {
            Ok(messages) => messages,
            Err(e) => return SessionOutcome::Ended(session_end(&e, true)),
        };
        let mut productive = false;

        loop {
            let next = tokio::select! {
                biased;
                () = connection.closed() => Some(Err(StreamError::Closed)),
                next = messages.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => return SessionOutcome::Ended(session_end(&e, false)),
                None => return SessionOutcome::Ended(SessionEnd::EndOfStream),
            };

            self.report.messages += 1;
            metrics::record_message_received();
            if !productive {
                // Attempt limits count consecutive sessions without data.
                productive = true;
                self.policy.reset();
            }

            for vote in self.matcher.votes(options, &message) {
                metrics::record_vote_matched();
                tracing::debug!(vote = %vote, "Vote matched");
                if votes.send(vote).await.is_err() {
                    return SessionOutcome::PublisherGone;
                }
                self.report.votes += 1;
            }
        }
    }
}

fn session_end(err: &StreamError, opening: bool) -> SessionEnd {
    let end = match err {
        StreamError::Request(_) | StreamError::Transport(_) => SessionEnd::Transport,
        StreamError::Status { .. } => SessionEnd::Status,
        StreamError::Decode(_) => SessionEnd::Decode,
        StreamError::Closed => SessionEnd::ForceClosed,
    };

    match end {
        SessionEnd::ForceClosed => {}
        _ if opening => tracing::warn!(error = %err, "Failed to open stream"),
        _ => tracing::info!(error = %err, "Stream read failed"),
    }
    end
}
