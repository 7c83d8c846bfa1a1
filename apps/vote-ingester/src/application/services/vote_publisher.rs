//! Vote Publisher Service
//!
//! Drains the vote hand-off channel into the queue, in arrival order. The
//! loop ends only when every sender is gone; then the queue is stopped and a
//! [`PublisherReport`] is delivered on a one-shot channel.
//!
//! # Failure Policy
//!
//! Each vote gets up to `max_attempts` publishes, with a fixed pause between
//! them. Queue adapters reconnect on the next publish after a failure. A
//! vote that fails every attempt is logged at error level, counted as
//! dropped, and the publisher moves on to the next one.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::application::ports::VoteQueue;
use crate::domain::poll::Vote;
use crate::infrastructure::metrics;

/// Bounded retry policy for publishing a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPolicy {
    /// Publishes attempted per vote (at least 1).
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// Totals reported once the publisher has drained its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherReport {
    /// Votes accepted by the queue.
    pub published: u64,
    /// Votes given up on.
    pub dropped: u64,
}

/// Forwards votes from the hand-off channel to a queue topic.
pub struct VotePublisher {
    queue: Box<dyn VoteQueue>,
    topic: String,
    policy: PublishPolicy,
}

impl std::fmt::Debug for VotePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VotePublisher")
            .field("topic", &self.topic)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl VotePublisher {
    /// Create a publisher writing to `topic`.
    #[must_use]
    pub fn new(queue: Box<dyn VoteQueue>, topic: impl Into<String>, policy: PublishPolicy) -> Self {
        Self {
            queue,
            topic: topic.into(),
            policy,
        }
    }

    /// Topic votes are published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Run the publisher on its own task.
    ///
    /// The returned receiver resolves after the channel closed, every
    /// received vote was handled and the queue was stopped.
    pub fn spawn(self, votes: mpsc::Receiver<Vote>) -> oneshot::Receiver<PublisherReport> {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let report = self.run(votes).await;
            let _ = done_tx.send(report);
        });
        done_rx
    }

    /// Drain `votes` until every sender is dropped, then stop the queue.
    pub async fn run(mut self, mut votes: mpsc::Receiver<Vote>) -> PublisherReport {
        let mut report = PublisherReport::default();

        while let Some(vote) = votes.recv().await {
            if self.publish(&vote).await {
                report.published += 1;
            } else {
                report.dropped += 1;
            }
        }

        tracing::info!(
            published = report.published,
            dropped = report.dropped,
            "Vote channel closed, stopping publisher"
        );
        self.queue.stop().await;
        tracing::info!("Publisher stopped");

        report
    }

    async fn publish(&mut self, vote: &Vote) -> bool {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.queue.publish(&self.topic, vote.as_bytes()).await {
                Ok(()) => {
                    metrics::record_vote_published();
                    tracing::debug!(vote = %vote, attempt, "Vote published");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        vote = %vote,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Vote publish failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        metrics::record_vote_dropped();
        tracing::error!(
            vote = %vote,
            topic = %self.topic,
            attempts = max_attempts,
            "Dropping vote after exhausting publish attempts"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::{InMemoryVoteQueue, QueueError};

    /// Queue that fails the first N publishes.
    #[derive(Clone, Default)]
    struct FlakyQueue {
        failures_left: Arc<Mutex<usize>>,
        inner: InMemoryVoteQueue,
        attempts: Arc<Mutex<u32>>,
    }

    impl FlakyQueue {
        fn failing(times: usize) -> Self {
            let queue = Self::default();
            *queue.failures_left.lock() = times;
            queue
        }
    }

    #[async_trait]
    impl VoteQueue for FlakyQueue {
        async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), QueueError> {
            *self.attempts.lock() += 1;
            {
                let mut left = self.failures_left.lock();
                if *left > 0 {
                    *left -= 1;
                    return Err(QueueError::Closed);
                }
            }
            self.inner.publish(topic, payload).await
        }

        async fn stop(&mut self) {
            self.inner.stop().await;
        }
    }

    fn policy(max_attempts: u32) -> PublishPolicy {
        PublishPolicy {
            max_attempts,
            retry_delay: Duration::from_millis(250),
        }
    }

    #[tokio::test]
    async fn publishes_in_order_and_stops_queue_after_drain() {
        let queue = InMemoryVoteQueue::new();
        let view = queue.clone();
        let (tx, rx) = mpsc::channel(1);

        let done = VotePublisher::new(Box::new(queue), "votes", PublishPolicy::default()).spawn(rx);
        for option in ["rust", "go", "rust"] {
            tx.send(Vote::new(option)).await.unwrap();
        }
        drop(tx);

        let report = done.await.unwrap();
        assert_eq!(report, PublisherReport { published: 3, dropped: 0 });
        assert_eq!(view.messages("votes"), vec!["rust", "go", "rust"]);
        assert!(view.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let queue = FlakyQueue::failing(2);
        let view = queue.clone();
        let (tx, rx) = mpsc::channel(1);

        let done = VotePublisher::new(Box::new(queue), "votes", policy(3)).spawn(rx);
        tx.send(Vote::new("rust")).await.unwrap();
        drop(tx);

        let report = done.await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(*view.attempts.lock(), 3);
        assert_eq!(view.inner.messages("votes"), vec!["rust"]);
    }

    #[tokio::test(start_paused = true)]
    async fn drops_vote_after_exhausting_attempts_and_continues() {
        let queue = FlakyQueue::failing(3);
        let view = queue.clone();
        let (tx, rx) = mpsc::channel(1);

        let done = VotePublisher::new(Box::new(queue), "votes", policy(3)).spawn(rx);
        tx.send(Vote::new("rust")).await.unwrap();
        tx.send(Vote::new("go")).await.unwrap();
        drop(tx);

        let report = done.await.unwrap();
        assert_eq!(report, PublisherReport { published: 1, dropped: 1 });
        assert_eq!(view.inner.messages("votes"), vec!["go"]);
        assert!(view.inner.is_stopped());
    }

    #[tokio::test]
    async fn completion_waits_for_channel_close() {
        let (tx, rx) = mpsc::channel(1);
        let mut done = VotePublisher::new(
            Box::new(InMemoryVoteQueue::new()),
            "votes",
            PublishPolicy::default(),
        )
        .spawn(rx);

        tokio::task::yield_now().await;
        assert!(done.try_recv().is_err());

        drop(tx);
        assert_eq!(done.await.unwrap(), PublisherReport::default());
    }
}
