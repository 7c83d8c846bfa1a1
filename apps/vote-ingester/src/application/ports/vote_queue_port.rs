//! Vote Queue Port (Driven Port)
//!
//! Interface for the durable queue that downstream tallying reads from.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Vote queue error.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Could not reach the queue broker.
    #[error("queue connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The broker rejected the publish.
    #[error("queue rejected publish: {0}")]
    Rejected(String),

    /// The broker sent something the client does not understand.
    #[error("queue protocol error: {0}")]
    Protocol(String),

    /// The broker did not answer in time.
    #[error("queue timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The connection closed before the broker answered.
    #[error("queue connection closed")]
    Closed,
}

/// Port for publishing raw payloads to a queue topic.
#[async_trait]
pub trait VoteQueue: Send {
    /// Publish one payload to `topic`.
    ///
    /// Returns once the broker acknowledged the message.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), QueueError>;

    /// Close the connection to the broker.
    async fn stop(&mut self);
}

/// Queue that keeps published messages in memory.
///
/// Clones share the same storage, so a test can hand one clone to the
/// publisher and inspect another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVoteQueue {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    stopped: Arc<Mutex<bool>>,
}

impl InMemoryVoteQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads published to `topic`, as UTF-8 strings, in publish order.
    #[must_use]
    pub fn messages(&self, topic: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }

    /// Whether `stop` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }
}

#[async_trait]
impl VoteQueue for InMemoryVoteQueue {
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), QueueError> {
        self.published
            .lock()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn stop(&mut self) {
        *self.stopped.lock() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_queue_records_by_topic() {
        let mut queue = InMemoryVoteQueue::new();
        let view = queue.clone();

        queue.publish("votes", b"rust").await.unwrap();
        queue.publish("other", b"ignored").await.unwrap();
        queue.publish("votes", b"go").await.unwrap();

        assert_eq!(view.messages("votes"), vec!["rust", "go"]);
        assert!(!view.is_stopped());

        queue.stop().await;
        assert!(view.is_stopped());
    }
}
