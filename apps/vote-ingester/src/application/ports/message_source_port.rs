//! Message Source Port (Driven Port)
//!
//! Interface for opening one stream session filtered by the tracked
//! keywords, over a [`Connection`] that can be closed from any task.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::domain::poll::{PollOptionSet, StreamMessage};

/// Handle to one streaming connection.
///
/// Cheap to clone; all clones observe the same close. The adapter serving a
/// session owns the actual socket and must drop it once the handle closes.
#[derive(Debug, Clone)]
pub struct Connection {
    id: u64,
    cancel: CancellationToken,
}

impl Connection {
    /// Create an open connection handle.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
        }
    }

    /// Monotonic connection identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether this connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once this connection is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Owned token cancelled when the connection closes.
    #[must_use]
    pub fn close_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Errors that end a stream session or prevent one from opening.
///
/// The supervisor treats every variant the same way: the session is over
/// and the retry policy decides when to open the next one.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The streaming request could not be built.
    #[error("failed to build stream request: {0}")]
    Request(String),

    /// The request could not be sent or the connection failed.
    #[error("stream transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("stream endpoint returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// A record in the body could not be decoded.
    #[error("stream decode error: {0}")]
    Decode(String),

    /// The connection was force-closed.
    #[error("stream connection force-closed")]
    Closed,
}

/// A lazy, finite sequence of decoded messages for one session.
pub type MessageStream = BoxStream<'static, Result<StreamMessage, StreamError>>;

/// Port for opening stream sessions.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Open a session tracking `options` over `connection`.
    ///
    /// The returned stream ends when the body is exhausted, fails, or the
    /// connection is force-closed.
    async fn open(
        &self,
        options: &PollOptionSet,
        connection: &Connection,
    ) -> Result<MessageStream, StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_close() {
        let conn = Connection::new(7);
        let clone = conn.clone();
        let token = conn.close_token();

        clone.close();
        assert!(conn.is_closed());
        assert!(token.is_cancelled());
        assert_eq!(conn.id(), 7);

        clone.close();
        assert!(conn.is_closed());
    }
}
