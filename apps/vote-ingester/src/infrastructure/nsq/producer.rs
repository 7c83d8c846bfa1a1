//! NSQ Producer
//!
//! Publishes messages to a single nsqd over TCP. The connection is opened
//! lazily on first publish and reopened on the next publish after any
//! transport or protocol failure.
//!
//! Each connection runs a reader task for its whole lifetime, so heartbeats
//! are answered with `NOP` even while no publish is in flight and a broker
//! close is noticed as soon as it happens. Every other frame is forwarded to
//! the publisher as the acknowledgement of the pending `PUB`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::{Command, Frame, MAGIC_V2, NsqCodec, NsqCodecError};
use crate::application::ports::{QueueError, VoteQueue};

/// Default nsqd TCP address.
pub const DEFAULT_NSQD_ADDR: &str = "localhost:4150";

/// Default bound on connecting and on waiting for an acknowledgement.
pub const DEFAULT_NSQ_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames buffered between the reader task and the publisher.
const REPLY_BUFFER: usize = 16;

impl From<NsqCodecError> for QueueError {
    fn from(err: NsqCodecError) -> Self {
        match err {
            NsqCodecError::Io(e) => Self::Connection(e),
            other => Self::Protocol(other.to_string()),
        }
    }
}

type SharedWriter = Arc<tokio::sync::Mutex<FramedWrite<OwnedWriteHalf, NsqCodec>>>;
type Reply = Result<Frame, QueueError>;

// =============================================================================
// Connection
// =============================================================================

/// One open nsqd connection and its reader task.
#[derive(Debug)]
struct NsqConnection {
    writer: SharedWriter,
    replies: mpsc::Receiver<Reply>,
    reader: JoinHandle<()>,
}

impl NsqConnection {
    fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(tokio::sync::Mutex::new(FramedWrite::new(write_half, NsqCodec)));
        let (tx, replies) = mpsc::channel(REPLY_BUFFER);
        let reader = tokio::spawn(read_frames(
            FramedRead::new(read_half, NsqCodec),
            Arc::clone(&writer),
            tx,
        ));

        Self {
            writer,
            replies,
            reader,
        }
    }

    /// Check the connection is still usable before sending a command.
    ///
    /// Frames that arrived with nothing in flight are discarded. A closed
    /// connection or a failed read is reported as an error.
    fn ensure_live(&mut self) -> Result<(), QueueError> {
        loop {
            match self.replies.try_recv() {
                Ok(Ok(Frame::Error(data))) => {
                    return Err(QueueError::Rejected(
                        String::from_utf8_lossy(&data).into_owned(),
                    ));
                }
                Ok(Ok(frame)) => tracing::debug!(?frame, "Discarding unsolicited nsqd frame"),
                Ok(Err(e)) => return Err(e),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(QueueError::Closed),
            }
        }
    }

    async fn send(&self, command: Command) -> Result<(), QueueError> {
        self.writer.lock().await.send(command).await?;
        Ok(())
    }

    /// Wait for the broker's answer to the command just sent.
    async fn await_ack(&mut self) -> Result<(), QueueError> {
        match self.replies.recv().await {
            Some(Ok(frame)) if frame.is_ok() => Ok(()),
            Some(Ok(Frame::Error(data))) => Err(QueueError::Rejected(
                String::from_utf8_lossy(&data).into_owned(),
            )),
            Some(Ok(Frame::Response(data))) => Err(QueueError::Protocol(format!(
                "unexpected response {:?}",
                String::from_utf8_lossy(&data)
            ))),
            Some(Ok(Frame::Message(_))) => {
                Err(QueueError::Protocol("unexpected message frame".into()))
            }
            Some(Err(e)) => Err(e),
            None => Err(QueueError::Closed),
        }
    }

    async fn close(self) {
        if let Err(e) = SinkExt::<Command>::close(&mut *self.writer.lock().await).await {
            tracing::debug!(error = %e, "Error closing nsqd connection");
        }
    }
}

impl Drop for NsqConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Read frames until the connection ends, answering heartbeats and
/// forwarding everything else.
async fn read_frames(
    mut frames: FramedRead<OwnedReadHalf, NsqCodec>,
    writer: SharedWriter,
    replies: mpsc::Sender<Reply>,
) {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(frame) if frame.is_heartbeat() => {
                tracing::trace!("nsqd heartbeat");
                if let Err(e) = writer.lock().await.send(Command::Nop).await {
                    let _ = replies.send(Err(e.into())).await;
                    return;
                }
            }
            Ok(frame) => {
                if replies.send(Ok(frame)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = replies.send(Err(e.into())).await;
                return;
            }
        }
    }

    tracing::debug!("nsqd closed the connection");
}

// =============================================================================
// Producer
// =============================================================================

/// [`VoteQueue`] backed by one nsqd.
#[derive(Debug)]
pub struct NsqProducer {
    addr: String,
    timeout: Duration,
    conn: Option<NsqConnection>,
}

impl NsqProducer {
    /// Create a producer for the nsqd at `addr`. No connection is made yet.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_NSQ_TIMEOUT,
            conn: None,
        }
    }

    /// Override the connect and acknowledgement timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// nsqd address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether a connection is currently open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the connection now instead of on first publish.
    ///
    /// # Errors
    ///
    /// Returns an error if nsqd cannot be reached.
    pub async fn connect(&mut self) -> Result<(), QueueError> {
        self.connection().await.map(|_| ())
    }

    /// Current connection, reconnecting if the held one has gone away.
    async fn connection(&mut self) -> Result<&mut NsqConnection, QueueError> {
        if let Some(conn) = self.conn.as_mut()
            && let Err(e) = conn.ensure_live()
        {
            tracing::info!(addr = %self.addr, error = %e, "nsqd connection lost, reconnecting");
            self.conn = None;
        }

        if self.conn.is_none() {
            let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| QueueError::Timeout(self.timeout))??;
            stream.set_nodelay(true)?;
            stream.write_all(MAGIC_V2).await?;

            tracing::info!(addr = %self.addr, "Connected to nsqd");
            self.conn = Some(NsqConnection::new(stream));
        }

        self.conn.as_mut().ok_or(QueueError::Closed)
    }

    async fn publish_once(&mut self, topic: &str, payload: &[u8]) -> Result<(), QueueError> {
        let timeout = self.timeout;
        let conn = self.connection().await?;

        conn.send(Command::publish(topic, Bytes::copy_from_slice(payload)))
            .await?;

        tokio::time::timeout(timeout, conn.await_ack())
            .await
            .map_err(|_| QueueError::Timeout(timeout))?
    }
}

#[async_trait]
impl VoteQueue for NsqProducer {
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), QueueError> {
        let result = self.publish_once(topic, payload).await;

        // nsqd closes the connection after most error frames.
        if let Err(e) = &result
            && self.conn.take().is_some()
        {
            tracing::debug!(addr = %self.addr, error = %e, "Dropped nsqd connection");
        }

        result
    }

    async fn stop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close().await;
            tracing::info!(addr = %self.addr, "Disconnected from nsqd");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_producer_is_lazy() {
        let producer = NsqProducer::new(DEFAULT_NSQD_ADDR);
        assert!(!producer.is_connected());
        assert_eq!(producer.addr(), "localhost:4150");
    }

    #[test]
    fn codec_io_errors_map_to_connection_errors() {
        let err: QueueError = NsqCodecError::Io(std::io::Error::other("reset")).into();
        assert!(matches!(err, QueueError::Connection(_)));

        let err: QueueError = NsqCodecError::UnknownFrameType(7).into();
        assert!(matches!(err, QueueError::Protocol(_)));
    }

    #[tokio::test]
    async fn unreachable_broker_is_a_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut producer = NsqProducer::new(addr.to_string());
        let err = producer.publish("votes", b"rust").await.unwrap_err();
        assert!(matches!(err, QueueError::Connection(_) | QueueError::Timeout(_)));
        assert!(!producer.is_connected());
    }

    #[tokio::test]
    async fn broker_close_is_noticed_with_nothing_in_flight() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let mut conn = NsqConnection::new(stream);
        assert!(conn.ensure_live().is_ok());

        drop(server);
        tokio::time::timeout(Duration::from_secs(1), async {
            while conn.ensure_live().is_ok() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(matches!(conn.ensure_live(), Err(QueueError::Closed)));
    }
}
