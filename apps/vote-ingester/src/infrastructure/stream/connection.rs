//! Connection Manager
//!
//! Owns the single streaming connection. Every [`Connection`] carries a
//! cancellation token: force-closing the connection cancels it, which makes
//! the reader drop the in-flight request or response body and with it the
//! socket.
//!
//! Opening a new connection always closes the previous one first.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::application::ports::Connection;
use crate::infrastructure::metrics;

/// Owner of the single active streaming connection.
#[derive(Debug)]
pub struct ConnectionManager {
    active: Mutex<Option<Connection>>,
    next_id: AtomicU64,
    force_closes: watch::Sender<u64>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    /// Create a manager with no connection held.
    #[must_use]
    pub fn new() -> Self {
        let (force_closes, _) = watch::channel(0);

        Self {
            active: Mutex::new(None),
            next_id: AtomicU64::new(0),
            force_closes,
        }
    }

    /// Open a new connection, closing the currently held one first.
    pub fn connect(&self) -> Connection {
        let mut active = self.active.lock();

        if let Some(previous) = active.take() {
            previous.close();
            tracing::debug!(connection_id = previous.id(), "Closed previous connection");
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let connection = Connection::new(id);
        *active = Some(connection.clone());
        drop(active);

        metrics::set_connection_open(true);
        tracing::debug!(connection_id = id, "Opened connection");

        connection
    }

    /// Close the currently held connection, interrupting any pending read.
    ///
    /// Safe to call from any task at any time. Returns whether a connection
    /// was open.
    pub fn force_close(&self) -> bool {
        let closed = self.active.lock().take();
        self.force_closes.send_modify(|count| *count += 1);

        match closed {
            Some(connection) => {
                connection.close();
                metrics::set_connection_open(false);
                tracing::info!(connection_id = connection.id(), "Connection force-closed");
                true
            }
            None => false,
        }
    }

    /// Close `connection` at the end of its session.
    ///
    /// A connection that was already replaced or force-closed is left alone.
    pub fn release(&self, connection: &Connection) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.id() == connection.id()) {
            *active = None;
            metrics::set_connection_open(false);
        }
        drop(active);
        connection.close();
    }

    /// Whether a connection is currently held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Identifier of the currently held connection.
    #[must_use]
    pub fn active_id(&self) -> Option<u64> {
        self.active.lock().as_ref().map(Connection::id)
    }

    /// Subscribe to forced closes.
    ///
    /// The receiver observes every `force_close` made after it was created,
    /// including ones made while no connection was held.
    #[must_use]
    pub fn subscribe_force_closes(&self) -> watch::Receiver<u64> {
        self.force_closes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new()
    }

    #[test]
    fn connect_twice_keeps_one_open_connection() {
        let mgr = manager();

        let first = mgr.connect();
        assert!(!first.is_closed());

        let second = mgr.connect();
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(mgr.active_id(), Some(second.id()));
        assert!(second.id() > first.id());
    }

    #[test]
    fn force_close_cancels_active_connection() {
        let mgr = manager();
        let conn = mgr.connect();

        assert!(mgr.force_close());
        assert!(conn.is_closed());
        assert!(!mgr.is_open());

        assert!(!mgr.force_close());
    }

    #[test]
    fn release_ignores_replaced_connection() {
        let mgr = manager();
        let old = mgr.connect();
        let current = mgr.connect();

        mgr.release(&old);
        assert_eq!(mgr.active_id(), Some(current.id()));

        mgr.release(&current);
        assert!(!mgr.is_open());
        assert!(current.is_closed());
    }

    #[test]
    fn force_close_is_observed_by_subscribers() {
        let mgr = manager();
        let mut closes = mgr.subscribe_force_closes();
        assert!(!closes.has_changed().unwrap());

        mgr.force_close();
        assert!(closes.has_changed().unwrap());
        closes.borrow_and_update();
        assert!(!closes.has_changed().unwrap());
    }

    #[test]
    fn closed_future_wakes_on_close() {
        let mgr = manager();
        let conn = mgr.connect();

        let mut closed = tokio_test::task::spawn(conn.closed());
        tokio_test::assert_pending!(closed.poll());

        mgr.force_close();
        assert!(closed.is_woken());
        tokio_test::assert_ready!(closed.poll());
    }

    #[tokio::test]
    async fn pending_read_unblocks_on_force_close() {
        let mgr = std::sync::Arc::new(manager());
        let conn = mgr.connect();

        let closer = std::sync::Arc::clone(&mgr);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.force_close();
        });

        let read = async {
            tokio::select! {
                () = conn.closed() => "closed",
                () = std::future::pending::<()>() => "data",
            }
        };

        let outcome = tokio::time::timeout(Duration::from_secs(1), read)
            .await
            .unwrap();
        assert_eq!(outcome, "closed");
    }
}
