//! The registry of live client sessions and the per-session channel plumbing.
//!
//! A [`Connection`] bundles the receiving halves the session loop selects
//! over; the [`ConnectionRegistry`] keeps the sending halves addressable by
//! [`ConnectionId`] so the push endpoint can deliver into a session owned by
//! another task. Exactly one reader task and one session loop operate on a
//! connection; nobody else writes to its channels.

use std::{collections::HashMap, num::NonZeroU32, sync::Arc, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use wsgw_types::ConnectionId;

use crate::metrics::METRICS_ID_CONNECTIONS_OPEN;

/// Errors of registry operations.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RegistryError {
    #[error("connection not found")]
    ConnectionNotFound,
    #[error("connection {0} already registered")]
    AlreadyRegistered(ConnectionId),
}

/// The close status a client reported (or the transport implied) when a
/// session ended.
#[derive(Debug, Clone)]
pub(crate) struct CloseInfo {
    pub(crate) code: u16,
    pub(crate) reason: String,
}

/// What the reader task observed when it stopped reading.
///
/// The reader task is the exclusive sender of these; it sends exactly one
/// signal as its last act.
#[derive(Debug)]
pub(crate) enum ReaderSignal {
    /// The peer closed the connection (or the stream ended).
    Closed(CloseInfo),
    /// The peer sent a non-text frame.
    ProtocolViolation,
    /// Reading from the socket failed.
    ReadFailed(String),
}

/// Tuning knobs for a freshly opened connection.
#[derive(Clone)]
pub(crate) struct ConnectionLimits {
    pub(crate) message_buffer_size: usize,
    pub(crate) push_rate_period: Duration,
    pub(crate) push_rate_burst: NonZeroU32,
}

/// The session-loop end of a connection: the receiving halves of all three
/// channels plus a sender for error replies toward the client.
pub(crate) struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) inbound: mpsc::Receiver<String>,
    pub(crate) outbound: mpsc::Receiver<String>,
    pub(crate) reader_signals: mpsc::Receiver<ReaderSignal>,
    pub(crate) error_replies: mpsc::Sender<String>,
}

/// The reader-task end of a connection.
pub(crate) struct ReaderEnd {
    pub(crate) inbound: mpsc::Sender<String>,
    pub(crate) signals: mpsc::Sender<ReaderSignal>,
}

/// The registry entry for a connection: everything the push path needs.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    outbound: mpsc::Sender<String>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl Connection {
    /// Allocates the channels and rate limiter of a new session.
    ///
    /// The inbound channel holds a single slot so the reader hands frames to
    /// the loop nearly synchronously, which keeps the read side applying
    /// backpressure to the client.
    pub(crate) fn open(
        id: ConnectionId,
        limits: &ConnectionLimits,
    ) -> (Self, ReaderEnd, ConnectionHandle) {
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(limits.message_buffer_size);
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let quota = Quota::with_period(limits.push_rate_period)
            .expect("push rate period is non-zero")
            .allow_burst(limits.push_rate_burst);
        let handle = ConnectionHandle {
            outbound: outbound_tx.clone(),
            limiter: Arc::new(RateLimiter::direct(quota)),
        };
        let connection = Connection {
            id,
            inbound: inbound_rx,
            outbound: outbound_rx,
            reader_signals: signal_rx,
            error_replies: outbound_tx,
        };
        let reader = ReaderEnd {
            inbound: inbound_tx,
            signals: signal_tx,
        };
        (connection, reader, handle)
    }
}

/// Process-wide map of live sessions.
#[derive(Default, Clone)]
pub(crate) struct ConnectionRegistry(Arc<Mutex<HashMap<ConnectionId, ConnectionHandle>>>);

/// A guard for a registered connection.
///
/// As long as this guard exists, the connection is addressable through the
/// registry. On drop, removes the entry, so teardown cannot leak a session.
#[must_use]
pub(crate) struct ConnectionGuard {
    id: ConnectionId,
    registry: ConnectionRegistry,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

impl ConnectionRegistry {
    /// Registers a new session under its id.
    ///
    /// On success, returns a [`ConnectionGuard`] that keeps the entry alive.
    pub(crate) fn insert(
        &self,
        id: ConnectionId,
        handle: ConnectionHandle,
    ) -> Result<ConnectionGuard, RegistryError> {
        use std::collections::hash_map::Entry;
        match self.0.lock().entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(id)),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                ::metrics::gauge!(METRICS_ID_CONNECTIONS_OPEN).increment(1);
                Ok(ConnectionGuard {
                    id,
                    registry: self.clone(),
                })
            }
        }
    }

    /// Removes a session.
    ///
    /// Is private so only the `Drop` implementation can call this.
    fn remove(&self, id: &ConnectionId) {
        self.0.lock().remove(id);
        ::metrics::gauge!(METRICS_ID_CONNECTIONS_OPEN).decrement(1);
    }

    /// Delivers a message into the outbound buffer of a locally owned
    /// session.
    ///
    /// Waits on the per-connection rate limiter first, then on a free buffer
    /// slot, so a flood toward one client neither starves other connections
    /// nor grows memory. The registry lock is never held across either wait.
    pub(crate) async fn push_local(
        &self,
        id: &ConnectionId,
        message: &str,
    ) -> Result<(), RegistryError> {
        let handle = self
            .0
            .lock()
            .get(id)
            .cloned()
            .ok_or(RegistryError::ConnectionNotFound)?;
        handle.limiter.until_ready().await;
        // a closed receiver means the session is past its teardown
        handle
            .outbound
            .send(message.to_owned())
            .await
            .map_err(|_| RegistryError::ConnectionNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_limits() -> ConnectionLimits {
        ConnectionLimits {
            message_buffer_size: 16,
            push_rate_period: Duration::from_millis(1),
            push_rate_burst: NonZeroU32::new(8).expect("non-zero"),
        }
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let registry = ConnectionRegistry::default();
        let id = ConnectionId::generate();
        let (_conn_a, _reader_a, handle_a) = Connection::open(id.clone(), &test_limits());
        let (_conn_b, _reader_b, handle_b) = Connection::open(id.clone(), &test_limits());

        let guard = registry.insert(id.clone(), handle_a).expect("first insert");
        let err = registry
            .insert(id.clone(), handle_b)
            .err()
            .expect("second insert must fail");
        assert!(matches!(err, RegistryError::AlreadyRegistered(dup) if dup == id));
        drop(guard);
    }

    #[test]
    fn dropping_the_guard_frees_the_id() {
        let registry = ConnectionRegistry::default();
        let id = ConnectionId::generate();
        let (_conn, _reader, handle) = Connection::open(id.clone(), &test_limits());
        let guard = registry.insert(id.clone(), handle).expect("insert");
        drop(guard);

        let (_conn, _reader, handle) = Connection::open(id.clone(), &test_limits());
        let _guard = registry.insert(id, handle).expect("id is free again");
    }

    #[test]
    fn outbound_buffer_is_bounded() {
        let id = ConnectionId::generate();
        let (conn, _reader, _handle) = Connection::open(id, &test_limits());
        assert_eq!(conn.error_replies.max_capacity(), 16);
    }

    #[tokio::test]
    async fn push_to_unknown_connection_reports_not_found() {
        let registry = ConnectionRegistry::default();
        let err = registry
            .push_local(&ConnectionId::generate(), "hello")
            .await
            .err()
            .expect("push must fail");
        assert!(matches!(err, RegistryError::ConnectionNotFound));
    }

    #[tokio::test]
    async fn push_delivers_in_fifo_order() {
        let registry = ConnectionRegistry::default();
        let id = ConnectionId::generate();
        let (mut conn, _reader, handle) = Connection::open(id.clone(), &test_limits());
        let _guard = registry.insert(id.clone(), handle).expect("insert");

        registry.push_local(&id, "first").await.expect("push");
        registry.push_local(&id, "second").await.expect("push");

        assert_eq!(conn.outbound.recv().await.as_deref(), Some("first"));
        assert_eq!(conn.outbound.recv().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn push_after_session_teardown_reports_not_found() {
        let registry = ConnectionRegistry::default();
        let id = ConnectionId::generate();
        let (conn, _reader, handle) = Connection::open(id.clone(), &test_limits());
        let _guard = registry.insert(id.clone(), handle).expect("insert");
        drop(conn);

        let err = registry
            .push_local(&id, "hello")
            .await
            .err()
            .expect("push must fail");
        assert!(matches!(err, RegistryError::ConnectionNotFound));
    }
}
