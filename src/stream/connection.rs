//! Client connection identity and outbound delivery

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::AgentEvent;
use crate::error::{Result, RunecastError};

/// Unique identity of a live real-time connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connection the registry can reference and the broadcast channel can deliver to.
///
/// The transport layer owns the connection; the registry only holds handles.
#[async_trait]
pub trait ClientConnection: Send + Sync + 'static {
    fn id(&self) -> ConnectionId;

    /// Deliver one event; an error means the connection is unusable
    async fn send(&self, event: AgentEvent) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Mark the connection unusable; its owning session drains and closes
    fn close(&self);
}

/// Connection backed by a bounded outbound queue drained by the transport writer
pub struct QueuedConnection {
    id: ConnectionId,
    tx: mpsc::Sender<AgentEvent>,
    send_timeout: Duration,
    closed: CancellationToken,
}

impl QueuedConnection {
    /// Create a connection and the receiving end its writer task drains
    pub fn channel(capacity: usize, send_timeout: Duration) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            tx,
            send_timeout,
            closed: CancellationToken::new(),
        };
        (connection, rx)
    }

    /// Fires once `close` has been called
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

#[async_trait]
impl ClientConnection for QueuedConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, event: AgentEvent) -> Result<()> {
        match tokio::time::timeout(self.send_timeout, self.tx.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RunecastError::ConnectionClosed(self.id.to_string())),
            Err(_) => Err(RunecastError::SendTimeout {
                connection: self.id.to_string(),
                timeout_ms: self.send_timeout.as_millis() as u64,
            }),
        }
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed() && !self.closed.is_cancelled()
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_receiver() {
        let (conn, mut rx) = QueuedConnection::channel(4, Duration::from_millis(100));
        conn.send(AgentEvent::Error("x".into())).await.unwrap();
        assert_eq!(rx.recv().await, Some(AgentEvent::Error("x".into())));
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_is_closed() {
        let (conn, rx) = QueuedConnection::channel(4, Duration::from_millis(100));
        drop(rx);

        assert!(!conn.is_open());
        let err = conn.send(AgentEvent::Error("x".into())).await.unwrap_err();
        assert!(matches!(err, RunecastError::ConnectionClosed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_times_out() {
        let (conn, _rx) = QueuedConnection::channel(1, Duration::from_millis(50));
        conn.send(AgentEvent::Error("first".into())).await.unwrap();

        let err = conn.send(AgentEvent::Error("second".into())).await.unwrap_err();
        assert!(matches!(err, RunecastError::SendTimeout { timeout_ms: 50, .. }));
    }

    #[tokio::test]
    async fn test_close_trips_token() {
        let (conn, _rx) = QueuedConnection::channel(4, Duration::from_millis(100));
        let closed = conn.closed_token();
        assert!(!closed.is_cancelled());

        conn.close();
        assert!(closed.is_cancelled());
        assert!(!conn.is_open());
    }
}
