//! Connection Session Handler
//!
//! One control loop per real-time connection. The handler is transport
//! agnostic: it reads `InboundFrame`s from a stream and writes `OutboundFrame`s
//! to a sink, so the axum WebSocket adapter and in-memory test transports
//! drive the same code.
//!
//! Lifecycle: `Connecting -> Active -> Draining -> Closed`. Registry and
//! monitor-lease teardown run on every exit path, including handler panics.

use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{ClientConnection, ConnectionId, QueuedConnection};
use super::registry::SubscriptionRegistry;
use crate::agent::{Agent, AgentRegistry};
use crate::domain::{AgentEvent, AgentId, ClientMessage};
use crate::error::Result;
use crate::supervisor::MonitorEnvironment;

/// Close code sent when the requested agent does not exist
pub const CLOSE_AGENT_NOT_FOUND: u16 = 4004;
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Close code sent when the client fell too far behind on broadcasts
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Frame received from the client transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping/pong; answered by the transport
    Control,
    Close,
}

/// Frame written to the client transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close { code: u16, reason: String },
}

impl OutboundFrame {
    fn close(code: u16, reason: &str) -> Self {
        OutboundFrame::Close {
            code,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    AgentNotFound,
    ClientDisconnected,
    Shutdown,
    /// A broadcast could not be delivered and the connection was dropped
    Dropped,
    Failed(String),
}

impl SessionOutcome {
    fn close_frame(&self) -> OutboundFrame {
        match self {
            SessionOutcome::AgentNotFound => {
                OutboundFrame::close(CLOSE_AGENT_NOT_FOUND, "Agent not found")
            }
            SessionOutcome::ClientDisconnected => OutboundFrame::close(CLOSE_NORMAL, ""),
            SessionOutcome::Shutdown => OutboundFrame::close(CLOSE_GOING_AWAY, "Server shutting down"),
            SessionOutcome::Dropped => OutboundFrame::close(CLOSE_TRY_AGAIN_LATER, "Delivery failed"),
            SessionOutcome::Failed(_) => OutboundFrame::close(CLOSE_INTERNAL_ERROR, "Internal error"),
        }
    }
}

/// Removes every subscription of a connection when dropped
struct Registration {
    registry: Arc<SubscriptionRegistry>,
    connection_id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let removed = self.registry.unregister_all(self.connection_id);
        debug!(connection = %self.connection_id, agents = removed.len(), "Connection unregistered");
    }
}

#[derive(Clone)]
pub struct SessionHandler {
    agents: Arc<AgentRegistry>,
    monitors: MonitorEnvironment,
    queue_capacity: usize,
    send_timeout: Duration,
}

impl SessionHandler {
    pub fn new(
        agents: Arc<AgentRegistry>,
        monitors: MonitorEnvironment,
        queue_capacity: usize,
        send_timeout: Duration,
    ) -> Self {
        Self {
            agents,
            monitors,
            queue_capacity,
            send_timeout,
        }
    }

    fn registry(&self) -> &Arc<SubscriptionRegistry> {
        self.monitors.broadcast.registry()
    }

    /// Drive one connection for `agent_id` until it closes.
    ///
    /// `sink` is owned by a writer task for the lifetime of the session; the
    /// final close frame is written through it.
    pub async fn run<Si, St, E>(&self, agent_id: AgentId, mut sink: Si, mut stream: St) -> SessionOutcome
    where
        Si: Sink<OutboundFrame> + Send + Unpin + 'static,
        Si::Error: fmt::Display,
        St: Stream<Item = std::result::Result<InboundFrame, E>> + Send + Unpin,
        E: fmt::Display + Send,
    {
        let mut state = SessionState::Connecting;

        let Some(agent) = self.agents.get(&agent_id) else {
            info!(agent = %agent_id, "Rejecting session: agent not found");
            let outcome = SessionOutcome::AgentNotFound;
            let _ = sink.send(outcome.close_frame()).await;
            transition(&mut state, SessionState::Closed, &agent_id);
            return outcome;
        };

        let (connection, outbox) = QueuedConnection::channel(self.queue_capacity, self.send_timeout);
        let connection = Arc::new(connection);
        let connection_id = connection.id();
        let dropped = connection.closed_token();
        let registration = Registration {
            registry: self.registry().clone(),
            connection_id,
        };
        self.registry().register(connection.clone(), &agent_id);

        let lease = match agent.acquire_monitors(&self.monitors).await {
            Ok(lease) => lease,
            Err(e) => {
                // Agent was deleted between lookup and lease
                warn!(agent = %agent_id, connection = %connection_id, "Monitor lease refused: {}", e);
                drop(registration);
                let outcome = SessionOutcome::AgentNotFound;
                let _ = sink.send(outcome.close_frame()).await;
                transition(&mut state, SessionState::Closed, &agent_id);
                return outcome;
            }
        };

        let closing = CancellationToken::new();
        let (close_tx, close_rx) = oneshot::channel();
        let writer = tokio::spawn(write_loop(sink, outbox, closing.clone(), close_rx));

        transition(&mut state, SessionState::Active, &agent_id);
        info!(agent = %agent_id, connection = %connection_id, "Session active");

        let outcome = AssertUnwindSafe(self.read_loop(&agent, connection.as_ref(), &dropped, &mut stream))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                SessionOutcome::Failed(format!("handler panicked: {}", panic_message(panic.as_ref())))
            });

        transition(&mut state, SessionState::Draining, &agent_id);
        if let SessionOutcome::Failed(reason) = &outcome {
            error!(agent = %agent_id, connection = %connection_id, "Session failed: {}", reason);
            self.monitors
                .broadcast
                .broadcast(&agent_id, AgentEvent::Error(format!("WebSocket error: {reason}")))
                .await;
        }

        lease.release().await;
        drop(registration);
        drop(connection);

        // The writer drains what is already queued, then writes the close frame
        let _ = close_tx.send(outcome.close_frame());
        let mut writer = writer;
        if tokio::time::timeout(self.send_timeout, &mut writer).await.is_err() {
            closing.cancel();
            if tokio::time::timeout(self.send_timeout, &mut writer).await.is_err() {
                warn!(agent = %agent_id, connection = %connection_id, "Writer stuck, aborting");
                writer.abort();
            }
        }

        transition(&mut state, SessionState::Closed, &agent_id);
        info!(agent = %agent_id, connection = %connection_id, outcome = ?outcome, "Session closed");
        outcome
    }

    async fn read_loop<St, E>(
        &self,
        agent: &Agent,
        connection: &dyn ClientConnection,
        dropped: &CancellationToken,
        stream: &mut St,
    ) -> SessionOutcome
    where
        St: Stream<Item = std::result::Result<InboundFrame, E>> + Send + Unpin,
        E: fmt::Display + Send,
    {
        let shutdown = &self.monitors.shutdown;
        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return SessionOutcome::Shutdown,
                _ = dropped.cancelled() => return SessionOutcome::Dropped,
                frame = stream.next() => frame,
            };

            let text = match frame {
                None | Some(Ok(InboundFrame::Close)) => return SessionOutcome::ClientDisconnected,
                Some(Err(e)) => {
                    debug!(agent = %agent.id(), connection = %connection.id(), "Transport error: {}", e);
                    return SessionOutcome::ClientDisconnected;
                }
                Some(Ok(InboundFrame::Control)) => continue,
                Some(Ok(InboundFrame::Text(text))) => text,
                Some(Ok(InboundFrame::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            };

            let handled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return SessionOutcome::Shutdown,
                _ = dropped.cancelled() => return SessionOutcome::Dropped,
                handled = handle_text(agent, connection, &text) => handled,
            };
            if let Err(e) = handled {
                return SessionOutcome::Failed(e.to_string());
            }
        }
    }
}

/// Dispatch one inbound text message; replies go to this connection only
async fn handle_text(agent: &Agent, connection: &dyn ClientConnection, text: &str) -> Result<()> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Command { message }) => {
            debug!(agent = %agent.id(), connection = %connection.id(), "Command received");
            let result = agent.process_message(&message).await;
            connection.send(AgentEvent::CommandResponse(result)).await
        }
        Ok(ClientMessage::Unsupported) => {
            debug!(agent = %agent.id(), connection = %connection.id(), "Ignoring non-command message");
            Ok(())
        }
        Err(e) => {
            connection
                .send(AgentEvent::Error(format!("Invalid message format: {e}")))
                .await
        }
    }
}

/// Forward queued events to the transport, then write the close frame
async fn write_loop<Si>(
    mut sink: Si,
    mut outbox: mpsc::Receiver<AgentEvent>,
    closing: CancellationToken,
    close_frame: oneshot::Receiver<OutboundFrame>,
) where
    Si: Sink<OutboundFrame> + Unpin,
    Si::Error: fmt::Display,
{
    loop {
        let event = tokio::select! {
            biased;
            _ = closing.cancelled() => break,
            event = outbox.recv() => event,
        };
        let Some(event) = event else {
            break;
        };

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!(kind = event.kind(), "Failed to serialize event: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.send(OutboundFrame::Text(json)).await {
            debug!("Transport write failed: {}", e);
            return;
        }
    }

    // Dropping the receiver marks the connection closed for late broadcasts
    drop(outbox);
    if let Ok(frame) = close_frame.await {
        let _ = sink.send(frame).await;
    }
    let _ = sink.close().await;
}

fn transition(state: &mut SessionState, next: SessionState, agent_id: &AgentId) {
    debug!(agent = %agent_id, from = %state, to = %next, "Session state");
    *state = next;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
