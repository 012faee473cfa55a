//! Real-time fan-out
//!
//! Subscription bookkeeping between client connections and agents, the
//! broadcast channel that delivers events over it, and the per-connection
//! session handler.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod session;

pub use broadcast::{BroadcastChannel, BroadcastReport};
pub use connection::{ClientConnection, ConnectionId, QueuedConnection};
pub use registry::SubscriptionRegistry;
pub use session::{
    InboundFrame, OutboundFrame, SessionHandler, SessionOutcome, SessionState,
    CLOSE_AGENT_NOT_FOUND,
};
