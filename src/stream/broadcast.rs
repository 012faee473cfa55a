//! Broadcast Channel
//!
//! Fans an event out to every subscriber of an agent. Delivery failures are
//! isolated per recipient: a failing connection is torn down and the others
//! still get the event.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use super::connection::ConnectionId;
use super::registry::SubscriptionRegistry;
use crate::domain::{AgentEvent, AgentId};

/// Result of one broadcast call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: Vec<ConnectionId>,
}

pub struct BroadcastChannel {
    registry: Arc<SubscriptionRegistry>,
}

impl BroadcastChannel {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Deliver `event` to the subscribers of `agent_id` as of this call.
    ///
    /// Never fails; connections that could not be reached are unregistered
    /// from all of their subscriptions and listed in the report.
    pub async fn broadcast(&self, agent_id: &AgentId, event: AgentEvent) -> BroadcastReport {
        let subscribers = self.registry.subscribers_of(agent_id);
        if subscribers.is_empty() {
            debug!(agent = %agent_id, kind = event.kind(), "No subscribers for event");
            return BroadcastReport::default();
        }

        let kind = event.kind();
        let deliveries = subscribers.into_iter().map(|connection| {
            let event = event.clone();
            async move {
                let outcome = connection.send(event).await;
                (connection, outcome)
            }
        });

        let mut report = BroadcastReport::default();
        for (connection, outcome) in join_all(deliveries).await {
            let connection_id = connection.id();
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        agent = %agent_id,
                        connection = %connection_id,
                        kind,
                        "Delivery failed, dropping connection: {}",
                        e
                    );
                    self.registry.unregister_all(connection_id);
                    connection.close();
                    report.dropped.push(connection_id);
                }
            }
        }

        debug!(
            agent = %agent_id,
            kind,
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Broadcast complete"
        );
        report
    }
}
