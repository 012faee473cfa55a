//! Subscription Registry
//!
//! Bidirectional map between live connections and the agents they follow.
//! Every operation is a single critical section with no suspension point, so
//! the two directions can never be observed out of sync.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::connection::{ClientConnection, ConnectionId};
use crate::domain::AgentId;

struct ConnectionEntry {
    connection: Arc<dyn ClientConnection>,
    agents: HashSet<AgentId>,
}

#[derive(Default)]
struct RegistryInner {
    by_agent: HashMap<AgentId, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, ConnectionEntry>,
}

/// Registry of (connection, agent) subscription edges
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add the edge (connection, agent). Returns false if it already existed.
    ///
    /// The first handle registered for a connection id is the one broadcasts
    /// use; later calls must pass the same handle.
    pub fn register(&self, connection: Arc<dyn ClientConnection>, agent_id: &AgentId) -> bool {
        let connection_id = connection.id();
        let mut inner = self.lock();

        let added = inner
            .by_agent
            .entry(agent_id.clone())
            .or_default()
            .insert(connection_id);

        let entry = inner
            .by_connection
            .entry(connection_id)
            .or_insert_with(|| ConnectionEntry {
                connection: connection.clone(),
                agents: HashSet::new(),
            });
        debug_assert!(
            same_handle(&entry.connection, &connection),
            "connection {connection_id} registered with two different handles"
        );
        entry.agents.insert(agent_id.clone());

        if added {
            debug!(connection = %connection_id, agent = %agent_id, "Subscription registered");
        }
        added
    }

    /// Remove every edge of a connection, dropping agents left without subscribers.
    ///
    /// Returns the agents the connection was subscribed to.
    pub fn unregister_all(&self, connection_id: ConnectionId) -> Vec<AgentId> {
        let mut inner = self.lock();

        let Some(entry) = inner.by_connection.remove(&connection_id) else {
            return Vec::new();
        };

        let agents: Vec<AgentId> = entry.agents.into_iter().collect();
        for agent_id in &agents {
            let now_empty = match inner.by_agent.get_mut(agent_id) {
                Some(subscribers) => {
                    subscribers.remove(&connection_id);
                    subscribers.is_empty()
                }
                None => false,
            };
            if now_empty {
                inner.by_agent.remove(agent_id);
            }
        }

        debug!(
            connection = %connection_id,
            agents = agents.len(),
            "Connection unregistered"
        );
        agents
    }

    /// Snapshot of the connections subscribed to an agent (empty if unknown)
    pub fn subscribers_of(&self, agent_id: &AgentId) -> Vec<Arc<dyn ClientConnection>> {
        let inner = self.lock();
        let Some(ids) = inner.by_agent.get(agent_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| inner.by_connection.get(id))
            .map(|entry| entry.connection.clone())
            .collect()
    }

    /// Agents a connection is subscribed to
    pub fn subscriptions_of(&self, connection_id: ConnectionId) -> Vec<AgentId> {
        self.lock()
            .by_connection
            .get(&connection_id)
            .map(|entry| entry.agents.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, connection_id: ConnectionId, agent_id: &AgentId) -> bool {
        self.lock()
            .by_agent
            .get(agent_id)
            .is_some_and(|ids| ids.contains(&connection_id))
    }

    /// Number of agents with at least one subscriber
    pub fn agent_count(&self) -> usize {
        self.lock().by_agent.len()
    }

    /// Number of connections holding at least one subscription
    pub fn connection_count(&self) -> usize {
        self.lock().by_connection.len()
    }
}

fn same_handle(a: &Arc<dyn ClientConnection>, b: &Arc<dyn ClientConnection>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentEvent;
    use crate::error::Result;
    use async_trait::async_trait;

    struct NullConnection(ConnectionId);

    #[async_trait]
    impl ClientConnection for NullConnection {
        fn id(&self) -> ConnectionId {
            self.0
        }

        async fn send(&self, _event: AgentEvent) -> Result<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        fn close(&self) {}
    }

    fn conn() -> Arc<dyn ClientConnection> {
        Arc::new(NullConnection(ConnectionId::new()))
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let c1 = conn();
        let a1 = AgentId::from("a1");

        assert!(registry.register(c1.clone(), &a1));
        assert!(!registry.register(c1.clone(), &a1));

        assert_eq!(registry.subscribers_of(&a1).len(), 1);
        assert_eq!(registry.subscriptions_of(c1.id()), vec![a1]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "two different handles")]
    fn test_second_handle_for_same_id_is_rejected() {
        let registry = SubscriptionRegistry::new();
        let id = ConnectionId::new();
        let first: Arc<dyn ClientConnection> = Arc::new(NullConnection(id));
        let second: Arc<dyn ClientConnection> = Arc::new(NullConnection(id));

        registry.register(first, &AgentId::from("a1"));
        registry.register(second, &AgentId::from("a2"));
    }

    #[test]
    fn test_many_to_many_edges() {
        let registry = SubscriptionRegistry::new();
        let (c1, c2) = (conn(), conn());
        let (a1, a2) = (AgentId::from("a1"), AgentId::from("a2"));

        registry.register(c1.clone(), &a1);
        registry.register(c1.clone(), &a2);
        registry.register(c2.clone(), &a1);

        assert_eq!(registry.subscribers_of(&a1).len(), 2);
        assert_eq!(registry.subscribers_of(&a2).len(), 1);
        assert_eq!(registry.subscriptions_of(c1.id()).len(), 2);
        assert_eq!(registry.agent_count(), 2);
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn test_unregister_all_removes_empty_agent_entries() {
        let registry = SubscriptionRegistry::new();
        let (c1, c2) = (conn(), conn());
        let (a1, a2) = (AgentId::from("a1"), AgentId::from("a2"));

        registry.register(c1.clone(), &a1);
        registry.register(c1.clone(), &a2);
        registry.register(c2.clone(), &a1);

        let mut removed = registry.unregister_all(c1.id());
        removed.sort();
        assert_eq!(removed, vec![a1.clone(), a2.clone()]);

        // a2 had only c1, so its entry is gone entirely
        assert_eq!(registry.agent_count(), 1);
        assert!(registry.subscribers_of(&a2).is_empty());
        assert!(!registry.is_subscribed(c1.id(), &a1));
        assert!(registry.is_subscribed(c2.id(), &a1));
    }

    #[test]
    fn test_unknown_agent_and_connection_are_empty() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.subscribers_of(&AgentId::from("ghost")).is_empty());
        assert!(registry.unregister_all(ConnectionId::new()).is_empty());
    }

    #[test]
    fn test_no_leak_after_all_connections_leave() {
        let registry = SubscriptionRegistry::new();
        let connections: Vec<_> = (0..8).map(|_| conn()).collect();
        let agents: Vec<_> = (0..5).map(|i| AgentId::from(format!("agent-{i}"))).collect();

        // Interleave registrations, including duplicates
        for (i, c) in connections.iter().enumerate() {
            for (j, a) in agents.iter().enumerate() {
                if (i + j) % 3 != 0 {
                    registry.register(c.clone(), a);
                    registry.register(c.clone(), a);
                }
            }
        }

        // Tear down in a different order than registration, twice for some
        for c in connections.iter().rev() {
            registry.unregister_all(c.id());
        }
        registry.unregister_all(connections[0].id());

        assert_eq!(registry.agent_count(), 0);
        assert_eq!(registry.connection_count(), 0);
        for a in &agents {
            assert!(registry.subscribers_of(a).is_empty());
        }
    }
}
