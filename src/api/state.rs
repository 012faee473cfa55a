use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::agent::{AgentRegistry, DispatcherFactory};
use crate::api::auth::ApiAuth;
use crate::config::AppConfig;
use crate::coordination::GracefulShutdown;
use crate::stream::{BroadcastChannel, SessionHandler, SubscriptionRegistry};
use crate::supervisor::MonitorEnvironment;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<AgentRegistry>,

    /// Live connection subscriptions
    pub subscriptions: Arc<SubscriptionRegistry>,

    pub sessions: SessionHandler,

    pub shutdown: Arc<GracefulShutdown>,

    /// Bearer policy for the agent endpoints
    pub auth: Arc<ApiAuth>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the registries, broadcast channel and session handler together
    pub fn new(
        config: &AppConfig,
        factory: Arc<dyn DispatcherFactory>,
        shutdown: Arc<GracefulShutdown>,
    ) -> Self {
        let agents = Arc::new(AgentRegistry::new(factory));
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let monitors = MonitorEnvironment {
            broadcast: Arc::new(BroadcastChannel::new(subscriptions.clone())),
            config: config.monitor.clone(),
            shutdown: shutdown.token(),
        };
        let sessions = SessionHandler::new(
            agents.clone(),
            monitors,
            config.server.outbound_queue_capacity,
            config.server.send_timeout(),
        );

        Self {
            agents,
            subscriptions,
            sessions,
            shutdown,
            auth: Arc::new(ApiAuth::from_config(&config.server)),
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
