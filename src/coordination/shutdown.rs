//! Graceful Shutdown Handler
//!
//! Coordinates process shutdown: a root cancellation token that every session
//! and supervisor runs under, a tracker for live session tasks, and a phased
//! teardown with bounded waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::agent::AgentRegistry;
use crate::config::ShutdownConfig;

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Normal graceful shutdown (SIGTERM, SIGINT)
    Graceful,
    /// Urgent shutdown - halves the session drain window
    Urgent,
    /// Emergency shutdown - sessions are not waited for
    Emergency,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
            ShutdownSignal::Emergency => write!(f, "emergency"),
        }
    }
}

/// Shutdown phase tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    /// Sessions observe cancellation and send their close frames
    ClosingSessions,
    /// Remaining supervisors are stopped and joined
    StoppingMonitors,
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::ClosingSessions => write!(f, "closing_sessions"),
            ShutdownPhase::StoppingMonitors => write!(f, "stopping_monitors"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Summary of a completed shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions still running when the drain window closed
    pub sessions_abandoned: usize,
    /// Monitor loops stopped in the final phase
    pub monitor_loops_stopped: usize,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ShutdownError {
    #[error("shutdown was not requested")]
    NotRequested,
}

/// Graceful shutdown coordinator
pub struct GracefulShutdown {
    config: ShutdownConfig,
    shutdown_requested: AtomicBool,
    signal: watch::Sender<Option<ShutdownSignal>>,
    phase: watch::Sender<ShutdownPhase>,
    token: CancellationToken,
    sessions: TaskTracker,
}

impl GracefulShutdown {
    pub fn new(config: ShutdownConfig) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        let (signal, _) = watch::channel(None);

        Self {
            config,
            shutdown_requested: AtomicBool::new(false),
            signal,
            phase,
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ShutdownConfig::default())
    }

    /// Root token; supervisors and sessions run under it or its children
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker live sessions are spawned on
    pub fn sessions(&self) -> &TaskTracker {
        &self.sessions
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Request shutdown with specified signal type
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        self.signal.send_replace(Some(signal));
    }

    /// Resolves once shutdown has been requested
    pub async fn wait_for_request(&self) -> ShutdownSignal {
        let mut rx = self.signal.subscribe();
        loop {
            if let Some(signal) = *rx.borrow_and_update() {
                return signal;
            }
            if rx.changed().await.is_err() {
                return ShutdownSignal::Emergency;
            }
        }
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
        info!("Shutdown phase: {}", phase);
    }

    fn drain_window(&self, signal: ShutdownSignal) -> Duration {
        let full = Duration::from_secs(self.config.drain_timeout_secs);
        match signal {
            ShutdownSignal::Graceful => full,
            ShutdownSignal::Urgent => full / 2,
            ShutdownSignal::Emergency => Duration::ZERO,
        }
    }

    /// Execute the shutdown sequence
    ///
    /// 1. Cancel the root token and wait (bounded) for tracked sessions
    /// 2. Stop every agent's remaining monitor loops
    pub async fn execute(&self, agents: &AgentRegistry) -> Result<ShutdownReport, ShutdownError> {
        let Some(signal) = *self.signal.borrow() else {
            return Err(ShutdownError::NotRequested);
        };
        let start = std::time::Instant::now();
        let mut report = ShutdownReport::default();

        self.set_phase(ShutdownPhase::ClosingSessions);
        self.token.cancel();
        self.sessions.close();

        let window = self.drain_window(signal);
        match tokio::time::timeout(window, self.sessions.wait()).await {
            Ok(()) => debug!("All sessions closed"),
            Err(_) => {
                report.sessions_abandoned = self.sessions.len();
                warn!(
                    "{} session(s) still open after {:?}, proceeding anyway",
                    report.sessions_abandoned, window
                );
            }
        }

        self.set_phase(ShutdownPhase::StoppingMonitors);
        report.monitor_loops_stopped = agents.shutdown_all().await;

        self.set_phase(ShutdownPhase::Complete);
        info!("Graceful shutdown completed in {:?}", start.elapsed());
        Ok(report)
    }
}

/// Install OS signal handlers that request shutdown
pub fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let handlers = [
            (SignalKind::terminate(), "SIGTERM", ShutdownSignal::Graceful),
            (SignalKind::interrupt(), "SIGINT", ShutdownSignal::Graceful),
            (SignalKind::quit(), "SIGQUIT", ShutdownSignal::Urgent),
        ];
        for (kind, name, requested) in handlers {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut stream = match signal(kind) {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to install {} handler: {}", name, e);
                        return;
                    }
                };
                stream.recv().await;
                info!("Received {}", name);
                shutdown.request_shutdown(requested);
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                return;
            }
            info!("Received Ctrl+C");
            shutdown.request_shutdown(ShutdownSignal::Graceful);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentDispatcher, DispatcherFactory, SharedAgentConfig};
    use crate::config::MonitorConfig;
    use crate::domain::{AgentBehavior, AgentCapability, AgentConfig, AgentId, DispatchResult};
    use crate::error::Result;
    use crate::stream::{BroadcastChannel, SubscriptionRegistry};
    use crate::supervisor::MonitorEnvironment;
    use async_trait::async_trait;

    struct Idle;

    #[async_trait]
    impl AgentDispatcher for Idle {
        async fn dispatch(&self, agent_id: &AgentId, _: &str) -> Result<DispatchResult> {
            Ok(DispatchResult::success(agent_id.clone(), "ok"))
        }
    }

    impl DispatcherFactory for Idle {
        fn build(&self, _: &AgentId, _: &SharedAgentConfig) -> Result<Arc<dyn AgentDispatcher>> {
            Ok(Arc::new(Idle))
        }
    }

    fn agent_config() -> AgentConfig {
        AgentConfig {
            name: "Runekeeper".into(),
            ticker: "RUNE".into(),
            chain: "base".into(),
            capabilities: [AgentCapability::SocialMedia].into_iter().collect(),
            behavior: AgentBehavior::Moderate,
            social_presence: None,
        }
    }

    #[test]
    fn test_shutdown_phase_display() {
        assert_eq!(ShutdownPhase::Running.to_string(), "running");
        assert_eq!(ShutdownPhase::ClosingSessions.to_string(), "closing_sessions");
        assert_eq!(ShutdownPhase::Complete.to_string(), "complete");
    }

    #[tokio::test]
    async fn test_duplicate_request_keeps_first_signal() {
        let shutdown = GracefulShutdown::with_defaults();
        assert!(!shutdown.is_shutdown_requested());
        assert_eq!(shutdown.current_phase(), ShutdownPhase::Running);

        shutdown.request_shutdown(ShutdownSignal::Graceful);
        shutdown.request_shutdown(ShutdownSignal::Emergency);
        assert!(shutdown.is_shutdown_requested());
        assert_eq!(shutdown.wait_for_request().await, ShutdownSignal::Graceful);
    }

    #[tokio::test]
    async fn test_execute_requires_request() {
        let shutdown = GracefulShutdown::with_defaults();
        let agents = AgentRegistry::new(Arc::new(Idle));
        assert!(matches!(
            shutdown.execute(&agents).await,
            Err(ShutdownError::NotRequested)
        ));
        assert!(!shutdown.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_execute_drains_sessions_and_stops_monitors() {
        let shutdown = GracefulShutdown::with_defaults();
        let agents = AgentRegistry::new(Arc::new(Idle));
        let agent = agents.create(agent_config()).unwrap();
        let env = MonitorEnvironment {
            broadcast: Arc::new(BroadcastChannel::new(Arc::new(SubscriptionRegistry::new()))),
            config: MonitorConfig::default(),
            shutdown: shutdown.token(),
        };
        let lease = agent.acquire_monitors(&env).await.unwrap();

        // A session that holds its lease until cancelled
        let token = shutdown.token();
        shutdown.sessions().spawn(async move {
            token.cancelled().await;
            lease.release().await;
        });

        shutdown.request_shutdown(ShutdownSignal::Graceful);
        let report = shutdown.execute(&agents).await.unwrap();

        assert_eq!(report.sessions_abandoned, 0);
        assert_eq!(shutdown.current_phase(), ShutdownPhase::Complete);
        assert!(!agent.monitors().is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_does_not_wait_for_sessions() {
        let shutdown = GracefulShutdown::with_defaults();
        let agents = AgentRegistry::new(Arc::new(Idle));
        shutdown.sessions().spawn(std::future::pending::<()>());

        shutdown.request_shutdown(ShutdownSignal::Emergency);
        let report = shutdown.execute(&agents).await.unwrap();
        assert_eq!(report.sessions_abandoned, 1);
    }
}
