//! Agent Monitor Supervisor
//!
//! Owns the monitor loops of one agent as a structured scope: every loop runs
//! in the supervisor's `JoinSet` under a child of the process-wide shutdown
//! token, and `stop` joins them all before returning.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::monitor_loop::{LoopStats, MonitorLoop, MonitorSpec};
use crate::domain::AgentId;
use crate::error::{Result, RunecastError};
use crate::stream::BroadcastChannel;

/// Outcome of a supervisor stop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Loops that observed cancellation within the grace period
    pub stopped: usize,
    /// Loops force-abandoned after the grace period
    pub aborted: usize,
}

struct RunningLoops {
    cancel: CancellationToken,
    tasks: JoinSet<(&'static str, LoopStats)>,
}

pub struct AgentSupervisor {
    agent_id: AgentId,
    specs: Vec<MonitorSpec>,
    broadcast: Arc<BroadcastChannel>,
    parent: CancellationToken,
    stop_grace: Duration,
    running: Option<RunningLoops>,
}

impl AgentSupervisor {
    pub fn new(
        agent_id: AgentId,
        specs: Vec<MonitorSpec>,
        broadcast: Arc<BroadcastChannel>,
        parent: CancellationToken,
        stop_grace: Duration,
    ) -> Self {
        Self {
            agent_id,
            specs,
            broadcast,
            parent,
            stop_grace,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Number of loops currently owned
    pub fn loop_count(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.tasks.len())
    }

    pub fn monitor_names(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.name).collect()
    }

    /// Spawn one loop per monitor spec. Returns the number of loops started.
    pub fn start(&mut self) -> Result<usize> {
        if self.running.is_some() {
            return Err(RunecastError::SupervisorAlreadyStarted(
                self.agent_id.to_string(),
            ));
        }

        let cancel = self.parent.child_token();
        let mut tasks = JoinSet::new();
        for spec in &self.specs {
            let monitor = MonitorLoop::new(self.agent_id.clone(), spec.clone(), self.broadcast.clone());
            let token = cancel.clone();
            tasks.spawn(async move {
                let name = monitor.name();
                (name, monitor.run(token).await)
            });
        }

        let started = tasks.len();
        info!(
            agent = %self.agent_id,
            monitors = ?self.monitor_names(),
            "Supervisor started {} monitor loop(s)",
            started
        );
        self.running = Some(RunningLoops { cancel, tasks });
        Ok(started)
    }

    /// Cancel every loop and wait for them; no-op when not running.
    ///
    /// Loops still alive after the grace period are aborted. Either way no
    /// owned loop is running when this returns.
    pub async fn stop(&mut self) -> StopReport {
        let Some(RunningLoops { cancel, mut tasks }) = self.running.take() else {
            return StopReport::default();
        };

        cancel.cancel();
        let mut report = StopReport::default();
        let agent_id = &self.agent_id;

        let joined = tokio::time::timeout(self.stop_grace, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((name, stats)) => {
                        debug!(agent = %agent_id, monitor = name, polls = stats.polls, "Monitor loop joined");
                    }
                    Err(e) => error!(agent = %agent_id, "Monitor loop ended abnormally: {}", e),
                }
                report.stopped += 1;
            }
        })
        .await;

        if joined.is_err() {
            report.aborted = tasks.len();
            warn!(
                agent = %self.agent_id,
                "{} monitor loop(s) ignored cancellation for {:?}, aborting",
                report.aborted,
                self.stop_grace
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        info!(
            agent = %self.agent_id,
            stopped = report.stopped,
            aborted = report.aborted,
            "Supervisor stopped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentEvent;
    use crate::stream::{QueuedConnection, SubscriptionRegistry};
    use crate::supervisor::monitor_loop::poll_fn;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn channel_with_subscriber(
        agent_id: &AgentId,
    ) -> (Arc<BroadcastChannel>, tokio::sync::mpsc::Receiver<AgentEvent>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (conn, rx) = QueuedConnection::channel(256, Duration::from_secs(1));
        registry.register(Arc::new(conn), agent_id);
        (Arc::new(BroadcastChannel::new(registry)), rx)
    }

    fn counting_spec(name: &'static str, counter: Arc<AtomicUsize>) -> MonitorSpec {
        let poll = poll_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(vec![AgentEvent::SocialUpdate(json!("tick"))]) }
        });
        MonitorSpec::new(name, poll, Duration::from_secs(10), Duration::from_secs(20))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_joins_all_loops_and_silences_them() {
        let agent_id = AgentId::from("a1");
        let (broadcast, mut rx) = channel_with_subscriber(&agent_id);
        let counter = Arc::new(AtomicUsize::new(0));
        let specs = vec![
            counting_spec("blockchain", counter.clone()),
            counting_spec("social", counter.clone()),
            counting_spec("trading", counter.clone()),
        ];

        let mut supervisor = AgentSupervisor::new(
            agent_id,
            specs,
            broadcast,
            CancellationToken::new(),
            Duration::from_secs(5),
        );
        assert_eq!(supervisor.start().unwrap(), 3);
        assert_eq!(supervisor.loop_count(), 3);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 6);

        let report = supervisor.stop().await;
        assert_eq!(report, StopReport { stopped: 3, aborted: 0 });
        assert!(!supervisor.is_running());

        while rx.try_recv().is_ok() {}
        let polls_at_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(counter.load(Ordering::SeqCst), polls_at_stop);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let agent_id = AgentId::from("a1");
        let (broadcast, _rx) = channel_with_subscriber(&agent_id);
        let counter = Arc::new(AtomicUsize::new(0));
        let mut supervisor = AgentSupervisor::new(
            agent_id,
            vec![counting_spec("social", counter)],
            broadcast,
            CancellationToken::new(),
            Duration::from_secs(5),
        );

        supervisor.start().unwrap();
        let err = supervisor.start().unwrap_err();
        assert!(matches!(err, RunecastError::SupervisorAlreadyStarted(_)));
        assert_eq!(supervisor.loop_count(), 1);

        supervisor.stop().await;
        // Restart after stop is allowed
        assert_eq!(supervisor.start().unwrap(), 1);
        supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_zero_monitors_and_idempotent_stop() {
        let agent_id = AgentId::from("a1");
        let (broadcast, _rx) = channel_with_subscriber(&agent_id);
        let mut supervisor = AgentSupervisor::new(
            agent_id,
            Vec::new(),
            broadcast,
            CancellationToken::new(),
            Duration::from_secs(5),
        );

        assert_eq!(supervisor.start().unwrap(), 0);
        assert!(supervisor.is_running());
        assert_eq!(supervisor.stop().await, StopReport::default());
        assert_eq!(supervisor.stop().await, StopReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stuck_in_delivery_is_aborted_after_grace() {
        let agent_id = AgentId::from("a1");
        let registry = Arc::new(SubscriptionRegistry::new());
        // One-slot queue nobody drains, with a send timeout far beyond the grace period
        let (conn, _rx) = QueuedConnection::channel(1, Duration::from_secs(3600));
        registry.register(Arc::new(conn), &agent_id);
        let broadcast = Arc::new(BroadcastChannel::new(registry));

        let poll = poll_fn(|| async {
            Ok(vec![
                AgentEvent::TradingUpdate(json!("first")),
                AgentEvent::TradingUpdate(json!("second")),
            ])
        });
        let spec = MonitorSpec::new("trading", poll, Duration::from_secs(60), Duration::from_secs(60));
        let mut supervisor = AgentSupervisor::new(
            agent_id,
            vec![spec],
            broadcast,
            CancellationToken::new(),
            Duration::from_millis(500),
        );
        supervisor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let report = supervisor.stop().await;
        assert_eq!(report, StopReport { stopped: 0, aborted: 1 });
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_parent_cancellation_ends_loops() {
        let agent_id = AgentId::from("a1");
        let (broadcast, _rx) = channel_with_subscriber(&agent_id);
        let parent = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut supervisor = AgentSupervisor::new(
            agent_id,
            vec![counting_spec("social", counter)],
            broadcast,
            parent.clone(),
            Duration::from_secs(5),
        );
        supervisor.start().unwrap();

        parent.cancel();
        let report = supervisor.stop().await;
        assert_eq!(report.stopped, 1);
    }
}
