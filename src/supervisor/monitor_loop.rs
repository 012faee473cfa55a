//! Monitor Loop
//!
//! Restart-on-error polling primitive: poll, broadcast what the poll produced,
//! sleep, repeat. A failed poll is reported to subscribers as an `error` event
//! and followed by the longer back-off sleep; it never ends the loop.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{AgentEvent, AgentId};
use crate::error::Result;
use crate::stream::BroadcastChannel;

/// Source of events for a monitor loop
#[async_trait]
pub trait PollAction: Send + Sync + 'static {
    async fn poll(&self) -> Result<Vec<AgentEvent>>;
}

struct FnPoll<F>(F);

#[async_trait]
impl<F, Fut> PollAction for FnPoll<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<AgentEvent>>> + Send + 'static,
{
    async fn poll(&self) -> Result<Vec<AgentEvent>> {
        (self.0)().await
    }
}

/// Wrap a closure as a poll action
pub fn poll_fn<F, Fut>(f: F) -> Arc<dyn PollAction>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<AgentEvent>>> + Send + 'static,
{
    Arc::new(FnPoll(f))
}

/// Name, cadence and poll action of one monitor
#[derive(Clone)]
pub struct MonitorSpec {
    pub name: &'static str,
    pub poll: Arc<dyn PollAction>,
    /// Sleep after a successful poll
    pub normal_interval: Duration,
    /// Sleep after a failed poll
    pub error_interval: Duration,
}

impl MonitorSpec {
    pub fn new(
        name: &'static str,
        poll: Arc<dyn PollAction>,
        normal_interval: Duration,
        error_interval: Duration,
    ) -> Self {
        Self {
            name,
            poll,
            normal_interval,
            error_interval,
        }
    }
}

impl std::fmt::Debug for MonitorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSpec")
            .field("name", &self.name)
            .field("normal_interval", &self.normal_interval)
            .field("error_interval", &self.error_interval)
            .finish()
    }
}

/// Counters reported when a loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub polls: u64,
    pub failures: u64,
    pub events: u64,
}

pub struct MonitorLoop {
    agent_id: AgentId,
    spec: MonitorSpec,
    broadcast: Arc<BroadcastChannel>,
}

impl MonitorLoop {
    pub fn new(agent_id: AgentId, spec: MonitorSpec, broadcast: Arc<BroadcastChannel>) -> Self {
        Self {
            agent_id,
            spec,
            broadcast,
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Run until `cancel` fires. Cancellation interrupts an in-flight poll or sleep.
    pub async fn run(self, cancel: CancellationToken) -> LoopStats {
        let mut stats = LoopStats::default();
        info!(agent = %self.agent_id, monitor = self.spec.name, "Monitor loop started");

        while !cancel.is_cancelled() {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.spec.poll.poll() => outcome,
            };
            stats.polls += 1;

            let pause = match outcome {
                Ok(events) => {
                    for event in events {
                        if cancel.is_cancelled() {
                            break;
                        }
                        self.broadcast.broadcast(&self.agent_id, event).await;
                        stats.events += 1;
                    }
                    self.spec.normal_interval
                }
                Err(e) => {
                    stats.failures += 1;
                    warn!(
                        agent = %self.agent_id,
                        monitor = self.spec.name,
                        "Poll failed, backing off {:?}: {}",
                        self.spec.error_interval,
                        e
                    );
                    if !cancel.is_cancelled() {
                        let message = format!("{} monitoring error: {}", title_case(self.spec.name), e);
                        self.broadcast
                            .broadcast(&self.agent_id, AgentEvent::Error(message))
                            .await;
                    }
                    self.spec.error_interval
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        debug!(
            agent = %self.agent_id,
            monitor = self.spec.name,
            polls = stats.polls,
            failures = stats.failures,
            "Monitor loop cancelled"
        );
        stats
    }
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunecastError;
    use crate::stream::{QueuedConnection, SubscriptionRegistry};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::mpsc;

    fn subscribed_channel(
        agent_id: &AgentId,
    ) -> (Arc<BroadcastChannel>, mpsc::Receiver<AgentEvent>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (conn, rx) = QueuedConnection::channel(64, Duration::from_secs(1));
        registry.register(Arc::new(conn), agent_id);
        (Arc::new(BroadcastChannel::new(registry)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_poll_keeps_looping_on_error_interval() {
        let agent_id = AgentId::from("a1");
        let (broadcast, mut rx) = subscribed_channel(&agent_id);

        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let poll = poll_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<Vec<AgentEvent>, _>(RunecastError::Dispatch("llm down".into())) }
        });

        let spec = MonitorSpec::new(
            "blockchain",
            poll,
            Duration::from_secs(30),
            Duration::from_secs(60),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(MonitorLoop::new(agent_id, spec, broadcast).run(cancel.clone()));

        // First poll is immediate; then one more poll per 60s back-off
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        cancel.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.failures, 4);
        assert_eq!(stats.events, 0);

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 4);
        assert!(received.iter().all(AgentEvent::is_error));
        assert_eq!(
            received[0],
            AgentEvent::Error("Blockchain monitoring error: Dispatch failed: llm down".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_delivered_once_per_normal_interval() {
        let agent_id = AgentId::from("a1");
        let (broadcast, mut rx) = subscribed_channel(&agent_id);

        let poll = poll_fn(|| async { Ok(vec![AgentEvent::WalletUpdate(json!({"eth": "1.5"}))]) });
        let spec = MonitorSpec::new("blockchain", poll, Duration::from_secs(30), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(MonitorLoop::new(agent_id, spec, broadcast).run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rx.try_recv().unwrap(), AgentEvent::WalletUpdate(json!({"eth": "1.5"})));
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.polls, 2);
        assert_eq!(stats.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let agent_id = AgentId::from("a1");
        let (broadcast, _rx) = subscribed_channel(&agent_id);

        let poll = poll_fn(|| async { Ok(Vec::new()) });
        let spec = MonitorSpec::new("social", poll, Duration::from_secs(300), Duration::from_secs(600));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(MonitorLoop::new(agent_id, spec, broadcast).run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = tokio::time::Instant::now();
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.polls, 1);
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("trading"), "Trading");
        assert_eq!(title_case(""), "");
    }
}
