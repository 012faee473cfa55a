//! Per-agent supervisor slot shared by real-time sessions
//!
//! An agent has at most one running supervisor. Sessions hold leases on it:
//! the first lease starts the supervisor, the last release stops it.
//!
//! The slot lock is never held while a supervisor stops. A lease taken during
//! that window starts a fresh supervisor; the old loops are already cancelled.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::agent_supervisor::{AgentSupervisor, StopReport};
use super::monitor_loop::MonitorSpec;
use crate::domain::AgentId;
use crate::error::{Result, RunecastError};
use crate::stream::BroadcastChannel;

/// Shared dependencies for building supervisors
#[derive(Clone)]
pub struct MonitorEnvironment {
    pub broadcast: Arc<BroadcastChannel>,
    pub config: crate::config::MonitorConfig,
    /// Process-wide shutdown token; supervisors run under child tokens of it
    pub shutdown: CancellationToken,
}

impl MonitorEnvironment {
    pub fn stop_grace(&self) -> Duration {
        self.config.stop_grace()
    }
}

#[derive(Default)]
struct SlotState {
    leases: usize,
    supervisor: Option<AgentSupervisor>,
    closed: bool,
}

struct SlotInner {
    agent_id: AgentId,
    state: Mutex<SlotState>,
}

impl SlotInner {
    async fn release_one(&self) -> Option<StopReport> {
        let mut state = self.state.lock().await;
        state.leases = state.leases.saturating_sub(1);
        if state.leases > 0 {
            debug!(agent = %self.agent_id, leases = state.leases, "Monitor lease released");
            return None;
        }
        let mut supervisor = state.supervisor.take()?;
        drop(state);
        Some(supervisor.stop().await)
    }
}

#[derive(Clone)]
pub struct MonitorSlot {
    inner: Arc<SlotInner>,
}

impl MonitorSlot {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                agent_id,
                state: Mutex::new(SlotState::default()),
            }),
        }
    }

    /// Take a lease, starting a supervisor built from `plan` if none is running.
    ///
    /// `plan` is only invoked when a new supervisor is needed.
    pub async fn acquire<F>(&self, env: &MonitorEnvironment, plan: F) -> Result<MonitorLease>
    where
        F: FnOnce() -> Vec<MonitorSpec>,
    {
        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(RunecastError::AgentNotFound(self.inner.agent_id.to_string()));
        }

        if state.supervisor.is_none() {
            let mut supervisor = AgentSupervisor::new(
                self.inner.agent_id.clone(),
                plan(),
                env.broadcast.clone(),
                env.shutdown.clone(),
                env.stop_grace(),
            );
            supervisor.start()?;
            state.supervisor = Some(supervisor);
        }

        state.leases += 1;
        debug!(agent = %self.inner.agent_id, leases = state.leases, "Monitor lease acquired");
        Ok(MonitorLease {
            slot: Some(self.inner.clone()),
        })
    }

    /// Stop the supervisor regardless of outstanding leases and refuse new ones
    pub async fn close(&self) -> StopReport {
        let supervisor = {
            let mut state = self.inner.state.lock().await;
            state.closed = true;
            state.supervisor.take()
        };
        match supervisor {
            Some(mut supervisor) => supervisor.stop().await,
            None => StopReport::default(),
        }
    }

    pub async fn lease_count(&self) -> usize {
        self.inner.state.lock().await.leases
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .supervisor
            .as_ref()
            .is_some_and(AgentSupervisor::is_running)
    }

    /// Monitor loops currently owned by the running supervisor
    pub async fn loop_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .await
            .supervisor
            .as_ref()
            .map_or(0, AgentSupervisor::loop_count)
    }
}

/// A session's claim on its agent's running supervisor
pub struct MonitorLease {
    slot: Option<Arc<SlotInner>>,
}

impl MonitorLease {
    /// Give the lease back; stops the supervisor when this was the last one
    pub async fn release(mut self) -> Option<StopReport> {
        let slot = self.slot.take()?;
        slot.release_one().await
    }
}

impl Drop for MonitorLease {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        warn!(agent = %slot.agent_id, "Monitor lease dropped without release");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                slot.release_one().await;
            });
        }
    }
}
