//! Agent instances and the process-wide agent registry

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use super::dispatcher::{AgentDispatcher, DispatcherFactory, SharedAgentConfig};
use crate::domain::{AgentConfig, AgentId, CapabilityGroup, DispatchResult};
use crate::error::{Result, RunecastError};
use crate::supervisor::{plan_monitors, MonitorEnvironment, MonitorLease, MonitorSlot, StopReport};

/// Mutable runtime state of an agent
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentRuntimeState {
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Serializable view of an agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub agent_id: AgentId,
    pub config: AgentConfig,
    pub capability_groups: Vec<CapabilityGroup>,
    pub state: AgentRuntimeState,
    pub monitors_running: bool,
}

pub struct Agent {
    id: AgentId,
    config: SharedAgentConfig,
    groups: BTreeSet<CapabilityGroup>,
    dispatcher: Arc<dyn AgentDispatcher>,
    state: RwLock<AgentRuntimeState>,
    monitors: MonitorSlot,
}

impl Agent {
    pub fn new(id: AgentId, config: SharedAgentConfig, dispatcher: Arc<dyn AgentDispatcher>) -> Self {
        let groups = config.snapshot().capability_groups();
        Self {
            monitors: MonitorSlot::new(id.clone()),
            id,
            config,
            groups,
            dispatcher,
            state: RwLock::new(AgentRuntimeState {
                active: true,
                ..AgentRuntimeState::default()
            }),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn config(&self) -> AgentConfig {
        self.config.snapshot()
    }

    /// Replace the configuration. Capability groups are fixed at construction,
    /// so a config mapping to different groups is rejected.
    ///
    /// The dispatcher shares the config, so later commands see the update.
    /// Running monitors keep the cadence they were started with.
    pub fn update_config(&self, config: AgentConfig) -> Result<()> {
        config.validate()?;
        if config.capability_groups() != self.groups {
            return Err(RunecastError::InvalidAgentConfig(
                "capability groups cannot change after creation".to_string(),
            ));
        }
        self.config.replace(config);
        info!(agent = %self.id, "Agent configuration updated");
        Ok(())
    }

    pub fn capability_groups(&self) -> &BTreeSet<CapabilityGroup> {
        &self.groups
    }

    pub fn runtime_state(&self) -> AgentRuntimeState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run a command through the dispatch capability.
    ///
    /// Never fails: a raised dispatch error becomes an error-status result.
    pub async fn process_message(&self, command: &str) -> DispatchResult {
        let result = match self.dispatcher.dispatch(&self.id, command).await {
            Ok(result) => result,
            Err(e) => DispatchResult::error(self.id.clone(), e.to_string()),
        };

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.last_action = Some(command.to_string());
        state.last_action_time = Some(result.timestamp);
        result
    }

    /// Take a monitor lease, starting this agent's supervisor on first use
    pub async fn acquire_monitors(&self, env: &MonitorEnvironment) -> Result<MonitorLease> {
        let behavior = self.config.snapshot().behavior;
        self.monitors
            .acquire(env, || {
                plan_monitors(&self.id, &self.groups, behavior, &self.dispatcher, &env.config)
            })
            .await
    }

    pub fn monitors(&self) -> &MonitorSlot {
        &self.monitors
    }

    /// Stop monitors for good and mark the agent inactive
    pub async fn shutdown(&self) -> StopReport {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .active = false;
        self.monitors.close().await
    }

    pub async fn info(&self) -> AgentInfo {
        AgentInfo {
            agent_id: self.id.clone(),
            config: self.config(),
            capability_groups: self.groups.iter().copied().collect(),
            state: self.runtime_state(),
            monitors_running: self.monitors.is_running().await,
        }
    }
}

/// Process-wide mapping from agent id to agent instance
pub struct AgentRegistry {
    agents: DashMap<AgentId, Arc<Agent>>,
    factory: Arc<dyn DispatcherFactory>,
}

impl AgentRegistry {
    pub fn new(factory: Arc<dyn DispatcherFactory>) -> Self {
        Self {
            agents: DashMap::new(),
            factory,
        }
    }

    /// Validate `config` and register a new agent under a fresh id
    pub fn create(&self, config: AgentConfig) -> Result<Arc<Agent>> {
        config.validate()?;
        let id = AgentId::generate();
        let config = SharedAgentConfig::new(config);
        let dispatcher = self.factory.build(&id, &config)?;
        let agent = Arc::new(Agent::new(id.clone(), config, dispatcher));

        info!(
            agent = %id,
            name = %agent.config().name,
            groups = ?agent.capability_groups(),
            "Agent created"
        );
        self.agents.insert(id, agent.clone());
        Ok(agent)
    }

    pub fn exists(&self, agent_id: &AgentId) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<Arc<Agent>> {
        self.agents.get(agent_id).map(|entry| entry.value().clone())
    }

    /// Like `get`, but unknown ids are an error
    pub fn require(&self, agent_id: &AgentId) -> Result<Arc<Agent>> {
        self.get(agent_id)
            .ok_or_else(|| RunecastError::AgentNotFound(agent_id.to_string()))
    }

    pub fn list(&self) -> Vec<Arc<Agent>> {
        self.agents.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Remove an agent and stop its monitors, even with sessions attached
    pub async fn remove(&self, agent_id: &AgentId) -> Result<StopReport> {
        let (_, agent) = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| RunecastError::AgentNotFound(agent_id.to_string()))?;
        let report = agent.shutdown().await;
        info!(agent = %agent_id, stopped = report.stopped, "Agent removed");
        Ok(report)
    }

    /// Stop the monitors of every agent; agents stay registered
    pub async fn shutdown_all(&self) -> usize {
        let agents = self.list();
        let mut stopped = 0;
        for agent in agents {
            let report = agent.shutdown().await;
            stopped += report.stopped + report.aborted;
        }
        debug!(loops = stopped, "All agent monitors stopped");
        stopped
    }
}
