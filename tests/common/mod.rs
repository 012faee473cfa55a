#![allow(dead_code)]

use async_trait::async_trait;
use runecast::agent::{AgentDispatcher, DispatcherFactory, SharedAgentConfig};
use runecast::api::AppState;
use runecast::config::AppConfig;
use runecast::coordination::GracefulShutdown;
use runecast::domain::{AgentId, DispatchResult};
use runecast::error::Result;
use std::sync::Arc;

/// Answers every command with `echo: <command>`
pub struct EchoDispatcher;

#[async_trait]
impl AgentDispatcher for EchoDispatcher {
    async fn dispatch(&self, agent_id: &AgentId, command: &str) -> Result<DispatchResult> {
        Ok(DispatchResult::success(agent_id.clone(), format!("echo: {command}")))
    }
}

pub struct EchoFactory;

impl DispatcherFactory for EchoFactory {
    fn build(&self, _: &AgentId, _: &SharedAgentConfig) -> Result<Arc<dyn AgentDispatcher>> {
        Ok(Arc::new(EchoDispatcher))
    }
}

pub fn app_state() -> AppState {
    app_state_with(AppConfig::default())
}

pub fn app_state_with(config: AppConfig) -> AppState {
    let shutdown = Arc::new(GracefulShutdown::new(config.shutdown.clone()));
    AppState::new(&config, Arc::new(EchoFactory), shutdown)
}

pub fn agent_json(name: &str, capabilities: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "ticker": "RUNE",
        "chain": "base-sepolia",
        "capabilities": capabilities,
        "behavior": "moderate",
    })
}
