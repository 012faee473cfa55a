//! Dispatch capability
//!
//! Runs one text command through an agent's LLM-driven tool loop and returns a
//! structured result. The shipped implementation forwards commands to an
//! upstream agent runtime over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DispatcherConfig;
use crate::domain::{AgentConfig, AgentId, DispatchResult};
use crate::error::{Result, RunecastError};

/// Live view of an agent's configuration.
///
/// The agent and its dispatcher share one handle, so a config update is seen
/// by the next dispatch.
#[derive(Debug, Clone)]
pub struct SharedAgentConfig(Arc<RwLock<AgentConfig>>);

impl SharedAgentConfig {
    pub fn new(config: AgentConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn snapshot(&self) -> AgentConfig {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, config: AgentConfig) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = config;
    }
}

/// Process a text command for an agent
#[async_trait]
pub trait AgentDispatcher: Send + Sync + 'static {
    async fn dispatch(&self, agent_id: &AgentId, command: &str) -> Result<DispatchResult>;
}

/// Builds the dispatch capability for a newly created agent
pub trait DispatcherFactory: Send + Sync + 'static {
    fn build(&self, agent_id: &AgentId, config: &SharedAgentConfig) -> Result<Arc<dyn AgentDispatcher>>;
}

#[derive(Debug, Clone, Serialize)]
struct InvokeRequest<'a> {
    thread_id: String,
    model: &'a str,
    message: &'a str,
    agent: AgentConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct InvokeResponse {
    message: String,
    #[serde(default)]
    suggested_trade: Option<String>,
}

/// Upstream agent runtime client
pub struct HttpDispatcher {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    agent: SharedAgentConfig,
}

impl HttpDispatcher {
    pub fn new(config: &DispatcherConfig, agent: SharedAgentConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RunecastError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(http, config, agent))
    }

    pub fn with_client(http: Client, config: &DispatcherConfig, agent: SharedAgentConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            agent,
        }
    }

    fn invoke_url(&self, agent_id: &AgentId) -> String {
        format!("{}/agents/{}/invoke", self.base_url, agent_id)
    }

    fn invoke_request<'a>(&'a self, agent_id: &AgentId, command: &'a str) -> InvokeRequest<'a> {
        InvokeRequest {
            thread_id: format!("runecast-{}", agent_id),
            model: &self.model,
            message: command,
            agent: self.agent.snapshot(),
        }
    }

    async fn invoke(&self, agent_id: &AgentId, command: &str) -> Result<InvokeResponse> {
        let request = self.invoke_request(agent_id, command);

        let mut builder = self.http.post(self.invoke_url(agent_id)).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RunecastError::Dispatch(format!(
                "agent runtime returned {}: {}",
                status, body
            )));
        }

        response
            .json::<InvokeResponse>()
            .await
            .map_err(|e| RunecastError::Dispatch(format!("Failed to parse agent runtime response: {}", e)))
    }
}

#[async_trait]
impl AgentDispatcher for HttpDispatcher {
    async fn dispatch(&self, agent_id: &AgentId, command: &str) -> Result<DispatchResult> {
        debug!(agent = %agent_id, command, "Dispatching command");

        match self.invoke(agent_id, command).await {
            Ok(reply) => {
                let mut result = DispatchResult::success(agent_id.clone(), reply.message);
                result.suggested_trade = reply.suggested_trade;
                Ok(result)
            }
            Err(e) => {
                warn!(agent = %agent_id, command, "Dispatch failed: {}", e);
                Ok(DispatchResult::error(agent_id.clone(), e.to_string()))
            }
        }
    }
}

/// Builds one `HttpDispatcher` per agent, sharing a connection pool
pub struct HttpDispatcherFactory {
    http: Client,
    config: DispatcherConfig,
}

impl HttpDispatcherFactory {
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RunecastError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }
}

impl DispatcherFactory for HttpDispatcherFactory {
    fn build(&self, _agent_id: &AgentId, config: &SharedAgentConfig) -> Result<Arc<dyn AgentDispatcher>> {
        Ok(Arc::new(HttpDispatcher::with_client(
            self.http.clone(),
            &self.config,
            config.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentBehavior, AgentCapability, DispatchStatus};
    use serde_json::json;

    fn agent_config() -> AgentConfig {
        AgentConfig {
            name: "Rune".into(),
            ticker: "RUNE".into(),
            chain: "base".into(),
            capabilities: [AgentCapability::Trading].into_iter().collect(),
            behavior: AgentBehavior::Moderate,
            social_presence: None,
        }
    }

    #[test]
    fn test_invoke_url_strips_trailing_slash() {
        let config = DispatcherConfig {
            base_url: "http://runtime:8100/".into(),
            ..DispatcherConfig::default()
        };
        let dispatcher = HttpDispatcher::new(&config, SharedAgentConfig::new(agent_config())).unwrap();
        assert_eq!(
            dispatcher.invoke_url(&AgentId::from("a1")),
            "http://runtime:8100/agents/a1/invoke"
        );
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        let config = DispatcherConfig {
            api_key: Some(String::new()),
            ..DispatcherConfig::default()
        };
        let dispatcher = HttpDispatcher::new(&config, SharedAgentConfig::new(agent_config())).unwrap();
        assert!(dispatcher.api_key.is_none());
    }

    #[test]
    fn test_request_shape() {
        let dispatcher =
            HttpDispatcher::new(&DispatcherConfig::default(), SharedAgentConfig::new(agent_config())).unwrap();
        let request = dispatcher.invoke_request(&AgentId::from("a1"), "get balance eth");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["thread_id"], "runecast-a1");
        assert_eq!(value["message"], "get balance eth");
        assert_eq!(value["agent"]["ticker"], "RUNE");
    }

    #[test]
    fn test_request_carries_updated_config() {
        let shared = SharedAgentConfig::new(agent_config());
        let dispatcher = HttpDispatcher::new(&DispatcherConfig::default(), shared.clone()).unwrap();

        let mut renamed = agent_config();
        renamed.name = "Runewarden".into();
        renamed.behavior = AgentBehavior::Aggressive;
        shared.replace(renamed);

        let value = serde_json::to_value(dispatcher.invoke_request(&AgentId::from("a1"), "hi")).unwrap();
        assert_eq!(value["agent"]["name"], "Runewarden");
        assert_eq!(value["agent"]["behavior"], "aggressive");
    }

    #[test]
    fn test_response_without_trade() {
        let reply: InvokeResponse = serde_json::from_value(json!({"message": "done"})).unwrap();
        assert_eq!(reply.message, "done");
        assert!(reply.suggested_trade.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_runtime_yields_error_result() {
        let config = DispatcherConfig {
            // Reserved port; nothing listens here
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..DispatcherConfig::default()
        };
        let dispatcher = HttpDispatcher::new(&config, SharedAgentConfig::new(agent_config())).unwrap();
        let result = dispatcher
            .dispatch(&AgentId::from("a1"), "get wallet details")
            .await
            .unwrap();

        assert_eq!(result.status, DispatchStatus::Error);
        assert_eq!(result.agent_id, AgentId::from("a1"));
    }
}
