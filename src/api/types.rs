use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AgentConfig, AgentId};

// ============================================================================
// Agent Types
// ============================================================================

/// Envelope for agent lifecycle operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_id: AgentId,
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl AgentResponse {
    pub fn success(agent_id: AgentId, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            agent_id,
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: AgentId,
    pub config: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

// ============================================================================
// System Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    pub agents: usize,
    pub connections: usize,
}
