//! Wire types exchanged with real-time clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::agent::AgentId;

/// Outcome status of a dispatched command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Success,
    Error,
}

/// Structured result of running one text command through an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub status: DispatchStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id: AgentId,
    /// Trade proposed by the agent runtime, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_trade: Option<String>,
}

impl DispatchResult {
    pub fn success(agent_id: AgentId, message: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Success,
            message: message.into(),
            timestamp: Utc::now(),
            agent_id,
            suggested_trade: None,
        }
    }

    pub fn error(agent_id: AgentId, message: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Error,
            message: message.into(),
            timestamp: Utc::now(),
            agent_id,
            suggested_trade: None,
        }
    }

    pub fn with_suggested_trade(mut self, trade: impl Into<String>) -> Self {
        self.suggested_trade = Some(trade.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == DispatchStatus::Success
    }
}

/// Event fanned out to real-time subscribers, serialized as `{"type": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    WalletUpdate(Value),
    BalanceUpdate(Value),
    SocialUpdate(Value),
    TradingUpdate(Value),
    TradeExecution(Value),
    Error(String),
    CommandResponse(DispatchResult),
}

impl AgentEvent {
    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::WalletUpdate(_) => "wallet_update",
            AgentEvent::BalanceUpdate(_) => "balance_update",
            AgentEvent::SocialUpdate(_) => "social_update",
            AgentEvent::TradingUpdate(_) => "trading_update",
            AgentEvent::TradeExecution(_) => "trade_execution",
            AgentEvent::Error(_) => "error",
            AgentEvent::CommandResponse(_) => "command_response",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AgentEvent::Error(_))
    }
}

/// Inbound message from a real-time client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Command { message: String },
    #[serde(other)]
    Unsupported,
}
