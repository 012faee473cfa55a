//! Poll actions for each capability group and the monitor plan built from them

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::monitor_loop::{MonitorSpec, PollAction};
use crate::agent::AgentDispatcher;
use crate::config::MonitorConfig;
use crate::domain::{AgentBehavior, AgentEvent, AgentId, CapabilityGroup, DispatchResult};
use crate::error::{Result, RunecastError};

pub const WALLET_DETAILS_COMMAND: &str = "get wallet details";
pub const BALANCE_COMMAND: &str = "get balance eth";
pub const MENTIONS_COMMAND: &str = "check account mentions";
pub const MARKET_ANALYSIS_COMMAND: &str = "analyze current market conditions and suggest trades";

/// Dispatch a command and treat an error-status result as a poll failure
async fn dispatch_checked(
    dispatcher: &dyn AgentDispatcher,
    agent_id: &AgentId,
    command: &str,
) -> Result<DispatchResult> {
    let result = dispatcher.dispatch(agent_id, command).await?;
    if result.is_success() {
        Ok(result)
    } else {
        Err(RunecastError::Dispatch(format!(
            "'{command}' returned error: {}",
            result.message
        )))
    }
}

/// Wallet details and ETH balance
pub struct BlockchainPoller {
    agent_id: AgentId,
    dispatcher: Arc<dyn AgentDispatcher>,
}

impl BlockchainPoller {
    pub fn new(agent_id: AgentId, dispatcher: Arc<dyn AgentDispatcher>) -> Self {
        Self {
            agent_id,
            dispatcher,
        }
    }
}

#[async_trait]
impl PollAction for BlockchainPoller {
    async fn poll(&self) -> Result<Vec<AgentEvent>> {
        // One poll, one outcome: a failed wallet fetch skips the balance
        let wallet =
            dispatch_checked(self.dispatcher.as_ref(), &self.agent_id, WALLET_DETAILS_COMMAND).await?;
        let balance =
            dispatch_checked(self.dispatcher.as_ref(), &self.agent_id, BALANCE_COMMAND).await?;

        Ok(vec![
            AgentEvent::WalletUpdate(Value::String(wallet.message)),
            AgentEvent::BalanceUpdate(Value::String(balance.message)),
        ])
    }
}

/// Account mentions
pub struct SocialPoller {
    agent_id: AgentId,
    dispatcher: Arc<dyn AgentDispatcher>,
}

impl SocialPoller {
    pub fn new(agent_id: AgentId, dispatcher: Arc<dyn AgentDispatcher>) -> Self {
        Self {
            agent_id,
            dispatcher,
        }
    }
}

#[async_trait]
impl PollAction for SocialPoller {
    async fn poll(&self) -> Result<Vec<AgentEvent>> {
        let mentions =
            dispatch_checked(self.dispatcher.as_ref(), &self.agent_id, MENTIONS_COMMAND).await?;
        Ok(vec![AgentEvent::SocialUpdate(Value::String(mentions.message))])
    }
}

/// Market analysis, followed by trade execution when the analysis suggests one
pub struct TradingPoller {
    agent_id: AgentId,
    dispatcher: Arc<dyn AgentDispatcher>,
}

impl TradingPoller {
    pub fn new(agent_id: AgentId, dispatcher: Arc<dyn AgentDispatcher>) -> Self {
        Self {
            agent_id,
            dispatcher,
        }
    }
}

#[async_trait]
impl PollAction for TradingPoller {
    async fn poll(&self) -> Result<Vec<AgentEvent>> {
        let analysis =
            dispatch_checked(self.dispatcher.as_ref(), &self.agent_id, MARKET_ANALYSIS_COMMAND)
                .await?;

        let suggested_trade = analysis.suggested_trade.clone();
        let mut events = vec![AgentEvent::TradingUpdate(Value::String(analysis.message))];

        if let Some(trade) = suggested_trade {
            // Execution outcome is reported whatever its status
            let execution = self
                .dispatcher
                .dispatch(&self.agent_id, &format!("execute trade: {trade}"))
                .await?;
            events.push(AgentEvent::TradeExecution(Value::String(execution.message)));
        }

        Ok(events)
    }
}

/// Normal trading cadence for a behavior mode
pub fn trading_interval(config: &MonitorConfig, behavior: AgentBehavior) -> Duration {
    match behavior {
        AgentBehavior::Aggressive => Duration::from_secs(config.trading_aggressive_interval_secs),
        _ => Duration::from_secs(config.trading_interval_secs),
    }
}

/// One monitor spec per enabled capability group
pub fn plan_monitors(
    agent_id: &AgentId,
    groups: &BTreeSet<CapabilityGroup>,
    behavior: AgentBehavior,
    dispatcher: &Arc<dyn AgentDispatcher>,
    config: &MonitorConfig,
) -> Vec<MonitorSpec> {
    groups
        .iter()
        .map(|group| match group {
            CapabilityGroup::Blockchain => MonitorSpec::new(
                group.as_str(),
                Arc::new(BlockchainPoller::new(agent_id.clone(), dispatcher.clone())),
                Duration::from_secs(config.blockchain_interval_secs),
                Duration::from_secs(config.blockchain_error_interval_secs),
            ),
            CapabilityGroup::Social => MonitorSpec::new(
                group.as_str(),
                Arc::new(SocialPoller::new(agent_id.clone(), dispatcher.clone())),
                Duration::from_secs(config.social_interval_secs),
                Duration::from_secs(config.social_error_interval_secs),
            ),
            CapabilityGroup::Trading => MonitorSpec::new(
                group.as_str(),
                Arc::new(TradingPoller::new(agent_id.clone(), dispatcher.clone())),
                trading_interval(config, behavior),
                Duration::from_secs(config.trading_error_interval_secs),
            ),
        })
        .collect()
}
