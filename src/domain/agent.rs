//! Agent identity and configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, RunecastError};

/// Opaque agent identifier, generated at creation time and stable for the agent's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Capabilities an agent can be created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    Trading,
    SocialMedia,
    ContentCreation,
    CommunityManagement,
    PortfolioManagement,
    DexOperations,
    NftManagement,
    TokenDeployment,
}

impl AgentCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCapability::Trading => "trading",
            AgentCapability::SocialMedia => "social_media",
            AgentCapability::ContentCreation => "content_creation",
            AgentCapability::CommunityManagement => "community_management",
            AgentCapability::PortfolioManagement => "portfolio_management",
            AgentCapability::DexOperations => "dex_operations",
            AgentCapability::NftManagement => "nft_management",
            AgentCapability::TokenDeployment => "token_deployment",
        }
    }
}

/// Groups of capabilities that each get one monitor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityGroup {
    Blockchain,
    Social,
    Trading,
}

impl CapabilityGroup {
    pub const ALL: [CapabilityGroup; 3] = [
        CapabilityGroup::Blockchain,
        CapabilityGroup::Social,
        CapabilityGroup::Trading,
    ];

    /// Capabilities that enable this group
    pub fn members(&self) -> &'static [AgentCapability] {
        match self {
            CapabilityGroup::Blockchain => &[
                AgentCapability::Trading,
                AgentCapability::PortfolioManagement,
                AgentCapability::DexOperations,
                AgentCapability::NftManagement,
                AgentCapability::TokenDeployment,
            ],
            CapabilityGroup::Social => &[
                AgentCapability::SocialMedia,
                AgentCapability::ContentCreation,
                AgentCapability::CommunityManagement,
            ],
            CapabilityGroup::Trading => &[AgentCapability::Trading],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityGroup::Blockchain => "blockchain",
            CapabilityGroup::Social => "social",
            CapabilityGroup::Trading => "trading",
        }
    }
}

impl fmt::Display for CapabilityGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral pattern of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentBehavior {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
    Experimental,
    CommunityFocused,
    Analytical,
}

/// Social media and web presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SocialPresence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl SocialPresence {
    fn links(&self) -> [(&'static str, Option<&String>); 4] {
        [
            ("twitter_link", self.twitter_link.as_ref()),
            ("telegram_link", self.telegram_link.as_ref()),
            ("youtube_link", self.youtube_link.as_ref()),
            ("website", self.website.as_ref()),
        ]
    }
}

/// Agent configuration as submitted on creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub ticker: String,
    pub chain: String,
    pub capabilities: BTreeSet<AgentCapability>,
    #[serde(default)]
    pub behavior: AgentBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_presence: Option<SocialPresence>,
}

impl AgentConfig {
    /// Check field constraints; returns the first violation
    pub fn validate(&self) -> Result<()> {
        let name_len = self.name.trim().chars().count();
        if !(3..=50).contains(&name_len) {
            return Err(RunecastError::InvalidAgentConfig(format!(
                "name must be 3-50 characters, got {name_len}"
            )));
        }

        let ticker_len = self.ticker.trim().chars().count();
        if !(1..=10).contains(&ticker_len) {
            return Err(RunecastError::InvalidAgentConfig(format!(
                "ticker must be 1-10 characters, got {ticker_len}"
            )));
        }

        if self.chain.trim().is_empty() {
            return Err(RunecastError::InvalidAgentConfig(
                "chain must not be empty".to_string(),
            ));
        }

        if let Some(presence) = &self.social_presence {
            for (field, link) in presence.links() {
                let Some(link) = link else {
                    continue;
                };
                let valid = url::Url::parse(link)
                    .map(|u| matches!(u.scheme(), "http" | "https"))
                    .unwrap_or(false);
                if !valid {
                    return Err(RunecastError::InvalidAgentConfig(format!(
                        "{field} is not an http(s) URL: {link}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Monitor groups enabled by this configuration's capability set
    pub fn capability_groups(&self) -> BTreeSet<CapabilityGroup> {
        CapabilityGroup::ALL
            .into_iter()
            .filter(|group| {
                group
                    .members()
                    .iter()
                    .any(|cap| self.capabilities.contains(cap))
            })
            .collect()
    }
}
