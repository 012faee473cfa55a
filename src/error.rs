use thiserror::Error;

/// Main error type for the agent coordinator
#[derive(Error, Debug)]
pub enum RunecastError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Agent registry errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Invalid agent config: {0}")]
    InvalidAgentConfig(String),

    // Monitor supervision errors
    #[error("Monitor supervisor already started for agent {0}")]
    SupervisorAlreadyStarted(String),

    // Real-time delivery errors
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Send to connection {connection} timed out after {timeout_ms}ms")]
    SendTimeout { connection: String, timeout_ms: u64 },

    // Dispatch capability errors
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RunecastError {
    /// Whether the error stems from caller misuse rather than an external system.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RunecastError::AgentNotFound(_)
                | RunecastError::InvalidAgentConfig(_)
                | RunecastError::SupervisorAlreadyStarted(_)
        )
    }
}

/// Result type alias for RunecastError
pub type Result<T> = std::result::Result<T, RunecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors_are_classified() {
        assert!(RunecastError::AgentNotFound("ghost".into()).is_caller_error());
        assert!(RunecastError::SupervisorAlreadyStarted("a1".into()).is_caller_error());
        assert!(!RunecastError::Dispatch("llm timeout".into()).is_caller_error());
        assert!(!RunecastError::ConnectionClosed("c1".into()).is_caller_error());
    }

    #[test]
    fn test_send_timeout_message() {
        let err = RunecastError::SendTimeout {
            connection: "c1".into(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "Send to connection c1 timed out after 250ms");
    }
}
