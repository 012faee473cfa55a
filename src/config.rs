use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener
    #[serde(default = "default_host")]
    pub host: String,
    /// Listener port (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-connection outbound event queue capacity
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Maximum time a broadcast waits on one connection's queue
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Require an `Authorization: Bearer` header on the agent endpoints
    #[serde(default)]
    pub require_bearer: bool,
    /// When set, the bearer token must match it
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_send_timeout_ms() -> u64 {
    2_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            send_timeout_ms: default_send_timeout_ms(),
            require_bearer: false,
            api_token: None,
        }
    }
}

impl ServerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Cadences for the per-agent monitor loops.
///
/// Every monitor has a normal-path interval and a longer back-off interval
/// used after a failed poll.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_blockchain_interval")]
    pub blockchain_interval_secs: u64,
    #[serde(default = "default_blockchain_error_interval")]
    pub blockchain_error_interval_secs: u64,
    #[serde(default = "default_social_interval")]
    pub social_interval_secs: u64,
    #[serde(default = "default_social_error_interval")]
    pub social_error_interval_secs: u64,
    #[serde(default = "default_trading_interval")]
    pub trading_interval_secs: u64,
    /// Trading cadence for agents with aggressive behavior
    #[serde(default = "default_trading_aggressive_interval")]
    pub trading_aggressive_interval_secs: u64,
    #[serde(default = "default_trading_error_interval")]
    pub trading_error_interval_secs: u64,
    /// Grace period granted to loops on supervisor stop before they are aborted
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

fn default_blockchain_interval() -> u64 {
    30
}

fn default_blockchain_error_interval() -> u64 {
    60
}

fn default_social_interval() -> u64 {
    300
}

fn default_social_error_interval() -> u64 {
    600
}

fn default_trading_interval() -> u64 {
    300
}

fn default_trading_aggressive_interval() -> u64 {
    60
}

fn default_trading_error_interval() -> u64 {
    600
}

fn default_stop_grace_ms() -> u64 {
    5_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            blockchain_interval_secs: default_blockchain_interval(),
            blockchain_error_interval_secs: default_blockchain_error_interval(),
            social_interval_secs: default_social_interval(),
            social_error_interval_secs: default_social_error_interval(),
            trading_interval_secs: default_trading_interval(),
            trading_aggressive_interval_secs: default_trading_aggressive_interval(),
            trading_error_interval_secs: default_trading_error_interval(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Upstream agent runtime that executes commands (LLM + tool loop)
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_dispatcher_url")]
    pub base_url: String,
    #[serde(default = "default_dispatcher_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_dispatcher_url() -> String {
    "http://127.0.0.1:8100".to_string()
}

fn default_dispatcher_timeout() -> u64 {
    120
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            base_url: default_dispatcher_url(),
            timeout_secs: default_dispatcher_timeout(),
            api_key: None,
            model: default_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// Time to wait for live sessions to drain (default: 10s)
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_drain_timeout() -> u64 {
    10
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `info` or `warn,runecast=debug`. `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info,runecast=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("RUNECAST_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (RUNECAST_SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("RUNECAST")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.outbound_queue_capacity == 0 {
            errors.push("server.outbound_queue_capacity must be positive".to_string());
        }

        if self.server.send_timeout_ms == 0 {
            errors.push("server.send_timeout_ms must be positive".to_string());
        }

        let m = &self.monitor;
        let cadences = [
            ("blockchain", m.blockchain_interval_secs, m.blockchain_error_interval_secs),
            ("social", m.social_interval_secs, m.social_error_interval_secs),
            ("trading", m.trading_interval_secs, m.trading_error_interval_secs),
            (
                "trading (aggressive)",
                m.trading_aggressive_interval_secs,
                m.trading_error_interval_secs,
            ),
        ];
        for (name, normal, error) in cadences {
            if normal == 0 || error == 0 {
                errors.push(format!("{name} monitor intervals must be positive"));
            }
        }

        if url::Url::parse(&self.dispatcher.base_url).is_err() {
            errors.push(format!(
                "dispatcher.base_url is not a valid URL: {}",
                self.dispatcher.base_url
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
