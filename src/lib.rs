pub mod agent;
pub mod api;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod stream;
pub mod supervisor;

pub use agent::{Agent, AgentDispatcher, AgentRegistry, DispatcherFactory, HttpDispatcher};
pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use error::{Result, RunecastError};
pub use stream::{BroadcastChannel, SessionHandler, SubscriptionRegistry};
pub use supervisor::{AgentSupervisor, MonitorLoop, MonitorSpec};
