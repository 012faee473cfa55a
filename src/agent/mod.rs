//! Agents and their dispatch capability
//!
//! An agent pairs a configuration with a dispatcher that runs text commands
//! through an LLM-driven tool loop. The registry owns every live agent.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{
    AgentDispatcher, DispatcherFactory, HttpDispatcher, HttpDispatcherFactory, SharedAgentConfig,
};
pub use registry::{Agent, AgentInfo, AgentRegistry, AgentRuntimeState};
