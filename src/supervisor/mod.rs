//! Agent monitor supervision
//!
//! - Monitor loops: restart-on-error poll/broadcast/sleep tasks
//! - Pollers: the poll actions behind each capability group
//! - Agent supervisor: owns one agent's loops as a unit
//! - Slot: lease-counted sharing of a supervisor between sessions

pub mod agent_supervisor;
pub mod monitor_loop;
pub mod pollers;
pub mod slot;

pub use agent_supervisor::{AgentSupervisor, StopReport};
pub use monitor_loop::{poll_fn, LoopStats, MonitorLoop, MonitorSpec, PollAction};
pub use pollers::{plan_monitors, trading_interval, BlockchainPoller, SocialPoller, TradingPoller};
pub use slot::{MonitorEnvironment, MonitorLease, MonitorSlot};
