pub mod agent;
pub mod event;

pub use agent::*;
pub use event::*;
