//! Process lifecycle coordination

pub mod shutdown;

pub use shutdown::{
    install_signal_handlers, GracefulShutdown, ShutdownError, ShutdownPhase, ShutdownReport,
    ShutdownSignal,
};
