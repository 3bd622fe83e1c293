//! External process lifecycle: the shared pid registry, signal delivery, and
//! the per-kind start/stop handle.

pub mod control;
pub mod managed;
pub mod registry;

pub use control::{ProcessControl, SystemControl};
pub use managed::{
    KindPolicy, ManagedProcess, ProcessKind, ProcessManager, StopReport, TerminationStrategy,
};
pub use registry::{SharedPidRegistry, SlotWriter, NO_PID};

/// Errors from starting or stopping background processes.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("could not allocate shared pid registry: {0}")]
    RegistryAllocation(#[source] std::io::Error),

    #[error("no registry slot for {kind} process")]
    NoSlot { kind: ProcessKind },

    #[error("no command configured for {kind} process")]
    EmptyCommand { kind: ProcessKind },

    #[error("failed to start {kind} process '{program}': {source}")]
    Spawn {
        kind: ProcessKind,
        program: String,
        #[source]
        source: std::io::Error,
    },
}
