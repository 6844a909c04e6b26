mod fallback;
mod faults;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub(crate) use faults::within_request;
pub use faults::{Fault, FaultHandler, FaultKind};
pub use orchestrator::{BootstrapController, BootstrapControllerBuilder};
pub use shutdown::ShutdownManager;
pub use state::{LifecycleSnapshot, LifecycleState};
pub use types::{
    ExitStatus, InitStage, InitializationError, Phase, ShutdownRequest, ShutdownSignal,
};
