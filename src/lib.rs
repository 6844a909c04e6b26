pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod http;
pub mod integration;

pub use app::{
    BootstrapController, BootstrapControllerBuilder, ExitStatus, FaultHandler, LifecycleState,
    Phase, ShutdownManager, ShutdownSignal,
};
pub use crate::config::{ProcessEnv, RunMode, ServerConfig};
pub use error::{Result, ServerError};
pub use events::{EventBus, LifecycleEvent};
pub use health::{HealthReporter, HealthSnapshot};
pub use integration::{AssetServer, DatabaseInitializer, DirectoryAssets, RouteRegistrar};
