use super::faults::FaultHandler;
use super::shutdown::ShutdownManager;
use super::state::LifecycleState;
use super::types::InitStage;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::health::HealthReporter;
use crate::http::{HttpServer, LiveRoutes};
use crate::integration::{
    AssetServer, DatabaseInitializer, DirectoryAssets, NoDatabase, NoRoutes, RouteRegistrar,
};
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Brings the process from cold start to serving, and back down again
pub struct BootstrapController {
    pub(super) config: ServerConfig,
    pub(super) events: Arc<EventBus>,
    pub(super) state: Arc<LifecycleState>,
    pub(super) health: HealthReporter,
    pub(super) routes: LiveRoutes,
    pub(super) http: HttpServer,

    // Collaborators
    pub(super) database: Arc<dyn DatabaseInitializer>,
    pub(super) registrar: Arc<dyn RouteRegistrar>,
    pub(super) assets: Arc<dyn AssetServer>,

    // Lifecycle management
    pub(super) shutdown: Arc<ShutdownManager>,
    pub(super) faults: Arc<FaultHandler>,
    pub(super) init_started: AtomicBool,
    pub(super) init_stage: Mutex<InitStage>,
}

impl BootstrapController {
    pub fn builder(config: ServerConfig) -> BootstrapControllerBuilder {
        BootstrapControllerBuilder::new(config)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> Arc<LifecycleState> {
        Arc::clone(&self.state)
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn health(&self) -> &HealthReporter {
        &self.health
    }

    pub fn shutdown_manager(&self) -> Arc<ShutdownManager> {
        Arc::clone(&self.shutdown)
    }

    pub fn fault_handler(&self) -> Arc<FaultHandler> {
        Arc::clone(&self.faults)
    }

    /// Router of the primary listener, for in-process requests
    pub fn router(&self) -> axum::Router {
        self.http.router()
    }
}

/// Wires collaborators into a controller; unset ones get inert defaults
pub struct BootstrapControllerBuilder {
    config: ServerConfig,
    events: Option<Arc<EventBus>>,
    database: Option<Arc<dyn DatabaseInitializer>>,
    registrar: Option<Arc<dyn RouteRegistrar>>,
    assets: Option<Arc<dyn AssetServer>>,
}

impl BootstrapControllerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            events: None,
            database: None,
            registrar: None,
            assets: None,
        }
    }

    /// Set the event bus
    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the database initializer
    pub fn database(mut self, database: Arc<dyn DatabaseInitializer>) -> Self {
        self.database = Some(database);
        self
    }

    /// Set the business route registrar
    pub fn routes(mut self, registrar: Arc<dyn RouteRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Set the client asset server
    pub fn assets(mut self, assets: Arc<dyn AssetServer>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn build(self) -> Result<BootstrapController> {
        self.config.validate()?;

        let events = self.events.unwrap_or_default();
        let state = Arc::new(LifecycleState::new(Arc::clone(&events)));
        let health = HealthReporter::new(Arc::clone(&state), self.config.environment.clone());
        let routes = LiveRoutes::new();
        let http = HttpServer::new(health.clone(), routes.clone());

        let shutdown = Arc::new(ShutdownManager::new(
            Arc::clone(&state),
            Arc::clone(&events),
            &self.config.lifecycle,
        ));
        let faults = Arc::new(FaultHandler::new(
            self.config.run_mode(),
            Arc::clone(&shutdown),
            Arc::clone(&events),
        ));

        let assets = self
            .assets
            .unwrap_or_else(|| Arc::new(DirectoryAssets::new(&self.config.assets)));

        Ok(BootstrapController {
            events,
            state,
            health,
            routes,
            http,
            database: self.database.unwrap_or_else(|| Arc::new(NoDatabase)),
            registrar: self.registrar.unwrap_or_else(|| Arc::new(NoRoutes)),
            assets,
            shutdown,
            faults,
            init_started: AtomicBool::new(false),
            init_stage: Mutex::new(InitStage::Database),
            config: self.config,
        })
    }
}
