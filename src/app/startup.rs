use super::types::{InitStage, InitializationError, Phase};
use super::BootstrapController;
use crate::error::{Result, ServerError};
use crate::events::LifecycleEvent;
use crate::http::{ListenerHandle, ListenerKind};
use crate::integration::attach_assets;
use axum::Router;
use std::sync::atomic::Ordering;
use tokio::time::timeout;
use tracing::{error, info, warn};

impl BootstrapController {
    /// Bind the primary listener before touching any dependency.
    ///
    /// `/` and `/health` answer as soon as this returns.
    pub async fn start(&self) -> Result<ListenerHandle> {
        info!("Starting server...");

        let handle = self
            .http
            .start(
                self.config.bind_address(),
                ListenerKind::Primary,
                self.shutdown.closing_token(),
            )
            .await?;

        info!("Environment: {}", self.config.environment);
        info!("Basic server ready - starting heavy initialization...");
        Ok(handle)
    }

    /// Deferred dependency setup. Runs once, after the listener is bound.
    ///
    /// Failures never escape: the process stays up in `Degraded` and keeps
    /// answering health probes. The returned error only covers misuse
    /// (second call, or shutdown already under way).
    pub async fn run_heavy_init(&self) -> Result<Phase> {
        if self.init_started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::system("Heavy initialization already started"));
        }

        self.state.advance(Phase::Initializing)?;

        let outcome = match self.config.lifecycle.init_timeout() {
            Some(limit) => match timeout(limit, self.initialize_dependencies()).await {
                Ok(result) => result,
                Err(_) => Err(InitializationError {
                    stage: self.current_stage(),
                    message: ServerError::InitTimeout {
                        seconds: limit.as_secs(),
                    }
                    .to_string(),
                }),
            },
            None => self.initialize_dependencies().await,
        };

        match outcome {
            Ok(router) => self.finish_ready(router),
            Err(failure) => self.finish_degraded(failure),
        }
    }

    async fn initialize_dependencies(&self) -> std::result::Result<Router, InitializationError> {
        self.enter_stage(InitStage::Database);
        self.database
            .initialize()
            .await
            .map_err(|e| failed(InitStage::Database, e))?;
        self.complete_stage(InitStage::Database);

        self.enter_stage(InitStage::Routes);
        let router = self
            .registrar
            .register(Router::new())
            .await
            .map_err(|e| failed(InitStage::Routes, e))?;
        self.complete_stage(InitStage::Routes);

        self.enter_stage(InitStage::AttachedAssets);
        let router = attach_assets(router, &self.config.assets.attached_dir);
        self.complete_stage(InitStage::AttachedAssets);

        // Selected once per process, never re-evaluated
        self.enter_stage(InitStage::Assets);
        let router = if self.config.run_mode().is_development() {
            let router = self
                .assets
                .setup_dev(router)
                .await
                .map_err(|e| failed(InitStage::Assets, e))?;
            info!("Development asset serving setup complete");
            router
        } else {
            let router = self
                .assets
                .serve_static(router)
                .map_err(|e| failed(InitStage::Assets, e))?;
            info!("Static file serving configured for production");
            router
        };
        self.complete_stage(InitStage::Assets);

        Ok(router)
    }

    fn finish_ready(&self, router: Router) -> Result<Phase> {
        if self.state.phase().is_shutting_down() {
            warn!("Heavy initialization finished after shutdown began, not installing routes");
            return Ok(self.state.phase());
        }

        self.routes.install(router)?;

        match self.state.advance(Phase::Ready) {
            Ok(_) => {
                info!("Server is fully ready to handle requests");
                Ok(Phase::Ready)
            }
            Err(e) => {
                warn!("Could not mark server ready: {}", e);
                Ok(self.state.phase())
            }
        }
    }

    fn finish_degraded(&self, failure: InitializationError) -> Result<Phase> {
        error!(
            "Heavy initialization failed at {}: {}",
            failure.stage, failure.message
        );

        let _ = self.events.publish(LifecycleEvent::InitializationFailed {
            stage: failure.stage,
            error: failure.message.clone(),
        });

        if self.config.run_mode().is_development() {
            info!("Continuing with minimal development server...");
        } else {
            info!("Continuing with minimal functionality for production deployment...");
        }

        match self.state.mark_degraded(failure) {
            Ok(_) => Ok(Phase::Degraded),
            Err(e) => {
                warn!("Could not mark server degraded: {}", e);
                Ok(self.state.phase())
            }
        }
    }

    fn enter_stage(&self, stage: InitStage) {
        *self.init_stage.lock() = stage;
    }

    fn current_stage(&self) -> InitStage {
        *self.init_stage.lock()
    }

    fn complete_stage(&self, stage: InitStage) {
        info!("{} initialization complete", stage);
        let _ = self.events.publish(LifecycleEvent::StageCompleted { stage });
    }
}

fn failed(stage: InitStage, error: ServerError) -> InitializationError {
    InitializationError {
        stage,
        message: error.to_string(),
    }
}
