use super::faults::Fault;
use super::types::{ExitStatus, ShutdownSignal};
use super::BootstrapController;
use crate::error::Result;
use crate::http::ListenerKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};

impl BootstrapController {
    /// Run the process lifecycle to completion and report how it ended
    pub async fn run(self: Arc<Self>) -> Result<ExitStatus> {
        self.faults.start();
        self.setup_signal_handlers();

        let mut listener = match self.start_with_fallback().await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to start server: {}", e);
                return Ok(ExitStatus::StartupFailed);
            }
        };

        // The fallback listener never runs heavy initialization
        if listener.kind() == ListenerKind::Primary {
            let controller = Arc::clone(&self);
            self.faults.spawn_detached("heavy_initialization", async move {
                controller.run_heavy_init().await.map(|_| ())
            });
        }

        if let Some(period) = self.config.lifecycle.health_log_interval() {
            self.spawn_health_log(period);
        }

        info!(
            "Server startup sequence completed successfully (process started {})",
            self.state.snapshot().started_at.to_rfc3339()
        );

        tokio::select! {
            _ = self.shutdown.requested() => {}
            result = listener.closed() => {
                let message = match result {
                    Ok(()) => "HTTP listener stopped unexpectedly".to_string(),
                    Err(e) => e.to_string(),
                };
                self.faults.handle(Fault::uncaught(message));
            }
        }

        let status = self.shutdown.wait_for_exit(listener.closed()).await?;
        info!("Shutdown finished with exit code {}", status.code());
        Ok(status)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self) {
        // Handle SIGTERM (orchestrator stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown = Arc::clone(&self.shutdown);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };

                while sigterm.recv().await.is_some() {
                    shutdown.request(ShutdownSignal::Sigterm);
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            while signal::ctrl_c().await.is_ok() {
                shutdown.request(ShutdownSignal::Sigint);
            }
        });
    }

    /// Periodic uptime line, stopped by shutdown
    pub(super) fn spawn_health_log(&self, period: Duration) -> JoinHandle<()> {
        let health = self.health.clone();
        let closing = self.shutdown.closing_token();

        self.faults.spawn_detached("health_log", async move {
            let mut ticker = interval(period);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = closing.cancelled() => break,
                    _ = ticker.tick() => {
                        info!("Server health check - uptime: {}s", health.uptime_secs());
                    }
                }
            }
            Ok(())
        })
    }
}
