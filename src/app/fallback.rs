use super::BootstrapController;
use crate::error::Result;
use crate::events::LifecycleEvent;
use crate::http::{ListenerHandle, ListenerKind};
use tokio::time::sleep;
use tracing::{error, info, warn};

impl BootstrapController {
    /// Primary bind, and if that fails, a health-only listener on the
    /// fallback port so orchestration probes still see the process.
    pub async fn start_with_fallback(&self) -> Result<ListenerHandle> {
        let primary_error = match self.start().await {
            Ok(handle) => return Ok(handle),
            Err(e) => e,
        };

        error!("Server startup failed: {}", primary_error);

        let attempts = self.config.lifecycle.fallback_attempts;
        let address = self.config.fallback_address();
        let mut last_error = primary_error;

        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(self.config.lifecycle.fallback_retry_delay()).await;
            }

            if self.shutdown.is_requested() {
                warn!("Shutdown requested, abandoning fallback listener");
                break;
            }

            info!(
                "Attempting minimal startup on {} (attempt {}/{})",
                address, attempt, attempts
            );

            match self
                .http
                .start(address, ListenerKind::Fallback, self.shutdown.closing_token())
                .await
            {
                Ok(handle) => {
                    info!("Minimal fallback server listening on http://{}", handle.local_addr());
                    let _ = self.events.publish(LifecycleEvent::FallbackListening {
                        address: handle.local_addr().to_string(),
                        attempt,
                    });
                    return Ok(handle);
                }
                Err(e) => {
                    error!("Fallback listener attempt {} failed: {}", attempt, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
