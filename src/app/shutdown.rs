use super::state::LifecycleState;
use super::types::{ExitStatus, Phase, ShutdownRequest, ShutdownSignal};
use crate::config::LifecycleConfig;
use crate::error::{Result, ServerError};
use crate::events::{EventBus, LifecycleEvent};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Bounded-time shutdown.
///
/// `Running --request--> Closing --listener closed--> grace delay --> exit 0`,
/// with a hard ceiling racing the whole sequence that exits 1.
pub struct ShutdownManager {
    state: Arc<LifecycleState>,
    events: Arc<EventBus>,
    closing: CancellationToken,
    timers_armed: AtomicBool,
    grace_period: Duration,
    hard_timeout: Duration,
}

impl ShutdownManager {
    pub fn new(state: Arc<LifecycleState>, events: Arc<EventBus>, config: &LifecycleConfig) -> Self {
        Self::with_timeouts(state, events, config.grace_period(), config.shutdown_timeout())
    }

    pub fn with_timeouts(
        state: Arc<LifecycleState>,
        events: Arc<EventBus>,
        grace_period: Duration,
        hard_timeout: Duration,
    ) -> Self {
        Self {
            state,
            events,
            closing: CancellationToken::new(),
            timers_armed: AtomicBool::new(false),
            grace_period,
            hard_timeout,
        }
    }

    /// Start shutting down. Only the first request has any effect.
    pub fn request(&self, signal: ShutdownSignal) -> bool {
        let request = ShutdownRequest::new(signal);
        let received_at = request.received_at;

        if !self.state.begin_shutdown(request) {
            info!("Received {} while already shutting down, ignoring", signal);
            return false;
        }

        info!("Received {}, starting graceful shutdown...", signal);
        let _ = self.events.publish(LifecycleEvent::ShutdownRequested {
            signal,
            timestamp: received_at,
        });

        // Listeners stop accepting as soon as this fires
        self.closing.cancel();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Resolves once a shutdown was requested
    pub async fn requested(&self) {
        self.closing.cancelled().await
    }

    /// Token handed to listeners for graceful close
    pub fn closing_token(&self) -> CancellationToken {
        self.closing.clone()
    }

    /// Wait for a shutdown request, then race listener close + grace delay
    /// against the hard ceiling. Timers are armed at most once.
    pub async fn wait_for_exit<F>(&self, closed: F) -> Result<ExitStatus>
    where
        F: Future<Output = Result<()>>,
    {
        self.requested().await;

        if self.timers_armed.swap(true, Ordering::SeqCst) {
            return Err(ServerError::system("Shutdown timers already armed"));
        }

        let graceful = async {
            if let Err(e) = closed.await {
                error!("HTTP server closed with error: {}", e);
            } else {
                info!("HTTP server closed gracefully");
            }
            sleep(self.grace_period).await;
        };

        let status = tokio::select! {
            _ = graceful => ExitStatus::Graceful,
            _ = sleep(self.hard_timeout) => {
                warn!("Forcing shutdown after timeout");
                ExitStatus::Forced
            }
        };

        if let Err(e) = self.state.advance(Phase::Terminated) {
            error!("Failed to mark process terminated: {}", e);
        }

        Ok(status)
    }
}
