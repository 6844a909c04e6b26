use super::types::{InitializationError, Phase, ShutdownRequest};
use crate::error::{Result, ServerError};
use crate::events::{EventBus, LifecycleEvent};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;

#[derive(Debug)]
struct Inner {
    phase: Phase,
    initialized: bool,
    initialization_error: Option<InitializationError>,
    shutdown: Option<ShutdownRequest>,
}

/// Consistent view of the lifecycle taken under one lock acquisition
#[derive(Debug, Clone)]
pub struct LifecycleSnapshot {
    pub phase: Phase,
    pub initialized: bool,
    pub started_at: DateTime<Utc>,
    pub uptime: Duration,
    pub initialization_error: Option<InitializationError>,
}

/// Process-wide lifecycle state.
///
/// Phases only move forward along the lifecycle graph; every successful
/// transition is published on the event bus.
pub struct LifecycleState {
    inner: RwLock<Inner>,
    started_at: DateTime<Utc>,
    started: Instant,
    events: Arc<EventBus>,
}

impl LifecycleState {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                phase: Phase::Listening,
                initialized: false,
                initialization_error: None,
                shutdown: None,
            }),
            started_at: Utc::now(),
            started: Instant::now(),
            events,
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.read().phase
    }

    /// True once `Ready` was reached; never reverts
    pub fn is_initialized(&self) -> bool {
        self.inner.read().initialized
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn initialization_error(&self) -> Option<InitializationError> {
        self.inner.read().initialization_error.clone()
    }

    pub fn shutdown_request(&self) -> Option<ShutdownRequest> {
        self.inner.read().shutdown.clone()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        let inner = self.inner.read();
        LifecycleSnapshot {
            phase: inner.phase,
            initialized: inner.initialized,
            started_at: self.started_at,
            uptime: self.started.elapsed(),
            initialization_error: inner.initialization_error.clone(),
        }
    }

    /// Advance to `next`, returning the previous phase
    pub fn advance(&self, next: Phase) -> Result<Phase> {
        let mut inner = self.inner.write();
        let previous = Self::transition(&mut inner, next)?;
        drop(inner);

        self.announce(previous, next);
        Ok(previous)
    }

    /// Move `Initializing -> Degraded` and keep the failure for later inspection
    pub fn mark_degraded(&self, error: InitializationError) -> Result<Phase> {
        let mut inner = self.inner.write();
        let previous = Self::transition(&mut inner, Phase::Degraded)?;
        inner.initialization_error = Some(error);
        drop(inner);

        self.announce(previous, Phase::Degraded);
        Ok(previous)
    }

    /// Enter `ShuttingDown` for the first request only.
    ///
    /// Returns false when a shutdown is already in progress (or finished).
    pub fn begin_shutdown(&self, request: ShutdownRequest) -> bool {
        let mut inner = self.inner.write();
        if inner.shutdown.is_some() || inner.phase.is_shutting_down() {
            debug!(
                "Ignoring {} - shutdown already in progress",
                request.signal
            );
            return false;
        }

        let previous = match Self::transition(&mut inner, Phase::ShuttingDown) {
            Ok(previous) => previous,
            Err(_) => return false,
        };
        inner.shutdown = Some(request);
        drop(inner);

        self.announce(previous, Phase::ShuttingDown);
        true
    }

    fn transition(inner: &mut Inner, next: Phase) -> Result<Phase> {
        let previous = inner.phase;
        if !previous.can_advance_to(next) {
            return Err(ServerError::InvalidTransition {
                from: previous,
                to: next,
            });
        }

        inner.phase = next;
        if next == Phase::Ready {
            inner.initialized = true;
        }
        Ok(previous)
    }

    fn announce(&self, from: Phase, to: Phase) {
        debug!("Lifecycle phase changed: {:?} -> {:?}", from, to);
        let _ = self.events.publish(LifecycleEvent::PhaseChanged {
            from,
            to,
            timestamp: SystemTime::now(),
        });
    }
}
