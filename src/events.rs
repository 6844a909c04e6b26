use crate::app::{InitStage, Phase, ShutdownSignal};
use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted while the process moves through its lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// The process-wide phase advanced
    PhaseChanged {
        from: Phase,
        to: Phase,
        timestamp: SystemTime,
    },
    /// A heavy initialization step finished
    StageCompleted { stage: InitStage },
    /// Heavy initialization gave up; the process keeps serving health only
    InitializationFailed { stage: InitStage, error: String },
    /// The primary bind failed and a last-resort listener is up
    FallbackListening { address: String, attempt: u32 },
    /// A shutdown sequence was started
    ShutdownRequested {
        signal: ShutdownSignal,
        timestamp: SystemTime,
    },
    /// A fault escaped every handler
    FaultReported { kind: String, message: String },
}

impl LifecycleEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            LifecycleEvent::PhaseChanged { from, to, .. } => {
                format!("Phase changed: {:?} -> {:?}", from, to)
            }
            LifecycleEvent::StageCompleted { stage } => {
                format!("Initialization stage {} complete", stage)
            }
            LifecycleEvent::InitializationFailed { stage, error } => {
                format!("Initialization failed at {}: {}", stage, error)
            }
            LifecycleEvent::FallbackListening { address, attempt } => {
                format!("Fallback listener on {} (attempt {})", address, attempt)
            }
            LifecycleEvent::ShutdownRequested { signal, .. } => {
                format!("Shutdown requested: {}", signal)
            }
            LifecycleEvent::FaultReported { kind, message } => {
                format!("{}: {}", kind, message)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::PhaseChanged { .. } => "phase_changed",
            LifecycleEvent::StageCompleted { .. } => "stage_completed",
            LifecycleEvent::InitializationFailed { .. } => "initialization_failed",
            LifecycleEvent::FallbackListening { .. } => "fallback_listening",
            LifecycleEvent::ShutdownRequested { .. } => "shutdown_requested",
            LifecycleEvent::FaultReported { .. } => "fault_reported",
        }
    }
}

/// Lifecycle event bus backed by a broadcast channel.
///
/// Call sites log the events they publish; the bus only traces delivery.
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Fails only when nobody is subscribed; lifecycle code ignores that.
    pub fn publish(&self, event: LifecycleEvent) -> Result<usize, EventBusError> {
        debug!("Publishing event: {}", event.description());

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
