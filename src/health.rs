use crate::app::{LifecycleState, Phase};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since process start
    pub uptime: f64,
    pub environment: String,
    pub initialized: bool,
    pub phase: Phase,
}

/// Computes health from the lifecycle state on every call; nothing is cached.
#[derive(Clone)]
pub struct HealthReporter {
    state: Arc<LifecycleState>,
    environment: String,
}

impl HealthReporter {
    pub fn new(state: Arc<LifecycleState>, environment: impl Into<String>) -> Self {
        Self {
            state,
            environment: environment.into(),
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let lifecycle = self.state.snapshot();

        // Probes match on "healthy"; `phase` carries the detail
        HealthSnapshot {
            status: "healthy",
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            uptime: lifecycle.uptime.as_secs_f64(),
            environment: self.environment.clone(),
            initialized: lifecycle.initialized,
            phase: lifecycle.phase,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.state.uptime().as_secs()
    }
}
