use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Process lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Listening,
    Initializing,
    Ready,
    Degraded,
    ShuttingDown,
    Terminated,
}

impl Phase {
    /// Whether `self -> next` is a forward edge of the lifecycle graph
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Listening, Initializing)
                | (Listening, ShuttingDown)
                | (Initializing, Ready)
                | (Initializing, Degraded)
                | (Initializing, ShuttingDown)
                | (Ready, ShuttingDown)
                | (Degraded, ShuttingDown)
                | (ShuttingDown, Terminated)
        )
    }

    pub fn is_shutting_down(self) -> bool {
        matches!(self, Phase::ShuttingDown | Phase::Terminated)
    }
}

/// What started a shutdown sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownSignal {
    Sigterm,
    Sigint,
    UncaughtException,
    UnhandledRejection,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownSignal::Sigterm => "SIGTERM",
            ShutdownSignal::Sigint => "SIGINT",
            ShutdownSignal::UncaughtException => "uncaughtException",
            ShutdownSignal::UnhandledRejection => "unhandledRejection",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownRequest {
    pub signal: ShutdownSignal,
    pub received_at: SystemTime,
}

impl ShutdownRequest {
    pub fn new(signal: ShutdownSignal) -> Self {
        Self {
            signal,
            received_at: SystemTime::now(),
        }
    }
}

/// Steps of heavy initialization, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStage {
    Database,
    Routes,
    AttachedAssets,
    Assets,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStage::Database => "database",
            InitStage::Routes => "routes",
            InitStage::AttachedAssets => "attached_assets",
            InitStage::Assets => "assets",
        };
        f.write_str(name)
    }
}

/// Recorded when heavy initialization ends in `Degraded`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializationError {
    pub stage: InitStage,
    pub message: String,
}

/// How the process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Listener closed inside the grace window
    Graceful,
    /// Hard shutdown ceiling reached first
    Forced,
    /// No listener could be opened at all
    StartupFailed,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Graceful => 0,
            ExitStatus::Forced | ExitStatus::StartupFailed => 1,
        }
    }
}
