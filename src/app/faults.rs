use super::shutdown::ShutdownManager;
use super::types::ShutdownSignal;
use crate::config::RunMode;
use crate::error::Result;
use crate::events::{EventBus, LifecycleEvent};
use std::future::Future;
use std::panic;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

tokio::task_local! {
    static HANDLING_REQUEST: ();
}

/// Run `future` as part of answering an HTTP request.
///
/// A panic inside it is answered with a 500 by the HTTP layer and never
/// reaches the fault policy.
pub(crate) async fn within_request<F: Future>(future: F) -> F::Output {
    HANDLING_REQUEST.scope((), future).await
}

/// The fault a panic on the current task amounts to, if any
pub(crate) fn fault_for_panic(message: String) -> Option<Fault> {
    if HANDLING_REQUEST.try_with(|_| ()).is_ok() {
        return None;
    }
    Some(Fault::uncaught(message))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A panic anywhere in the process
    Uncaught,
    /// A detached task finished with an error nobody awaited
    UnhandledRejection,
}

#[derive(Debug, Clone)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn uncaught(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Uncaught,
            message: message.into(),
        }
    }

    pub fn unhandled_rejection(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::UnhandledRejection,
            message: message.into(),
        }
    }
}

/// Process-level fault handling.
///
/// Uncaught faults always shut down gracefully. Unhandled rejections are
/// logged always and shut down only in development.
pub struct FaultHandler {
    mode: RunMode,
    shutdown: Arc<ShutdownManager>,
    events: Arc<EventBus>,
    sender: mpsc::UnboundedSender<Fault>,
    receiver: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Fault>>>,
}

impl FaultHandler {
    pub fn new(mode: RunMode, shutdown: Arc<ShutdownManager>, events: Arc<EventBus>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            mode,
            shutdown,
            events,
            sender,
            receiver: parking_lot::Mutex::new(Some(receiver)),
        }
    }

    /// Route panics into the fault channel. Process-global, so only the
    /// binary installs it.
    pub fn install_panic_hook(&self) {
        let sender = self.sender.clone();
        panic::set_hook(Box::new(move |info| match fault_for_panic(info.to_string()) {
            Some(fault) => {
                let _ = sender.send(fault);
            }
            None => error!("Request handler panicked: {}", info),
        }));
    }

    /// Spawn a task whose error, if any, is reported as an unhandled rejection
    pub fn spawn_detached<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                let _ = sender.send(Fault::unhandled_rejection(format!("{}: {}", name, e)));
            }
        })
    }

    /// Spawn the dispatch loop. Only the first call starts one.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut receiver = self.receiver.lock().take()?;
        let handler = Arc::clone(self);

        Some(tokio::spawn(async move {
            while let Some(fault) = receiver.recv().await {
                handler.handle(fault);
            }
        }))
    }

    /// Apply the fault policy; returns whether a shutdown was started
    pub fn handle(&self, fault: Fault) -> bool {
        let _ = self.events.publish(LifecycleEvent::FaultReported {
            kind: format!("{:?}", fault.kind),
            message: fault.message.clone(),
        });

        match fault.kind {
            FaultKind::Uncaught => {
                error!("Uncaught Exception: {}", fault.message);
                self.shutdown.request(ShutdownSignal::UncaughtException)
            }
            FaultKind::UnhandledRejection => {
                error!("Unhandled Rejection, reason: {}", fault.message);
                if self.mode.is_development() {
                    self.shutdown.request(ShutdownSignal::UnhandledRejection)
                } else {
                    warn!("Keeping production instance alive after unhandled rejection");
                    false
                }
            }
        }
    }
}
