use crate::{
    app::within_request,
    error::{Result, ServerError},
    health::HealthReporter,
};
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::any::Any;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::info;

use super::handlers::{dispatch_handler, health_handler, root_handler};
use super::logging::log_api_requests;
use super::routes::LiveRoutes;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) health: HealthReporter,
    pub(crate) routes: LiveRoutes,
}

/// Which router a listener serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    /// Health endpoints plus the live business route table
    Primary,
    /// Health endpoints only
    Fallback,
}

/// A bound listener and the task serving it
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    kind: ListenerKind,
    task: JoinHandle<Result<()>>,
    finished: bool,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// Resolves once the server stopped accepting and every connection drained.
    ///
    /// Cancel-safe: dropping the future keeps the server task alive.
    pub async fn closed(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }

        let outcome = (&mut self.task).await;
        self.finished = true;

        match outcome {
            Ok(result) => result,
            Err(e) => Err(ServerError::system(format!("HTTP server task failed: {}", e))),
        }
    }
}

async fn request_scope(request: Request, next: Next) -> Response {
    within_request(next.run(request)).await
}

/// 500 `{message}` for a handler that panicked
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Internal Server Error".to_string()
    };

    let body = serde_json::json!({ "message": message });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// HTTP front of the process
pub struct HttpServer {
    state: ServerState,
}

impl HttpServer {
    pub fn new(health: HealthReporter, routes: LiveRoutes) -> Self {
        Self {
            state: ServerState { health, routes },
        }
    }

    /// Router for the primary listener
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .fallback(dispatch_handler)
            .layer(middleware::from_fn(log_api_requests))
            .layer(middleware::from_fn(request_scope))
            .layer(CatchPanicLayer::custom(panic_response))
            .with_state(self.state.clone())
    }

    /// Router for the last-resort listener: no business routes at all
    pub fn fallback_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .with_state(self.state.clone())
    }

    /// Bind `addr` and start serving until `shutdown` is cancelled
    pub async fn start(
        &self,
        addr: SocketAddr,
        kind: ListenerKind,
        shutdown: CancellationToken,
    ) -> Result<ListenerHandle> {
        let app = match kind {
            ListenerKind::Primary => self.router(),
            ListenerKind::Fallback => self.fallback_router(),
        };

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                address: addr.to_string(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;

        info!("Server is running on http://{}", local_addr);

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .map_err(|e| ServerError::system(format!("Server error: {}", e)))
        });

        Ok(ListenerHandle {
            local_addr,
            kind,
            task,
            finished: false,
        })
    }
}
