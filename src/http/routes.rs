use crate::error::{Result, ServerError};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::RwLock;
use std::sync::Arc;
use tower::ServiceExt;
use tracing::debug;

/// Business route table that can be filled in while the listener is live.
///
/// Until a router is installed every request answers 404.
#[derive(Clone, Default)]
pub struct LiveRoutes {
    table: Arc<RwLock<Option<Router>>>,
}

impl LiveRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the fully assembled router. Only one install per process.
    pub fn install(&self, router: Router) -> Result<()> {
        let mut table = self.table.write();
        if table.is_some() {
            return Err(ServerError::system("Business routes already installed"));
        }
        *table = Some(router);
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.table.read().is_some()
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        // Clone out of the lock so no guard is held across the await
        let router = self.table.read().clone();

        match router {
            Some(router) => match router.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            },
            None => {
                debug!("No route for {} {}", request.method(), request.uri().path());
                StatusCode::NOT_FOUND.into_response()
            }
        }
    }
}
