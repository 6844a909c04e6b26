use crate::app::Phase;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind listener on {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Heavy initialization timed out after {seconds}s")]
    InitTimeout { seconds: u64 },

    #[error("Invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

impl ServerError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Routes registered by collaborators may bubble errors out with `?`;
/// clients get a JSON body instead of a dropped connection.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!("Error: {}", self);
        let body = serde_json::json!({ "message": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
