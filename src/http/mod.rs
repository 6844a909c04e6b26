mod handlers;
mod logging;
mod routes;
mod server;

pub use logging::{format_api_log_line, log_api_requests};
pub use routes::LiveRoutes;
pub use server::{HttpServer, ListenerHandle, ListenerKind, ServerState};
