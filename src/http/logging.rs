use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;
use tracing::{error, info};

const MAX_LOG_LINE_CHARS: usize = 80;
const MAX_CAPTURED_BODY_BYTES: u64 = 64 * 1024;

/// Logs one line per `/api` request, including the JSON body when there is one
pub async fn log_api_requests(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !path.starts_with("/api") {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_millis();
    let status = response.status();

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    let body_len = response.body().size_hint().exact();
    let capturable = body_len.is_some_and(|len| len <= MAX_CAPTURED_BODY_BYTES);

    if !is_json || !capturable {
        info!("{}", format_api_log_line(&method, &path, status, elapsed_ms, None));
        return response;
    }

    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, MAX_CAPTURED_BODY_BYTES as usize).await {
        Ok(bytes) => {
            let captured = String::from_utf8_lossy(&bytes);
            info!(
                "{}",
                format_api_log_line(&method, &path, status, elapsed_ms, Some(&captured))
            );
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(e) => {
            error!("Failed to buffer response body for {} {}: {}", method, path, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /api/x 200 in 3ms :: {...}`, cut to 80 characters
pub fn format_api_log_line(
    method: &Method,
    path: &str,
    status: StatusCode,
    elapsed_ms: u128,
    json_body: Option<&str>,
) -> String {
    let mut line = format!("{} {} {} in {}ms", method, path, status.as_u16(), elapsed_ms);
    if let Some(body) = json_body {
        line.push_str(" :: ");
        line.push_str(body);
    }

    if line.chars().count() > MAX_LOG_LINE_CHARS {
        let mut truncated: String = line.chars().take(MAX_LOG_LINE_CHARS - 1).collect();
        truncated.push('…');
        truncated
    } else {
        line
    }
}
