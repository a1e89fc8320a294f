use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::http::handlers::MCP_SESSION_ID_HEADER;

const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global subscriber. `RUST_LOG` overrides the level; `NO_COLOR` disables ANSI.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_session = request
        .headers()
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();
    // `/sse` answers with the id it just allocated; `/messages` echoes the caller's.
    let session_id = response
        .headers()
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or(request_session)
        .unwrap_or_else(|| "-".to_string());

    // Liveness probes would drown everything else at info.
    if path == "/health" {
        debug!(status = status.as_u16(), duration_ms = elapsed_ms, "health probe");
        return response;
    }

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        session_id = %session_id,
        "request summary"
    );

    if status.is_client_error() || status.is_server_error() {
        warn!(method = %method, path = %path, status = status.as_u16(), "request rejected");
    }

    response
}
