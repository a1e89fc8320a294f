use std::sync::Arc;

use axum::{
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod renderer;
pub mod session;

use domain::{output::OutputLayout, tools::ToolRegistry};
use mcp::stream::StreamSettings;
use renderer::RepoRenderer;
use session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub tools: Arc<ToolRegistry>,
    pub sessions: Arc<SessionStore>,
    pub renderer: Arc<dyn RepoRenderer>,
    pub output_layout: Arc<OutputLayout>,
    pub max_file_bytes: u64,
    pub stream: StreamSettings,
}

impl AppState {
    pub fn new(
        renderer: Arc<dyn RepoRenderer>,
        output_layout: OutputLayout,
        max_file_bytes: u64,
        stream: StreamSettings,
    ) -> Self {
        Self {
            tools: Arc::new(ToolRegistry::new()),
            sessions: Arc::new(SessionStore::new()),
            renderer,
            output_layout: Arc::new(output_layout),
            max_file_bytes,
            stream,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let session_header = HeaderName::from_static(http::handlers::MCP_SESSION_ID_HEADER);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, session_header.clone()])
        .expose_headers([session_header]);

    Router::new()
        .route("/sse", get(http::handlers::sse_endpoint))
        .route("/messages", post(http::handlers::messages_endpoint))
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
