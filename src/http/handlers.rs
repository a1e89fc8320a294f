//! Axum HTTP handlers for the web server
//!
//! Provides the event stream and message endpoints of the Model Context Protocol,
//! and general metadata endpoints.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{sse::Sse, IntoResponse, Response},
    Json,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::mcp::rpc::{decode, json_rpc_error, ErrorCode, Payload};
use crate::mcp::server::handle_json_rpc_value;
use crate::mcp::stream::spawn_session_stream;
use crate::session::SessionId;
use crate::AppState;

pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub server: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub sse_endpoint: &'static str,
    pub messages_endpoint: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub session_id: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        server: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.sessions.len(),
    })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        sse_endpoint: "/sse",
        messages_endpoint: "/messages",
    })
}

pub async fn sse_endpoint(State(state): State<AppState>) -> Response {
    let (session_id, frames) =
        spawn_session_stream(Arc::clone(&state.sessions), state.stream.clone());
    let events =
        ReceiverStream::new(frames).map(|frame| Ok::<_, Infallible>(frame.into_event()));

    let mut response = Sse::new(events).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    if let Ok(value) = HeaderValue::from_str(session_id.as_str()) {
        headers.insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
    }

    response
}

pub async fn messages_endpoint(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = session_from_request(&headers, &query);

    let payload = match decode(&body) {
        Ok(payload) => payload,
        Err(err) => return (StatusCode::OK, Json(err.to_response())).into_response(),
    };

    match payload {
        Payload::Batch(batch) => {
            if batch.is_empty() {
                return (
                    StatusCode::OK,
                    Json(vec![json_rpc_error(
                        None,
                        ErrorCode::InvalidRequest,
                        ErrorCode::InvalidRequest.message(),
                    )]),
                )
                    .into_response();
            }

            // Items run concurrently; `join_all` keeps their original order.
            let responses = join_all(
                batch
                    .into_iter()
                    .map(|item| handle_json_rpc_value(&state, item, session.as_ref())),
            )
            .await
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

            if responses.is_empty() {
                return StatusCode::ACCEPTED.into_response();
            }

            (StatusCode::OK, Json(Value::Array(responses))).into_response()
        }
        Payload::Single(item) => match handle_json_rpc_value(&state, item, session.as_ref()).await
        {
            Some(response) => (StatusCode::OK, Json(response)).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        },
    }
}

fn session_from_request(headers: &HeaderMap, query: &MessagesQuery) -> Option<SessionId> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .or(query.session_id.as_deref())
        .and_then(SessionId::parse)
}
