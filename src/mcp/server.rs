//! The central Model Context Protocol dispatcher
//!
//! Decodes each inbound envelope, routes it over the closed set of recognised
//! methods, and guarantees exactly one response per request carrying an id.

use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ListToolsResult, ServerCapabilities, ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::tools::handle_tools_call;
use crate::mcp::rpc::{
    is_json_rpc_error, json_rpc_error, json_rpc_notification, json_rpc_result, parse_envelope,
    Envelope, ErrorCode,
};
use crate::{session::SessionId, AppState};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";
pub const LOGGER_NAME: &str = "rendergit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    Unknown(String),
}

impl Method {
    pub fn parse(name: &str) -> Self {
        match name {
            "initialize" => Self::Initialize,
            "ping" => Self::Ping,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::Unknown(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

/// Server identity and capabilities, shared by `initialize` and the stream handshake.
pub fn initialize_result() -> Value {
    let initialize_result = InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            ..Default::default()
        },
        protocol_version: SUPPORTED_PROTOCOL_VERSION.to_string(),
        instructions: None,
        meta: None,
    };

    serde_json::to_value(initialize_result).expect("initialize result serialization")
}

/// Pushes a `notifications/message` onto the caller's stream, if it has one.
///
/// A closed session only loses the notification; the call's own response is unaffected.
pub fn notify_session(
    state: &AppState,
    session: Option<&SessionId>,
    level: LogLevel,
    message: String,
) {
    let Some(session_id) = session else {
        return;
    };

    let notification = json_rpc_notification(
        "notifications/message",
        json!({
            "level": level.as_str(),
            "logger": LOGGER_NAME,
            "data": message,
        }),
    );

    if let Err(err) = state.sessions.enqueue(session_id, notification) {
        warn!(session_id = %session_id, error = %err, "notification dropped");
    }
}

pub async fn handle_json_rpc_value(
    state: &AppState,
    payload: Value,
    session: Option<&SessionId>,
) -> Option<Value> {
    match parse_envelope(payload) {
        Ok(Envelope::Request { id, method, params }) => {
            Some(handle_json_rpc_request(state, id, &method, params, session).await)
        }
        Ok(Envelope::Notification { method, params }) => {
            debug!(method = %method, "client notification received");
            // Executed like any request; only the reply is discarded.
            let _ = handle_json_rpc_request(state, Value::Null, &method, params, session).await;
            None
        }
        Err(err) => {
            debug!(error = %err, "rejected json-rpc envelope");
            Some(err.to_response())
        }
    }
}

pub async fn handle_json_rpc_request(
    state: &AppState,
    id: Value,
    method: &str,
    params: Option<Value>,
    session: Option<&SessionId>,
) -> Value {
    let audit_params = redact_audit_params(params.as_ref());
    let method = Method::parse(method);

    let response = match &method {
        Method::Initialize => json_rpc_result(id, initialize_result()),
        Method::Ping => json_rpc_result(id, json!({})),
        Method::ToolsList => json_rpc_result(
            id,
            serde_json::to_value(ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: state.tools.list(),
            })
            .expect("tools list result serialization"),
        ),
        Method::ToolsCall => handle_tools_call(state, id, params, session).await,
        Method::Unknown(name) => json_rpc_error(
            Some(id),
            ErrorCode::MethodNotFound,
            &format!("Unknown method: {name}"),
        ),
    };

    info!(
        method = %method.as_str(),
        params = %audit_params,
        session_id = session.map(SessionId::as_str).unwrap_or("-"),
        outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
        "mcp action audited"
    );

    response
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    ["token", "secret", "password", "credential", "authorization", "api_key"]
        .iter()
        .any(|marker| normalized.contains(marker))
}

#[cfg(test)]
mod tests {
    use rust_mcp_sdk::schema::ProtocolVersion;
    use serde_json::json;

    use super::{initialize_result, redact_audit_params, Method, SUPPORTED_PROTOCOL_VERSION};

    #[test]
    fn method_names_round_trip_through_the_closed_set() {
        for name in ["initialize", "ping", "tools/list", "tools/call"] {
            let method = Method::parse(name);
            assert!(!matches!(method, Method::Unknown(_)));
            assert_eq!(method.as_str(), name);
        }

        assert_eq!(
            Method::parse("resources/list"),
            Method::Unknown("resources/list".to_string())
        );
    }

    #[test]
    fn supported_version_matches_sdk_protocol_constant() {
        let sdk_version: String = ProtocolVersion::V2024_11_05.into();
        assert_eq!(sdk_version, SUPPORTED_PROTOCOL_VERSION);
    }

    #[test]
    fn initialize_result_advertises_tools_and_identity() {
        let result = initialize_result();

        assert_eq!(result["protocolVersion"], SUPPORTED_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(result["serverInfo"]["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "render_repo",
            "arguments": {
                "repo_url": "https://github.com/owner/repo",
                "github_token": "should-not-appear",
                "nested": [{ "Password": "should-not-appear" }]
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["name"], json!("render_repo"));
        assert_eq!(
            redacted["arguments"]["repo_url"],
            json!("https://github.com/owner/repo")
        );
        assert_eq!(redacted["arguments"]["github_token"], json!("[REDACTED]"));
        assert_eq!(
            redacted["arguments"]["nested"][0]["Password"],
            json!("[REDACTED]")
        );
        assert_eq!(redact_audit_params(None), serde_json::Value::Null);
    }
}
