//! JSON-RPC envelope decoding and response encoding
//!
//! Decoding never panics: malformed bytes become [`DecodeError::Parse`] and
//! structurally invalid envelopes become [`DecodeError::InvalidRequest`], both of
//! which render to a well-formed error response.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::errors::AppError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Fixed protocol error codes. Never renumber these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// Top-level body of a call-endpoint request.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Single(Value),
    Batch(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid request")]
    InvalidRequest { id: Option<Value> },
    #[error("request has no method")]
    MissingMethod { id: Option<Value> },
}

impl DecodeError {
    pub fn to_response(&self) -> Value {
        match self {
            Self::Parse(_) => {
                json_rpc_error(None, ErrorCode::ParseError, ErrorCode::ParseError.message())
            }
            Self::InvalidRequest { id } => json_rpc_error(
                id.clone(),
                ErrorCode::InvalidRequest,
                ErrorCode::InvalidRequest.message(),
            ),
            Self::MissingMethod { id } => json_rpc_error(
                id.clone(),
                ErrorCode::MethodNotFound,
                ErrorCode::MethodNotFound.message(),
            ),
        }
    }
}

pub fn decode(raw: &[u8]) -> Result<Payload, DecodeError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|err| DecodeError::Parse(err.to_string()))?;

    Ok(match value {
        Value::Array(items) => Payload::Batch(items),
        other => Payload::Single(other),
    })
}

pub fn parse_envelope(value: Value) -> Result<Envelope, DecodeError> {
    let Value::Object(mut object) = value else {
        return Err(DecodeError::InvalidRequest { id: None });
    };

    let id = object.remove("id");
    if let Some(id) = id.as_ref() {
        if !(id.is_string() || id.is_i64() || id.is_u64() || id.is_null()) {
            return Err(DecodeError::InvalidRequest { id: None });
        }
    }

    let invalid = || DecodeError::InvalidRequest { id: id.clone() };

    // An absent version tag is tolerated; a wrong one is not.
    if let Some(version) = object.get("jsonrpc") {
        if version.as_str() != Some(JSONRPC_VERSION) {
            return Err(invalid());
        }
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.trim().is_empty() => method,
        // Responses sent back by the client are not requests at all.
        None if object.contains_key("result") || object.contains_key("error") => {
            return Err(invalid())
        }
        None | Some(Value::Null) | Some(Value::String(_)) => {
            return Err(DecodeError::MissingMethod { id: id.clone() })
        }
        Some(_) => return Err(invalid()),
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => None,
        Some(params @ (Value::Object(_) | Value::Array(_))) => Some(params),
        Some(_) => return Err(invalid()),
    };

    Ok(match id {
        Some(id) => Envelope::Request { id, method, params },
        None => Envelope::Notification { method, params },
    })
}

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn app_error_to_json_rpc(id: Value, err: AppError) -> Value {
    match err {
        AppError::BadRequest { code, message } => json_rpc_error_with_data(
            Some(id),
            ErrorCode::InvalidParams,
            &message,
            Some(json!({
                "code": code,
                "message": message,
                "details": {}
            })),
        ),
        AppError::ToolNotFound { name } => json_rpc_error_with_data(
            Some(id),
            ErrorCode::MethodNotFound,
            &format!("Unknown tool: {name}"),
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": { "name": name }
            })),
        ),
        AppError::Internal { message } => {
            tracing::error!(error = %message, "tool invocation failed");
            json_rpc_error(
                Some(id),
                ErrorCode::InternalError,
                &format!("Internal error: {message}"),
            )
        }
    }
}

pub fn json_rpc_error(id: Option<Value>, code: ErrorCode, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: ErrorCode,
    message: &str,
    data: Option<Value>,
) -> Value {
    let mut error = Map::new();
    error.insert("code".to_string(), json!(code.code()));
    error.insert("message".to_string(), json!(message));
    if let Some(data) = data {
        error.insert("data".to_string(), data);
    }

    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.unwrap_or(Value::Null),
        "error": error
    })
}

pub fn json_rpc_result(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result
    })
}

pub fn json_rpc_notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params
    })
}
