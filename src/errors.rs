use thiserror::Error;

/// Failures raised while handling a `tools/call`, mapped onto JSON-RPC errors by
/// [`crate::mcp::rpc::app_error_to_json_rpc`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("unknown tool: {name}")]
    ToolNotFound { name: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
