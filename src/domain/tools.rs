//! Tool registry and the `tools/call` execution path
//!
//! Provides `render_repo` and `render_repo_to_file`, both delegating the actual
//! rendering to the injected `RepoRenderer`.

use rust_mcp_sdk::{
    macros,
    schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::domain::output::write_rendered;
use crate::mcp::rpc::{app_error_to_json_rpc, json_rpc_result};
use crate::mcp::server::{notify_session, LogLevel};
use crate::{errors::AppError, session::SessionId, AppState};

#[macros::mcp_tool(
    name = "render_repo",
    description = "Renders a Git repository into a single HTML file optimized for LLM context and returns the HTML content."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct RenderRepoTool {
    /// The URL of the Git repository to render.
    pub repo_url: String,
}

#[macros::mcp_tool(
    name = "render_repo_to_file",
    description = "Renders a Git repository into a single HTML file and saves it to local storage for future reference."
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct RenderRepoToFileTool {
    /// The URL of the Git repository to render.
    pub repo_url: String,
    /// Optional custom output path. If not provided, will auto-generate based on repo name.
    pub output_path: Option<String>,
    /// Project storage location, e.g. 'docker' or 'backblaze'.
    pub project_type: Option<String>,
    /// Optional subdirectory within the project type.
    pub project_subpath: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    RenderRepo,
    RenderRepoToFile,
}

#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub kind: ToolKind,
    pub definition: Tool,
    required: Vec<String>,
}

impl RegisteredTool {
    fn new(kind: ToolKind, definition: Tool) -> Self {
        let schema = serde_json::to_value(&definition).expect("tool definition serialization");
        let required = schema["inputSchema"]["required"]
            .as_array()
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            kind,
            definition,
            required,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    /// First required argument that is absent, null or a blank string.
    pub fn missing_required<'a>(&'a self, arguments: &Map<String, Value>) -> Option<&'a str> {
        self.required
            .iter()
            .find(|field| match arguments.get(field.as_str()) {
                None | Some(Value::Null) => true,
                Some(Value::String(value)) => value.trim().is_empty(),
                Some(_) => false,
            })
            .map(String::as_str)
    }
}

/// Immutable table of invocable tools, in the order they are advertised.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: vec![
                RegisteredTool::new(ToolKind::RenderRepo, RenderRepoTool::tool()),
                RegisteredTool::new(ToolKind::RenderRepoToFile, RenderRepoToFileTool::tool()),
            ],
        }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|tool| tool.definition.clone())
            .collect()
    }

    pub fn resolve(&self, name: &str) -> Result<&RegisteredTool, AppError> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| AppError::tool_not_found(name))
    }
}

pub async fn handle_tools_call(
    state: &AppState,
    id: Value,
    params: Option<Value>,
    session: Option<&SessionId>,
) -> Value {
    let Some(raw_params) = params else {
        return app_error_to_json_rpc(
            id,
            AppError::bad_request("missing_params", "tools/call requires params"),
        );
    };

    if raw_params.get("name").and_then(Value::as_str).is_none() {
        return app_error_to_json_rpc(
            id,
            AppError::bad_request("missing_tool_name", "params.name is required"),
        );
    }

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(err) => {
            let message = format!("Invalid tools/call params: {err}");
            return app_error_to_json_rpc(id, AppError::bad_request("invalid_params", message));
        }
    };

    let tool = match state.tools.resolve(&tool_call.name) {
        Ok(tool) => tool,
        Err(err) => return app_error_to_json_rpc(id, err),
    };

    let arguments = tool_call.arguments.unwrap_or_default();
    if let Some(field) = tool.missing_required(&arguments) {
        return app_error_to_json_rpc(
            id,
            AppError::bad_request("missing_argument", format!("Missing {field} parameter")),
        );
    }

    // The invocation gets its own task so a dropped HTTP request cannot cancel it
    // and a panic inside the renderer surfaces as a JoinError.
    let kind = tool.kind;
    let task_state = state.clone();
    let task_session = session.cloned();
    let outcome = tokio::spawn(async move {
        invoke_tool(&task_state, kind, arguments, task_session.as_ref()).await
    })
    .await;

    match outcome {
        Ok(Ok(result)) => json_rpc_result(id, result),
        Ok(Err(err)) => app_error_to_json_rpc(id, err),
        Err(err) => {
            app_error_to_json_rpc(id, AppError::internal(format!("tool task failed: {err}")))
        }
    }
}

async fn invoke_tool(
    state: &AppState,
    kind: ToolKind,
    arguments: Map<String, Value>,
    session: Option<&SessionId>,
) -> Result<Value, AppError> {
    match kind {
        ToolKind::RenderRepo => render_repo(state, parse_arguments(arguments)?, session).await,
        ToolKind::RenderRepoToFile => {
            render_repo_to_file(state, parse_arguments(arguments)?, session).await
        }
    }
}

fn parse_arguments<T: DeserializeOwned>(arguments: Map<String, Value>) -> Result<T, AppError> {
    serde_json::from_value(Value::Object(arguments)).map_err(|err| {
        AppError::bad_request("invalid_arguments", format!("Invalid arguments: {err}"))
    })
}

async fn render_repo(
    state: &AppState,
    args: RenderRepoTool,
    session: Option<&SessionId>,
) -> Result<Value, AppError> {
    info!(repo_url = %args.repo_url, "executing render_repo");
    let html = render(state, &args.repo_url, session).await?;
    notify_session(
        state,
        session,
        LogLevel::Info,
        format!("Successfully rendered {} characters", html.chars().count()),
    );

    Ok(serde_json::to_value(CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(html, None, None))],
        is_error: None,
        meta: None,
        structured_content: None,
    })
    .expect("render_repo tool result serialization"))
}

async fn render_repo_to_file(
    state: &AppState,
    args: RenderRepoToFileTool,
    session: Option<&SessionId>,
) -> Result<Value, AppError> {
    let output_path = state.output_layout.resolve(
        &args.repo_url,
        args.output_path.as_deref(),
        args.project_type.as_deref(),
        args.project_subpath.as_deref(),
    )?;

    info!(
        repo_url = %args.repo_url,
        output_path = %output_path.display(),
        "executing render_repo_to_file"
    );
    let html = render(state, &args.repo_url, session).await?;

    let file_size = match write_rendered(&output_path, &html).await {
        Ok(size) => size,
        Err(err) => {
            notify_session(state, session, LogLevel::Error, err.to_string());
            return Err(err);
        }
    };

    let output_path = output_path.display().to_string();
    let message = format!("Repository rendered and saved to {output_path}");
    notify_session(
        state,
        session,
        LogLevel::Info,
        format!("Successfully saved to {output_path} ({file_size} bytes)"),
    );

    let record = Map::from_iter([
        ("success".to_string(), json!(true)),
        ("output_path".to_string(), json!(output_path)),
        ("repo_url".to_string(), json!(args.repo_url)),
        ("file_size".to_string(), json!(file_size)),
        ("message".to_string(), json!(message)),
    ]);
    let text = serde_json::to_string_pretty(&record).expect("render record serialization");

    Ok(serde_json::to_value(CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: Some(record),
    })
    .expect("render_repo_to_file tool result serialization"))
}

async fn render(
    state: &AppState,
    repo_url: &str,
    session: Option<&SessionId>,
) -> Result<String, AppError> {
    notify_session(
        state,
        session,
        LogLevel::Info,
        format!("Rendering repository: {repo_url}"),
    );

    state
        .renderer
        .render(repo_url, state.max_file_bytes)
        .await
        .map_err(|err| {
            warn!(repo_url = %repo_url, error = %err, "render failed");
            notify_session(
                state,
                session,
                LogLevel::Error,
                format!("Failed to render repository: {err}"),
            );
            AppError::internal(err.to_string())
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ToolKind, ToolRegistry};

    #[test]
    fn registry_lists_both_tools_in_fixed_order() {
        let registry = ToolRegistry::new();
        let names = registry
            .list()
            .into_iter()
            .map(|tool| tool.name)
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["render_repo", "render_repo_to_file"]);
        assert_eq!(
            registry.list().len(),
            ToolRegistry::new().list().len(),
            "listing is stable"
        );
    }

    #[test]
    fn only_repo_url_is_required() {
        let registry = ToolRegistry::new();

        for name in ["render_repo", "render_repo_to_file"] {
            let tool = registry.resolve(name).expect("registered tool");
            assert_eq!(tool.required_fields(), ["repo_url".to_string()]);
        }
    }

    #[test]
    fn resolve_maps_names_to_kinds() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.resolve("render_repo_to_file").expect("tool").kind,
            ToolKind::RenderRepoToFile
        );

        let err = registry.resolve("delete_repo").expect_err("unknown tool");
        assert!(err.to_string().contains("delete_repo"));
    }

    #[test]
    fn blank_or_null_required_arguments_count_as_missing() {
        let registry = ToolRegistry::new();
        let tool = registry.resolve("render_repo").expect("tool");

        let blank = json!({ "repo_url": "  " });
        let null = json!({ "repo_url": null });
        let present = json!({ "repo_url": "https://github.com/owner/repo" });

        assert_eq!(
            tool.missing_required(blank.as_object().expect("object")),
            Some("repo_url")
        );
        assert_eq!(
            tool.missing_required(null.as_object().expect("object")),
            Some("repo_url")
        );
        assert_eq!(
            tool.missing_required(present.as_object().expect("object")),
            None
        );
    }
}
