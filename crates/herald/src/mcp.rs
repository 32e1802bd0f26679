//! MCP Streamable HTTP server
//!
//! Implements the MCP protocol over HTTP, routing tool calls to the
//! beacon monitor link.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::dispatch::{self, Dialect, DispatchError};
use crate::link::MonitorLink;

/// JSON-RPC error code for a method or tool that does not exist.
pub const CODE_NOT_FOUND: i32 = -32601;
/// JSON-RPC error code for invalid tool arguments.
pub const CODE_INVALID_PARAMS: i32 = -32602;
/// Implementation-defined code for "monitor link not ready".
pub const CODE_BACKEND_UNAVAILABLE: i32 = -32001;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub link: Arc<MonitorLink>,
    /// Source identifier stamped into relayed envelopes
    pub source: String,
    /// Fallback user id for calls that omit one
    pub default_user: String,
    pub start_time: Instant,
}

/// JSON-RPC request wrapper
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response wrapper
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self::error_with_data(id, code, message, None)
    }

    pub fn error_with_data(
        id: Option<Value>,
        code: i32,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }
}

/// Handle MCP JSON-RPC requests (streamable dialect)
#[instrument(skip(state, request), fields(method = %request.method))]
pub async fn handle_mcp(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let response = handle_rpc(&state, request, Dialect::Streamable).await;
    Json(response).into_response()
}

/// Dispatch one JSON-RPC request. Shared by both HTTP front ends; only
/// the argument dialect differs.
pub async fn handle_rpc(
    state: &AppState,
    request: JsonRpcRequest,
    dialect: Dialect,
) -> JsonRpcResponse {
    debug!("MCP request: {} {:?}", request.method, request.params);

    match request.method.as_str() {
        "initialize" => handle_initialize(request.id),
        "tools/list" => handle_tools_list(request.id, dialect),
        "tools/call" => handle_tools_call(state, request.id, request.params, dialect).await,
        "ping" => JsonRpcResponse::success(request.id, serde_json::json!({})),
        _ => JsonRpcResponse::error(
            request.id,
            CODE_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ),
    }
}

fn handle_initialize(id: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse::success(
        id,
        serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "herald",
                "version": env!("CARGO_PKG_VERSION"),
            }
        }),
    )
}

fn handle_tools_list(id: Option<Value>, dialect: Dialect) -> JsonRpcResponse {
    JsonRpcResponse::success(id, serde_json::json!({ "tools": tool_definitions(dialect) }))
}

/// The fixed two-tool surface. Schemas differ per dialect only in field
/// spelling.
pub fn tool_definitions(dialect: Dialect) -> Vec<Value> {
    match dialect {
        Dialect::Streamable => vec![
            serde_json::json!({
                "name": dispatch::TOOL_SEND_TASK_EVENT,
                "description": "Report a task lifecycle event (started, completed, failed) to the beacon monitor",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "taskId": { "type": "string", "description": "Stable identifier of the task" },
                        "type": {
                            "type": "string",
                            "enum": ["task_started", "task_completed", "task_failed"],
                            "description": "Lifecycle stage this event reports"
                        },
                        "description": { "type": "string", "description": "Human-readable summary of the event" },
                        "userId": { "type": "string", "description": "User on whose behalf the task runs (optional)" },
                        "metadata": { "type": "object", "description": "Arbitrary extra context (optional)" }
                    },
                    "required": ["taskId", "type", "description"]
                }
            }),
            serde_json::json!({
                "name": dispatch::TOOL_REQUEST_AUTHORIZATION,
                "description": "Ask a human operator to authorize an action before a deadline",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "taskId": { "type": "string", "description": "Task the authorization applies to" },
                        "action": { "type": "string", "description": "Action awaiting approval" },
                        "description": { "type": "string", "description": "What the operator is approving" },
                        "userId": { "type": "string", "description": "Requesting user (optional)" },
                        "requiredBy": { "type": "string", "format": "date-time", "description": "ISO-8601 deadline" },
                        "metadata": { "type": "object", "description": "Arbitrary extra context (optional)" }
                    },
                    "required": ["taskId", "action", "description", "requiredBy"]
                }
            }),
        ],
        Dialect::Legacy => vec![
            serde_json::json!({
                "name": dispatch::TOOL_SEND_TASK_EVENT,
                "description": "Report a task lifecycle event (started, completed, failed) to the beacon monitor",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "task_id": { "type": "string", "description": "Stable identifier of the task" },
                        "event_type": {
                            "type": "string",
                            "enum": ["started", "completed", "failed"],
                            "description": "Lifecycle stage this event reports"
                        },
                        "description": { "type": "string", "description": "Human-readable summary of the event" },
                        "user_id": { "type": "string", "description": "User on whose behalf the task runs (optional)" },
                        "metadata": { "type": "object", "description": "Arbitrary extra context (optional)" }
                    },
                    "required": ["task_id", "event_type", "description"]
                }
            }),
            serde_json::json!({
                "name": dispatch::TOOL_REQUEST_AUTHORIZATION,
                "description": "Ask a human operator to authorize an action before a deadline",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "task_id": { "type": "string", "description": "Task the authorization applies to" },
                        "action": { "type": "string", "description": "Action awaiting approval" },
                        "description": { "type": "string", "description": "What the operator is approving" },
                        "user_id": { "type": "string", "description": "Requesting user (optional)" },
                        "required_by": { "type": "string", "format": "date-time", "description": "ISO-8601 deadline" },
                        "metadata": { "type": "object", "description": "Arbitrary extra context (optional)" }
                    },
                    "required": ["task_id", "action", "description", "required_by"]
                }
            }),
        ],
    }
}

async fn handle_tools_call(
    state: &AppState,
    id: Option<Value>,
    params: Value,
    dialect: Dialect,
) -> JsonRpcResponse {
    let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    info!(tool = %name, "Tool call");

    match dispatch::dispatch(
        &state.link,
        &state.source,
        &state.default_user,
        dialect,
        name,
        &arguments,
    )
    .await
    {
        Ok(text) => JsonRpcResponse::success(
            id,
            serde_json::json!({
                "content": [{
                    "type": "text",
                    "text": text,
                }],
                "isError": false,
            }),
        ),
        Err(DispatchError::UnknownTool { name }) => {
            JsonRpcResponse::error(id, CODE_NOT_FOUND, format!("Unknown tool: {name}"))
        }
        Err(DispatchError::Validation(e)) => JsonRpcResponse::error_with_data(
            id,
            CODE_INVALID_PARAMS,
            e.to_string(),
            Some(serde_json::json!({ "fields": e.fields })),
        ),
        Err(DispatchError::Backend(e)) => JsonRpcResponse::error(
            id,
            CODE_BACKEND_UNAVAILABLE,
            format!("Monitor unavailable: {e}"),
        ),
    }
}

/// Health check endpoint
pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.start_time.elapsed();

    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime.as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "monitor": {
            "endpoint": state.link.endpoint(),
            "state": state.link.state().as_str(),
            "ready": state.link.is_ready(),
            "attempts": state.link.attempts(),
        }
    }))
}
