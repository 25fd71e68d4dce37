//! MCP dispatcher
//!
//! JSON-RPC 2.0 message handling for the Model Context Protocol: tool calls go to
//! the [`ExpenseStore`], resource reads go to the [`CategoryProvider`]. The
//! dispatcher is transport-agnostic and synchronous; the HTTP layer decides
//! where it runs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::categories::{CategoryProvider, CATEGORIES_MIME_TYPE, CATEGORIES_URI};
use crate::db::{ExpenseStore, StoreError};
use crate::models::{ErrorPayload, NewExpense};

pub const SERVER_NAME: &str = "ExpenseTracker";

/// Protocol revisions this server can speak, oldest first
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2024-11-05", "2025-03-26", "2025-06-18"];

pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

const INSTRUCTIONS: &str = "Track personal expenses: add_expense records one expense, \
list_expenses returns expenses in an inclusive YYYY-MM-DD range, summarize totals them \
by category. Read expense:///categories for the category list.";

// ============================================================================
// JSON-RPC TYPES
// ============================================================================

/// Incoming JSON-RPC message. Only a message without an `id` member is a
/// notification; an explicit `"id": null` still gets a response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: McpError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(err.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Protocol-level failures. Storage failures are not among them: those are
/// returned to the caller as an [`ErrorPayload`] inside a normal tool result.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    pub fn code(&self) -> i64 {
        match self {
            McpError::Parse(_) => -32700,
            McpError::InvalidRequest(_) => -32600,
            McpError::MethodNotFound(_) => -32601,
            McpError::InvalidParams(_) => -32602,
            McpError::ResourceNotFound(_) => -32002,
            McpError::Internal(_) => -32603,
        }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            data: None,
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Internal(err.to_string())
    }
}

// ============================================================================
// TOOL ARGUMENTS
// ============================================================================

#[derive(Debug, Deserialize)]
struct DateRangeArgs {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct SummarizeArgs {
    start_date: String,
    end_date: String,
    #[serde(default)]
    category: Option<String>,
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, McpError> {
    serde_json::from_value(arguments)
        .map_err(|e| McpError::InvalidParams(format!("{}: {}", tool, e)))
}

// ============================================================================
// DISPATCHER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: ExpenseStore,
    categories: CategoryProvider,
}

impl Dispatcher {
    pub fn new(store: ExpenseStore, categories: CategoryProvider) -> Self {
        Self { store, categories }
    }

    pub fn store(&self) -> &ExpenseStore {
        &self.store
    }

    /// Handle one decoded JSON-RPC message. Returns `None` for notifications.
    pub fn handle_message(&self, message: Value) -> Option<JsonRpcResponse> {
        let fallback_id = message.get("id").cloned().unwrap_or(Value::Null);
        // serde folds `"id": null` into `None`, so presence is checked on the raw message
        let has_id = message.get("id").is_some();

        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    fallback_id,
                    McpError::InvalidRequest(e.to_string()),
                ))
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                fallback_id,
                McpError::InvalidRequest(format!("unsupported jsonrpc version '{}'", request.jsonrpc)),
            ));
        }

        if !has_id {
            debug!(method = %request.method, "notification received");
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        debug!(method = %request.method, "request received");
        let response = match self.dispatch(&request.method, request.params.unwrap_or(Value::Null)) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                debug!(method = %request.method, code = err.code(), error = %err, "request rejected");
                JsonRpcResponse::failure(id, err)
            }
        };
        Some(response)
    }

    fn dispatch(&self, method: &str, params: Value) -> Result<Value, McpError> {
        match method {
            "initialize" => Ok(initialize_result(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidParams("missing tool name".to_string()))?;
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                let payload = self.call_tool(name, arguments)?;
                Ok(tool_result(payload))
            }
            "resources/list" => Ok(json!({
                "resources": [{
                    "uri": CATEGORIES_URI,
                    "name": "categories",
                    "description": "Expense categories",
                    "mimeType": CATEGORIES_MIME_TYPE,
                }]
            })),
            "resources/read" => {
                let uri = params
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidParams("missing resource uri".to_string()))?;
                let text = self.read_resource(uri)?;
                Ok(json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": CATEGORIES_MIME_TYPE,
                        "text": text,
                    }]
                }))
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    /// Run a tool and return its payload: the success shape, or an
    /// [`ErrorPayload`] when the store fails.
    pub fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        match name {
            "add_expense" => {
                let input: NewExpense = parse_args(name, arguments)?;
                outcome(name, self.store.add(&input))
            }
            "list_expenses" => {
                let args: DateRangeArgs = parse_args(name, arguments)?;
                outcome(name, self.store.list(&args.start_date, &args.end_date))
            }
            "summarize" => {
                let args: SummarizeArgs = parse_args(name, arguments)?;
                outcome(
                    name,
                    self.store
                        .summarize(&args.start_date, &args.end_date, args.category.as_deref()),
                )
            }
            other => Err(McpError::InvalidParams(format!("unknown tool '{}'", other))),
        }
    }

    pub fn read_resource(&self, uri: &str) -> Result<String, McpError> {
        if uri == CATEGORIES_URI {
            Ok(self.categories.read())
        } else {
            Err(McpError::ResourceNotFound(uri.to_string()))
        }
    }
}

fn outcome<T: Serialize>(tool: &str, result: Result<T, StoreError>) -> Result<Value, McpError> {
    match result {
        Ok(value) => Ok(serde_json::to_value(value)?),
        Err(err) => {
            warn!(tool, kind = err.kind().as_str(), error = %err, "tool call failed");
            Ok(serde_json::to_value(ErrorPayload::from(&err))?)
        }
    }
}

/// Wrap a payload in an MCP `CallToolResult`. Error payloads are data, so
/// `isError` stays false.
fn tool_result(payload: Value) -> Value {
    let text = payload.to_string();
    let structured = if payload.is_object() {
        payload
    } else {
        json!({ "result": payload })
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": structured,
        "isError": false,
    })
}

fn initialize_result(params: &Value) -> Value {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let version = requested
        .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        .unwrap_or(LATEST_PROTOCOL_VERSION);

    json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false },
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": crate::VERSION,
        },
        "instructions": INSTRUCTIONS,
    })
}

fn tool_definitions() -> Value {
    json!([
        {
            "name": "add_expense",
            "description": "Add a new expense entry.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "date": { "type": "string", "description": "Expense date, YYYY-MM-DD" },
                    "amount": { "type": ["number", "string"] },
                    "category": { "type": "string" },
                    "subcategory": { "type": "string", "default": "" },
                    "note": { "type": "string", "default": "" }
                },
                "required": ["date", "amount", "category"]
            }
        },
        {
            "name": "list_expenses",
            "description": "List expenses in a date range.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "start_date": { "type": "string", "description": "Inclusive, YYYY-MM-DD" },
                    "end_date": { "type": "string", "description": "Inclusive, YYYY-MM-DD" }
                },
                "required": ["start_date", "end_date"]
            }
        },
        {
            "name": "summarize",
            "description": "Summarize expenses by category.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "start_date": { "type": "string", "description": "Inclusive, YYYY-MM-DD" },
                    "end_date": { "type": "string", "description": "Inclusive, YYYY-MM-DD" },
                    "category": { "type": ["string", "null"], "default": null }
                },
                "required": ["start_date", "end_date"]
            }
        }
    ])
}
