// 🌐 MCP over HTTP - axum transport for the dispatcher
//
// POST /mcp        one JSON-RPC message in, one response out (202 for notifications)
// GET  /api/health store reachability

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::mcp::{Dispatcher, JsonRpcResponse, McpError};

/// Header carrying the session id handed out on `initialize`
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Shared application state
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<Value> {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> Response {
    let store = state.dispatcher.store().clone();

    match tokio::task::spawn_blocking(move || store.count()).await {
        Ok(Ok(count)) => Json(ApiResponse::ok(json!({ "status": "ok", "expenses": count })))
            .into_response(),
        Ok(Err(e)) => {
            warn!(kind = e.kind().as_str(), error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<Value>::failure(e.to_string())),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "health check task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<Value>::failure(e.to_string())),
            )
                .into_response()
        }
    }
}

/// POST /mcp - One JSON-RPC message
async fn handle_mcp(State(state): State<AppState>, body: Bytes) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            return Json(JsonRpcResponse::failure(Value::Null, McpError::Parse(e.to_string())))
                .into_response()
        }
    };
    let is_initialize = message.get("method").and_then(Value::as_str) == Some("initialize");

    // SQLite calls block; keep them off the async workers
    let dispatcher = Arc::clone(&state.dispatcher);
    let outcome = tokio::task::spawn_blocking(move || dispatcher.handle_message(message)).await;

    let response = match outcome {
        Ok(Some(response)) => response,
        Ok(None) => return StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            error!(error = %e, "dispatch task failed");
            let failure = JsonRpcResponse::failure(Value::Null, McpError::Internal(e.to_string()));
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(failure)).into_response();
        }
    };

    let start_session = is_initialize && response.error.is_none();
    let mut http_response = Json(response).into_response();
    if start_session {
        let session_id = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            http_response.headers_mut().insert(SESSION_HEADER, value);
        }
        info!(session_id = %session_id, "session initialized");
    }
    http_response
}

// ============================================================================
// Router + Server
// ============================================================================

pub fn router(dispatcher: Dispatcher) -> Router {
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .with_state(state.clone());

    Router::new()
        .route("/mcp", post(handle_mcp))
        .with_state(state)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until Ctrl+C
pub async fn serve(dispatcher: Dispatcher, config: &ServerConfig) -> anyhow::Result<()> {
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!(address = %addr, "MCP endpoint listening on /mcp");

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
}
