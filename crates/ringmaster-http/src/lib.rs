//! HTTP bridge
//!
//! A small local surface over the engine: tool listing, per-provider
//! counts, dispatch, and health. Tool failures never become HTTP errors;
//! they are JSON bodies with `success: false`. Dispatch runs under the
//! smaller of the bridge deadline and the descriptor timeout.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use ringmaster_core::{defaults, Runtime};

/// App state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
}

/// Build the bridge router.
pub fn router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/servers", get(list_servers))
        .route("/execute", post(execute))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { runtime })
}

/// Serve the bridge until the process ends.
pub async fn serve(runtime: Arc<Runtime>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP bridge listening");
    axum::serve(listener, router(runtime)).await
}

/// GET /tools - every registered descriptor
async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let tools: Vec<Value> = state
        .runtime
        .registry()
        .list()
        .iter()
        .map(|descriptor| {
            json!({
                "name": descriptor.name,
                "description": descriptor.description,
                "server": descriptor.provider,
                "category": descriptor.category,
                "version": descriptor.version,
                "parameters": descriptor.parameters_schema(),
            })
        })
        .collect();
    Json(json!(tools))
}

/// GET /servers - tool counts per provider
async fn list_servers(State(state): State<AppState>) -> Json<Value> {
    let counts = state.runtime.registry().provider_counts();
    let total_servers = counts.len();
    let total_tools: usize = counts.values().sum();
    Json(json!({
        "servers": counts,
        "total_servers": total_servers,
        "total_tools": total_tools,
    }))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<Value> {
    let counts = state.runtime.registry().provider_counts();
    Json(json!({
        "status": "ok",
        "servers": counts.len(),
        "tools": state.runtime.registry().len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// POST /execute - dispatch one tool call
///
/// The body is parsed by hand so malformed JSON yields a 400 with a JSON
/// `{error}` body instead of the framework's plain-text rejection.
async fn execute(State(state): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    let parsed: Value = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("malformed JSON body: {}", error) })),
            );
        }
    };

    let Some(tool_name) = parsed.get("tool_name").and_then(Value::as_str) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "tool_name is required" })),
        );
    };
    let params = match parsed.get("params") {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "params must be an object" })),
            );
        }
    };

    let Some(entry) = state.runtime.registry().lookup(tool_name) else {
        return (
            StatusCode::OK,
            Json(json!({
                "success": false,
                "error": format!("Unknown tool: {}", tool_name),
            })),
        );
    };

    // The authoritative bound is the smaller of the bridge deadline and the
    // descriptor timeout.
    let deadline = Duration::from_secs(
        defaults::HTTP_DEADLINE_SECONDS.min(entry.descriptor.timeout_secs),
    );
    let provider = entry.descriptor.provider.clone();
    let dispatched = tokio::time::timeout(
        deadline,
        state.runtime.dispatcher().dispatch(tool_name, params),
    )
    .await;

    match dispatched {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "success": result.is_success(),
                "result": result.payload,
                "message": result.message,
                "execution_time": result.execution_time,
                "server": provider,
                "tool": tool_name,
            })),
        ),
        Err(_) => (
            StatusCode::OK,
            Json(json!({
                "success": false,
                "error": format!(
                    "execution exceeded the {}s request deadline",
                    deadline.as_secs()
                ),
                "server": provider,
                "tool": tool_name,
            })),
        ),
    }
}
