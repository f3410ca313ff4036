use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::monitor::{AgentHandle, CommandError};
use crate::storage::{into_record, LogStore, StoreError};

/// Application state shared across handlers
pub struct AppState {
    pub agent: AgentHandle,
    /// Local stores accepting ingestion, by category
    pub stores: HashMap<String, LogStore>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Operator Commands
// ============================================================================

#[derive(Deserialize)]
pub struct CommandRequest {
    pub caller: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Serialize)]
pub struct CommandResponse {
    pub reply: String,
}

pub async fn run_command(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let reply = state
        .agent
        .command(&request.caller, &name, request.args)
        .await?;
    Ok(Json(CommandResponse { reply }))
}

// ============================================================================
// Ingest
// ============================================================================

#[derive(Serialize)]
pub struct IngestResponse {
    pub category: String,
    pub key: String,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<IngestResponse>, ApiError> {
    let store = state
        .stores
        .get(&category)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("Unknown log category: {}", category)))?;

    let record = into_record(payload)?;
    // Store writes block on the save lock
    let key = tokio::task::spawn_blocking(move || store.append(record, Utc::now()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(IngestResponse { category, key }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<CommandError> for ApiError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Unknown(_) => ApiError::NotFound(e.to_string()),
            CommandError::Unauthorized { .. } => ApiError::Forbidden(e.to_string()),
            CommandError::AgentUnavailable => ApiError::Unavailable(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidInput(_) => ApiError::BadRequest(e.to_string()),
            StoreError::LockTimeout { .. } => ApiError::Unavailable(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
