//! HTTP service layer over the engine façade.
//!
//! Each endpoint maps 1:1 to one [`Engine`] call; the service layer owns
//! only session-id derivation and status-code translation. Session ids
//! are explicit request fields — a fresh UUID is generated when a query
//! arrives without one, and returned so the client can continue the
//! conversation.
//!
//! # Endpoints
//!
//! | Method | Path | Engine call |
//! |--------|------|-------------|
//! | `POST` | `/query` | `query` |
//! | `POST` | `/new-conversation` | `new_conversation` |
//! | `POST` | `/switch-model` | `switch_model` |
//! | `POST` | `/documents` | `add_documents` |
//! | `POST` | `/llm-api-key` | `register_backend` |
//! | `GET`  | `/sessions/{id}/sources` | `document_sources` |
//! | `GET`  | `/health` | — |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unknown_backend", "message": "no backend registered with name: not-a-model" } }
//! ```
//!
//! Codes: `bad_request` (400), `unknown_backend` (400), `not_found`
//! (404), `conflict` (409), `embedding_failure` (502),
//! `backend_failure` (502), `timeout` (504).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support
//! browser-based chat clients.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::BackendsConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::models::Document;
use crate::router::GeminiBackend;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    /// Kept so the key-registration endpoint can rebuild backends with
    /// rotated credentials using their configured model and timeouts.
    backends: BackendsConfig,
}

/// Start the HTTP server on `bind`. Runs until the process terminates.
pub async fn run_server(
    engine: Arc<Engine>,
    backends: BackendsConfig,
    bind: &str,
) -> anyhow::Result<()> {
    let state = AppState { engine, backends };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/query", post(handle_query))
        .route("/new-conversation", post(handle_new_conversation))
        .route("/switch-model", post(handle_switch_model))
        .route("/documents", post(handle_add_documents))
        .route("/llm-api-key", post(handle_register_key))
        .route("/sessions/{id}/sources", get(handle_sources))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind, "server listening");
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        let (status, code) = match err {
            EngineError::CollectionNotFound(_) | EngineError::SessionNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            EngineError::DuplicateCollection(_) => (StatusCode::CONFLICT, "conflict"),
            EngineError::UnknownBackend(_) => (StatusCode::BAD_REQUEST, "unknown_backend"),
            EngineError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_failure"),
            EngineError::Backend(_) => (StatusCode::BAD_GATEWAY, "backend_failure"),
            EngineError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        };
        AppError {
            status,
            code,
            message,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    session_id: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    session_id: String,
    answer: String,
    sources: Vec<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let session_id = req
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = state.engine.query(&session_id, &req.question).await?;

    Ok(Json(QueryResponse {
        session_id,
        answer: result.answer,
        sources: result.sources,
    }))
}

// ============ POST /new-conversation ============

#[derive(Deserialize)]
struct SessionRequest {
    session_id: String,
}

async fn handle_new_conversation(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.engine.new_conversation(&req.session_id)?;
    Ok(Json(serde_json::json!({ "message": "new conversation started" })))
}

// ============ POST /switch-model ============

#[derive(Deserialize)]
struct SwitchModelRequest {
    session_id: String,
    model: String,
}

async fn handle_switch_model(
    State(state): State<AppState>,
    Json(req): Json<SwitchModelRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.engine.switch_model(&req.session_id, &req.model)?;
    Ok(Json(
        serde_json::json!({ "message": format!("switched to model: {}", req.model) }),
    ))
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct AddDocumentsRequest {
    session_id: String,
    documents: Vec<Document>,
}

async fn handle_add_documents(
    State(state): State<AppState>,
    Json(req): Json<AddDocumentsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.documents.is_empty() {
        return Err(bad_request("documents must not be empty"));
    }

    let written = state
        .engine
        .add_documents(&req.session_id, &req.documents)
        .await?;
    Ok(Json(serde_json::json!({ "ingested": written })))
}

// ============ POST /llm-api-key ============

#[derive(Deserialize)]
struct RegisterKeyRequest {
    backend: String,
    api_key: String,
}

/// Rebuild a key-bearing backend with the supplied credential and
/// register it under its name. Sessions pick up the rotated backend on
/// their next query; no restart needed.
async fn handle_register_key(
    State(state): State<AppState>,
    Json(req): Json<RegisterKeyRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.api_key.trim().is_empty() {
        return Err(bad_request("api_key must not be empty"));
    }

    match req.backend.as_str() {
        "gemini" => {
            let config = state
                .backends
                .gemini
                .as_ref()
                .ok_or_else(|| bad_request("no [backends.gemini] section configured"))?;
            let backend = GeminiBackend::with_api_key(config, req.api_key)?;
            state.engine.register_backend("gemini", Arc::new(backend));
            Ok(Json(
                serde_json::json!({ "message": "API key registered for backend: gemini" }),
            ))
        }
        other => Err(EngineError::UnknownBackend(other.to_string()).into()),
    }
}

// ============ GET /sessions/{id}/sources ============

async fn handle_sources(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sources = state.engine.document_sources(&session_id)?;
    Ok(Json(serde_json::json!({ "sources": sources })))
}
