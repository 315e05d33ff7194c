//! Chat service routes

mod error;

use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::Role;
use crate::core::DEFAULT_SESSION;
use crate::AppState;

pub use error::ApiError;

#[derive(Debug, Serialize)]
struct LiveResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

impl SessionQuery {
    fn session(&self) -> &str {
        session_or_default(self.session_id.as_deref())
    }
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    session_id: String,
    messages: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    session_id: String,
    cleared: u64,
}

fn session_or_default(session_id: Option<&str>) -> &str {
    match session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => DEFAULT_SESSION,
    }
}

async fn live() -> Json<LiveResponse> {
    Json(LiveResponse {
        message: "Chatbot is live!",
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.chat_engine.model_name().to_string(),
    })
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session = session_or_default(request.session_id.as_deref());
    let response = state.chat_engine.run(session, &request.query).await?;

    Ok(Json(ChatResponse { response }))
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session = query.session();
    let messages = state
        .chat_engine
        .history(session)
        .await?
        .into_iter()
        .map(|m| HistoryEntry {
            role: m.role,
            content: m.content,
            created_at: m.created_at,
        })
        .collect();

    Ok(Json(HistoryResponse {
        session_id: session.to_string(),
        messages,
    }))
}

async fn reset(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<ResetResponse>, ApiError> {
    let session = query.session();
    let cleared = state.chat_engine.reset(session).await?;

    Ok(Json(ResetResponse {
        session_id: session.to_string(),
        cleared,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(live))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/history", get(history))
        .route("/reset", post(reset))
}
