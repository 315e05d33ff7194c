//! Browser chat surface
//!
//! A server-rendered page that keeps one transcript per browser (keyed by the
//! `chat_session` cookie) and forwards each submission to the chat service.
//! The browser's session id doubles as the service-side session id, so each
//! browser gets its own conversation memory.
//!
//! Per submission the page goes idle → awaiting response → rendered; the
//! in-flight request cannot be cancelled.

pub mod client;
pub mod render;
pub mod transcript;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use client::{ChatServiceClient, SurfaceError};
pub use render::PageRenderer;
pub use transcript::{Line, Speaker, Transcript};

pub const SESSION_COOKIE: &str = "chat_session";

/// Per-browser page state
#[derive(Debug, Default)]
pub struct BrowserSession {
    pub transcript: Transcript,
    /// Shown once on the next render
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct SurfaceState {
    client: Arc<ChatServiceClient>,
    renderer: Arc<PageRenderer>,
    sessions: Arc<Mutex<HashMap<String, BrowserSession>>>,
}

impl SurfaceState {
    pub fn new(client: ChatServiceClient) -> Result<Self, tera::Error> {
        Ok(Self {
            client: Arc::new(client),
            renderer: Arc::new(PageRenderer::new()?),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Run `f` against a browser session, creating it on first use.
    pub fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&mut BrowserSession) -> T) -> T {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        f(sessions.entry(session_id.to_string()).or_default())
    }

    /// Snapshot of what a render shows. The pending error is consumed, and an
    /// unknown session reads as an empty page without being stored.
    fn take_view(&self, session_id: &str) -> (Vec<Line>, Option<String>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get_mut(session_id) {
            Some(session) => (session.transcript.entries().to_vec(), session.error.take()),
            None => (Vec::new(), None),
        }
    }

    fn end_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
    }
}

#[derive(Debug, Deserialize)]
pub struct SendForm {
    #[serde(default)]
    pub message: String,
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// The browser's session id, minting a cookie for it on first visit.
fn browser_session(jar: CookieJar) -> (CookieJar, String) {
    match jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        Some(id) if !id.is_empty() => (jar, id),
        _ => {
            let id = Uuid::new_v4().to_string();
            (jar.add(session_cookie(id.clone())), id)
        }
    }
}

async fn show(State(state): State<SurfaceState>, jar: CookieJar) -> Response {
    let (jar, session_id) = browser_session(jar);
    let (lines, error) = state.take_view(&session_id);

    match state.renderer.page(&lines, error.as_deref()) {
        Ok(html) => (jar, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(session = %session_id, error = %e, "Failed to render chat page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render chat page").into_response()
        }
    }
}

async fn send(
    State(state): State<SurfaceState>,
    jar: CookieJar,
    Form(form): Form<SendForm>,
) -> impl IntoResponse {
    let (jar, session_id) = browser_session(jar);
    let message = form.message.trim();

    if !message.is_empty() {
        let result = state.client.send(&session_id, message).await;

        state.with_session(&session_id, |session| match result {
            Ok(reply) => {
                session.transcript.push_exchange(message, reply);
                session.error = None;
            }
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "Chat service call failed");
                session.error = Some(e.to_string());
            }
        });
    }

    (jar, Redirect::to("/"))
}

/// Clears this browser's transcript and starts a new session id. The chat
/// service is not contacted, so its memory for the old session stays as is.
async fn end(State(state): State<SurfaceState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(old) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        state.end_session(&old);
        tracing::info!(session = %old, "Conversation ended");
    }

    (
        jar.add(session_cookie(Uuid::new_v4().to_string())),
        Redirect::to("/"),
    )
}

pub fn router(state: SurfaceState) -> Router {
    Router::new()
        .route("/", get(show))
        .route("/send", post(send))
        .route("/end", post(end))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
