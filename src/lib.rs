//! Groq Chatbot
//!
//! A small chatbot made of two processes:
//! - the chat service, which keeps per-session conversation memory and
//!   forwards each turn to Groq's chat completion API;
//! - the chat surface, a browser page that talks to the chat service.

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod conversation;
pub mod core;
pub mod providers;
pub mod routes;
pub mod surface;

use crate::core::ChatEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat_engine: Arc<ChatEngine>,
}

impl AppState {
    pub fn new(chat_engine: ChatEngine) -> Self {
        Self {
            chat_engine: Arc::new(chat_engine),
        }
    }
}

/// The chat service with its middleware stack.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
