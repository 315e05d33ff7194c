//! Mapping of chat errors to HTTP status codes and the error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::core::ChatError;

/// Error returned by the request handlers
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            ChatError::InvalidInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_INPUT"),
            ChatError::UpstreamUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE")
            }
            ChatError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ChatError::Memory(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MEMORY_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %self.0, "Chat request failed");
        }

        let body = json!({
            "error": {
                "code": code,
                "message": self.0.to_string(),
            }
        });

        (status, Json(body)).into_response()
    }
}
