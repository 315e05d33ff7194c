//! HTTP client for the chat service's `/chat` endpoint

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::routes::{ChatRequest, ChatResponse};

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("chat service returned HTTP {status}: {message}")]
    Service { status: u16, message: String },
}

pub struct ChatServiceClient {
    client: Client,
    base_url: String,
}

impl ChatServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SurfaceError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one message and wait for the reply. No retries.
    pub async fn send(&self, session_id: &str, query: &str) -> Result<String, SurfaceError> {
        let request = ChatRequest {
            query: query.to_string(),
            session_id: Some(session_id.to_string()),
        };

        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SurfaceError::Service {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let reply: ChatResponse = response.json().await?;
        Ok(reply.response)
    }
}

/// Pull the message out of the service's error envelope, falling back to
/// the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["detail"].as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":{"code":"UPSTREAM_ERROR","message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(error_message("Failed to deserialize the JSON body"), "Failed to deserialize the JSON body");
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client =
            ChatServiceClient::new("http://fastapi-service:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://fastapi-service:8000");
    }
}
