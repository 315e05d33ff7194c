//! Upstream model API integrations

pub mod groq;

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::Message;

pub use groq::{GroqConfig, GroqProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream rejected the API key ({0})")]
    Unauthorized(u16),

    #[error("Upstream rate limit reached: {0}")]
    RateLimited(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ProviderError {
    /// Failures where the upstream could not serve the call right now,
    /// as opposed to a request it refused.
    pub fn is_unavailable(&self) -> bool {
        match self {
            ProviderError::Unavailable(_) | ProviderError::RateLimited(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProviderError::Unavailable(err.to_string())
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            ProviderError::Client(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

/// A hosted chat model: takes the whole prompt, returns the assistant reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier sent upstream
    fn model(&self) -> &str;

    async fn complete(&self, messages: &[Message]) -> Result<Message, ProviderError>;
}
