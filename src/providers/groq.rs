//! Groq chat completions provider
//!
//! Groq exposes the OpenAI chat completions format, so this works against any
//! compatible endpoint by changing `base_url`.
//!
//! # Configuration
//!
//! ```toml
//! [llm]
//! base_url = "https://api.groq.com/openai/v1"
//! api_key_env = "GROQ_API_KEY"
//! model = "llama3-8b-8192"
//! timeout_secs = 60
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmConfig;
use crate::conversation::{Message, Role};

use super::{ChatModel, ProviderError};

/// OpenAI-compatible chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Groq provider configuration
#[derive(Debug, Clone)]
pub struct GroqConfig {
    /// Base URL for the API (e.g., https://api.groq.com/openai/v1)
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GroqConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: api_key.into(),
            model: "llama3-8b-8192".to_string(),
            temperature: None,
            timeout_secs: 60,
        }
    }

    pub fn from_llm_config(llm: &LlmConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: llm.model.clone(),
            temperature: llm.temperature,
            timeout_secs: llm.timeout_secs,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Groq chat completion client
pub struct GroqProvider {
    config: GroqConfig,
    client: Client,
}

impl GroqProvider {
    pub fn new(config: GroqConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: Value = response.json().await?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }
}

#[async_trait]
impl ChatModel for GroqProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<Message, ProviderError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: messages.iter().map(ChatMessage::from).collect(),
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {} - Body: {}", e, body))
        })?;

        if let Some(usage) = &completion.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion usage"
            );
        }

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        Ok(Message {
            role: Role::Assistant,
            content,
        })
    }
}

fn status_error(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Unauthorized(status.as_u16())
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
        _ => ProviderError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured {
        auth: Arc<Mutex<Option<String>>>,
        body: Arc<Mutex<Option<Value>>>,
    }

    async fn completions(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        *captured.auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        *captured.body.lock().unwrap() = Some(body);

        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hi there!" } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        }))
    }

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: &str) -> GroqProvider {
        GroqProvider::new(GroqConfig::new("gsk_test").with_base_url(base_url)).unwrap()
    }

    #[test]
    fn test_config_from_llm_settings() {
        let llm = LlmConfig {
            base_url: "http://localhost:9999/v1/".into(),
            temperature: Some(0.3),
            ..LlmConfig::default()
        };
        let config = GroqConfig::from_llm_config(&llm, "key");
        assert_eq!(config.base_url, "http://localhost:9999/v1");
        assert_eq!(config.model, "llama3-8b-8192");
        assert_eq!(config.temperature, Some(0.3));
    }

    #[test]
    fn test_message_conversion() {
        let chat_msg = ChatMessage::from(&Message::user("Hello"));
        assert_eq!(chat_msg.role, "user");
        assert_eq!(chat_msg.content, "Hello");
    }

    #[tokio::test]
    async fn test_complete_sends_prompt_and_key() {
        let captured = Captured::default();
        let router = Router::new()
            .route("/chat/completions", post(completions))
            .with_state(captured.clone());
        let base_url = spawn_upstream(router).await;

        let reply = provider(&base_url)
            .complete(&[Message::system("be nice"), Message::user("hello")])
            .await
            .unwrap();

        assert_eq!(reply, Message::assistant("Hi there!"));
        assert_eq!(
            captured.auth.lock().unwrap().as_deref(),
            Some("Bearer gsk_test")
        );

        let body = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "llama3-8b-8192");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": { "message": "Invalid API Key", "type": "invalid_request_error" } })),
                )
            }),
        );
        let base_url = spawn_upstream(router).await;

        let err = provider(&base_url)
            .complete(&[Message::user("hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unauthorized(401)));
        assert!(!err.is_unavailable());
    }

    #[tokio::test]
    async fn test_api_error_message_is_extracted() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": { "message": "model not found" } })),
                )
            }),
        );
        let base_url = spawn_upstream(router).await;

        let err = provider(&base_url)
            .complete(&[Message::user("hello")])
            .await
            .unwrap_err();
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "model not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let base_url = spawn_upstream(router).await;

        let err = provider(&base_url)
            .complete(&[Message::user("hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(&format!("http://{}", addr))
            .complete(&[Message::user("hello")])
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "expected unavailable, got {err:?}");
    }

    #[tokio::test]
    async fn test_list_models() {
        let router = Router::new().route(
            "/models",
            get(|| async {
                Json(json!({
                    "object": "list",
                    "data": [{ "id": "llama3-8b-8192" }, { "id": "gemma2-9b-it" }]
                }))
            }),
        );
        let base_url = spawn_upstream(router).await;

        let models = provider(&base_url).list_models().await.unwrap();
        assert_eq!(models, vec!["llama3-8b-8192", "gemma2-9b-it"]);
    }
}
