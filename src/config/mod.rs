//! Application configuration
//!
//! Settings come from three layers, later ones winning:
//! 1. Built-in defaults
//! 2. An optional TOML file named by `CHATBOT_CONFIG`
//! 3. Environment variables (a local `.env` is loaded by the binaries)
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [llm]
//! model = "llama3-8b-8192"
//! api_key_env = "GROQ_API_KEY"
//! timeout_secs = 60
//!
//! [surface]
//! port = 8501
//! service_url = "http://fastapi-service:8000"
//! ```

pub mod prompts;

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Environment variable holding the path of the optional TOML file
pub const CONFIG_PATH_ENV: &str = "CHATBOT_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub surface: SurfaceConfig,
}

/// Chat service listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI-compatible API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Resolved from `api_key_env`, never read from the file
    #[serde(skip)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub temperature: Option<f32>,

    /// Overrides the built-in conversation prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            temperature: None,
            system_prompt: None,
        }
    }
}

impl LlmConfig {
    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(prompts::CONVERSATION)
    }
}

/// Browser chat surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_surface_port")]
    pub port: u16,

    /// Where the chat service is reachable from the surface process
    #[serde(default = "default_service_url")]
    pub service_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_surface_port(),
            service_url: default_service_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

fn default_surface_port() -> u16 {
    8501
}

fn default_model() -> String {
    "llama3-8b-8192".into()
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".into()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_service_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("API key not set: export {0} or add it to .env")]
    MissingApiKey(String),
}

impl Config {
    /// Load defaults, the optional config file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply variable overrides through `lookup`, then resolve the API key.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_number("PORT", &port)?;
        }
        if let Some(model) = lookup("GROQ_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) = lookup("GROQ_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(timeout) = lookup("UPSTREAM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_number("UPSTREAM_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(host) = lookup("SURFACE_HOST") {
            self.surface.host = host;
        }
        if let Some(port) = lookup("SURFACE_PORT") {
            self.surface.port = parse_number("SURFACE_PORT", &port)?;
        }
        if let Some(url) = lookup("CHAT_SERVICE_URL") {
            self.surface.service_url = url;
        }

        self.llm.api_key = lookup(&self.llm.api_key_env).filter(|key| !key.trim().is_empty());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".into()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.surface.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "surface.request_timeout_secs must be greater than zero".into(),
            ));
        }
        check_url("llm.base_url", &self.llm.base_url)?;
        check_url("surface.service_url", &self.surface.service_url)?;
        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::Validation(format!(
                    "llm.temperature must be between 0 and 2, got {}",
                    temperature
                )));
            }
        }
        Ok(())
    }

    /// The chat service cannot start without a key; the surface never needs one.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.llm
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingApiKey(self.llm.api_key_env.clone()))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} is not a valid number: {:?}", key, value)))
}

fn check_url(key: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{} must be an http(s) URL, got {:?}",
            key, url
        )))
    }
}
