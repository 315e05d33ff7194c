//! Chat service: `GET /` liveness, `POST /chat` conversation turns.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use groq_chatbot::config::Config;
use groq_chatbot::core::{ChatEngine, MemoryStore};
use groq_chatbot::providers::{GroqConfig, GroqProvider};
use groq_chatbot::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groq_chatbot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let api_key = config.require_api_key()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let provider = GroqProvider::new(GroqConfig::from_llm_config(&config.llm, api_key))?;
    match provider.list_models().await {
        Ok(models) if !models.iter().any(|m| m == &config.llm.model) => {
            tracing::warn!(
                "Model {} not in the upstream model list ({} models)",
                config.llm.model,
                models.len()
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not list upstream models: {}", e),
    }

    let memory = Arc::new(MemoryStore::in_memory().await?);
    let chat_engine = ChatEngine::new(Arc::new(provider), memory)
        .with_system_prompt(config.llm.system_prompt());

    tracing::info!("🧠 Using model {}", config.llm.model);

    let app = groq_chatbot::app(AppState::new(chat_engine));

    tracing::info!("🔥 Chat service running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(groq_chatbot::shutdown_signal())
        .await?;

    Ok(())
}
