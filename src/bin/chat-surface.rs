//! Browser chat surface: renders the transcript and relays messages to the
//! chat service.

use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use groq_chatbot::config::Config;
use groq_chatbot::surface::{self, ChatServiceClient, SurfaceState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groq_chatbot=debug,chat_surface=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let addr: SocketAddr = format!("{}:{}", config.surface.host, config.surface.port).parse()?;

    let client = ChatServiceClient::new(
        config.surface.service_url.clone(),
        Duration::from_secs(config.surface.request_timeout_secs),
    )?;
    tracing::info!("🔌 Relaying messages to {}", client.base_url());

    let app = surface::router(SurfaceState::new(client)?);

    tracing::info!("💬 Chat surface running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(groq_chatbot::shutdown_signal())
        .await?;

    Ok(())
}
