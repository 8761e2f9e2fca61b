use anyhow::Context;
use blog_service::{build_router, cors_layer, AppState, ServiceConfig, SERVICE_NAME};
use common_auth::identity_source_from_config;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;
    let identity = identity_source_from_config(&config.auth)
        .context("failed to configure token verification")?;
    info!(source = identity.name(), "identity source ready");

    let app = build_router(AppState::new(identity)).layer(cors_layer(&config.allowed_origins));

    let addr = config.addr();
    info!(%addr, "starting {SERVICE_NAME}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
