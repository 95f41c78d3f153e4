use anyhow::Context;

use docfleet_infra::config::{ApiConfig, StorageConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docfleet_observability::init();

    let config = ApiConfig::from_env().context("reading api configuration")?;
    let services = docfleet_api::app::services::build_services(&config, &StorageConfig::from_env()).await?;
    let app = docfleet_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, zone = %config.zone, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
