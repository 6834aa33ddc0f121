use anyhow::Result;
use sparql_cache_proxy::{config::Settings, Application};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone())),
        )
        .init();

    info!("Starting SPARQL cache proxy");

    let app = Application::new(settings).await?;
    app.run().await?;

    Ok(())
}
