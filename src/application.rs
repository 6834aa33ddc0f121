//! Application startup and HTTP server wiring

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Settings;
use crate::proxy::SparqlProxyService;
use crate::Result;

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
    service: Arc<SparqlProxyService>,
}

impl Application {
    pub async fn new(settings: Settings) -> Result<Self> {
        let proxy_config = settings.proxy_config()?;
        let cache_config = settings.cache_config()?;

        info!("Proxying SPARQL queries to {}", proxy_config.endpoint_url);

        let service = SparqlProxyService::init(proxy_config, &cache_config).await?;

        Ok(Self {
            settings,
            service: Arc::new(service),
        })
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.settings.application.host, self.settings.application.port
        );
        let listener = TcpListener::bind(&addr).await?;
        info!("Listening on {addr}");

        let router = SparqlProxyService::into_router(self.service);
        axum::serve(listener, router).await?;

        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
