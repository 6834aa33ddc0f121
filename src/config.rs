use std::collections::HashMap;
use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::proxy::types::{
    Authentication, CacheConfig, CacheNamespace, CaptureLimit, EndpointUrl, ProxyConfig,
    QueryOperation, RewriteRule, TtlSeconds,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub proxy: ProxySettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxySettings {
    pub endpoint_url: String,
    pub query_operation: QueryOperation,
    /// Response deadline in milliseconds, 0 disables the guard
    pub timeout_ms: u64,
    /// Upper bound on response bodies captured for caching and logging
    pub capture_limit: usize,
    #[serde(default)]
    pub authentication: Option<AuthenticationSettings>,
    /// Static headers sent with every upstream request
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub rewrite: Option<RewriteSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthenticationSettings {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RewriteSettings {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default)]
    pub url: Option<String>,
    pub ttl: u64,
    pub prefix: String,
    pub disabled: bool,
    pub clear_at_startup: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8080)?
            .set_default("proxy.endpoint_url", "http://localhost:3030/query")?
            .set_default("proxy.query_operation", "post-direct")?
            .set_default("proxy.timeout_ms", 2000)?
            .set_default("proxy.capture_limit", 10 * 1024 * 1024)?
            .set_default("cache.ttl", 3600)?
            .set_default("cache.prefix", "default")?
            .set_default("cache.disabled", false)?
            .set_default("cache.clear_at_startup", false)?
            .set_default("logging.level", "info")?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix("SPARQL_PROXY").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Validated proxy configuration derived from the raw settings
    pub fn proxy_config(&self) -> Result<ProxyConfig, ConfigError> {
        let endpoint_url = EndpointUrl::try_new(self.proxy.endpoint_url.clone())
            .map_err(|e| ConfigError::Message(format!("proxy.endpoint_url: {e}")))?;
        let capture_limit = CaptureLimit::try_new(self.proxy.capture_limit)
            .map_err(|e| ConfigError::Message(format!("proxy.capture_limit: {e}")))?;

        let timeout = match self.proxy.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(ProxyConfig {
            endpoint_url,
            query_operation: self.proxy.query_operation,
            timeout,
            capture_limit,
            authentication: self.proxy.authentication.as_ref().map(|auth| Authentication {
                user: auth.user.clone(),
                password: auth.password.clone(),
            }),
            headers: self.proxy.headers.clone(),
            rewrite: self.proxy.rewrite.as_ref().map(|rewrite| RewriteRule {
                from: rewrite.from.clone(),
                to: rewrite.to.clone(),
            }),
        })
    }

    /// Validated cache configuration derived from the raw settings
    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        let namespace = CacheNamespace::try_new(self.cache.prefix.clone())
            .map_err(|e| ConfigError::Message(format!("cache.prefix: {e}")))?;
        let ttl = TtlSeconds::try_new(self.cache.ttl)
            .map_err(|e| ConfigError::Message(format!("cache.ttl: {e}")))?;

        Ok(CacheConfig {
            url: self.cache.url.clone(),
            namespace,
            ttl,
            disabled: self.cache.disabled,
            clear_at_startup: self.cache.clear_at_startup,
        })
    }
}
