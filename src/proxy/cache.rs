//! Cache store adapter
//!
//! A thin contract over an external key-value store. Implementations own
//! their failure policy: a failed read is a miss, a failed write is a no-op,
//! so the store can never fail or delay a request. Initialization happens
//! exactly once at proxy construction; an unreachable store degrades to
//! "cache disabled for this process" instead of crashing the server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, info, warn};

use crate::proxy::types::{CacheConfig, CacheEntry, CacheNamespace};

/// Store contract consulted by the request path
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Look up an entry; absent on miss, expiry, or store failure
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store an entry with an expiry; best-effort
    async fn put(&self, key: &str, entry: &CacheEntry, ttl: Duration);
}

/// Cache handle plus the request-path parameters derived from configuration
#[derive(Clone)]
pub struct CacheLayer {
    pub store: Arc<dyn QueryCache>,
    pub namespace: CacheNamespace,
    pub ttl: Duration,
}

impl CacheLayer {
    /// One-time cache initialization at proxy construction.
    ///
    /// Returns `None` when caching is not configured, turned off, or the
    /// store is unreachable at startup; the request path treats all three
    /// identically to "caching disabled".
    pub async fn init(config: &CacheConfig) -> Option<Self> {
        if config.disabled {
            info!("Cache: disabled");
            return None;
        }
        let Some(url) = &config.url else {
            info!("Cache: no store URL configured");
            return None;
        };

        match RedisCache::connect(url, &config.namespace, config.clear_at_startup).await {
            Ok(store) => {
                info!("Cache: enabled");
                Some(Self {
                    store: Arc::new(store),
                    namespace: config.namespace.clone(),
                    ttl: Duration::from_secs(config.ttl.into_inner()),
                })
            }
            Err(error) => {
                warn!(%error, "Cache: store unreachable, serving without cache");
                None
            }
        }
    }

    /// Assemble a layer around an already-constructed store
    pub fn with_store(
        store: Arc<dyn QueryCache>,
        namespace: CacheNamespace,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            namespace,
            ttl,
        }
    }
}

/// Redis-backed cache store
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    /// Open the client and verify connectivity eagerly.
    async fn connect(
        url: &str,
        namespace: &CacheNamespace,
        clear_at_startup: bool,
    ) -> redis::RedisResult<Self> {
        let client = Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        if clear_at_startup {
            // best-effort sweep, never blocks request serving
            match clear_namespace(&mut conn, namespace).await {
                Ok(removed) => info!(removed, "Cache: cleared namespace '{namespace}' at startup"),
                Err(error) => warn!(%error, "Cache: startup sweep failed"),
            }
        }

        Ok(Self { client })
    }

    async fn fetch(&self, key: &str) -> redis::RedisResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.get(key).await
    }

    async fn write(&self, key: &str, json: String, ttl: Duration) -> redis::RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, json, ttl.as_secs().max(1)).await?;
        Ok(())
    }
}

#[async_trait]
impl QueryCache for RedisCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.fetch(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(entry) => {
                    debug!(key, "Cache: hit");
                    Some(entry)
                }
                Err(error) => {
                    warn!(%error, key, "Cache: malformed entry, treating as miss");
                    None
                }
            },
            Ok(None) => {
                debug!(key, "Cache: miss");
                None
            }
            Err(error) => {
                warn!(%error, "Cache: get failed, treating as miss");
                None
            }
        }
    }

    async fn put(&self, key: &str, entry: &CacheEntry, ttl: Duration) {
        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(error) => {
                warn!(%error, "Cache: entry not serializable, skipping store");
                return;
            }
        };

        if let Err(error) = self.write(key, json, ttl).await {
            warn!(%error, "Cache: set failed, response not stored");
        }
    }
}

/// Delete every key under the namespace prefix.
async fn clear_namespace(
    conn: &mut MultiplexedConnection,
    namespace: &CacheNamespace,
) -> redis::RedisResult<usize> {
    let pattern = format!("{namespace}:*");
    let mut iter = conn.scan_match::<_, String>(&pattern).await?;
    let mut keys = Vec::new();
    while let Some(key) = iter.next_item().await {
        keys.push(key);
    }
    drop(iter);

    if !keys.is_empty() {
        let _: () = conn.del(&keys).await?;
    }
    Ok(keys.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::types::TtlSeconds;
    use std::collections::BTreeMap;

    fn cache_config(url: Option<&str>, disabled: bool) -> CacheConfig {
        CacheConfig {
            url: url.map(str::to_string),
            namespace: CacheNamespace::try_new("test".to_string()).unwrap(),
            ttl: TtlSeconds::try_new(60).unwrap(),
            disabled,
            clear_at_startup: false,
        }
    }

    #[tokio::test]
    async fn test_init_without_url_is_disabled() {
        assert!(CacheLayer::init(&cache_config(None, false)).await.is_none());
    }

    #[tokio::test]
    async fn test_init_with_disabled_flag_ignores_url() {
        let config = cache_config(Some("redis://127.0.0.1:6379"), true);
        assert!(CacheLayer::init(&config).await.is_none());
    }

    #[tokio::test]
    async fn test_init_with_unreachable_store_degrades_to_disabled() {
        // nothing listens on port 1
        let config = cache_config(Some("redis://127.0.0.1:1"), false);
        assert!(CacheLayer::init(&config).await.is_none());
    }

    #[tokio::test]
    #[ignore = "requires a local Redis instance"]
    async fn test_round_trip_against_local_redis() {
        let config = cache_config(Some("redis://127.0.0.1:6379"), false);
        let layer = CacheLayer::init(&config).await.expect("Redis reachable");

        let entry = CacheEntry {
            status: 200,
            headers: BTreeMap::new(),
            data: "result".to_string(),
        };
        layer.store.put("test:roundtrip", &entry, layer.ttl).await;

        let cached = layer.store.get("test:roundtrip").await;
        assert_eq!(cached, Some(entry));
    }
}
