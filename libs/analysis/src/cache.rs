//! Memoization of finished reports keyed by request parameters

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result};
use cached::{Cached, TimedCache};
use fred::prelude::*;
use fred::types::Expiration;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::pipeline::AnalysisReport;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_KEY_PREFIX: &str = "analysis";

/// Storage for reports with a time-to-live, injected into the pipeline.
pub trait ResultCache {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<AnalysisReport>>> + Send;

    fn put(&self, key: &str, report: &AnalysisReport) -> impl Future<Output = Result<()>> + Send;
}

/// In-process cache, lost on restart.
#[derive(Clone)]
pub struct MemoryCache {
    cache: Arc<Mutex<TimedCache<String, AnalysisReport>>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(Mutex::new(TimedCache::with_lifespan(ttl))),
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.cache.lock().await.cache_clear();
    }
}

impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<AnalysisReport>> {
        let mut cache = self.cache.lock().await;
        Ok(cache.cache_get(&key.to_string()).cloned())
    }

    async fn put(&self, key: &str, report: &AnalysisReport) -> Result<()> {
        let mut cache = self.cache.lock().await;
        // TimedCache only drops stale entries on flush
        cache.flush();
        let _ = cache.cache_set(key.to_string(), report.clone());
        Ok(())
    }
}

/// Redis-backed cache; entries are JSON with an `EXPIRE` set to the TTL.
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
    key_prefix: String,
    ttl: Duration,
}

impl RedisCache {
    pub async fn new(
        redis_url: &str,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, Error> {
        let config = Config::from_url(redis_url)?;

        let client = Builder::from_config(config)
            .with_connection_config(|config| {
                config.connection_timeout = Duration::from_secs(5);
                config.tcp = TcpConfig {
                    nodelay: Some(true),
                    ..Default::default()
                };
            })
            .build()?;

        client.on_error(|(error, server)| async move {
            error!("{:?}: Redis connection error: {:?}", server, error);
            Ok(())
        });

        client.connect();
        client.wait_for_connect().await?;

        Ok(Self {
            client,
            key_prefix: key.into(),
            ttl,
        })
    }

    fn report_key(&self, key: &str) -> String {
        report_key(&self.key_prefix, key)
    }
}

fn report_key(prefix: &str, key: &str) -> String {
    format!("{prefix}:report:{key}")
}

impl ResultCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<AnalysisReport>> {
        let raw: Option<String> = self.client.get(self.report_key(key)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    async fn put(&self, key: &str, report: &AnalysisReport) -> Result<()> {
        let json = serde_json::to_string(report)?;
        let expire = Expiration::EX(self.ttl.as_secs().max(1) as i64);
        let _: () = self
            .client
            .set(self.report_key(key), json, Some(expire), None, false)
            .await?;
        debug!(key, ttl_secs = self.ttl.as_secs(), "stored report in redis");
        Ok(())
    }
}

/// Cache selected at startup.
#[derive(Clone)]
pub enum CacheBackend {
    Disabled,
    Memory(MemoryCache),
    Redis(RedisCache),
}

impl ResultCache for CacheBackend {
    async fn get(&self, key: &str) -> Result<Option<AnalysisReport>> {
        match self {
            CacheBackend::Disabled => Ok(None),
            CacheBackend::Memory(cache) => cache.get(key).await,
            CacheBackend::Redis(cache) => cache.get(key).await,
        }
    }

    async fn put(&self, key: &str, report: &AnalysisReport) -> Result<()> {
        match self {
            CacheBackend::Disabled => Ok(()),
            CacheBackend::Memory(cache) => cache.put(key, report).await,
            CacheBackend::Redis(cache) => cache.put(key, report).await,
        }
    }
}
