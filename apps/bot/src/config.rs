use std::env::var;
use std::time::Duration;

use analysis::cache::{DEFAULT_KEY_PREFIX, DEFAULT_TTL};
use anyhow::{Context, Result};

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub version: String,
    /// Redis is used for the report cache when set, memory otherwise
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cache_ttl = match var("ANALYSIS_CACHE_TTL_SECS") {
            Ok(secs) => Duration::from_secs(
                secs.parse()
                    .with_context(|| format!("ANALYSIS_CACHE_TTL_SECS is not a number: {secs}"))?,
            ),
            Err(_) => DEFAULT_TTL,
        };

        Ok(Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN not set")?,
            version: var("APP_VERSION").unwrap_or_else(|_| "Unknown".to_string()),
            redis_url: var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            redis_key_prefix: key_prefix(var("REDIS_KEY_PREFIX").ok()),
            cache_ttl,
        })
    }
}

fn key_prefix(raw: Option<String>) -> String {
    raw.filter(|prefix| !prefix.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string())
}
