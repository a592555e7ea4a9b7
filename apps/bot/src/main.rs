use std::sync::Arc;

use analysis::cache::{CacheBackend, MemoryCache, RedisCache};
use analysis::{AnalysisPipeline, PriceClient};
use anyhow::{Context, Result};
use bot::{Data, command::stock::stock_command, config::Config};
use poise::{Framework, FrameworkOptions};
use serenity::all::{ActivityData, ClientBuilder, GatewayIntents};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let price_client = PriceClient::from_env().context("init price client failed")?;
    let cache = select_cache(&config).await;
    let pipeline = Arc::new(AnalysisPipeline::new(price_client, cache));

    let intents = GatewayIntents::non_privileged();
    let commands = vec![stock_command()];

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands,
            ..Default::default()
        })
        .setup({
            let pipeline = Arc::clone(&pipeline);
            let version = config.version.clone();

            move |ctx, ready, framework| {
                let pipeline = Arc::clone(&pipeline);

                Box::pin(async move {
                    info!(
                        version = %version,
                        "{} [{}] connected successfully!",
                        ready.user.name,
                        ready.user.id
                    );

                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    ctx.set_activity(Some(ActivityData::custom(format!("Version - {version}"))));

                    Ok(Data { pipeline })
                })
            }
        })
        .build();

    let mut client = ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("Err creating client")?;

    tokio::spawn(async move {
        if let Err(why) = client.start().await {
            error!("Client error: {why:?}");
        }
    });

    shutdown_signal().await;

    info!("Shutdown complete.");
    Ok(())
}

/// Redis when configured and reachable, otherwise an in-process cache.
async fn select_cache(config: &Config) -> CacheBackend {
    if let Some(redis_url) = &config.redis_url {
        match RedisCache::new(redis_url, config.redis_key_prefix.clone(), config.cache_ttl).await {
            Ok(cache) => {
                info!("Using redis report cache");
                return CacheBackend::Redis(cache);
            }
            Err(e) => warn!("Redis unavailable, falling back to memory cache: {e:?}"),
        }
    }

    info!(ttl_secs = config.cache_ttl.as_secs(), "Using memory report cache");
    CacheBackend::Memory(MemoryCache::new(config.cache_ttl))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::{
            select,
            signal::unix::{SignalKind, signal},
        };
        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            error!("failed to install signal handlers");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv()  => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
