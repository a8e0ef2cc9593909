use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

#[cfg(test)]
mod testing;

use crate::audio::{
    player::PlayerSettings,
    registry::PlayerRegistry,
    source::{sweep_scratch_dir, YtDlpProvider},
};
use crate::bot::MusicBot;
use crate::config::Config;
use crate::sources::{ytdlp::YtDlpClient, MediaExtractor, TrackResolver, WorkerPool};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("music_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Music Bot v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let pool = WorkerPool::new(config.worker_threads);
    let ytdlp = Arc::new(YtDlpClient::new(config.ytdlp_path.clone(), pool.clone()));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&ytdlp).await;
    }

    // Leftovers from a run that did not shut down cleanly
    let scratch = config.cache_dir.clone();
    match pool.blocking(move || sweep_scratch_dir(&scratch)).await {
        Ok(Ok(0)) => {}
        Ok(Ok(removed)) => info!("🧹 Removed {} stale scratch file(s)", removed),
        Ok(Err(e)) | Err(e) => warn!("Could not sweep scratch directory: {}", e),
    }

    let extractor: Arc<dyn MediaExtractor> = ytdlp;
    let resolver = Arc::new(TrackResolver::new(extractor.clone(), config.max_playlist_size));
    let provider = Arc::new(YtDlpProvider::new(
        extractor,
        config.source_mode,
        config.cache_dir.clone(),
        config.regather_after,
    ));
    let registry = PlayerRegistry::new(resolver, provider, PlayerSettings::from(config.as_ref()));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = MusicBot::new(config.clone(), registry.clone());
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(ytdlp: &YtDlpClient) -> Result<()> {
    let version = ytdlp.version().await?;
    info!("yt-dlp {}", version);
    println!("OK");
    Ok(())
}
