use anyhow::{Context, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use guild_jukebox::{
    audio::{PlaybackController, SongbirdSink},
    bot::{JukeboxBot, PremiumGuilds},
    config::Config,
    sources::YtDlpResolver,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .thread_name("jukebox-rt")
        .build()
        .context("failed to build tokio runtime")?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return runtime.block_on(health_check(&config));
    }

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    let resolver = Arc::new(YtDlpResolver::new(
        config.ytdlp_path.clone(),
        config.ytdlp_cookies.clone(),
        config.resolve_timeout(),
    ));
    match resolver.version().await {
        Ok(version) => info!("📦 yt-dlp {}", version),
        Err(e) => error!("❌ yt-dlp not usable, every song will fail to resolve: {:?}", e),
    }

    let songbird = Songbird::serenity();
    let sink = Arc::new(SongbirdSink::new(songbird.clone()));

    let controller = Arc::new(
        PlaybackController::new(resolver, sink, config.session_defaults()).with_entitlements(
            Arc::new(PremiumGuilds::new(config.premium_guilds.clone())),
        ),
    );
    let reaper = controller.spawn_reaper(config.reaper_interval(), config.idle_timeout());

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = JukeboxBot::new(config.clone(), controller.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    let shutdown_controller = controller.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        shutdown_controller.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    reaper.abort();
    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let resolver = YtDlpResolver::new(
        config.ytdlp_path.clone(),
        config.ytdlp_cookies.clone(),
        config.resolve_timeout(),
    );
    let version = resolver.version().await?;
    println!("OK (yt-dlp {version})");
    Ok(())
}
