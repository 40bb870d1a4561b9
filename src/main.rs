//! Snake Arena Server
//!
//! Authoritative multiplayer server for Snake Arena.

use std::sync::Arc;
use tracing::{info, error};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use snake_arena::{
    VERSION,
    config::ServerConfig,
    network::GameServer,
    persistence::{JsonLinesRecorder, LogRecorder, MatchRecorder},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::from_env()?;

    info!("Snake Arena Server v{}", VERSION);
    info!("Tick Rate: {} Hz", config.room.tick_rate);
    info!(
        "Rooms: capacity {}, reset after {}s",
        config.room.capacity,
        config.room.reset_cooldown.as_secs()
    );

    let recorder: Arc<dyn MatchRecorder> = match &config.match_log {
        Some(path) => {
            info!("Recording matches to {}", path.display());
            Arc::new(JsonLinesRecorder::open(path)?)
        }
        None => Arc::new(LogRecorder),
    };

    let server = Arc::new(GameServer::new(config, recorder));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
