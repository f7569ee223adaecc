//! Turnkeep Game Server
//!
//! Loads configuration, opens the snapshot store and serves WebSocket clients
//! until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use turnkeep::{
    config::{DatabaseConfig, ServerConfig},
    network::{GameServer, SessionManager},
    persistence::{Database, MemoryStore, RetentionPolicy, SnapshotStore, SqliteStore},
    VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("Failed to read .env");
        }
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    let config = ServerConfig::from_env().context("Invalid configuration")?;
    info!("Turnkeep Server v{}", VERSION);
    info!("Server id: {}", config.server_id);

    let store: Arc<dyn SnapshotStore> = match &config.database {
        DatabaseConfig::Memory => {
            warn!("Using in-memory storage; games are lost on restart");
            Arc::new(MemoryStore::new())
        }
        DatabaseConfig::Sqlite(path) => Arc::new(
            SqliteStore::open(path).with_context(|| format!("Failed to open database {}", path.display()))?,
        ),
    };

    let policy = RetentionPolicy {
        max_game_days: config.max_game_days,
    };
    let db = Arc::new(Database::new(store, policy));
    match db.purge_configured().await {
        Ok(purged) if !purged.is_empty() => info!("Purged {} stale games at startup", purged.len()),
        Ok(_) => {}
        Err(e) => warn!("Startup purge failed: {}", e),
    }

    let sessions = Arc::new(SessionManager::new(db));
    let server = Arc::new(GameServer::new(config, sessions));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
