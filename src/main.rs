//! DICE HOUSE: round-based dice wagering engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the store, resumes any active round and serves the console
//! until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use dice_house::config::{self, StorageBackend};
use dice_house::console::{self, routes::ConsoleState};
use dice_house::engine::commands::Dispatcher;
use dice_house::engine::parser::BetParser;
use dice_house::engine::House;
use dice_house::storage::{MemoryStore, SqliteStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    info!(
        house = %cfg.house.name,
        backend = ?cfg.storage.backend,
        console = cfg.console.enabled,
        "Dice house starting up"
    );

    // -- Store and house -------------------------------------------------

    let store: Arc<dyn Store> = match cfg.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory store, nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::Sqlite => Arc::new(
            SqliteStore::connect(&cfg.storage.database_url, cfg.storage.max_connections)
                .await
                .context("Failed to open SQLite store")?,
        ),
    };

    let parser = BetParser::new(&cfg.betting.symbols).context("Invalid bet symbols")?;
    let house = Arc::new(House::start(store, parser).await.context("Failed to resume house")?);

    let status = house.status().await?;
    info!(phase = %status.phase, round_id = ?status.round_id, "House ready");

    let admin_key = match config::AppConfig::resolve_env(&cfg.house.admin_key_env) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(error = %e, "No admin key configured, admin commands disabled");
            None
        }
    };
    let dispatcher = Dispatcher::new(house, admin_key, cfg.house.recent_results_limit);

    // -- Console ---------------------------------------------------------

    if cfg.console.enabled {
        let state = Arc::new(ConsoleState::new(dispatcher, cfg.house.recent_results_limit));
        console::spawn_console(state, cfg.console.port).await?;
    } else {
        info!("Console disabled");
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received. Dice house stopped.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dice_house=info"));

    let json_logging = std::env::var("DICE_HOUSE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
