use std::env::var;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use livesync_bridge::store::{
    SettingsStore, SqliteSettingsStore, StorageHealthGuard, SETTINGS_DB_FILE,
};
use livesync_bridge::{BridgeConfig, Hub, HubConfig, PeerRegistry};
use tracing::{error, info};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, EnvFilter};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup(cli.debug_enabled())?;

    run(cli).await
}

fn setup(debug: bool) -> Result<()> {
    let directives = match var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => value,
        _ if debug => "livesync_bridge=debug,livesync_bridge_store=debug".to_owned(),
        _ => "livesync_bridge=info,livesync_bridge_store=info".to_owned(),
    };

    registry()
        .with(EnvFilter::builder().parse(directives)?)
        .with(layer())
        .init();

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    info!("livesync-bridge starting");

    let db_path = cli.data_dir.join(SETTINGS_DB_FILE);
    let store = Arc::new(
        SqliteSettingsStore::open(&db_path)
            .with_context(|| format!("opening settings store at {}", db_path.display()))?,
    );

    let guard = StorageHealthGuard::for_database(&cli.data_dir, SETTINGS_DB_FILE);
    let health = if cli.reset {
        guard.reset(store.as_ref())
    } else {
        guard.ensure_healthy(store.as_ref())
    };
    let report = match health {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, dir = %cli.data_dir.display(), "settings store is unusable");
            return Err(err).context("settings store health check failed");
        }
    };
    if report.recovered {
        info!(removed_files = report.removed_files, "settings store recovered");
    }

    let config = BridgeConfig::load_or_default(&cli.config).await;
    info!(peers = config.peers.len(), config = %cli.config.display(), "configuration loaded");

    let store: Arc<dyn SettingsStore> = store;
    let mut hub = Hub::new(&config, store, &PeerRegistry::with_builtin(), HubConfig::default());
    hub.start().await;

    hub.run_until(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await;

    hub.stop().await;
    info!("livesync-bridge stopped");
    Ok(())
}
