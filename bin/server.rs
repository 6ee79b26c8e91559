// Nearby POI - Web Server
// REST API with Axum over the proximity engine

use anyhow::{Context, Result};
use clap::Parser;
use nearby_poi::api::{router, AppState};
use nearby_poi::{init_tracing, ProximityEngine, StoreConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nearby-server", about = "Nearby POI HTTP server", version)]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "NEARBY_BIND", default_value = "0.0.0.0:8000")]
    bind: String,

    /// SQLite store path (overrides DB_PATH / DB_PATH_FILE)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = ServerArgs::parse();

    let mut config = StoreConfig::from_env().context("Failed to build store configuration")?;
    if let Some(db) = args.db {
        config.database_path = db;
    }

    // One engine per process, handed to handlers through state
    let engine = ProximityEngine::from_config(&config)?;
    let startup = engine.clone();
    let liveness = tokio::task::spawn_blocking(move || startup.probe_liveness()).await?;
    if !liveness.is_ok() {
        tracing::warn!(?liveness, "store not reachable at startup; serving degraded");
    }

    let app = router(AppState { engine });

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", args.bind))?;

    tracing::info!(
        bind = %args.bind,
        db = %config.database_path.display(),
        pool_size = config.pool_size,
        max_overflow = config.max_overflow,
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    tracing::info!("server stopped; pool drained");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
