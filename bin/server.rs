// Shopping List Engine - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shopping_list::api::{router, AppState};
use shopping_list::{open_database, AppConfig, ShoppingListService};

#[derive(Parser)]
#[command(name = "shopping-server")]
#[command(about = "HTTP API for the shopping-list engine")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database (overrides storage.database_path)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Listen address (overrides server.bind_addr)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    let db_path = args.db.unwrap_or_else(|| config.storage.database_path.clone());
    let conn = open_database(&db_path)?;
    info!(path = %db_path.display(), "database opened");

    let state = AppState::new(conn, ShoppingListService::from_config(&config));
    let app = router(state).layer(CorsLayer::permissive());

    let addr = args.bind.unwrap_or_else(|| config.server.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "🚀 server running, API under /api");

    axum::serve(listener, app)
        .await
        .context("Server stopped with an error")?;
    Ok(())
}
