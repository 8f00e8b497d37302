// Container Registry - Web Server
// REST API with Axum over the SQLite-backed registry

use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use container_registry::api::{router, AppState};
use container_registry::{init_logging, open_registry, RegistryConfig, SystemClock};

#[derive(Parser)]
#[command(name = "registry-server")]
#[command(about = "HTTP API for the container registry", long_about = None)]
struct Args {
    /// Config file (TOML); defaults apply when it does not exist
    #[arg(long, default_value = "registry.toml")]
    config: PathBuf,

    /// Overrides `server.bind`
    #[arg(long)]
    bind: Option<String>,

    /// Overrides `database.path`
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = RegistryConfig::load_or_default(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }
    init_logging(&config.log.level);

    let conn = Connection::open(&config.database.path).with_context(|| {
        format!("Failed to open database {}", config.database.path.display())
    })?;
    let registry = open_registry(&conn, Arc::new(SystemClock))?;

    let stats = registry.query().stats();
    info!(
        containers = stats.containers,
        owners = stats.owners,
        registrars = stats.registrars,
        "registry loaded from {}",
        config.database.path.display()
    );

    let app = router(AppState::with_database(registry, conn));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    println!("🚀 Container Registry API");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📍 Server: http://{}", config.server.bind);
    println!("📊 API:    http://{}/api/stats", config.server.bind);
    println!("💡 Writes need an `x-caller` header");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
