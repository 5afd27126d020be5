//! Query service: read-only JSON view of the writer's database
//!
//! Environment variables:
//!   TEMPFLOW_DB_PATH - SQLite database path (default: temperature.db)
//!   QUERY_BIND_ADDR - listen address (default: 0.0.0.0:8080)
//!   QUERY_BUSY_TIMEOUT_MS - wait on a locked database (default: 5000)

use dotenv::dotenv;
use log::{error, info};
use tempflow::pipeline::SqliteSeriesReader;
use tempflow::query::{serve, QueryConfig, QueryState};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = QueryConfig::from_env();
    info!("🚀 Temperature query service");
    info!("   ├─ Database: {}", config.db_path);
    info!("   └─ Bind: {}", config.bind_addr);

    // Fail at startup rather than on the first request
    if let Err(e) = SqliteSeriesReader::open(&config.db_path, config.busy_timeout) {
        error!("❌ Cannot open database {}: {}", config.db_path, e);
        return Err(e.into());
    }

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let state = QueryState::new(&config.db_path, config.busy_timeout);

    tokio::select! {
        result = serve(listener, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("⚠️  Received CTRL+C, shutting down..."),
    }

    info!("✅ Query service stopped");
    Ok(())
}
