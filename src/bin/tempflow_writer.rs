//! Writer process: sensor channel -> buffers -> SQLite
//!
//! Usage:
//!   tempflow_writer <device-path | ->
//!
//! `-` reads tokens from stdin. See `PipelineConfig::from_env` for the
//! environment variables.

use dotenv::dotenv;
use log::{error, info};
use std::env;
use std::sync::Arc;
use tempflow::pipeline::scheduler::{log_sync_reports, sync_all};
use tempflow::pipeline::{
    run_ingestion, Clock, PipelineConfig, PipelineContext, ReadingSource, SqliteStore,
    Synchronizer, SystemClock, TokenSource,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let Some(device) = env::args().nth(1) else {
        error!("❌ Usage: tempflow_writer <device-path | ->");
        std::process::exit(2);
    };

    let config = PipelineConfig::from_env();

    info!("🚀 Temperature writer");
    info!("   ├─ Source: {}", device);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Mode: {:?}", config.mode);
    info!(
        "   ├─ Retention (s): raw={} hourly={} daily={}",
        config.retention.raw_secs, config.retention.hourly_avg_secs, config.retention.daily_avg_secs
    );
    info!(
        "   ├─ Cadence (s): sync={} hourly={} daily={}",
        config.cadence.sync_secs, config.cadence.hourly_avg_secs, config.cadence.daily_avg_secs
    );
    info!("   └─ Conflict policy: {}", config.conflict_policy.as_str());

    let mut source: Box<dyn ReadingSource> = if device == "-" {
        Box::new(TokenSource::new(tokio::io::stdin()))
    } else {
        match TokenSource::open(&device).await {
            Ok(source) => Box::new(source),
            Err(e) => {
                error!("❌ Cannot open {}: {}", device, e);
                return Err(e.into());
            }
        }
    };

    let store = SqliteStore::open(&config.db_path, config.conflict_policy)?;
    info!("✅ Database initialized");

    let clock = Arc::new(SystemClock);
    let ctx = PipelineContext::new(Arc::new(store), clock.clone(), config.retention);
    let mut synchronizer = Synchronizer::new(&config.cadence, clock.now());

    tokio::select! {
        stats = run_ingestion(source.as_mut(), &ctx, &mut synchronizer, config.read_timeout) => {
            info!("📊 Final stats: {:?}", stats);
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("❌ Failed to listen for CTRL+C: {}", e);
            }
            info!("⚠️  Received CTRL+C, flushing buffers...");
            log_sync_reports(&sync_all(&ctx, ctx.clock.now()));
        }
    }

    info!("✅ Writer stopped");
    Ok(())
}
