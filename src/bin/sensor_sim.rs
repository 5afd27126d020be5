//! Synthetic sensor feeding a device path, FIFO or file
//!
//! Usage:
//!   sensor_sim <path>
//!
//! Environment variables: SIM_INTERVAL_SECS, SIM_MIN, SIM_MAX

use dotenv::dotenv;
use log::{error, info};
use std::env;
use tempflow::simulator::{run_simulator, SimulatorConfig};
use tokio::fs::OpenOptions;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let Some(path) = env::args().nth(1) else {
        error!("❌ Usage: sensor_sim <path>");
        std::process::exit(2);
    };

    let config = SimulatorConfig::from_env();
    info!("🚀 Sensor simulator writing to {}", path);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .append(true)
        .open(&path)
        .await?;

    tokio::select! {
        result = run_simulator(&mut file, &config, None) => {
            let written = result?;
            info!("✅ Wrote {} readings", written);
        }
        _ = tokio::signal::ctrl_c() => info!("⚠️  Received CTRL+C, stopping simulator"),
    }
    Ok(())
}
