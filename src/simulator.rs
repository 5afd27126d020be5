//! Synthetic sensor: writes random temperature readings to a byte sink
//!
//! Stands in for the real device when testing the writer, e.g. with a FIFO:
//!
//! ```text
//! mkfifo /tmp/sensor
//! sensor_sim /tmp/sensor &
//! tempflow_writer /tmp/sensor
//! ```

use crate::pipeline::config::parse_or;
use rand::Rng;
use std::env;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub interval: Duration,
    pub min: f64,
    pub max: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            min: 20.0,
            max: 30.0,
        }
    }
}

impl SimulatorConfig {
    /// Environment variables:
    /// - `SIM_INTERVAL_SECS` (default: 10)
    /// - `SIM_MIN` (default: 20.0)
    /// - `SIM_MAX` (default: 30.0)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let interval_secs = parse_or(&lookup, "SIM_INTERVAL_SECS", defaults.interval.as_secs());
        let min = parse_or(&lookup, "SIM_MIN", defaults.min);
        let max = parse_or(&lookup, "SIM_MAX", defaults.max);

        let (min, max) = if min.is_finite() && max.is_finite() && min <= max {
            (min, max)
        } else {
            log::warn!(
                "⚠️  Invalid range [{}, {}], using [{}, {}]",
                min,
                max,
                defaults.min,
                defaults.max
            );
            (defaults.min, defaults.max)
        };

        Self {
            interval: Duration::from_secs(interval_secs),
            min,
            max,
        }
    }
}

/// Uniform value in `[min, max]` rounded to one decimal
pub fn random_reading<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    let value = rng.gen_range(min..=max);
    (value * 10.0).round() / 10.0
}

/// Write one newline-terminated reading per interval
///
/// Stops after `limit` readings when given, otherwise runs until the sink
/// fails. Returns the number of readings written.
pub async fn run_simulator<W>(
    writer: &mut W,
    config: &SimulatorConfig,
    limit: Option<u64>,
) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    log::info!(
        "🌡️  Simulating readings in [{}, {}] every {}s",
        config.min,
        config.max,
        config.interval.as_secs()
    );

    let mut written = 0u64;
    loop {
        if limit.is_some_and(|limit| written >= limit) {
            break;
        }

        // ThreadRng is not Send; keep it out of the await points
        let value = random_reading(&mut rand::thread_rng(), config.min, config.max);
        writer.write_all(format!("{:.1}\n", value).as_bytes()).await?;
        writer.flush().await?;
        written += 1;
        log::debug!("Sent: {:.1}", value);

        if limit.is_some_and(|limit| written >= limit) {
            break;
        }
        tokio::time::sleep(config.interval).await;
    }

    Ok(written)
}
