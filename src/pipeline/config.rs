//! Writer configuration from environment variables
//!
//! Loaded once at startup; unparseable values fall back to their default.

use super::db::ConflictPolicy;
use super::types::Series;
use super::windows::{DAY_SECS, HOUR_SECS};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Deployment mode, selects the default raw retention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Raw readings kept for 24h
    Production,
    /// Raw readings kept for 60s, for bench setups fed by the simulator
    Demo,
}

impl DeploymentMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Some(DeploymentMode::Production),
            "demo" => Some(DeploymentMode::Demo),
            _ => None,
        }
    }

    pub fn default_raw_retention_secs(&self) -> i64 {
        match self {
            DeploymentMode::Production => DAY_SECS,
            DeploymentMode::Demo => 60,
        }
    }
}

/// Per-series retention horizons, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub raw_secs: i64,
    pub hourly_avg_secs: i64,
    pub daily_avg_secs: i64,
}

impl RetentionPolicy {
    pub fn for_mode(mode: DeploymentMode) -> Self {
        Self {
            raw_secs: mode.default_raw_retention_secs(),
            hourly_avg_secs: 30 * DAY_SECS,
            daily_avg_secs: 365 * DAY_SECS,
        }
    }

    pub fn horizon_secs(&self, series: Series) -> i64 {
        match series {
            Series::Raw => self.raw_secs,
            Series::HourlyAvg => self.hourly_avg_secs,
            Series::DailyAvg => self.daily_avg_secs,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::for_mode(DeploymentMode::Production)
    }
}

/// Periods of the three independent timers, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceConfig {
    pub sync_secs: i64,
    pub hourly_avg_secs: i64,
    pub daily_avg_secs: i64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            sync_secs: 6,
            hourly_avg_secs: HOUR_SECS,
            daily_avg_secs: DAY_SECS,
        }
    }
}

/// Configuration for the writer process
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to SQLite database file
    pub db_path: String,

    pub mode: DeploymentMode,

    pub retention: RetentionPolicy,

    pub cadence: CadenceConfig,

    /// Longest wait for one token from the reading source
    pub read_timeout: Duration,

    pub conflict_policy: ConflictPolicy,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TEMPFLOW_DB_PATH` (default: temperature.db)
    /// - `TEMPFLOW_MODE` (default: production; `demo` keeps raw rows 60s)
    /// - `RAW_RETENTION_SECS` (default: per mode)
    /// - `HOURLY_RETENTION_SECS` (default: 30 days)
    /// - `DAILY_RETENTION_SECS` (default: 365 days)
    /// - `SYNC_INTERVAL_SECS` (default: 6)
    /// - `HOURLY_AVG_INTERVAL_SECS` (default: 3600)
    /// - `DAILY_AVG_INTERVAL_SECS` (default: 86400)
    /// - `SOURCE_READ_TIMEOUT_MS` (default: 1000)
    /// - `STORE_CONFLICT_POLICY` (default: upsert)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = match lookup("TEMPFLOW_MODE") {
            Some(raw) => DeploymentMode::parse(&raw).unwrap_or_else(|| {
                log::warn!("⚠️  Invalid TEMPFLOW_MODE '{}', using production", raw);
                DeploymentMode::Production
            }),
            None => DeploymentMode::Production,
        };
        let defaults = RetentionPolicy::for_mode(mode);
        let cadence_defaults = CadenceConfig::default();

        let retention = RetentionPolicy {
            raw_secs: parse_or(&lookup, "RAW_RETENTION_SECS", defaults.raw_secs),
            hourly_avg_secs: parse_or(&lookup, "HOURLY_RETENTION_SECS", defaults.hourly_avg_secs),
            daily_avg_secs: parse_or(&lookup, "DAILY_RETENTION_SECS", defaults.daily_avg_secs),
        };

        // A zero or negative period would fire on every loop iteration
        let cadence = CadenceConfig {
            sync_secs: parse_or(&lookup, "SYNC_INTERVAL_SECS", cadence_defaults.sync_secs).max(1),
            hourly_avg_secs: parse_or(
                &lookup,
                "HOURLY_AVG_INTERVAL_SECS",
                cadence_defaults.hourly_avg_secs,
            )
            .max(1),
            daily_avg_secs: parse_or(
                &lookup,
                "DAILY_AVG_INTERVAL_SECS",
                cadence_defaults.daily_avg_secs,
            )
            .max(1),
        };

        let conflict_policy = match lookup("STORE_CONFLICT_POLICY") {
            Some(raw) => ConflictPolicy::parse(&raw).unwrap_or_else(|| {
                log::warn!("⚠️  Invalid STORE_CONFLICT_POLICY '{}', using upsert", raw);
                ConflictPolicy::Upsert
            }),
            None => ConflictPolicy::Upsert,
        };

        Self {
            db_path: lookup("TEMPFLOW_DB_PATH").unwrap_or_else(|| "temperature.db".to_string()),
            mode,
            retention,
            cadence,
            read_timeout: Duration::from_millis(parse_or(&lookup, "SOURCE_READ_TIMEOUT_MS", 1_000)),
            conflict_policy,
        }
    }
}

/// Parse `key` through `lookup`, logging and falling back on bad input
pub(crate) fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("⚠️  Invalid {} '{}', using default {:?}", key, raw, default);
            default
        }),
        None => default,
    }
}
