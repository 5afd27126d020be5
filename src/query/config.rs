//! Query service configuration from environment variables

use crate::pipeline::config::parse_or;
use crate::sqlite_pragma::DEFAULT_BUSY_TIMEOUT;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Path to the SQLite file written by the writer process
    pub db_path: String,

    pub bind_addr: String,

    /// How long a request waits on a locked database
    pub busy_timeout: Duration,
}

impl QueryConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TEMPFLOW_DB_PATH` (default: temperature.db)
    /// - `QUERY_BIND_ADDR` (default: 0.0.0.0:8080)
    /// - `QUERY_BUSY_TIMEOUT_MS` (default: 5000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_timeout = DEFAULT_BUSY_TIMEOUT.as_millis() as u64;
        Self {
            db_path: lookup("TEMPFLOW_DB_PATH").unwrap_or_else(|| "temperature.db".to_string()),
            bind_addr: lookup("QUERY_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            busy_timeout: Duration::from_millis(parse_or(
                &lookup,
                "QUERY_BUSY_TIMEOUT_MS",
                default_timeout,
            )),
        }
    }
}
