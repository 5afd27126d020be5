//! # Read-only query service
//!
//! Serves each series as `{"data":[{"timestamp":..,"value":..},..]}`:
//! - `GET /temperatures` - raw readings
//! - `GET /avg_temp_hour` - hourly averages
//! - `GET /avg_temp_day` - daily averages
//!
//! Any other path is 404, any other method 405. Every response is JSON and
//! closes the connection. Each request opens its own read-only connection
//! to the store and drops it before the response is sent.

pub mod config;
pub mod routes;

pub use config::QueryConfig;
pub use routes::{router, serve, QueryError, QueryState, SeriesPayload};
