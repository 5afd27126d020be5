//! # Writer pipeline
//!
//! Turns a stream of raw sensor tokens into three durable series:
//!
//! ```text
//! ReadingSource → ingestion (validate) → raw buffer
//!                                            ↓ (hourly / daily cadence)
//!                                       windows::trailing_average → avg buffers
//!                                            ↓ (sync cadence)
//!                             scheduler::sync_all → SQLite store (insert + prune)
//! ```
//!
//! The store file is the only thing shared with the query service.
//!
//! ## Module Organization
//!
//! - `types` - Reading, Series, SeriesRow, timestamp format
//! - `clock` - Wall-clock abstraction (system and manual)
//! - `buffer` - Mutex-guarded per-series ingestion buffers
//! - `windows` - Trailing-window averages
//! - `db` - Store trait, SQLite writer store and read-only reader
//! - `scheduler` - Cadence timers and the sync tick
//! - `source` - Reading source boundary and tokenizer
//! - `ingestion` - Token validation and the main loop
//! - `config` - Environment configuration
//! - `context` - Process-wide context passed to every component

pub mod types;
pub mod clock;
pub mod buffer;
pub mod windows;
pub mod db;
pub mod scheduler;
pub mod source;
pub mod ingestion;
pub mod config;
pub mod context;

// Re-export commonly used types
pub use types::{Reading, Series, SeriesRow};
pub use clock::{Clock, ManualClock, SystemClock};
pub use buffer::{IngestionBuffer, SeriesBuffers};
pub use windows::AverageWindow;
pub use db::{ConflictPolicy, SqliteSeriesReader, SqliteStore, StoreError, TimeSeriesStore};
pub use scheduler::{Cadence, SeriesSyncReport, Synchronizer};
pub use source::{ReadingSource, TokenSource};
pub use ingestion::{run_ingestion, IngestionStats, ReadingError};
pub use config::{CadenceConfig, DeploymentMode, PipelineConfig, RetentionPolicy};
pub use context::PipelineContext;
