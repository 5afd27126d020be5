//! tempflow: tiered temperature series with a read-only query service
//!
//! Two processes share one SQLite file:
//! - the writer (`tempflow_writer`) ingests readings, computes hourly and
//!   daily averages, flushes them and enforces retention (`pipeline`)
//! - the reader (`tempflow_query`) serves each series as JSON over HTTP
//!   (`query`)

pub mod pipeline;
pub mod query;
pub mod simulator;
pub mod sqlite_pragma;
