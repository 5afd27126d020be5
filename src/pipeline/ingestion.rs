//! Writer main loop: read, validate, buffer, aggregate, sync
//!
//! Single task, strictly sequential per iteration:
//! 1. wait for one token (bounded by the read timeout)
//! 2. validate it and append the reading to the raw buffer
//! 3. let the synchronizer run whatever cadence is due
//!
//! A timeout is an absent reading, never an exit. The loop only ends when
//! the source is exhausted, after a final flush.

use super::context::PipelineContext;
use super::scheduler::{log_sync_reports, sync_all, Synchronizer};
use super::source::ReadingSource;
use super::types::Reading;
use std::time::Duration;
use tokio::time::timeout;

/// Why a token was not accepted as a reading
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingError {
    Empty,
    ContainsNull,
    InvalidCharacter(char),
    Unparseable(String),
    /// Digits only, but too large for a finite `f64`
    OutOfRange(String),
}

impl std::fmt::Display for ReadingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadingError::Empty => write!(f, "Empty token"),
            ReadingError::ContainsNull => write!(f, "Token contains null bytes"),
            ReadingError::InvalidCharacter(c) => write!(f, "Invalid character {:?}", c),
            ReadingError::Unparseable(t) => write!(f, "Not a decimal number: {:?}", t),
            ReadingError::OutOfRange(t) => write!(f, "Value out of range: {} bytes", t.len()),
        }
    }
}

impl std::error::Error for ReadingError {}

/// Validate a raw token and parse it as a decimal value
///
/// Accepted tokens are non-empty, null-free and made only of ASCII digits,
/// `.` and `-`.
pub fn parse_reading(token: &str) -> Result<f64, ReadingError> {
    if token.is_empty() {
        return Err(ReadingError::Empty);
    }
    if token.contains('\0') {
        return Err(ReadingError::ContainsNull);
    }
    if let Some(c) = token
        .chars()
        .find(|c| !(c.is_ascii_digit() || *c == '.' || *c == '-'))
    {
        return Err(ReadingError::InvalidCharacter(c));
    }

    let value = token
        .parse::<f64>()
        .map_err(|_| ReadingError::Unparseable(token.to_string()))?;
    if !value.is_finite() {
        return Err(ReadingError::OutOfRange(token.to_string()));
    }
    Ok(value)
}

/// Counters for one run of the loop
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    pub accepted: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub read_errors: u64,
    pub sync_ticks: u64,
}

/// Validate `token` and buffer it as a raw reading stamped with the
/// context's clock
pub fn ingest_token(ctx: &PipelineContext, token: &str) -> Result<Reading, ReadingError> {
    let value = parse_reading(token)?;
    let reading = Reading::new(ctx.clock.now(), value);
    ctx.buffers.raw.append(reading);
    Ok(reading)
}

/// Run the writer loop until `source` is exhausted
pub async fn run_ingestion<S>(
    source: &mut S,
    ctx: &PipelineContext,
    synchronizer: &mut Synchronizer,
    read_timeout: Duration,
) -> IngestionStats
where
    S: ReadingSource + ?Sized,
{
    log::info!("🚀 Starting ingestion (read timeout: {}ms)", read_timeout.as_millis());
    let mut stats = IngestionStats::default();

    loop {
        match timeout(read_timeout, source.next_token()).await {
            Ok(Ok(Some(token))) => match ingest_token(ctx, &token) {
                Ok(reading) => {
                    stats.accepted += 1;
                    log::debug!("Got: {}", reading.value);
                }
                Err(e) => {
                    stats.rejected += 1;
                    log::warn!("⚠️  Dropped token {:?}: {}", token, e);
                }
            },
            Ok(Ok(None)) => {
                log::warn!("⚠️  Reading source exhausted, stopping ingestion");
                break;
            }
            Ok(Err(e)) => {
                stats.read_errors += 1;
                log::error!("❌ Reading source error: {}", e);
                // Keep the loop bounded by the read timeout even if the
                // source fails instantly every time
                tokio::time::sleep(read_timeout).await;
            }
            Err(_) => {
                stats.timeouts += 1;
                log::debug!("No reading within {}ms", read_timeout.as_millis());
            }
        }

        if let Some(reports) = synchronizer.poll(ctx) {
            stats.sync_ticks += 1;
            log_sync_reports(&reports);
        }
    }

    log::info!("🔄 Performing final flush...");
    let reports = sync_all(ctx, ctx.clock.now());
    log_sync_reports(&reports);

    log::info!(
        "✅ Ingestion stopped ({} accepted, {} rejected, {} timeouts)",
        stats.accepted,
        stats.rejected,
        stats.timeouts
    );
    stats
}
