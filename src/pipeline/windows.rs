//! Trailing-window averages over the raw series
//!
//! The raw series is split between the store (already flushed) and the raw
//! ingestion buffer (not yet flushed). Flushing moves readings from one to
//! the other in a single step of the writer loop, so an average never double
//! counts or misses a reading because of where the flush boundary fell.
//!
//! Only readings still within the raw retention horizon can be averaged.
//! When raw retention is shorter than the window (60s in demo mode against
//! a 1h window) the average covers the retained tail only.
//!
//! Windows are half-open, `(now - window, now]`, so a reading stamped at one
//! firing belongs to that average and not to the next one.
//!
//! No qualifying readings yields `None`; callers record nothing for that
//! window rather than a fake 0.0.

use super::buffer::IngestionBuffer;
use super::db::{StoreError, TimeSeriesStore};
use super::types::{format_timestamp, parse_timestamp, Series, SeriesRow};
use chrono::{Duration, NaiveDateTime};

pub const HOUR_SECS: i64 = 60 * 60;
pub const DAY_SECS: i64 = 24 * HOUR_SECS;

/// Derived-average windows and the series each one feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AverageWindow {
    Hour,
    Day,
}

impl AverageWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            AverageWindow::Hour => "1h",
            AverageWindow::Day => "1d",
        }
    }

    pub fn duration_secs(&self) -> i64 {
        match self {
            AverageWindow::Hour => HOUR_SECS,
            AverageWindow::Day => DAY_SECS,
        }
    }

    pub fn target_series(&self) -> Series {
        match self {
            AverageWindow::Hour => Series::HourlyAvg,
            AverageWindow::Day => Series::DailyAvg,
        }
    }

    pub fn all() -> [AverageWindow; 2] {
        [AverageWindow::Hour, AverageWindow::Day]
    }
}

/// Mean of the rows whose timestamp is `> cutoff`
///
/// Rows with an unparseable timestamp are logged and skipped; one corrupt
/// row never invalidates the rest.
pub fn average_after<'a, I>(rows: I, cutoff: NaiveDateTime) -> Option<f64>
where
    I: IntoIterator<Item = &'a SeriesRow>,
{
    let mut sum = 0.0;
    let mut count = 0usize;

    for row in rows {
        let timestamp = match parse_timestamp(&row.timestamp) {
            Ok(ts) => ts,
            Err(e) => {
                log::warn!(
                    "⚠️  Skipping row with unparseable timestamp {:?}: {}",
                    row.timestamp,
                    e
                );
                continue;
            }
        };

        if timestamp > cutoff {
            sum += row.value;
            count += 1;
        }
    }

    (count > 0).then(|| sum / count as f64)
}

/// Average of the raw series over the trailing `window_secs` ending at `now`
///
/// Reads flushed rows from the store and pending rows from the raw buffer.
pub fn trailing_average(
    store: &dyn TimeSeriesStore,
    raw_buffer: &IngestionBuffer,
    now: NaiveDateTime,
    window_secs: i64,
) -> Result<Option<f64>, StoreError> {
    let cutoff = now - Duration::seconds(window_secs);

    let flushed = store.query_after(Series::Raw, &format_timestamp(cutoff))?;
    let pending: Vec<SeriesRow> = raw_buffer
        .snapshot(now, window_secs)
        .iter()
        .map(|r| r.to_row())
        .collect();

    Ok(average_after(flushed.iter().chain(pending.iter()), cutoff))
}
