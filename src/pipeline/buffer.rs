//! In-memory ingestion buffers
//!
//! One mutex-guarded queue per series. Readings wait here until the next
//! sync tick drains them into the store. The lock is only ever held for the
//! duration of a single buffer operation.

use super::types::{Reading, Series};
use chrono::{Duration, NaiveDateTime};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct IngestionBuffer {
    entries: Mutex<VecDeque<Reading>>,
}

impl IngestionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<Reading>> {
        // Entries are plain data, a panic mid-push cannot leave them torn
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, reading: Reading) {
        self.entries().push_back(reading);
    }

    /// Take every buffered reading, leaving the buffer empty
    pub fn drain_all(&self) -> Vec<Reading> {
        std::mem::take(&mut *self.entries()).into()
    }

    /// Readings with `timestamp >= cutoff`, buffer untouched
    fn snapshot_since(&self, cutoff: NaiveDateTime) -> Vec<Reading> {
        self.entries()
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .copied()
            .collect()
    }

    /// Readings within the trailing `window_secs` of `now`
    pub fn snapshot(&self, now: NaiveDateTime, window_secs: i64) -> Vec<Reading> {
        self.snapshot_since(now - Duration::seconds(window_secs))
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// The three per-series buffers of the writer process
#[derive(Debug, Default)]
pub struct SeriesBuffers {
    pub raw: IngestionBuffer,
    pub hourly_avg: IngestionBuffer,
    pub daily_avg: IngestionBuffer,
}

impl SeriesBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, series: Series) -> &IngestionBuffer {
        match series {
            Series::Raw => &self.raw,
            Series::HourlyAvg => &self.hourly_avg,
            Series::DailyAvg => &self.daily_avg,
        }
    }
}
