//! Core data types for the tiered temperature series
//!
//! Every series shares the same row shape: a second-precision wall-clock
//! timestamp (primary key) and a floating-point value.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Timestamp format stored in every table and served over HTTP
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
}

/// The three retained series
///
/// Each series maps 1:1 to a table in the store and to a resource path on
/// the query service (the table name is the resource name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    Raw,
    HourlyAvg,
    DailyAvg,
}

impl Series {
    pub fn as_str(&self) -> &'static str {
        match self {
            Series::Raw => "raw",
            Series::HourlyAvg => "hourly_avg",
            Series::DailyAvg => "daily_avg",
        }
    }

    /// Table name in the store (never user supplied)
    pub fn table(&self) -> &'static str {
        match self {
            Series::Raw => "temperatures",
            Series::HourlyAvg => "avg_temp_hour",
            Series::DailyAvg => "avg_temp_day",
        }
    }

    pub fn from_resource(resource: &str) -> Option<Self> {
        match resource {
            "temperatures" => Some(Series::Raw),
            "avg_temp_hour" => Some(Series::HourlyAvg),
            "avg_temp_day" => Some(Series::DailyAvg),
            _ => None,
        }
    }

    pub fn all() -> [Series; 3] {
        [Series::Raw, Series::HourlyAvg, Series::DailyAvg]
    }
}

impl std::fmt::Display for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped measurement held in memory before it is flushed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

impl Reading {
    /// Create a reading, truncating the timestamp to whole seconds
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self {
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            value,
        }
    }

    pub fn to_row(&self) -> SeriesRow {
        SeriesRow {
            timestamp: format_timestamp(self.timestamp),
            value: self.value,
        }
    }
}

/// A row as stored in a series table and served by the query service
///
/// The timestamp stays textual: rows read back from disk are not trusted to
/// parse, and consumers decide what to do with ones that don't.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub timestamp: String,
    pub value: f64,
}

impl SeriesRow {
    pub fn new(timestamp: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            value,
        }
    }
}
