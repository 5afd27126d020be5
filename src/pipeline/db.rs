//! Persistent store for the three series
//!
//! Tables (one per series, identical schema):
//! - `temperatures` - raw readings
//! - `avg_temp_hour` - hourly averages
//! - `avg_temp_day` - daily averages
//!
//! Schema: `(timestamp TEXT PRIMARY KEY, value REAL)`, created idempotently
//! on first open. Table names come from the closed `Series` enum; every
//! value is bound as a statement parameter.

use super::types::{format_timestamp, Series, SeriesRow};
use crate::sqlite_pragma::{apply_optimized_pragmas, apply_reader_pragmas};
use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub enum StoreError {
    /// A row with this timestamp already exists (reject policy only)
    Conflict { series: Series, timestamp: String },
    /// The database could not be opened, read or written
    Unavailable(rusqlite::Error),
    Io(std::io::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict { series, timestamp } => {
                write!(f, "Duplicate timestamp {} in {}", timestamp, series.table())
            }
            StoreError::Unavailable(e) => write!(f, "Storage unavailable: {}", e),
            StoreError::Io(e) => write!(f, "Storage unavailable (IO): {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// What to do when an insert hits an existing timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Last write wins
    #[default]
    Upsert,
    /// Keep the existing row, report `StoreError::Conflict`
    Reject,
}

impl ConflictPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "upsert" => Some(ConflictPolicy::Upsert),
            "reject" => Some(ConflictPolicy::Reject),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Upsert => "upsert",
            ConflictPolicy::Reject => "reject",
        }
    }
}

/// Append/prune/query access to the series tables
///
/// Each call is independent: a failure leaves previously committed rows
/// untouched and does not affect later calls.
pub trait TimeSeriesStore: Send + Sync {
    /// Insert one row into a series table
    fn insert(&self, series: Series, row: &SeriesRow) -> Result<(), StoreError>;

    /// Delete rows with `timestamp < now - max_age_secs`, returns rows deleted
    fn prune(
        &self,
        series: Series,
        now: NaiveDateTime,
        max_age_secs: i64,
    ) -> Result<usize, StoreError>;

    /// Every row of a series, ordered by timestamp
    fn query_all(&self, series: Series) -> Result<Vec<SeriesRow>, StoreError>;

    /// Rows with `timestamp > after`, ordered by timestamp
    fn query_after(&self, series: Series, after: &str) -> Result<Vec<SeriesRow>, StoreError>;
}

/// Create all series tables (IF NOT EXISTS)
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    let ddl: String = Series::all()
        .iter()
        .map(|s| {
            format!(
                "CREATE TABLE IF NOT EXISTS {} (timestamp TEXT PRIMARY KEY, value REAL);\n",
                s.table()
            )
        })
        .collect();
    conn.execute_batch(&ddl)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<SeriesRow> {
    Ok(SeriesRow {
        timestamp: row.get(0)?,
        value: row.get(1)?,
    })
}

fn select_rows(
    conn: &Connection,
    series: Series,
    after: Option<&str>,
) -> rusqlite::Result<Vec<SeriesRow>> {
    match after {
        Some(cutoff) => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT timestamp, value FROM {} WHERE timestamp > ?1 ORDER BY timestamp ASC",
                series.table()
            ))?;
            let rows = stmt
                .query_map([cutoff], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        }
        None => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT timestamp, value FROM {} ORDER BY timestamp ASC",
                series.table()
            ))?;
            let rows = stmt
                .query_map([], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        }
    }
}

/// Writer-side SQLite store
///
/// Holds the single read-write connection of the writer process behind a
/// mutex; the lock is held for one statement at a time.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    policy: ConflictPolicy,
}

impl SqliteStore {
    /// Open (or create) the store file and ensure the schema exists
    pub fn open(db_path: impl AsRef<Path>, policy: ConflictPolicy) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;
        init_schema(&conn)?;

        log::info!(
            "✅ Store ready at {} (WAL, conflict policy: {})",
            db_path.display(),
            policy.as_str()
        );

        Ok(Self {
            conn: Mutex::new(conn),
            policy,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimeSeriesStore for SqliteStore {
    fn insert(&self, series: Series, row: &SeriesRow) -> Result<(), StoreError> {
        let conn = self.conn();
        let sql = match self.policy {
            ConflictPolicy::Upsert => format!(
                "INSERT INTO {} (timestamp, value) VALUES (?1, ?2)
                 ON CONFLICT(timestamp) DO UPDATE SET value = excluded.value",
                series.table()
            ),
            ConflictPolicy::Reject => format!(
                "INSERT INTO {} (timestamp, value) VALUES (?1, ?2)",
                series.table()
            ),
        };

        let mut stmt = conn.prepare_cached(&sql)?;
        match stmt.execute(params![row.timestamp, row.value]) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict {
                    series,
                    timestamp: row.timestamp.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn prune(
        &self,
        series: Series,
        now: NaiveDateTime,
        max_age_secs: i64,
    ) -> Result<usize, StoreError> {
        let cutoff = format_timestamp(now - Duration::seconds(max_age_secs));
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE timestamp < ?1",
            series.table()
        ))?;
        Ok(stmt.execute([cutoff])?)
    }

    fn query_all(&self, series: Series) -> Result<Vec<SeriesRow>, StoreError> {
        Ok(select_rows(&self.conn(), series, None)?)
    }

    fn query_after(&self, series: Series, after: &str) -> Result<Vec<SeriesRow>, StoreError> {
        Ok(select_rows(&self.conn(), series, Some(after))?)
    }
}

/// Read-only view of the store for the query service
///
/// Opened per request and dropped with it. The file must already exist; the
/// reader never creates or migrates it.
pub struct SqliteSeriesReader {
    conn: Connection,
}

impl SqliteSeriesReader {
    pub fn open(
        db_path: impl AsRef<Path>,
        busy_timeout: std::time::Duration,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        apply_reader_pragmas(&conn, busy_timeout)?;
        Ok(Self { conn })
    }

    /// Full series inside one read transaction
    pub fn query_all(&mut self, series: Series) -> Result<Vec<SeriesRow>, StoreError> {
        let tx = self.conn.transaction()?;
        let rows = select_rows(&tx, series, None)?;
        tx.commit()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::parse_timestamp;
    use tempfile::{tempdir, TempDir};

    fn open_store(policy: ConflictPolicy) -> (TempDir, std::path::PathBuf, SqliteStore) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("temperature.db");
        let store = SqliteStore::open(&db_path, policy).unwrap();
        (dir, db_path, store)
    }

    fn now() -> NaiveDateTime {
        parse_timestamp("2024-01-02 00:00:00").unwrap()
    }

    #[test]
    fn test_schema_creation_is_idempotent() {
        let (_dir, db_path, store) = open_store(ConflictPolicy::Upsert);
        store
            .insert(Series::Raw, &SeriesRow::new("2024-01-01 00:00:00", 21.5))
            .unwrap();
        drop(store);

        // Reopening must neither fail nor wipe data
        let store = SqliteStore::open(&db_path, ConflictPolicy::Upsert).unwrap();
        assert_eq!(store.query_all(Series::Raw).unwrap().len(), 1);

        let conn = Connection::open(&db_path).unwrap();
        let mut tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        tables.sort();
        assert_eq!(tables, vec!["avg_temp_day", "avg_temp_hour", "temperatures"]);
    }

    #[test]
    fn test_query_all_ordered_by_timestamp() {
        let (_dir, _path, store) = open_store(ConflictPolicy::Upsert);
        store
            .insert(Series::HourlyAvg, &SeriesRow::new("2024-01-01 01:00:00", 22.0))
            .unwrap();
        store
            .insert(Series::HourlyAvg, &SeriesRow::new("2024-01-01 00:00:00", 21.5))
            .unwrap();

        let rows = store.query_all(Series::HourlyAvg).unwrap();
        assert_eq!(
            rows,
            vec![
                SeriesRow::new("2024-01-01 00:00:00", 21.5),
                SeriesRow::new("2024-01-01 01:00:00", 22.0),
            ]
        );
        assert!(store.query_all(Series::Raw).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_last_write_wins() {
        let (_dir, _path, store) = open_store(ConflictPolicy::Upsert);
        let ts = "2024-01-01 00:00:00";
        store.insert(Series::Raw, &SeriesRow::new(ts, 21.0)).unwrap();
        store.insert(Series::Raw, &SeriesRow::new(ts, 23.0)).unwrap();

        let rows = store.query_all(Series::Raw).unwrap();
        assert_eq!(rows, vec![SeriesRow::new(ts, 23.0)]);
    }

    #[test]
    fn test_reject_policy_reports_conflict() {
        let (_dir, _path, store) = open_store(ConflictPolicy::Reject);
        let ts = "2024-01-01 00:00:00";
        store.insert(Series::Raw, &SeriesRow::new(ts, 21.0)).unwrap();

        let err = store.insert(Series::Raw, &SeriesRow::new(ts, 23.0)).unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("temperatures"));

        // First row kept
        assert_eq!(
            store.query_all(Series::Raw).unwrap(),
            vec![SeriesRow::new(ts, 21.0)]
        );
    }

    #[test]
    fn test_prune_removes_exactly_older_rows() {
        let (_dir, _path, store) = open_store(ConflictPolicy::Upsert);
        // Horizon 3600s at 2024-01-02 00:00:00 => cutoff 2024-01-01 23:00:00
        for (ts, v) in [
            ("2024-01-01 21:00:00", 1.0),
            ("2024-01-01 22:59:59", 2.0),
            ("2024-01-01 23:00:00", 3.0),
            ("2024-01-01 23:30:00", 4.0),
        ] {
            store.insert(Series::Raw, &SeriesRow::new(ts, v)).unwrap();
        }

        let deleted = store.prune(Series::Raw, now(), 3600).unwrap();
        assert_eq!(deleted, 2);

        let remaining: Vec<f64> = store
            .query_all(Series::Raw)
            .unwrap()
            .into_iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(remaining, vec![3.0, 4.0]);

        // Second prune with no inserts deletes nothing
        assert_eq!(store.prune(Series::Raw, now(), 3600).unwrap(), 0);
    }

    #[test]
    fn test_prune_only_touches_its_series() {
        let (_dir, _path, store) = open_store(ConflictPolicy::Upsert);
        let old = SeriesRow::new("2020-01-01 00:00:00", 1.0);
        store.insert(Series::Raw, &old).unwrap();
        store.insert(Series::DailyAvg, &old).unwrap();

        assert_eq!(store.prune(Series::Raw, now(), 60).unwrap(), 1);
        assert_eq!(store.query_all(Series::DailyAvg).unwrap().len(), 1);
    }

    #[test]
    fn test_query_after_excludes_boundary() {
        let (_dir, _path, store) = open_store(ConflictPolicy::Upsert);
        for (ts, value) in [
            ("2024-01-01 00:00:00", 1.0),
            ("2024-01-01 00:00:10", 2.0),
            ("2024-01-01 00:00:20", 3.0),
        ] {
            store.insert(Series::Raw, &SeriesRow::new(ts, value)).unwrap();
        }

        let rows = store
            .query_after(Series::Raw, "2024-01-01 00:00:10")
            .unwrap();
        assert_eq!(rows, vec![SeriesRow::new("2024-01-01 00:00:20", 3.0)]);
    }

    #[test]
    fn test_reader_sees_committed_rows_while_writer_open() {
        let (_dir, db_path, store) = open_store(ConflictPolicy::Upsert);
        store
            .insert(Series::Raw, &SeriesRow::new("2024-01-01 00:00:00", 21.5))
            .unwrap();

        let mut reader =
            SqliteSeriesReader::open(&db_path, std::time::Duration::from_secs(1)).unwrap();
        assert_eq!(reader.query_all(Series::Raw).unwrap().len(), 1);

        store
            .insert(Series::Raw, &SeriesRow::new("2024-01-01 01:00:00", 22.0))
            .unwrap();
        assert_eq!(reader.query_all(Series::Raw).unwrap().len(), 2);
    }

    #[test]
    fn test_reader_is_read_only() {
        let (_dir, db_path, _store) = open_store(ConflictPolicy::Upsert);
        let reader =
            SqliteSeriesReader::open(&db_path, std::time::Duration::from_secs(1)).unwrap();

        let result = reader.conn.execute(
            "INSERT INTO temperatures (timestamp, value) VALUES ('2024-01-01 00:00:00', 1.0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_reader_missing_file_is_unavailable() {
        let dir = tempdir().unwrap();
        let result = SqliteSeriesReader::open(
            dir.path().join("missing.db"),
            std::time::Duration::from_secs(1),
        );
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_conflict_policy_parse() {
        assert_eq!(ConflictPolicy::parse("UPSERT"), Some(ConflictPolicy::Upsert));
        assert_eq!(ConflictPolicy::parse(" reject "), Some(ConflictPolicy::Reject));
        assert_eq!(ConflictPolicy::parse("ignore"), None);
    }
}
