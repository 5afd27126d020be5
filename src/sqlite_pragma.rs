//! SQLite connection tuning shared by the writer and the query service
//!
//! The store file is the only channel between the two processes. WAL mode
//! gives one writer and any number of readers on the same file: readers see
//! the last committed snapshot and never block the writer, and the writer
//! never exposes a half-written row.

use rusqlite::Connection;
use std::time::Duration;

/// How long a connection waits on a locked database before failing
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// PRAGMAs for the writer connection (WAL, NORMAL, MEMORY, autocheckpoint)
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        log::warn!("⚠️  SQLite refused WAL mode, running with journal_mode={}", mode);
    }

    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    let _pages: i64 =
        conn.pragma_update_and_check(None, "wal_autocheckpoint", 1000, |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;

    Ok(())
}

/// PRAGMAs for a query-service connection
///
/// `query_only` rejects any write through this connection, so the read
/// service cannot modify the store even by mistake.
pub fn apply_reader_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "query_only", "ON")?;
    Ok(())
}
