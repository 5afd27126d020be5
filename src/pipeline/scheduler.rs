//! Periodic timers and the sync tick
//!
//! Three independent cadences run off the injected clock:
//! - hourly average: append the trailing 1h raw average to `hourly_avg`
//! - daily average: append the trailing 1d raw average to `daily_avg`
//! - sync: drain every buffer into the store, then prune each table to its
//!   retention horizon
//!
//! Storage errors are isolated per series and per tick. Drained readings
//! that fail to insert are dropped, not re-buffered, so an unavailable store
//! can't grow the buffers without bound.

use super::context::PipelineContext;
use super::config::CadenceConfig;
use super::types::{Reading, Series};
use super::windows::{trailing_average, AverageWindow};
use chrono::NaiveDateTime;

/// Fires once every `period_secs` of wall-clock time
#[derive(Debug, Clone)]
pub struct Cadence {
    period_secs: i64,
    last_fired: NaiveDateTime,
}

impl Cadence {
    pub fn new(period_secs: i64, start: NaiveDateTime) -> Self {
        Self {
            period_secs,
            last_fired: start,
        }
    }

    /// True when a full period has elapsed since the last firing
    pub fn poll(&mut self, now: NaiveDateTime) -> bool {
        if now < self.last_fired {
            // Clock stepped backwards: re-anchor instead of firing early or never
            self.last_fired = now;
            return false;
        }

        if (now - self.last_fired).num_seconds() >= self.period_secs {
            self.last_fired = now;
            true
        } else {
            false
        }
    }

    pub fn period_secs(&self) -> i64 {
        self.period_secs
    }
}

/// Outcome of one sync tick for one series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSyncReport {
    pub series: Series,
    pub drained: usize,
    pub inserted: usize,
    pub failed: usize,
    /// `None` when pruning was skipped or failed
    pub pruned: Option<usize>,
}

impl SeriesSyncReport {
    fn new(series: Series, drained: usize) -> Self {
        Self {
            series,
            drained,
            inserted: 0,
            failed: 0,
            pruned: None,
        }
    }
}

pub struct Synchronizer {
    sync: Cadence,
    hourly: Cadence,
    daily: Cadence,
}

impl Synchronizer {
    pub fn new(cadence: &CadenceConfig, start: NaiveDateTime) -> Self {
        Self {
            sync: Cadence::new(cadence.sync_secs, start),
            hourly: Cadence::new(cadence.hourly_avg_secs, start),
            daily: Cadence::new(cadence.daily_avg_secs, start),
        }
    }

    /// Run whatever is due at the context's current time
    ///
    /// Returns the per-series reports when the sync cadence fired.
    pub fn poll(&mut self, ctx: &PipelineContext) -> Option<Vec<SeriesSyncReport>> {
        let now = ctx.clock.now();

        if self.hourly.poll(now) {
            record_average(ctx, AverageWindow::Hour, now);
        }
        if self.daily.poll(now) {
            record_average(ctx, AverageWindow::Day, now);
        }

        self.sync.poll(now).then(|| sync_all(ctx, now))
    }
}

/// Compute the trailing average for `window` and buffer it in its series
pub fn record_average(
    ctx: &PipelineContext,
    window: AverageWindow,
    now: NaiveDateTime,
) -> Option<f64> {
    match trailing_average(
        ctx.store.as_ref(),
        &ctx.buffers.raw,
        now,
        window.duration_secs(),
    ) {
        Ok(Some(avg)) => {
            ctx.buffers
                .get(window.target_series())
                .append(Reading::new(now, avg));
            log::info!("📈 {} average: {:.2}", window.as_str(), avg);
            Some(avg)
        }
        Ok(None) => {
            log::info!("📈 {} average: no readings in window, nothing recorded", window.as_str());
            None
        }
        Err(e) => {
            log::error!("❌ {} average failed: {}", window.as_str(), e);
            None
        }
    }
}

/// Flush and prune every series
pub fn sync_all(ctx: &PipelineContext, now: NaiveDateTime) -> Vec<SeriesSyncReport> {
    Series::all()
        .into_iter()
        .map(|series| sync_series(ctx, series, now))
        .collect()
}

/// Drain one buffer into its table, then prune the table
///
/// Every drained reading gets its own insert attempt. Pruning is skipped for
/// this tick if any insert found the store unavailable.
pub fn sync_series(ctx: &PipelineContext, series: Series, now: NaiveDateTime) -> SeriesSyncReport {
    let drained = ctx.buffers.get(series).drain_all();
    let mut report = SeriesSyncReport::new(series, drained.len());
    let mut store_unavailable = false;

    for reading in &drained {
        let row = reading.to_row();
        match ctx.store.insert(series, &row) {
            Ok(()) => report.inserted += 1,
            Err(e) if e.is_conflict() => {
                log::warn!("⚠️  Dropped reading ({}): {}", row.value, e);
                report.failed += 1;
            }
            Err(e) => {
                log::error!("❌ Insert into {} failed: {}", series.table(), e);
                report.failed += 1;
                store_unavailable = true;
            }
        }
    }

    if store_unavailable {
        log::warn!(
            "⚠️  Skipping prune of {} this tick ({} readings lost)",
            series.table(),
            report.failed
        );
        return report;
    }

    let horizon = ctx.retention.horizon_secs(series);
    match ctx.store.prune(series, now, horizon) {
        Ok(deleted) => {
            if deleted > 0 {
                log::debug!(
                    "🧹 Deleted {} rows from {} older than {}s",
                    deleted,
                    series.table(),
                    horizon
                );
            }
            report.pruned = Some(deleted);
        }
        Err(e) => {
            log::error!("❌ Prune of {} failed: {}", series.table(), e);
        }
    }

    report
}

/// One summary line per sync tick
pub fn log_sync_reports(reports: &[SeriesSyncReport]) {
    let summary: Vec<String> = reports
        .iter()
        .map(|r| {
            format!(
                "{} +{}/{} -{}",
                r.series.table(),
                r.inserted,
                r.drained,
                r.pruned.map_or_else(|| "?".to_string(), |n| n.to_string())
            )
        })
        .collect();

    if reports.iter().any(|r| r.failed > 0 || r.pruned.is_none()) {
        log::warn!("⚠️  Sync completed with errors: {}", summary.join(" | "));
    } else {
        log::info!("📊 Sync complete: {}", summary.join(" | "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clock::{Clock, ManualClock};
    use crate::pipeline::config::RetentionPolicy;
    use crate::pipeline::db::{ConflictPolicy, SqliteStore, StoreError, TimeSeriesStore};
    use crate::pipeline::types::{parse_timestamp, SeriesRow};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn start() -> NaiveDateTime {
        parse_timestamp("2024-01-01 00:00:00").unwrap()
    }

    /// In-memory store failing chosen insert attempts
    #[derive(Default)]
    struct FlakyStore {
        rows: Mutex<Vec<(Series, SeriesRow)>>,
        attempts: Mutex<usize>,
        fail_on: HashSet<usize>,
        prune_calls: Mutex<usize>,
    }

    impl FlakyStore {
        fn failing_on(attempts: &[usize]) -> Self {
            Self {
                fail_on: attempts.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl TimeSeriesStore for FlakyStore {
        fn insert(&self, series: Series, row: &SeriesRow) -> Result<(), StoreError> {
            let mut attempts = self.attempts.lock().unwrap();
            let attempt = *attempts;
            *attempts += 1;
            if self.fail_on.contains(&attempt) {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.rows.lock().unwrap().push((series, row.clone()));
            Ok(())
        }

        fn prune(&self, _: Series, _: NaiveDateTime, _: i64) -> Result<usize, StoreError> {
            *self.prune_calls.lock().unwrap() += 1;
            Ok(0)
        }

        fn query_all(&self, series: Series) -> Result<Vec<SeriesRow>, StoreError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _)| *s == series)
                .map(|(_, r)| r.clone())
                .collect())
        }

        fn query_after(&self, series: Series, after: &str) -> Result<Vec<SeriesRow>, StoreError> {
            Ok(self
                .query_all(series)?
                .into_iter()
                .filter(|r| r.timestamp.as_str() > after)
                .collect())
        }
    }

    fn sqlite_context(clock: Arc<ManualClock>) -> (TempDir, PipelineContext) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            SqliteStore::open(dir.path().join("temperature.db"), ConflictPolicy::Upsert).unwrap();
        let ctx = PipelineContext::new(Arc::new(store), clock, RetentionPolicy::default());
        (dir, ctx)
    }

    #[test]
    fn test_cadence_fires_after_period() {
        let mut cadence = Cadence::new(6, start());
        let at = |s| start() + chrono::Duration::seconds(s);

        assert!(!cadence.poll(at(0)));
        assert!(!cadence.poll(at(5)));
        assert!(cadence.poll(at(6)));
        assert!(!cadence.poll(at(11)));
        assert!(cadence.poll(at(13)));
    }

    #[test]
    fn test_cadence_clock_backwards_reanchors() {
        let mut cadence = Cadence::new(10, start());
        let at = |s| start() + chrono::Duration::seconds(s);

        assert!(!cadence.poll(at(-100)));
        assert!(!cadence.poll(at(-95)));
        assert!(cadence.poll(at(-90)));
    }

    #[test]
    fn test_partial_failure_still_attempts_remaining_inserts() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(FlakyStore::failing_on(&[2]));
        let ctx = PipelineContext::new(store.clone(), clock.clone(), RetentionPolicy::default());

        for i in 0..5 {
            ctx.buffers
                .raw
                .append(Reading::new(start() + chrono::Duration::seconds(i), i as f64));
        }

        let report = sync_series(&ctx, Series::Raw, clock.now());
        assert_eq!(report.drained, 5);
        assert_eq!(report.inserted, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pruned, None);
        assert_eq!(*store.attempts.lock().unwrap(), 5);
        assert_eq!(*store.prune_calls.lock().unwrap(), 0);

        // Failed reading is not re-buffered
        assert!(ctx.buffers.raw.is_empty());
        let values: Vec<f64> = store
            .query_all(Series::Raw)
            .unwrap()
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![0.0, 1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_failure_isolated_to_one_series() {
        let clock = Arc::new(ManualClock::new(start()));
        // Attempt 0 is the only raw reading
        let store = Arc::new(FlakyStore::failing_on(&[0]));
        let ctx = PipelineContext::new(store.clone(), clock.clone(), RetentionPolicy::default());

        ctx.buffers.raw.append(Reading::new(start(), 21.0));
        ctx.buffers.hourly_avg.append(Reading::new(start(), 22.0));
        ctx.buffers.daily_avg.append(Reading::new(start(), 23.0));

        let reports = sync_all(&ctx, clock.now());
        assert_eq!(reports[0].failed, 1);
        assert_eq!(reports[0].pruned, None);
        assert_eq!(reports[1].inserted, 1);
        assert_eq!(reports[1].pruned, Some(0));
        assert_eq!(reports[2].inserted, 1);
        assert_eq!(*store.prune_calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_sync_flushes_and_prunes_by_horizon() {
        let clock = Arc::new(ManualClock::new(start()));
        let (_dir, ctx) = sqlite_context(clock.clone());

        // Older than the 24h raw horizon once the clock moves on
        ctx.store
            .insert(Series::Raw, &SeriesRow::new("2023-12-30 00:00:00", 10.0))
            .unwrap();
        ctx.buffers.raw.append(Reading::new(clock.now(), 21.5));

        let reports = sync_all(&ctx, clock.now());
        let raw = &reports[0];
        assert_eq!(raw.inserted, 1);
        assert_eq!(raw.pruned, Some(1));

        let rows = ctx.store.query_all(Series::Raw).unwrap();
        assert_eq!(rows, vec![SeriesRow::new("2024-01-01 00:00:00", 21.5)]);
        assert!(ctx.buffers.raw.is_empty());
    }

    #[test]
    fn test_synchronizer_records_hourly_average_then_flushes() {
        let clock = Arc::new(ManualClock::new(start()));
        let (_dir, ctx) = sqlite_context(clock.clone());
        let cadence = CadenceConfig {
            sync_secs: 6,
            hourly_avg_secs: 3600,
            daily_avg_secs: 86_400,
        };
        let mut sync = Synchronizer::new(&cadence, clock.now());

        // One reading per 10 minutes, flushed as we go
        for i in 0..6 {
            clock.advance_secs(600);
            ctx.buffers.raw.append(Reading::new(clock.now(), 20.0 + i as f64));
            assert!(sync.poll(&ctx).is_some());
        }

        // At t=3600 the hourly cadence fired during the last poll
        let hourly = ctx.store.query_all(Series::HourlyAvg).unwrap();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].timestamp, "2024-01-01 01:00:00");
        assert!((hourly[0].value - 22.5).abs() < 1e-9);
        assert!(ctx.store.query_all(Series::DailyAvg).unwrap().is_empty());
    }

    #[test]
    fn test_consecutive_hourly_windows_do_not_share_readings() {
        let clock = Arc::new(ManualClock::new(start()));
        let (_dir, ctx) = sqlite_context(clock.clone());
        let cadence = CadenceConfig {
            sync_secs: 6,
            hourly_avg_secs: 3600,
            daily_avg_secs: 86_400,
        };
        let mut sync = Synchronizer::new(&cadence, clock.now());

        // Each reading lands exactly on an hourly firing
        clock.advance_secs(3600);
        ctx.buffers.raw.append(Reading::new(clock.now(), 10.0));
        assert!(sync.poll(&ctx).is_some());

        clock.advance_secs(3600);
        ctx.buffers.raw.append(Reading::new(clock.now(), 30.0));
        assert!(sync.poll(&ctx).is_some());

        assert_eq!(
            ctx.store.query_all(Series::HourlyAvg).unwrap(),
            vec![
                SeriesRow::new("2024-01-01 01:00:00", 10.0),
                SeriesRow::new("2024-01-01 02:00:00", 30.0),
            ]
        );
    }

    #[test]
    fn test_reject_conflict_still_prunes() {
        let clock = Arc::new(ManualClock::new(start()));
        let dir = tempfile::tempdir().unwrap();
        let store =
            SqliteStore::open(dir.path().join("temperature.db"), ConflictPolicy::Reject).unwrap();
        let ctx = PipelineContext::new(Arc::new(store), clock.clone(), RetentionPolicy::default());

        ctx.store
            .insert(Series::Raw, &SeriesRow::new("2023-12-30 00:00:00", 5.0))
            .unwrap();
        ctx.store
            .insert(Series::Raw, &SeriesRow::new("2024-01-01 00:00:00", 21.0))
            .unwrap();
        ctx.buffers.raw.append(Reading::new(start(), 99.0));
        ctx.buffers
            .raw
            .append(Reading::new(start() + chrono::Duration::seconds(1), 22.0));

        let report = sync_series(&ctx, Series::Raw, clock.now());
        assert_eq!(report.drained, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed, 1);
        // Row older than the 24h horizon is gone
        assert_eq!(report.pruned, Some(1));

        assert_eq!(
            ctx.store.query_all(Series::Raw).unwrap(),
            vec![
                SeriesRow::new("2024-01-01 00:00:00", 21.0),
                SeriesRow::new("2024-01-01 00:00:01", 22.0),
            ]
        );
    }

    #[test]
    fn test_no_data_records_nothing() {
        let clock = Arc::new(ManualClock::new(start()));
        let (_dir, ctx) = sqlite_context(clock.clone());

        assert_eq!(record_average(&ctx, AverageWindow::Day, clock.now()), None);
        assert!(ctx.buffers.daily_avg.is_empty());
    }

    #[test]
    fn test_poll_before_any_cadence_is_noop() {
        let clock = Arc::new(ManualClock::new(start()));
        let (_dir, ctx) = sqlite_context(clock.clone());
        let mut sync = Synchronizer::new(&CadenceConfig::default(), clock.now());

        ctx.buffers.raw.append(Reading::new(clock.now(), 21.0));
        clock.advance_secs(5);
        assert!(sync.poll(&ctx).is_none());
        assert_eq!(ctx.buffers.raw.len(), 1);
    }
}
