//! Telemetry store: raw samples, bucket tiers, and watermarks.
//!
//! Every bucket write is an upsert keyed on the tier's natural key, so
//! re-running a deterministic aggregation over the same inputs rewrites the
//! same values. Concurrent writers (the live collector and a backfill run)
//! converge without locking: the last commit wins and the values agree.
//!
//! Each read is a single `SELECT` and therefore a consistent snapshot even
//! while another process is upserting.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};

use crate::core::models::{DayBucket, HourBucket, MonthBucket, RawSample, YearBucket};
use crate::error::{PvError, Result};
use crate::storage::schema::{TABLES, run_migrations};

/// How long a writer waits on a locked database before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persisted per-stage progress markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Watermark {
    /// Epoch of the last successful raw collection.
    RawCollection,
    /// Start of the last hour the hourly aggregator processed.
    Hour,
    /// Local-midnight epoch of the last day the daily aggregator processed.
    Day,
    /// Epoch of local first-of-month of the last processed month.
    Month,
    /// Epoch of local Jan-1 of the last processed year.
    Year,
}

impl Watermark {
    pub const ALL: &'static [Self] = &[
        Self::RawCollection,
        Self::Hour,
        Self::Day,
        Self::Month,
        Self::Year,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::RawCollection => "raw.last_collection",
            Self::Hour => "hour.last_processed",
            Self::Day => "day.last_processed",
            Self::Month => "month.last_processed",
            Self::Year => "year.last_processed",
        }
    }
}

/// Bucket store backed by `SQLite`.
pub struct TelemetryStore {
    conn: Connection,
}

impl TelemetryStore {
    /// Create or open a store at the given path.
    ///
    /// The file is put in WAL mode so a backfill run and the collector can
    /// share it.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the database
    /// cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)
            .map_err(|e| PvError::Store(format!("open {}: {e}", path.display())))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| PvError::Store(format!("busy timeout: {e}")))?;
        let _mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| PvError::Store(format!("enable WAL: {e}")))?;

        run_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing).
    ///
    /// # Errors
    /// Returns an error if the in-memory database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| PvError::Store(format!("open in-memory db: {e}")))?;

        run_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    fn transaction(&self) -> Result<Transaction<'_>> {
        self.conn
            .unchecked_transaction()
            .map_err(|e| PvError::Store(format!("begin transaction: {e}")))
    }

    // =========================================================================
    // Watermarks
    // =========================================================================

    /// Read a watermark.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn watermark(&self, mark: Watermark) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                [mark.key()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| PvError::Store(format!("read watermark {}: {e}", mark.key())))
    }

    /// Set a watermark outside of any data write.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub fn set_watermark(&self, mark: Watermark, value: i64) -> Result<()> {
        write_watermark(&self.conn, mark, value)
    }

    /// All watermarks that have been written, in pipeline order.
    ///
    /// # Errors
    /// Returns an error if any read fails.
    pub fn watermarks(&self) -> Result<Vec<(Watermark, i64)>> {
        let mut marks = Vec::new();
        for &mark in Watermark::ALL {
            if let Some(value) = self.watermark(mark)? {
                marks.push((mark, value));
            }
        }
        Ok(marks)
    }

    // =========================================================================
    // Raw samples
    // =========================================================================

    /// Upsert a raw sample and advance the collection watermark atomically.
    ///
    /// # Errors
    /// Returns an error if either write fails; neither is then committed.
    pub fn record_sample(&self, sample: &RawSample, collected_at: i64) -> Result<()> {
        let tx = self.transaction()?;
        tx.execute(
            "INSERT INTO raw_samples (\
                timestamp, power_w, energy_today_wh, energy_month_wh, energy_total_wh, \
                status, collected_at\
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
            ON CONFLICT(timestamp) DO UPDATE SET \
                power_w = excluded.power_w, \
                energy_today_wh = excluded.energy_today_wh, \
                energy_month_wh = excluded.energy_month_wh, \
                energy_total_wh = excluded.energy_total_wh, \
                status = excluded.status, \
                collected_at = excluded.collected_at",
            params![
                sample.timestamp,
                sample.power_w,
                sample.energy_today_wh,
                sample.energy_month_wh,
                sample.energy_total_wh,
                sample.status,
                sample.collected_at,
            ],
        )
        .map_err(|e| PvError::Store(format!("upsert raw sample: {e}")))?;
        write_watermark(&tx, Watermark::RawCollection, collected_at)?;
        tx.commit()
            .map_err(|e| PvError::Store(format!("commit raw sample: {e}")))?;
        Ok(())
    }

    /// Raw samples with `start <= timestamp < end`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn samples_in_range(&self, start: i64, end: i64) -> Result<Vec<RawSample>> {
        self.select(
            "SELECT timestamp, power_w, energy_today_wh, energy_month_wh, energy_total_wh, \
                status, collected_at \
             FROM raw_samples WHERE timestamp >= ?1 AND timestamp < ?2 \
             ORDER BY timestamp ASC",
            params![start, end],
            map_sample,
        )
    }

    /// The most recent raw sample.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn latest_sample(&self) -> Result<Option<RawSample>> {
        self.conn
            .query_row(
                "SELECT timestamp, power_w, energy_today_wh, energy_month_wh, energy_total_wh, \
                    status, collected_at \
                 FROM raw_samples ORDER BY timestamp DESC LIMIT 1",
                [],
                map_sample,
            )
            .optional()
            .map_err(|e| PvError::Store(format!("latest sample: {e}")))
    }

    /// Delete raw samples older than `cutoff`. Buckets are never touched.
    ///
    /// # Errors
    /// Returns an error if the DELETE fails.
    pub fn prune_samples_before(&self, cutoff: i64) -> Result<usize> {
        self.conn
            .execute("DELETE FROM raw_samples WHERE timestamp < ?1", [cutoff])
            .map_err(|e| PvError::Store(format!("prune raw samples: {e}")))
    }

    // =========================================================================
    // Hour buckets
    // =========================================================================

    /// Upsert an hour bucket.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub fn upsert_hour(&self, bucket: &HourBucket) -> Result<()> {
        upsert_hour_on(&self.conn, bucket)
    }

    /// Upsert an optional hour bucket and move the hourly watermark to `hour`
    /// in one transaction.
    ///
    /// # Errors
    /// Returns an error if either write fails; neither is then committed.
    pub fn commit_hour(&self, hour: i64, bucket: Option<&HourBucket>) -> Result<()> {
        let tx = self.transaction()?;
        if let Some(bucket) = bucket {
            upsert_hour_on(&tx, bucket)?;
        }
        write_watermark(&tx, Watermark::Hour, hour)?;
        tx.commit()
            .map_err(|e| PvError::Store(format!("commit hour {hour}: {e}")))?;
        Ok(())
    }

    /// Hour buckets starting in `[start, end)`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn hours_in_range(&self, start: i64, end: i64) -> Result<Vec<HourBucket>> {
        self.select(
            "SELECT start_timestamp, energy_delta_wh, power_avg_w, power_max_w, power_min_w, \
                sample_count \
             FROM hour_buckets WHERE start_timestamp >= ?1 AND start_timestamp < ?2 \
             ORDER BY start_timestamp ASC",
            params![start, end],
            map_hour,
        )
    }

    /// The `limit` most recent hour buckets, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_hours(&self, limit: usize) -> Result<Vec<HourBucket>> {
        self.select(
            "SELECT start_timestamp, energy_delta_wh, power_avg_w, power_max_w, power_min_w, \
                sample_count \
             FROM hour_buckets ORDER BY start_timestamp DESC LIMIT ?1",
            params![limit_param(limit)],
            map_hour,
        )
    }

    // =========================================================================
    // Day buckets
    // =========================================================================

    /// Upsert a day bucket.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub fn upsert_day(&self, bucket: &DayBucket) -> Result<()> {
        upsert_day_on(&self.conn, bucket)
    }

    /// Replace the hours of `[day.start_timestamp, day_end)` with `hours` and
    /// upsert the day, in one transaction.
    ///
    /// Hour buckets in the range that are not in `hours` are deleted, so the
    /// stored hours always sum to the day total.
    ///
    /// # Errors
    /// Returns an error if any write fails; nothing is then committed.
    pub fn write_day_with_hours(
        &self,
        day: &DayBucket,
        day_end: i64,
        hours: &[HourBucket],
    ) -> Result<()> {
        let tx = self.transaction()?;
        let removed = tx
            .execute(
                "DELETE FROM hour_buckets WHERE start_timestamp >= ?1 AND start_timestamp < ?2",
                params![day.start_timestamp, day_end],
            )
            .map_err(|e| PvError::Store(format!("clear hours of {}: {e}", day.date)))?;
        if removed > 0 {
            tracing::debug!(date = %day.date, removed, "Replacing existing hour buckets");
        }
        for hour in hours {
            upsert_hour_on(&tx, hour)?;
        }
        upsert_day_on(&tx, day)?;
        tx.commit()
            .map_err(|e| PvError::Store(format!("commit day {}: {e}", day.date)))?;
        Ok(())
    }

    /// Look up a day bucket by date (`YYYY-MM-DD`).
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn day(&self, date: &str) -> Result<Option<DayBucket>> {
        self.conn
            .query_row(
                "SELECT date, start_timestamp, energy_total_wh, power_peak_w, power_peak_time, \
                    sunlight_hours, capacity_factor \
                 FROM day_buckets WHERE date = ?1",
                [date],
                map_day,
            )
            .optional()
            .map_err(|e| PvError::Store(format!("read day {date}: {e}")))
    }

    /// Day buckets whose local midnight falls in `[start, end)`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn days_in_range(&self, start: i64, end: i64) -> Result<Vec<DayBucket>> {
        self.select(
            "SELECT date, start_timestamp, energy_total_wh, power_peak_w, power_peak_time, \
                sunlight_hours, capacity_factor \
             FROM day_buckets WHERE start_timestamp >= ?1 AND start_timestamp < ?2 \
             ORDER BY start_timestamp ASC",
            params![start, end],
            map_day,
        )
    }

    /// The `limit` most recent day buckets, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_days(&self, limit: usize) -> Result<Vec<DayBucket>> {
        self.select(
            "SELECT date, start_timestamp, energy_total_wh, power_peak_w, power_peak_time, \
                sunlight_hours, capacity_factor \
             FROM day_buckets ORDER BY start_timestamp DESC LIMIT ?1",
            params![limit_param(limit)],
            map_day,
        )
    }

    // =========================================================================
    // Month buckets
    // =========================================================================

    /// Upsert a month bucket.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub fn upsert_month(&self, bucket: &MonthBucket) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO month_buckets (\
                    year, month, start_timestamp, energy_total_wh, power_peak_w, \
                    days_with_data, avg_daily_wh, capacity_factor\
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                ON CONFLICT(year, month) DO UPDATE SET \
                    start_timestamp = excluded.start_timestamp, \
                    energy_total_wh = excluded.energy_total_wh, \
                    power_peak_w = excluded.power_peak_w, \
                    days_with_data = excluded.days_with_data, \
                    avg_daily_wh = excluded.avg_daily_wh, \
                    capacity_factor = excluded.capacity_factor",
                params![
                    bucket.year,
                    bucket.month,
                    bucket.start_timestamp,
                    bucket.energy_total_wh,
                    bucket.power_peak_w,
                    bucket.days_with_data,
                    bucket.avg_daily_wh,
                    bucket.capacity_factor,
                ],
            )
            .map_err(|e| {
                PvError::Store(format!(
                    "upsert month {}-{:02}: {e}",
                    bucket.year, bucket.month
                ))
            })?;
        Ok(())
    }

    /// Look up a month bucket.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn month(&self, year: i32, month: u32) -> Result<Option<MonthBucket>> {
        self.conn
            .query_row(
                "SELECT year, month, start_timestamp, energy_total_wh, power_peak_w, \
                    days_with_data, avg_daily_wh, capacity_factor \
                 FROM month_buckets WHERE year = ?1 AND month = ?2",
                params![year, month],
                map_month,
            )
            .optional()
            .map_err(|e| PvError::Store(format!("read month {year}-{month:02}: {e}")))
    }

    /// All month buckets of `year`, January first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn months_of_year(&self, year: i32) -> Result<Vec<MonthBucket>> {
        self.select(
            "SELECT year, month, start_timestamp, energy_total_wh, power_peak_w, \
                days_with_data, avg_daily_wh, capacity_factor \
             FROM month_buckets WHERE year = ?1 ORDER BY month ASC",
            params![year],
            map_month,
        )
    }

    /// The `limit` most recent month buckets, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_months(&self, limit: usize) -> Result<Vec<MonthBucket>> {
        self.select(
            "SELECT year, month, start_timestamp, energy_total_wh, power_peak_w, \
                days_with_data, avg_daily_wh, capacity_factor \
             FROM month_buckets ORDER BY year DESC, month DESC LIMIT ?1",
            params![limit_param(limit)],
            map_month,
        )
    }

    // =========================================================================
    // Year buckets
    // =========================================================================

    /// Upsert a year bucket.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub fn upsert_year(&self, bucket: &YearBucket) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO year_buckets (\
                    year, start_timestamp, energy_total_wh, power_peak_w, \
                    months_with_data, avg_monthly_wh, capacity_factor\
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                ON CONFLICT(year) DO UPDATE SET \
                    start_timestamp = excluded.start_timestamp, \
                    energy_total_wh = excluded.energy_total_wh, \
                    power_peak_w = excluded.power_peak_w, \
                    months_with_data = excluded.months_with_data, \
                    avg_monthly_wh = excluded.avg_monthly_wh, \
                    capacity_factor = excluded.capacity_factor",
                params![
                    bucket.year,
                    bucket.start_timestamp,
                    bucket.energy_total_wh,
                    bucket.power_peak_w,
                    bucket.months_with_data,
                    bucket.avg_monthly_wh,
                    bucket.capacity_factor,
                ],
            )
            .map_err(|e| PvError::Store(format!("upsert year {}: {e}", bucket.year)))?;
        Ok(())
    }

    /// Look up a year bucket.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn year(&self, year: i32) -> Result<Option<YearBucket>> {
        self.conn
            .query_row(
                "SELECT year, start_timestamp, energy_total_wh, power_peak_w, \
                    months_with_data, avg_monthly_wh, capacity_factor \
                 FROM year_buckets WHERE year = ?1",
                [year],
                map_year,
            )
            .optional()
            .map_err(|e| PvError::Store(format!("read year {year}: {e}")))
    }

    /// The `limit` most recent year buckets, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_years(&self, limit: usize) -> Result<Vec<YearBucket>> {
        self.select(
            "SELECT year, start_timestamp, energy_total_wh, power_peak_w, \
                months_with_data, avg_monthly_wh, capacity_factor \
             FROM year_buckets ORDER BY year DESC LIMIT ?1",
            params![limit_param(limit)],
            map_year,
        )
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Count rows in a known table.
    ///
    /// # Errors
    /// Returns an error if the table name is invalid or the COUNT query fails.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        if !TABLES.contains(&table) {
            return Err(PvError::Config(format!("Invalid table name: {table}")));
        }

        let query = format!("SELECT COUNT(*) FROM {table}");
        self.conn
            .query_row(&query, [], |row| row.get(0))
            .map_err(|e| PvError::Store(format!("count {table}: {e}")))
    }

    /// Get the approximate database size in bytes.
    ///
    /// # Errors
    /// Returns an error if the PRAGMA queries for page count or page size fail.
    pub fn db_size(&self) -> Result<u64> {
        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .map_err(|e| PvError::Store(format!("page_count: {e}")))?;

        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .map_err(|e| PvError::Store(format!("page_size: {e}")))?;

        #[allow(clippy::cast_sign_loss)] // page count and page size are non-negative
        Ok((page_count * page_size) as u64)
    }

    fn select<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: rusqlite::Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| PvError::Store(format!("prepare select: {e}")))?;

        let rows = stmt
            .query_map(params, map)
            .map_err(|e| PvError::Store(format!("query rows: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| PvError::Store(format!("map row: {e}")))?);
        }
        Ok(out)
    }
}

fn write_watermark(conn: &Connection, mark: Watermark, value: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now')) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![mark.key(), value],
    )
    .map_err(|e| PvError::Store(format!("write watermark {}: {e}", mark.key())))?;
    Ok(())
}

fn upsert_hour_on(conn: &Connection, bucket: &HourBucket) -> Result<()> {
    conn.execute(
        "INSERT INTO hour_buckets (\
            start_timestamp, energy_delta_wh, power_avg_w, power_max_w, power_min_w, sample_count\
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
        ON CONFLICT(start_timestamp) DO UPDATE SET \
            energy_delta_wh = excluded.energy_delta_wh, \
            power_avg_w = excluded.power_avg_w, \
            power_max_w = excluded.power_max_w, \
            power_min_w = excluded.power_min_w, \
            sample_count = excluded.sample_count",
        params![
            bucket.start_timestamp,
            bucket.energy_delta_wh,
            bucket.power_avg_w,
            bucket.power_max_w,
            bucket.power_min_w,
            bucket.sample_count,
        ],
    )
    .map_err(|e| PvError::Store(format!("upsert hour {}: {e}", bucket.start_timestamp)))?;
    Ok(())
}

fn upsert_day_on(conn: &Connection, bucket: &DayBucket) -> Result<()> {
    conn.execute(
        "INSERT INTO day_buckets (\
            date, start_timestamp, energy_total_wh, power_peak_w, power_peak_time, \
            sunlight_hours, capacity_factor\
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
        ON CONFLICT(date) DO UPDATE SET \
            start_timestamp = excluded.start_timestamp, \
            energy_total_wh = excluded.energy_total_wh, \
            power_peak_w = excluded.power_peak_w, \
            power_peak_time = excluded.power_peak_time, \
            sunlight_hours = excluded.sunlight_hours, \
            capacity_factor = excluded.capacity_factor",
        params![
            bucket.date,
            bucket.start_timestamp,
            bucket.energy_total_wh,
            bucket.power_peak_w,
            bucket.power_peak_time,
            bucket.sunlight_hours,
            bucket.capacity_factor,
        ],
    )
    .map_err(|e| PvError::Store(format!("upsert day {}: {e}", bucket.date)))?;
    Ok(())
}

#[allow(clippy::cast_possible_wrap)] // limits are clamped to a few hundred
const fn limit_param(limit: usize) -> i64 {
    limit as i64
}

fn map_sample(row: &Row<'_>) -> rusqlite::Result<RawSample> {
    Ok(RawSample {
        timestamp: row.get(0)?,
        power_w: row.get(1)?,
        energy_today_wh: row.get(2)?,
        energy_month_wh: row.get(3)?,
        energy_total_wh: row.get(4)?,
        status: row.get(5)?,
        collected_at: row.get(6)?,
    })
}

fn map_hour(row: &Row<'_>) -> rusqlite::Result<HourBucket> {
    Ok(HourBucket {
        start_timestamp: row.get(0)?,
        energy_delta_wh: row.get(1)?,
        power_avg_w: row.get(2)?,
        power_max_w: row.get(3)?,
        power_min_w: row.get(4)?,
        sample_count: row.get(5)?,
    })
}

fn map_day(row: &Row<'_>) -> rusqlite::Result<DayBucket> {
    Ok(DayBucket {
        date: row.get(0)?,
        start_timestamp: row.get(1)?,
        energy_total_wh: row.get(2)?,
        power_peak_w: row.get(3)?,
        power_peak_time: row.get(4)?,
        sunlight_hours: row.get(5)?,
        capacity_factor: row.get(6)?,
    })
}

fn map_month(row: &Row<'_>) -> rusqlite::Result<MonthBucket> {
    Ok(MonthBucket {
        year: row.get(0)?,
        month: row.get(1)?,
        start_timestamp: row.get(2)?,
        energy_total_wh: row.get(3)?,
        power_peak_w: row.get(4)?,
        days_with_data: row.get(5)?,
        avg_daily_wh: row.get(6)?,
        capacity_factor: row.get(7)?,
    })
}

fn map_year(row: &Row<'_>) -> rusqlite::Result<YearBucket> {
    Ok(YearBucket {
        year: row.get(0)?,
        start_timestamp: row.get(1)?,
        energy_total_wh: row.get(2)?,
        power_peak_w: row.get(3)?,
        months_with_data: row.get(4)?,
        avg_monthly_wh: row.get(5)?,
        capacity_factor: row.get(6)?,
    })
}
