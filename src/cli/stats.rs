//! Stats command implementation.

use serde::Serialize;

use crate::cli::Context;
use crate::core::calendar::Calendar;
use crate::error::Result;
use crate::render::human;
use crate::storage::TelemetryStore;
use crate::storage::schema::TABLES;
use crate::storage::store::Watermark;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatermarkEntry {
    pub key: &'static str,
    pub value: Option<i64>,
    /// `value` as RFC 3339 in the configured timezone.
    pub time: Option<String>,
}

/// Database overview printed by `pvstat stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub timezone: String,
    pub tables: Vec<TableCount>,
    pub watermarks: Vec<WatermarkEntry>,
}

/// Gather row counts and watermarks from `store`.
///
/// # Errors
/// Returns a store error if any count or watermark read fails.
pub fn collect_stats(
    store: &TelemetryStore,
    db_path: &str,
    calendar: &Calendar,
) -> Result<StoreStats> {
    let mut tables = Vec::with_capacity(TABLES.len());
    for &table in TABLES {
        tables.push(TableCount {
            table,
            rows: store.count_rows(table)?,
        });
    }

    let mut watermarks = Vec::with_capacity(Watermark::ALL.len());
    for &mark in Watermark::ALL {
        let value = store.watermark(mark)?;
        watermarks.push(WatermarkEntry {
            key: mark.key(),
            value,
            time: value.map(|ts| calendar.format_rfc3339(ts)),
        });
    }

    Ok(StoreStats {
        db_path: db_path.to_string(),
        db_size_bytes: store.db_size()?,
        timezone: calendar.timezone().name().to_string(),
        tables,
        watermarks,
    })
}

/// Execute the stats command.
pub fn execute(ctx: &Context) -> Result<()> {
    let stats = collect_stats(
        &ctx.store,
        &ctx.resolved.db_path.display().to_string(),
        &ctx.calendar(),
    )?;
    let now = chrono::Utc::now().timestamp();
    ctx.emit(&stats, |s| human::render_stats(s, now, ctx.no_color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{raw_sample, utc_ts};

    #[test]
    fn stats_cover_every_table_and_watermark() {
        let store = TelemetryStore::open_in_memory().unwrap();
        let ts = utc_ts(2024, 6, 1, 12, 0);
        store.record_sample(&raw_sample(ts, 500.0, 100.0), ts).unwrap();

        let stats = collect_stats(&store, ":memory:", &Calendar::default()).unwrap();

        assert_eq!(stats.tables.len(), TABLES.len());
        let raw = stats.tables.iter().find(|t| t.table == "raw_samples").unwrap();
        assert_eq!(raw.rows, 1);

        assert_eq!(stats.watermarks.len(), Watermark::ALL.len());
        assert_eq!(stats.watermarks[0].key, "raw.last_collection");
        assert_eq!(stats.watermarks[0].value, Some(ts));
        assert_eq!(
            stats.watermarks[0].time.as_deref(),
            Some("2024-06-01T12:00:00+00:00")
        );
        assert!(stats.watermarks[1].value.is_none());
        assert_eq!(stats.timezone, "UTC");
    }
}
