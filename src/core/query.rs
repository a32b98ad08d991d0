//! Read side: the latest reading and the N most recent buckets of a tier.
//!
//! Nothing here returns an error to the caller. A store failure degrades to an
//! empty, zeroed response carrying an `error` message.

use serde::Serialize;

use super::calendar::{Calendar, days_in_month, days_in_year};
use super::models::{DayBucket, Granularity, HourBucket, MonthBucket, YearBucket, capacity_factor};
use crate::error::Result;
use crate::storage::TelemetryStore;

/// Latest live reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentResponse {
    /// Instantaneous power (W).
    pub power: f64,
    /// Lifetime energy (Wh).
    pub energy: f64,
    pub energy_today: f64,
    pub energy_month: f64,
    pub status: i64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CurrentResponse {
    fn empty(error: String) -> Self {
        Self {
            power: 0.0,
            energy: 0.0,
            energy_today: 0.0,
            energy_month: 0.0,
            status: 0,
            timestamp: 0,
            error: Some(error),
        }
    }
}

/// Tier-specific fields of a chart point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum PointDetail {
    Hour {
        power_min: f64,
        sample_count: i64,
    },
    Day {
        date: String,
        peak_time: String,
        sunlight_hours: f64,
        capacity_factor: f64,
    },
    Month {
        year: i32,
        month: u32,
        days_with_data: i64,
        avg_daily: f64,
        capacity_factor: f64,
    },
    Year {
        year: i32,
        months_with_data: i64,
        avg_monthly: f64,
        capacity_factor: f64,
    },
}

/// One bucket as charted. `power` is the mean power over the bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub timestamp: String,
    pub unix_timestamp: i64,
    /// Energy (Wh).
    pub production: f64,
    pub power: f64,
    pub power_max: f64,
    #[serde(flatten)]
    pub detail: PointDetail,
}

/// Summary average; its key names the tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Average {
    /// Mean of hourly average power (W).
    #[serde(rename = "avgPower")]
    Power(f64),
    /// Mean daily energy (Wh).
    #[serde(rename = "avgDaily")]
    Daily(f64),
    /// Mean monthly energy (Wh).
    #[serde(rename = "avgMonthly")]
    Monthly(f64),
    /// Mean yearly energy (Wh).
    #[serde(rename = "avgYearly")]
    Yearly(f64),
}

impl Average {
    const fn zero(granularity: Granularity) -> Self {
        Self::of(granularity, 0.0)
    }

    const fn of(granularity: Granularity, value: f64) -> Self {
        match granularity {
            Granularity::Hour => Self::Power(value),
            Granularity::Day => Self::Daily(value),
            Granularity::Month => Self::Monthly(value),
            Granularity::Year => Self::Yearly(value),
        }
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        match self {
            Self::Power(v) | Self::Daily(v) | Self::Monthly(v) | Self::Yearly(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakPower {
    pub value: f64,
    /// Start of the peak hour for hour and day tiers, bucket start otherwise.
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Energy (Wh) over the returned buckets.
    pub total_energy: f64,
    #[serde(flatten)]
    pub average: Average,
    pub peak_power: PeakPower,
    pub capacity_factor: f64,
}

impl Stats {
    const fn zeroed(granularity: Granularity) -> Self {
        Self {
            total_energy: 0.0,
            average: Average::zero(granularity),
            peak_power: PeakPower {
                value: 0.0,
                time: None,
            },
            capacity_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalResponse {
    pub period: Granularity,
    /// Count after clamping.
    pub zoom: usize,
    pub chart_data: Vec<ChartPoint>,
    pub stats: Stats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Clamp a requested bucket count to `1..=max_count`.
#[must_use]
pub fn effective_count(granularity: Granularity, count: usize) -> usize {
    count.clamp(1, granularity.max_count())
}

/// Summary input extracted from one bucket.
struct Summary {
    energy: f64,
    average_input: f64,
    peak: f64,
    peak_at: i64,
}

pub struct QueryService<'a> {
    store: &'a TelemetryStore,
    calendar: Calendar,
    rated_capacity_kw: f64,
}

impl<'a> QueryService<'a> {
    #[must_use]
    pub const fn new(
        store: &'a TelemetryStore,
        calendar: Calendar,
        rated_capacity_kw: f64,
    ) -> Self {
        Self {
            store,
            calendar,
            rated_capacity_kw,
        }
    }

    /// The latest raw sample, or zeros with an error when there is none.
    #[must_use]
    pub fn current(&self) -> CurrentResponse {
        match self.store.latest_sample() {
            Ok(Some(sample)) => CurrentResponse {
                power: sample.power_w,
                energy: sample.energy_total_wh,
                energy_today: sample.energy_today_wh,
                energy_month: sample.energy_month_wh,
                status: sample.status,
                timestamp: sample.timestamp,
                error: None,
            },
            Ok(None) => CurrentResponse::empty("no samples collected yet".to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Current reading query failed");
                CurrentResponse::empty(e.to_string())
            }
        }
    }

    /// The `count` most recent existing buckets of `granularity`, oldest first.
    #[must_use]
    pub fn query(&self, granularity: Granularity, count: usize) -> HistoricalResponse {
        let zoom = effective_count(granularity, count);
        match self.load(granularity, zoom) {
            Ok((chart_data, summaries)) => {
                let stats = self.summarize(granularity, &summaries);
                HistoricalResponse {
                    period: granularity,
                    zoom,
                    chart_data,
                    stats,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(granularity = %granularity, error = %e, "Range query failed");
                HistoricalResponse {
                    period: granularity,
                    zoom,
                    chart_data: Vec::new(),
                    stats: Stats::zeroed(granularity),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn load(
        &self,
        granularity: Granularity,
        limit: usize,
    ) -> Result<(Vec<ChartPoint>, Vec<Summary>)> {
        let mut rows: Vec<(ChartPoint, Summary)> = match granularity {
            Granularity::Hour => self
                .store
                .recent_hours(limit)?
                .iter()
                .map(|b| self.hour_point(b))
                .collect(),
            Granularity::Day => self
                .store
                .recent_days(limit)?
                .iter()
                .map(|b| self.day_point(b))
                .collect(),
            Granularity::Month => self
                .store
                .recent_months(limit)?
                .iter()
                .map(|b| self.month_point(b))
                .collect(),
            Granularity::Year => self
                .store
                .recent_years(limit)?
                .iter()
                .map(|b| self.year_point(b))
                .collect(),
        };
        rows.reverse();
        Ok(rows.into_iter().unzip())
    }

    fn summarize(&self, granularity: Granularity, rows: &[Summary]) -> Stats {
        if rows.is_empty() {
            return Stats::zeroed(granularity);
        }

        let total: f64 = rows.iter().map(|r| r.energy).sum();
        #[allow(clippy::cast_precision_loss)] // at most 365 buckets
        let n = rows.len() as f64;
        let average = rows.iter().map(|r| r.average_input).sum::<f64>() / n;

        let mut peak = &rows[0];
        for row in rows {
            if row.peak > peak.peak {
                peak = row;
            }
        }

        Stats {
            total_energy: total,
            average: Average::of(granularity, average),
            peak_power: PeakPower {
                value: peak.peak,
                time: Some(self.calendar.format_rfc3339(peak.peak_at)),
            },
            capacity_factor: capacity_factor(
                total,
                self.rated_capacity_kw,
                n * granularity.hours_per_bucket(),
            ),
        }
    }

    fn point(
        &self,
        start: i64,
        production: f64,
        hours: f64,
        power_max: f64,
        detail: PointDetail,
    ) -> ChartPoint {
        ChartPoint {
            timestamp: self.calendar.format_rfc3339(start),
            unix_timestamp: start,
            production,
            power: if hours > 0.0 { production / hours } else { 0.0 },
            power_max,
            detail,
        }
    }

    fn hour_point(&self, b: &HourBucket) -> (ChartPoint, Summary) {
        let mut point = self.point(
            b.start_timestamp,
            b.energy_delta_wh,
            1.0,
            b.power_max_w,
            PointDetail::Hour {
                power_min: b.power_min_w,
                sample_count: b.sample_count,
            },
        );
        point.power = b.power_avg_w;
        let summary = Summary {
            energy: b.energy_delta_wh,
            average_input: b.power_avg_w,
            peak: b.power_max_w,
            peak_at: b.start_timestamp,
        };
        (point, summary)
    }

    fn day_point(&self, b: &DayBucket) -> (ChartPoint, Summary) {
        let point = self.point(
            b.start_timestamp,
            b.energy_total_wh,
            24.0,
            b.power_peak_w,
            PointDetail::Day {
                date: b.date.clone(),
                peak_time: self.calendar.format_rfc3339(b.power_peak_time),
                sunlight_hours: b.sunlight_hours,
                capacity_factor: b.capacity_factor,
            },
        );
        let summary = Summary {
            energy: b.energy_total_wh,
            average_input: b.energy_total_wh,
            peak: b.power_peak_w,
            peak_at: b.power_peak_time,
        };
        (point, summary)
    }

    fn month_point(&self, b: &MonthBucket) -> (ChartPoint, Summary) {
        let point = self.point(
            b.start_timestamp,
            b.energy_total_wh,
            24.0 * f64::from(days_in_month(b.year, b.month)),
            b.power_peak_w,
            PointDetail::Month {
                year: b.year,
                month: b.month,
                days_with_data: b.days_with_data,
                avg_daily: b.avg_daily_wh,
                capacity_factor: b.capacity_factor,
            },
        );
        let summary = Summary {
            energy: b.energy_total_wh,
            average_input: b.energy_total_wh,
            peak: b.power_peak_w,
            peak_at: b.start_timestamp,
        };
        (point, summary)
    }

    fn year_point(&self, b: &YearBucket) -> (ChartPoint, Summary) {
        let point = self.point(
            b.start_timestamp,
            b.energy_total_wh,
            24.0 * f64::from(days_in_year(b.year)),
            b.power_peak_w,
            PointDetail::Year {
                year: b.year,
                months_with_data: b.months_with_data,
                avg_monthly: b.avg_monthly_wh,
                capacity_factor: b.capacity_factor,
            },
        );
        let summary = Summary {
            energy: b.energy_total_wh,
            average_input: b.energy_total_wh,
            peak: b.power_peak_w,
            peak_at: b.start_timestamp,
        };
        (point, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{hour_bucket_at, raw_sample, utc_ts};

    fn service(store: &TelemetryStore) -> QueryService<'_> {
        QueryService::new(store, Calendar::default(), 5.0)
    }

    #[test]
    fn empty_store_gives_zeroed_stats_without_error() {
        let store = TelemetryStore::open_in_memory().unwrap();
        let response = service(&store).query(Granularity::Year, 5);

        assert!(response.chart_data.is_empty());
        assert_eq!(response.stats, Stats::zeroed(Granularity::Year));
        assert!(response.error.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["chartData"], serde_json::json!([]));
        assert_eq!(json["stats"]["avgYearly"], serde_json::json!(0.0));
        assert_eq!(json["stats"]["totalEnergy"], serde_json::json!(0.0));
    }

    #[test]
    fn counts_are_clamped_per_tier() {
        assert_eq!(effective_count(Granularity::Hour, 1000), 168);
        assert_eq!(effective_count(Granularity::Day, 0), 1);
        assert_eq!(effective_count(Granularity::Month, 12), 12);
        assert_eq!(effective_count(Granularity::Year, 50), 10);
    }

    #[test]
    fn hours_are_returned_oldest_first_with_summary() {
        let store = TelemetryStore::open_in_memory().unwrap();
        let base = utc_ts(2024, 6, 1, 10, 0);
        store.upsert_hour(&hour_bucket_at(base, 100.0, 100.0, 150.0)).unwrap();
        store
            .upsert_hour(&hour_bucket_at(base + 3600, 300.0, 300.0, 450.0))
            .unwrap();
        store
            .upsert_hour(&hour_bucket_at(base + 7200, 200.0, 200.0, 250.0))
            .unwrap();

        let response = service(&store).query(Granularity::Hour, 2);
        let stamps: Vec<i64> = response.chart_data.iter().map(|p| p.unix_timestamp).collect();
        assert_eq!(stamps, vec![base + 3600, base + 7200]);
        assert_eq!(response.zoom, 2);

        assert!((response.stats.total_energy - 500.0).abs() < 1e-9);
        assert_eq!(response.stats.average, Average::Power(250.0));
        assert!((response.stats.peak_power.value - 450.0).abs() < f64::EPSILON);
        assert_eq!(
            response.stats.peak_power.time.as_deref(),
            Some("2024-06-01T11:00:00+00:00")
        );
        // 500 Wh against 5 kW over two hours.
        assert!((response.stats.capacity_factor - 5.0).abs() < 1e-9);

        let json = serde_json::to_value(&response.chart_data[0]).unwrap();
        assert_eq!(json["powerMin"], serde_json::json!(150.0));
        assert_eq!(json["sampleCount"], serde_json::json!(3));
        assert_eq!(json["timestamp"], serde_json::json!("2024-06-01T11:00:00+00:00"));
    }

    #[test]
    fn current_reads_latest_sample() {
        let store = TelemetryStore::open_in_memory().unwrap();
        let service = service(&store);
        let empty = service.current();
        assert_eq!(empty.error.as_deref(), Some("no samples collected yet"));
        assert!(empty.power.abs() < f64::EPSILON);

        let ts = utc_ts(2024, 6, 1, 12, 0);
        store.record_sample(&raw_sample(ts - 600, 900.0, 100.0), ts - 600).unwrap();
        store.record_sample(&raw_sample(ts, 1200.0, 200.0), ts).unwrap();

        let current = service.current();
        assert_eq!(current.timestamp, ts);
        assert!((current.power - 1200.0).abs() < f64::EPSILON);
        assert!((current.energy_today - 200.0).abs() < f64::EPSILON);
        assert!(current.error.is_none());
    }
}
