//! Seeded stores and mock telemetry payloads for integration tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pvstat::TestDir;
use pvstat::core::calendar::Calendar;
use pvstat::core::models::{MonthBucket, capacity_factor};
use pvstat::flat_day;
use pvstat::storage::TelemetryStore;
use pvstat::storage::schema::TABLES;

/// A file-backed store in a fresh temporary directory.
///
/// Keep the returned `TestDir` alive for as long as the store is used.
pub fn temp_store() -> (TestDir, TelemetryStore) {
    let dir = TestDir::new();
    let store = TelemetryStore::open(&dir.file_path("telemetry.sqlite")).expect("open store");
    (dir, store)
}

/// Row counts of every table, in schema order.
pub fn table_counts(store: &TelemetryStore) -> Vec<i64> {
    TABLES
        .iter()
        .map(|t| store.count_rows(t).expect("count rows"))
        .collect()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Month buckets for `months` of `year`, each with `energy_wh` over 30 days.
pub fn seed_months(store: &TelemetryStore, calendar: &Calendar, year: i32, months: &[u32], energy_wh: f64) {
    for &month in months {
        store
            .upsert_month(&MonthBucket {
                year,
                month,
                start_timestamp: calendar.month_start(year, month),
                energy_total_wh: energy_wh,
                power_peak_w: 4200.0,
                days_with_data: 30,
                avg_daily_wh: energy_wh / 30.0,
                capacity_factor: capacity_factor(energy_wh, 5.0, 720.0),
            })
            .expect("seed month");
    }
}

/// `/current` body with power in kW and energy in kWh.
pub fn current_json(power_kw: f64, today_kwh: f64) -> Value {
    json!({
        "status": 1,
        "power": power_kw,
        "power_unit": "kW",
        "energy_today": today_kwh,
        "energy_month": today_kwh * 10.0,
        "energy_total": today_kwh * 100.0,
    })
}

/// `/history` body for one local day at constant power.
pub fn history_json(calendar: &Calendar, day: NaiveDate, interval_minutes: u32, power_w: f64) -> Value {
    let intervals = flat_day(calendar, day, interval_minutes, power_w);
    let samples: Vec<Value> = intervals
        .samples
        .iter()
        .map(|s| json!({ "timestamp": s.timestamp, "power": s.power_w }))
        .collect();
    json!({
        "interval_minutes": interval_minutes,
        "power_unit": "W",
        "samples": samples,
    })
}

/// Serve `body` on `GET /current`.
pub async fn mount_current(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serve `body` on `GET /history?date=<day>`.
pub async fn mount_history(server: &MockServer, day: NaiveDate, body: Value) {
    Mock::given(method("GET"))
        .and(path("/history"))
        .and(query_param("date", day.format("%Y-%m-%d").to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}
