//! Collection and cascade behavior over a simulated day.
//!
//! Covers:
//! - Minimum-interval gate across collector instances
//! - No bucket for a period that has not fully elapsed
//! - Re-running the cascade leaves completed buckets unchanged
//! - Counter resets never yield negative energy

mod common;

use common::fixtures::{date, temp_store};
use common::logger::TestLogger;

use pvstat::core::aggregate::AggregationSettings;
use pvstat::core::calendar::Calendar;
use pvstat::core::ingest::{CollectOutcome, Collector, CollectorSettings};
use pvstat::core::models::Granularity;
use pvstat::core::pipeline::Pipeline;
use pvstat::storage::{TelemetryStore, Watermark};
use pvstat::{FakeSource, reading, utc_ts};

const STEP: i64 = 20 * 60;

/// Collect every 20 minutes from 10:00 to 14:00 UTC on 2024-06-01, with the
/// today-counter climbing 300 Wh per step.
async fn simulate_morning(store: &TelemetryStore) {
    let readings = (0..=12)
        .map(|i| reading(1000.0 + f64::from(i) * 10.0, f64::from(i) * 300.0))
        .collect();
    let source = FakeSource::new().with_readings(readings);
    let collector = Collector::new(
        store,
        &source,
        Calendar::default(),
        CollectorSettings::default(),
        AggregationSettings::default(),
    );

    let t0 = utc_ts(2024, 6, 1, 10, 0);
    for i in 0..=12 {
        let outcome = collector.collect_at(t0 + i * STEP, false).await.unwrap();
        assert!(outcome.is_collected(), "step {i} was not collected");
    }
    assert_eq!(source.current_calls(), 13);
}

#[tokio::test]
async fn minimum_interval_holds_across_collectors() {
    let log = TestLogger::new("minimum_interval_holds_across_collectors");
    let (_dir, store) = temp_store();
    let t0 = utc_ts(2024, 6, 1, 12, 0);

    log.phase("execute");
    for offset in [0, 120] {
        // A fresh collector per call, as two cron invocations would be.
        let source = FakeSource::new().with_reading(reading(1500.0, 4000.0));
        let collector = Collector::new(
            &store,
            &source,
            Calendar::default(),
            CollectorSettings::default(),
            AggregationSettings::default(),
        );
        let outcome = collector.collect_at(t0 + offset, false).await.unwrap();
        if offset > 0 {
            assert!(matches!(outcome, CollectOutcome::Skipped { next_due, .. } if next_due == t0 + 299));
            assert_eq!(source.current_calls(), 0);
        }
    }

    log.phase("verify");
    assert_eq!(store.count_rows("raw_samples").unwrap(), 1);
    assert_eq!(store.watermark(Watermark::RawCollection).unwrap(), Some(t0));
    log.finish_ok();
}

#[tokio::test]
async fn only_elapsed_hours_are_bucketed() {
    let log = TestLogger::new("only_elapsed_hours_are_bucketed");
    let (_dir, store) = temp_store();

    log.phase("execute");
    simulate_morning(&store).await;

    log.phase("verify");
    let hours = store
        .hours_in_range(utc_ts(2024, 6, 1, 0, 0), utc_ts(2024, 6, 2, 0, 0))
        .unwrap();
    let starts: Vec<i64> = hours.iter().map(|h| h.start_timestamp).collect();
    assert_eq!(
        starts,
        (10..14).map(|h| utc_ts(2024, 6, 1, h, 0)).collect::<Vec<_>>()
    );
    for hour in &hours {
        assert!((hour.energy_delta_wh - 600.0).abs() < 1e-9);
        assert_eq!(hour.sample_count, 3);
    }
    assert_eq!(
        store.watermark(Watermark::Hour).unwrap(),
        Some(utc_ts(2024, 6, 1, 13, 0))
    );
    assert!(store.day("2024-06-01").unwrap().is_none());
    log.finish_ok();
}

#[tokio::test]
async fn cascade_rerun_is_idempotent() {
    let log = TestLogger::new("cascade_rerun_is_idempotent");
    let (_dir, store) = temp_store();
    simulate_morning(&store).await;

    log.phase("first run");
    let pipeline = Pipeline::new(&store, Calendar::default(), AggregationSettings::default());
    let after_midnight = utc_ts(2024, 6, 2, 0, 30);
    let report = pipeline.run(after_midnight, false).unwrap();
    assert_eq!(report.stage(Granularity::Day).unwrap().written, 1);

    let day = store.day("2024-06-01").unwrap().unwrap();
    assert!((day.energy_total_wh - 2400.0).abs() < 1e-9);
    assert!((day.power_peak_w - 1120.0).abs() < 1e-9);
    assert!((day.sunlight_hours - 5.0).abs() < 1e-9);

    log.phase("rerun");
    let hours_before = store.recent_hours(48).unwrap();
    let incremental = pipeline.run(after_midnight, false).unwrap();
    assert_eq!(incremental.written(), 0);
    let forced = pipeline.run(after_midnight, true).unwrap();
    assert!(forced.stage(Granularity::Day).unwrap().written >= 1);

    log.phase("verify");
    assert_eq!(store.day("2024-06-01").unwrap().unwrap(), day);
    assert_eq!(store.recent_hours(48).unwrap(), hours_before);
    assert_eq!(
        store.watermark(Watermark::Day).unwrap(),
        Some(Calendar::default().day_start(date(2024, 6, 1)))
    );
    log.finish_ok();
}

#[tokio::test]
async fn counter_reset_yields_zero_energy() {
    let (_dir, store) = temp_store();
    let source = FakeSource::new().with_readings(vec![
        reading(800.0, 5000.0),
        reading(800.0, 5100.0),
        reading(800.0, 20.0),
    ]);
    let collector = Collector::new(
        &store,
        &source,
        Calendar::default(),
        CollectorSettings::default(),
        AggregationSettings::default(),
    );

    let t0 = utc_ts(2024, 6, 1, 9, 0);
    for i in 0..3 {
        collector.collect_at(t0 + i * STEP, false).await.unwrap();
    }
    Pipeline::new(&store, Calendar::default(), AggregationSettings::default())
        .run(utc_ts(2024, 6, 1, 10, 5), false)
        .unwrap();

    let hours = store.hours_in_range(t0, t0 + 3600).unwrap();
    assert_eq!(hours.len(), 1);
    assert!(hours[0].energy_delta_wh.abs() < f64::EPSILON);
}
