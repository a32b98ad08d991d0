//! Telemetry sources.
//!
//! A source answers two questions: what is the inverter doing right now, and
//! what did it do on a given past day. Every value it returns is already in
//! W and Wh.

pub mod http;

use std::future::Future;

use chrono::NaiveDate;

use crate::core::models::{DayIntervals, Reading};
use crate::error::Result;

pub use http::HttpSource;

/// A pull-based telemetry source.
pub trait TelemetrySource {
    /// Fetch the current instantaneous power and energy counters.
    fn fetch_current(&self) -> impl Future<Output = Result<Reading>> + Send;

    /// Fetch sub-hour power samples for one local calendar day.
    fn fetch_day_intervals(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<DayIntervals>> + Send;
}

impl<S: TelemetrySource + Sync> TelemetrySource for &S {
    fn fetch_current(&self) -> impl Future<Output = Result<Reading>> + Send {
        (**self).fetch_current()
    }

    fn fetch_day_intervals(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<DayIntervals>> + Send {
        (**self).fetch_day_intervals(date)
    }
}
