//! Bucket boundary arithmetic.
//!
//! Hours are aligned to epoch multiples of 3600s. Days, months and years are
//! aligned to local midnight in the configured timezone, so a day may span
//! 23 or 25 hours around DST changes. Only zones whose UTC offset is always a
//! whole number of hours are accepted, so every local midnight falls on an
//! hour boundary.

use chrono::{
    DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::error::{PvError, Result};

/// Seconds per hour bucket.
pub const HOUR_SECS: i64 = 3600;

/// Timezone-aware boundary calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    tz: Tz,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl Calendar {
    #[must_use]
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Build a calendar from an IANA timezone name.
    ///
    /// # Errors
    /// Returns a config error if the name is not a known timezone, or if the
    /// zone uses a UTC offset that is not a whole number of hours.
    pub fn from_name(name: &str) -> Result<Self> {
        let invalid = |message: &str| PvError::ConfigInvalid {
            key: "general.timezone".to_string(),
            value: name.to_string(),
            message: message.to_string(),
        };
        let tz = name
            .parse::<Tz>()
            .map_err(|_| invalid("unknown IANA timezone"))?;
        if !has_whole_hour_offsets(tz) {
            return Err(invalid(
                "UTC offset is not a whole number of hours, so local midnight would split an hour bucket",
            ));
        }
        Ok(Self::new(tz))
    }

    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.tz
    }

    /// Start of the hour containing `ts`.
    #[must_use]
    pub const fn hour_floor(ts: i64) -> i64 {
        ts.div_euclid(HOUR_SECS) * HOUR_SECS
    }

    /// Local calendar date containing `ts`.
    #[must_use]
    pub fn local_date(&self, ts: i64) -> NaiveDate {
        self.to_local(ts).date_naive()
    }

    /// Convert epoch seconds to a zoned datetime.
    #[must_use]
    pub fn to_local(&self, ts: i64) -> DateTime<Tz> {
        let utc = Utc.timestamp_opt(ts, 0).single().unwrap_or_default();
        utc.with_timezone(&self.tz)
    }

    /// RFC 3339 rendering of `ts` in the local timezone.
    #[must_use]
    pub fn format_rfc3339(&self, ts: i64) -> String {
        self.to_local(ts).to_rfc3339()
    }

    /// Epoch of local midnight starting `date`.
    #[must_use]
    pub fn day_start(&self, date: NaiveDate) -> i64 {
        self.local_epoch(date.and_time(NaiveTime::MIN))
    }

    /// Epoch of local midnight ending `date` (start of the next day).
    #[must_use]
    pub fn day_end(&self, date: NaiveDate) -> i64 {
        self.day_start(next_day(date))
    }

    /// Epoch of local midnight on the first of the month.
    #[must_use]
    pub fn month_start(&self, year: i32, month: u32) -> i64 {
        self.day_start(first_of_month(year, month))
    }

    /// Epoch of local midnight on the first of the following month.
    #[must_use]
    pub fn month_end(&self, year: i32, month: u32) -> i64 {
        let (year, month) = next_month(year, month);
        self.month_start(year, month)
    }

    /// Epoch of local midnight on January 1st.
    #[must_use]
    pub fn year_start(&self, year: i32) -> i64 {
        self.month_start(year, 1)
    }

    /// Epoch of local midnight on January 1st of the following year.
    #[must_use]
    pub fn year_end(&self, year: i32) -> i64 {
        self.year_start(year + 1)
    }

    /// Resolve a local wall-clock time to epoch seconds. Ambiguous times take
    /// the earlier instant; times inside a DST gap move forward an hour.
    fn local_epoch(&self, naive: NaiveDateTime) -> i64 {
        if let Some(dt) = self.tz.from_local_datetime(&naive).earliest() {
            return dt.timestamp();
        }
        let shifted = naive + chrono::Duration::hours(1);
        self.tz
            .from_local_datetime(&shifted)
            .earliest()
            .map_or_else(|| naive.and_utc().timestamp(), |dt| dt.timestamp())
    }
}

/// Whether `tz` keeps a whole-hour UTC offset in both seasons of every year
/// from 1990 through 2100.
fn has_whole_hour_offsets(tz: Tz) -> bool {
    (1990..=2100).all(|year| {
        [1, 7].iter().all(|&month| {
            NaiveDate::from_ymd_opt(year, month, 15)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .is_none_or(|noon| {
                    let offset = tz.offset_from_utc_datetime(&noon).fix().local_minus_utc();
                    offset % 3600 == 0
                })
        })
    })
}

/// First day of `(year, month)`. Months outside 1..=12 are clamped.
#[must_use]
pub fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month.clamp(1, 12), 1).unwrap_or(NaiveDate::MIN)
}

/// Last day of `(year, month)`.
#[must_use]
pub fn last_of_month(year: i32, month: u32) -> NaiveDate {
    let (year, month) = next_month(year, month);
    first_of_month(year, month)
        .pred_opt()
        .unwrap_or(NaiveDate::MIN)
}

/// The day after `date`.
#[must_use]
pub fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(date)
}

/// The month after `(year, month)`.
#[must_use]
pub const fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 { (year + 1, 1) } else { (year, month + 1) }
}

/// Number of days in `(year, month)`.
#[must_use]
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let start = first_of_month(year, month);
    let end = start.checked_add_months(Months::new(1)).unwrap_or(start);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // 28..=31
    {
        (end - start).num_days() as u32
    }
}

/// Number of days in `year`, leap-year aware.
#[must_use]
pub fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

/// `(year, month)` of `date`.
#[must_use]
pub fn year_month(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prague() -> Calendar {
        Calendar::from_name("Europe/Prague").expect("tz")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn hour_floor_aligns_to_epoch_hours() {
        assert_eq!(Calendar::hour_floor(7199), 3600);
        assert_eq!(Calendar::hour_floor(7200), 7200);
        assert_eq!(Calendar::hour_floor(-1), -3600);
    }

    #[test]
    fn day_start_is_local_midnight() {
        let cal = prague();
        // 2024-06-01 00:00 CEST is 2024-05-31 22:00 UTC.
        let start = cal.day_start(date(2024, 6, 1));
        assert_eq!(start, 1_717_192_800);
        assert_eq!(cal.local_date(start), date(2024, 6, 1));
        assert_eq!(cal.local_date(start - 1), date(2024, 5, 31));
    }

    #[test]
    fn dst_days_have_23_or_25_hours() {
        let cal = prague();
        let spring = date(2024, 3, 31);
        assert_eq!(cal.day_end(spring) - cal.day_start(spring), 23 * HOUR_SECS);
        let autumn = date(2024, 10, 27);
        assert_eq!(cal.day_end(autumn) - cal.day_start(autumn), 25 * HOUR_SECS);
    }

    #[test]
    fn month_and_year_boundaries() {
        let cal = Calendar::default();
        assert_eq!(cal.month_start(2024, 2), 1_706_745_600);
        assert_eq!(cal.month_end(2024, 12), cal.year_start(2025));
        assert_eq!(cal.year_end(2023), cal.year_start(2024));
    }

    #[test]
    fn leap_years_are_respected() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2023, 12), 31);
        assert_eq!(last_of_month(2024, 2), date(2024, 2, 29));
        assert_eq!(last_of_month(2023, 12), date(2023, 12, 31));
        assert_eq!(days_in_year(2024), 366);
        assert_eq!(days_in_year(2023), 365);
        assert_eq!(days_in_year(1900), 365);
        assert_eq!(days_in_year(2000), 366);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(matches!(
            Calendar::from_name("Mars/Olympus"),
            Err(PvError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn fractional_hour_zones_are_rejected() {
        for name in ["Asia/Kolkata", "Asia/Kathmandu", "Australia/Adelaide", "Australia/Lord_Howe"] {
            let err = Calendar::from_name(name).unwrap_err();
            assert!(err.to_string().contains("whole number of hours"), "{name}: {err}");
        }
        for name in ["UTC", "Europe/Prague", "America/New_York", "Asia/Tokyo"] {
            let cal = Calendar::from_name(name).unwrap();
            let start = cal.day_start(date(2024, 3, 31));
            assert_eq!(start % HOUR_SECS, 0, "{name}");
        }
    }
}
