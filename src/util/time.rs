//! Time formatting utilities.

use chrono::TimeDelta;

/// Format the wait until `target`, both given in epoch seconds.
#[must_use]
pub fn format_countdown(target: i64, now: i64) -> String {
    let duration = TimeDelta::seconds(target - now);

    if duration.num_seconds() <= 0 {
        return "now".to_string();
    }

    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;

    if hours > 24 {
        let days = hours / 24;
        format!("in {days} day{}", if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {hours}h {minutes}m")
    } else if minutes > 0 {
        format!("in {minutes}m")
    } else {
        let seconds = duration.num_seconds();
        format!("in {seconds}s")
    }
}

/// Format `target` relative to `now` (past or future), both in epoch seconds.
#[must_use]
pub fn format_relative_time(target: i64, now: i64) -> String {
    let duration = TimeDelta::seconds(now - target);

    if duration.num_seconds().abs() < 60 {
        return "just now".to_string();
    }

    let minutes = duration.num_minutes().abs();
    let hours = duration.num_hours().abs();
    let days = duration.num_days().abs();

    let suffix = if duration.num_seconds() > 0 {
        "ago"
    } else {
        "from now"
    };

    if days > 0 {
        format!("{days} day{} {suffix}", if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("{hours} hour{} {suffix}", if hours == 1 { "" } else { "s" })
    } else {
        format!(
            "{minutes} minute{} {suffix}",
            if minutes == 1 { "" } else { "s" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_717_243_200;

    #[test]
    fn countdown_minutes() {
        assert_eq!(format_countdown(NOW + 180, NOW), "in 3m");
        assert_eq!(format_countdown(NOW + 3 * 3600 + 1800, NOW), "in 3h 30m");
        assert_eq!(format_countdown(NOW - 5, NOW), "now");
    }

    #[test]
    fn relative_time_past_and_future() {
        assert_eq!(format_relative_time(NOW - 7200, NOW), "2 hours ago");
        assert_eq!(format_relative_time(NOW + 86_400 * 3, NOW), "3 days from now");
        assert_eq!(format_relative_time(NOW - 30, NOW), "just now");
    }
}
