//! Number formatting utilities.

/// Format a percentage with one decimal.
#[must_use]
pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

fn format_scaled(value: f64, base_unit: &str) -> String {
    let abs = value.abs();
    if abs >= 1_000_000.0 {
        format!("{:.2} M{base_unit}", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.2} k{base_unit}", value / 1_000.0)
    } else {
        format!("{value:.0} {base_unit}")
    }
}

/// Format an energy amount given in Wh.
#[must_use]
pub fn format_energy(wh: f64) -> String {
    format_scaled(wh, "Wh")
}

/// Format a power value given in W.
#[must_use]
pub fn format_power(w: f64) -> String {
    format_scaled(w, "W")
}

/// Format a byte count.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut unit = 0;
    let mut whole = bytes;
    let mut rem = 0;
    while whole >= 1024 && unit < UNITS.len() - 1 {
        rem = whole % 1024;
        whole /= 1024;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{whole}.{} {}", rem * 10 / 1024, UNITS[unit])
    }
}
