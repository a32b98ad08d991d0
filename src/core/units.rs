//! Unit normalization for source payloads.
//!
//! Canonical units are W for instantaneous power and Wh for energy counters.

use crate::error::{PvError, Result};

/// Power unit as reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerUnit {
    #[default]
    Watt,
    Kilowatt,
    Megawatt,
}

impl PowerUnit {
    /// Parse a unit label (case-insensitive).
    ///
    /// # Errors
    /// Returns `MalformedResponse` for unknown labels.
    pub fn parse(label: &str) -> Result<Self> {
        match label.trim().to_lowercase().as_str() {
            "w" | "watt" | "watts" => Ok(Self::Watt),
            "kw" | "kilowatt" | "kilowatts" => Ok(Self::Kilowatt),
            "mw" | "megawatt" | "megawatts" => Ok(Self::Megawatt),
            other => Err(PvError::MalformedResponse(format!(
                "unknown power unit '{other}'"
            ))),
        }
    }

    #[must_use]
    pub const fn to_watts_factor(self) -> f64 {
        match self {
            Self::Watt => 1.0,
            Self::Kilowatt => 1_000.0,
            Self::Megawatt => 1_000_000.0,
        }
    }
}

/// Energy unit as reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnergyUnit {
    WattHour,
    #[default]
    KilowattHour,
    MegawattHour,
}

impl EnergyUnit {
    /// Parse a unit label (case-insensitive).
    ///
    /// # Errors
    /// Returns `MalformedResponse` for unknown labels.
    pub fn parse(label: &str) -> Result<Self> {
        match label.trim().to_lowercase().as_str() {
            "wh" => Ok(Self::WattHour),
            "kwh" => Ok(Self::KilowattHour),
            "mwh" => Ok(Self::MegawattHour),
            other => Err(PvError::MalformedResponse(format!(
                "unknown energy unit '{other}'"
            ))),
        }
    }

    #[must_use]
    pub const fn to_watt_hours_factor(self) -> f64 {
        match self {
            Self::WattHour => 1.0,
            Self::KilowattHour => 1_000.0,
            Self::MegawattHour => 1_000_000.0,
        }
    }
}

/// Normalize a power value to W.
///
/// # Errors
/// Rejects non-finite and negative values.
pub fn power_to_watts(value: f64, unit: PowerUnit, field: &str) -> Result<f64> {
    check_measurement(value, field)?;
    Ok(value * unit.to_watts_factor())
}

/// Normalize an energy counter to Wh.
///
/// # Errors
/// Rejects non-finite and negative values.
pub fn energy_to_watt_hours(value: f64, unit: EnergyUnit, field: &str) -> Result<f64> {
    check_measurement(value, field)?;
    Ok(value * unit.to_watt_hours_factor())
}

fn check_measurement(value: f64, field: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(PvError::MalformedResponse(format!(
            "{field} is not a finite number"
        )));
    }
    if value < 0.0 {
        return Err(PvError::MalformedResponse(format!(
            "{field} is negative ({value})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kilowatts_become_watts() {
        let unit = PowerUnit::parse("kW").unwrap();
        assert!((power_to_watts(1.25, unit, "power").unwrap() - 1250.0).abs() < 1e-9);
    }

    #[test]
    fn kilowatt_hours_become_watt_hours() {
        let unit = EnergyUnit::parse("KWH").unwrap();
        assert!((energy_to_watt_hours(5.1, unit, "energy_today").unwrap() - 5100.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_units_are_malformed() {
        assert!(matches!(
            PowerUnit::parse("hp"),
            Err(PvError::MalformedResponse(_))
        ));
        assert!(matches!(
            EnergyUnit::parse("J"),
            Err(PvError::MalformedResponse(_))
        ));
    }

    #[test]
    fn negative_and_nan_values_are_rejected() {
        assert!(power_to_watts(-1.0, PowerUnit::Watt, "power").is_err());
        assert!(energy_to_watt_hours(f64::NAN, EnergyUnit::WattHour, "energy").is_err());
    }
}
