//! Meter reading value types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which physical display screen a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterScreenType {
    /// Total energy register (code 1580)
    Total,
    /// Night tariff register (code 1581)
    Night,
    /// Day tariff register (code 1582)
    Day,
    /// Meter date screen
    Date,
    /// Meter clock screen
    Time,
}

impl MeterScreenType {
    /// All screen types in display order
    pub const ALL: [MeterScreenType; 5] = [
        MeterScreenType::Total,
        MeterScreenType::Night,
        MeterScreenType::Day,
        MeterScreenType::Date,
        MeterScreenType::Time,
    ];

    /// Screens that must be captured before a reading set counts as complete.
    /// The clock screen is informational only.
    pub fn required_by_default() -> Vec<MeterScreenType> {
        Self::ALL
            .iter()
            .copied()
            .filter(|t| *t != MeterScreenType::Time)
            .collect()
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            MeterScreenType::Total => "Total",
            MeterScreenType::Night => "Night",
            MeterScreenType::Day => "Day",
            MeterScreenType::Date => "Date",
            MeterScreenType::Time => "Time",
        }
    }
}

impl fmt::Display for MeterScreenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single normalized reading taken from one screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    screen: MeterScreenType,
    value: String,
}

impl MeterReading {
    /// Create a reading. `value` must already be in canonical form.
    pub fn new(screen: MeterScreenType, value: impl Into<String>) -> Self {
        Self {
            screen,
            value: value.into(),
        }
    }

    /// Create an energy reading, inserting the decimal point when needed
    pub fn energy(screen: MeterScreenType, raw: &str) -> Self {
        Self::new(screen, normalize_energy_value(raw))
    }

    pub fn screen(&self) -> MeterScreenType {
        self.screen
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for MeterReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.screen, self.value)
    }
}

/// Canonicalize an energy register value.
///
/// The display shows eight digits with one fractional digit. When the
/// recognized string carries no separator the point is inserted before the
/// last digit. Anything else is returned cleaned but otherwise untouched so
/// consumers can re-validate it.
pub fn normalize_energy_value(raw: &str) -> String {
    let mut cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if !cleaned.contains('.') && cleaned.chars().count() == 8 {
        let last = cleaned.len() - cleaned.chars().last().map_or(0, char::len_utf8);
        cleaned.insert(last, '.');
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_inserts_point_before_last_digit() {
        assert_eq!(normalize_energy_value("12345678"), "1234567.8");
        assert_eq!(normalize_energy_value("00012345"), "0001234.5");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_energy_value("23456789");
        assert_eq!(normalize_energy_value(&once), once);
        assert_eq!(normalize_energy_value("1234567.8"), "1234567.8");
    }

    #[test]
    fn test_normalize_strips_spaces() {
        assert_eq!(normalize_energy_value("1234 5678"), "1234567.8");
    }

    #[test]
    fn test_normalize_keeps_unexpected_lengths() {
        assert_eq!(normalize_energy_value("1234567"), "1234567");
        assert_eq!(normalize_energy_value("123456789"), "123456789");
    }

    #[test]
    fn test_required_by_default_skips_time() {
        let required = MeterScreenType::required_by_default();
        assert_eq!(required.len(), 4);
        assert!(!required.contains(&MeterScreenType::Time));
    }

    #[test]
    fn test_energy_constructor() {
        let reading = MeterReading::energy(MeterScreenType::Night, "23456789");
        assert_eq!(reading.screen(), MeterScreenType::Night);
        assert_eq!(reading.value(), "2345678.9");
        assert_eq!(reading.to_string(), "Night = 2345678.9");
    }

    #[test]
    fn test_screen_type_serde_names() {
        let json = serde_json::to_string(&MeterScreenType::Total).unwrap();
        assert_eq!(json, "\"total\"");
        let parsed: MeterScreenType = serde_json::from_str("\"date\"").unwrap();
        assert_eq!(parsed, MeterScreenType::Date);
    }
}
