//! Position-free screen detection over ordered text lines
//!
//! The supported meter prints a fixed header (`GAMA 100`) followed, for
//! energy screens, by the register code, the `kWh` unit, the value and the
//! `2000 imp` pulse constant. Markers are only trusted when they appear in
//! that order after the header.

use regex::Regex;

use super::codes::ENERGY_CODES;
use super::reading::{MeterReading, MeterScreenType};

const ANCHOR: &str = "gama100";
const UNIT_MARKER: &str = "kwh";
const PULSE_MARKER: &str = "2000imp";
const DATE_MARKER: &str = "092";
const TIME_MARKER: &str = "091";

const DATE_PATTERN: &str = r"\b\d{1,2}[-/]\d{1,2}[-/]\d{2,4}\b";
const TIME_PATTERN: &str = r"\b\d{1,2}[:.]\d{2}\b";
/// Eight digits with an optional fraction, not touching other digits
const ENERGY_PATTERN: &str = r"(?:^|\D)(\d{8}(?:\.\d)?)(?:\D|$)";

/// Anchor-then-forward line scanner
#[derive(Debug, Clone)]
pub struct SequentialLineScanner {
    date_re: Regex,
    time_re: Regex,
    energy_re: Regex,
}

impl SequentialLineScanner {
    pub fn new() -> Self {
        Self {
            date_re: Regex::new(DATE_PATTERN).expect("date pattern is valid"),
            time_re: Regex::new(TIME_PATTERN).expect("time pattern is valid"),
            energy_re: Regex::new(ENERGY_PATTERN).expect("energy pattern is valid"),
        }
    }

    /// Lowercase and strip whitespace and periods
    pub fn normalize_line(line: &str) -> String {
        line.chars()
            .filter(|c| !c.is_whitespace() && *c != '.')
            .flat_map(char::to_lowercase)
            .collect()
    }

    /// Detect a single reading from lines in reading order
    pub fn scan<S: AsRef<str>>(&self, lines: &[S]) -> Option<MeterReading> {
        let lines: Vec<String> = lines.iter().map(|l| Self::normalize_line(l.as_ref())).collect();

        let anchor = lines.iter().position(|l| l.contains(ANCHOR))?;

        ENERGY_CODES
            .iter()
            .find_map(|(code, screen)| self.detect_energy(&lines, anchor, code, *screen))
            .or_else(|| self.detect_date(&lines))
            .or_else(|| self.detect_time(&lines))
    }

    /// Walk code → unit → value → pulse marker strictly forward from the anchor
    fn detect_energy(
        &self,
        lines: &[String],
        anchor: usize,
        code: &str,
        screen: MeterScreenType,
    ) -> Option<MeterReading> {
        let code_idx = find_after(lines, anchor, |l| l.contains(code))?;
        let unit_idx = find_after(lines, code_idx, |l| l.contains(UNIT_MARKER))?;
        let value_idx = find_after(lines, unit_idx, |l| self.find_energy_value(l).is_some())?;
        let pulse_idx = find_after(lines, value_idx, |l| l.contains(PULSE_MARKER))?;

        if !(anchor < code_idx && code_idx < unit_idx && unit_idx < value_idx && value_idx < pulse_idx) {
            return None;
        }

        let value = self.find_energy_value(&lines[value_idx])?;
        Some(MeterReading::energy(screen, value))
    }

    /// First isolated 8-digit run, optionally followed by one fractional digit
    fn find_energy_value<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.energy_re
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    fn detect_date(&self, lines: &[String]) -> Option<MeterReading> {
        if !lines.iter().any(|l| l.contains(DATE_MARKER)) {
            return None;
        }
        first_match(&self.date_re, lines).map(|m| MeterReading::new(MeterScreenType::Date, m))
    }

    fn detect_time(&self, lines: &[String]) -> Option<MeterReading> {
        if !lines.iter().any(|l| l.contains(TIME_MARKER)) {
            return None;
        }
        first_match(&self.time_re, lines).map(|m| MeterReading::new(MeterScreenType::Time, m))
    }
}

impl Default for SequentialLineScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the first line after `start` matching `pred`
fn find_after<F>(lines: &[String], start: usize, pred: F) -> Option<usize>
where
    F: Fn(&str) -> bool,
{
    lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, l)| pred(l))
        .map(|(i, _)| i)
}

fn first_match(re: &Regex, lines: &[String]) -> Option<String> {
    lines
        .iter()
        .find_map(|l| re.find(l).map(|m| m.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(lines: &[&str]) -> Option<MeterReading> {
        SequentialLineScanner::new().scan(lines)
    }

    #[test]
    fn test_total_chain() {
        let reading = scan(&["gama100 code", "1580", "kwh", "12345678", "2000imp"]).unwrap();
        assert_eq!(reading, MeterReading::new(MeterScreenType::Total, "1234567.8"));
    }

    #[test]
    fn test_pulse_marker_before_value_fails() {
        assert!(scan(&["gama100 code", "1580", "kwh", "2000imp", "12345678"]).is_none());
    }

    #[test]
    fn test_missing_anchor() {
        assert!(scan(&["1580", "kwh", "12345678", "2000imp"]).is_none());
    }

    #[test]
    fn test_code_on_anchor_line_is_not_used() {
        assert!(scan(&["gama100 1580", "kwh", "12345678", "2000imp"]).is_none());
    }

    #[test]
    fn test_raw_display_text_is_normalized() {
        let reading = scan(&["GAMA 100", "1.8.1 1581", "kWh", "2345678.9", "2000 imp/kWh"]).unwrap();
        assert_eq!(reading, MeterReading::new(MeterScreenType::Night, "2345678.9"));
    }

    #[test]
    fn test_day_chain() {
        let reading = scan(&["GAMA100", "1582", "kWh", "00012345", "2000imp"]).unwrap();
        assert_eq!(reading, MeterReading::new(MeterScreenType::Day, "0001234.5"));
    }

    #[test]
    fn test_total_has_priority() {
        let lines = ["gama100", "1581", "1580", "kwh", "11111111", "2000imp"];
        assert_eq!(scan(&lines).unwrap().screen(), MeterScreenType::Total);
    }

    #[test]
    fn test_value_must_be_isolated() {
        assert!(scan(&["gama100", "1580", "kwh", "123456789", "2000imp"]).is_none());
    }

    #[test]
    fn test_date_screen() {
        let reading = scan(&["gama100", "0.9.2", "12/03/2024"]).unwrap();
        assert_eq!(reading, MeterReading::new(MeterScreenType::Date, "12/03/2024"));
    }

    #[test]
    fn test_date_pattern_needs_marker() {
        assert!(scan(&["gama100", "12-03-24"]).is_none());
    }

    #[test]
    fn test_time_screen() {
        let reading = scan(&["gama100", "091", "13:45"]).unwrap();
        assert_eq!(reading, MeterReading::new(MeterScreenType::Time, "13:45"));
    }

    #[test]
    fn test_date_takes_precedence_over_time() {
        let reading = scan(&["gama100", "092 091", "1-2-24", "13:45"]).unwrap();
        assert_eq!(reading.screen(), MeterScreenType::Date);
    }

    #[test]
    fn test_find_energy_value() {
        let scanner = SequentialLineScanner::new();
        assert_eq!(scanner.find_energy_value("12345678"), Some("12345678"));
        assert_eq!(scanner.find_energy_value("x12345678y"), Some("12345678"));
        assert_eq!(scanner.find_energy_value("12345678.9"), Some("12345678.9"));
        assert_eq!(scanner.find_energy_value("12345678.95"), Some("12345678"));
        assert_eq!(scanner.find_energy_value("123456789"), None);
        assert_eq!(scanner.find_energy_value("1234567"), None);
        assert_eq!(scanner.find_energy_value("1234 12345678"), Some("12345678"));
        assert_eq!(scanner.find_energy_value("123456789 87654321"), Some("87654321"));
    }

    #[test]
    fn test_normalize_line() {
        assert_eq!(SequentialLineScanner::normalize_line("GAMA 1.0.0"), "gama100");
        assert_eq!(SequentialLineScanner::normalize_line(" 2000 Imp "), "2000imp");
    }
}
