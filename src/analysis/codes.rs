//! Field code normalization
//!
//! Maps raw recognized text onto the 4-digit register codes printed next to
//! each energy value, tolerating the usual seven-segment OCR confusions.

use super::reading::MeterScreenType;

/// Register codes in priority order
pub const ENERGY_CODES: [(&str, MeterScreenType); 3] = [
    ("1580", MeterScreenType::Total),
    ("1581", MeterScreenType::Night),
    ("1582", MeterScreenType::Day),
];

/// Canonicalize recognized text: drop whitespace, use `.` as the only
/// separator and collapse doubled points.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect::<String>()
        .replace("..", ".")
}

/// Strip separators, leaving the characters used for length checks
pub fn digits_only(text: &str) -> String {
    text.chars().filter(|c| *c != '.' && *c != ',').collect()
}

/// Classify a normalized token as one of the energy register codes
pub fn classify(text: &str) -> Option<MeterScreenType> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 4 {
        return None;
    }

    let code = &digits[..4];
    let variants = [code.to_string(), replace_leading_seven(code)];

    ENERGY_CODES
        .iter()
        .find(|(known, _)| variants.iter().any(|v| v == known))
        .map(|(_, screen)| *screen)
}

/// The seven-segment "1" is frequently read as "7"
fn replace_leading_seven(code: &str) -> String {
    match code.strip_prefix('7') {
        Some(rest) => format!("1{rest}"),
        None => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(" 1234 567,8 "), "1234567.8");
        assert_eq!(normalize("1234567..8"), "1234567.8");
        assert_eq!(normalize("12,,3"), "12.3");
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("1234567.8"), "12345678");
        assert_eq!(digits_only("1,2.3"), "123");
    }

    #[test]
    fn test_classify_known_codes() {
        assert_eq!(classify("1580"), Some(MeterScreenType::Total));
        assert_eq!(classify("1581"), Some(MeterScreenType::Night));
        assert_eq!(classify("1582"), Some(MeterScreenType::Day));
    }

    #[test]
    fn test_classify_leading_seven_confusion() {
        assert_eq!(classify("7580"), Some(MeterScreenType::Total));
        assert_eq!(classify("7581"), Some(MeterScreenType::Night));
        assert_eq!(classify("7582"), Some(MeterScreenType::Day));
    }

    #[test]
    fn test_classify_rejects_other_codes() {
        assert_eq!(classify("1583"), None);
        assert_eq!(classify("0092"), None);
        assert_eq!(classify("7777"), None);
        assert_eq!(classify("158"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn test_classify_uses_first_four_digits() {
        assert_eq!(classify("1581.8.0"), Some(MeterScreenType::Night));
        assert_eq!(classify("C1580"), Some(MeterScreenType::Total));
        assert_eq!(classify("2158"), None);
    }
}
