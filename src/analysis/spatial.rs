//! Layout-based field matching
//!
//! On the meter display each register code is printed directly above its
//! 8-digit value. A code observation is paired with a value observation that
//! sits entirely below it and shares part of its horizontal extent.

use tracing::debug;

use super::codes::{classify, digits_only, normalize};
use super::reading::{MeterReading, MeterScreenType};
use crate::vision::{NormalizedRect, TextObservation};

/// Required length of a register value in digits
const VALUE_DIGITS: usize = 8;

/// A text observation whose text decodes to a register code
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCodeObservation {
    pub screen: MeterScreenType,
    pub bounds: NormalizedRect,
}

/// A text observation whose digits-only form is a full register value
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCandidate {
    pub digits: String,
    pub bounds: NormalizedRect,
}

/// Pairs field codes with the value printed below them
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialFieldMatcher;

impl SpatialFieldMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Observations that decode to a register code, in discovery order
    pub fn field_codes(&self, observations: &[TextObservation]) -> Vec<FieldCodeObservation> {
        observations
            .iter()
            .filter_map(|obs| {
                classify(&normalize(&obs.text)).map(|screen| FieldCodeObservation {
                    screen,
                    bounds: obs.bounds,
                })
            })
            .collect()
    }

    /// Observations that look like a full 8-digit register value
    pub fn value_candidates(&self, observations: &[TextObservation]) -> Vec<ValueCandidate> {
        observations
            .iter()
            .filter_map(|obs| {
                let digits = digits_only(&normalize(&obs.text));
                is_register_value(&digits).then(|| ValueCandidate {
                    digits,
                    bounds: obs.bounds,
                })
            })
            .collect()
    }

    /// Whether `candidate` sits in the value slot of `code`
    pub fn is_value_slot(code: &NormalizedRect, candidate: &NormalizedRect) -> bool {
        candidate.is_below(code) && candidate.overlaps_x(code)
    }

    /// First qualifying reading for the frame, if any
    pub fn detect(&self, observations: &[TextObservation]) -> Option<MeterReading> {
        self.match_all(observations).into_iter().next()
    }

    /// One reading per code type that has a qualifying value below it.
    ///
    /// Codes are visited in discovery order and each takes the first
    /// candidate that satisfies the layout rule.
    pub fn match_all(&self, observations: &[TextObservation]) -> Vec<MeterReading> {
        let codes = self.field_codes(observations);
        if codes.is_empty() {
            return vec![];
        }
        let candidates = self.value_candidates(observations);

        let mut readings: Vec<MeterReading> = Vec::new();
        for code in &codes {
            if readings.iter().any(|r| r.screen() == code.screen) {
                continue;
            }
            let Some(candidate) = candidates
                .iter()
                .find(|c| Self::is_value_slot(&code.bounds, &c.bounds))
            else {
                debug!("Code for {} has no value below it", code.screen);
                continue;
            };
            readings.push(MeterReading::energy(code.screen, &candidate.digits));
        }

        readings
    }
}

fn is_register_value(digits: &str) -> bool {
    digits.len() == VALUE_DIGITS && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(text: &str, x: f32, y: f32, w: f32, h: f32) -> TextObservation {
        TextObservation::new(text, NormalizedRect::new(x, y, w, h), 0.9)
    }

    #[test]
    fn test_match_below_with_overlap() {
        let observations = vec![
            obs("1580", 0.3, 0.1, 0.2, 0.1),
            obs("12345678", 0.2, 0.25, 0.5, 0.1),
        ];
        let reading = SpatialFieldMatcher::new().detect(&observations).unwrap();
        assert_eq!(reading, MeterReading::new(MeterScreenType::Total, "1234567.8"));
    }

    #[test]
    fn test_no_match_without_horizontal_overlap() {
        let observations = vec![
            obs("1580", 0.1, 0.1, 0.2, 0.1),
            obs("12345678", 0.5, 0.25, 0.4, 0.1),
        ];
        assert!(SpatialFieldMatcher::new().detect(&observations).is_none());
    }

    #[test]
    fn test_no_match_when_value_above_code() {
        let observations = vec![
            obs("12345678", 0.2, 0.05, 0.5, 0.1),
            obs("1581", 0.3, 0.3, 0.2, 0.1),
        ];
        assert!(SpatialFieldMatcher::new().detect(&observations).is_none());
    }

    #[test]
    fn test_value_touching_code_is_not_below() {
        let observations = vec![
            obs("1582", 0.3, 0.1, 0.2, 0.1),
            obs("12345678", 0.3, 0.2, 0.2, 0.1),
        ];
        assert!(SpatialFieldMatcher::new().detect(&observations).is_none());
    }

    #[test]
    fn test_value_with_separator_and_ocr_confusion() {
        let observations = vec![
            obs("7581", 0.3, 0.1, 0.2, 0.1),
            obs("2345678,9", 0.2, 0.3, 0.5, 0.1),
        ];
        let reading = SpatialFieldMatcher::new().detect(&observations).unwrap();
        assert_eq!(reading, MeterReading::new(MeterScreenType::Night, "2345678.9"));
    }

    #[test]
    fn test_rejects_wrong_length_values() {
        let observations = vec![
            obs("1580", 0.3, 0.1, 0.2, 0.1),
            obs("1234567", 0.2, 0.25, 0.5, 0.1),
            obs("12345678kwh", 0.2, 0.4, 0.5, 0.1),
        ];
        assert!(SpatialFieldMatcher::new().detect(&observations).is_none());
    }

    #[test]
    fn test_first_candidate_in_discovery_order_wins() {
        let observations = vec![
            obs("1580", 0.3, 0.1, 0.2, 0.1),
            obs("11111111", 0.2, 0.5, 0.5, 0.1),
            obs("22222222", 0.2, 0.25, 0.5, 0.1),
        ];
        let reading = SpatialFieldMatcher::new().detect(&observations).unwrap();
        assert_eq!(reading.value(), "1111111.1");
    }

    #[test]
    fn test_match_all_emits_each_code_type() {
        let observations = vec![
            obs("1580", 0.05, 0.1, 0.2, 0.1),
            obs("11111111", 0.0, 0.25, 0.3, 0.1),
            obs("1582", 0.6, 0.1, 0.2, 0.1),
            obs("22222222", 0.55, 0.25, 0.3, 0.1),
        ];
        let readings = SpatialFieldMatcher::new().match_all(&observations);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0], MeterReading::new(MeterScreenType::Total, "1111111.1"));
        assert_eq!(readings[1], MeterReading::new(MeterScreenType::Day, "2222222.2"));
    }

    #[test]
    fn test_match_all_first_code_of_type_wins() {
        let observations = vec![
            obs("1580", 0.1, 0.1, 0.3, 0.1),
            obs("11111111", 0.1, 0.25, 0.3, 0.1),
            obs("1580", 0.6, 0.5, 0.3, 0.1),
            obs("22222222", 0.6, 0.65, 0.3, 0.1),
        ];
        let readings = SpatialFieldMatcher::new().match_all(&observations);
        assert_eq!(readings, vec![MeterReading::new(MeterScreenType::Total, "1111111.1")]);
    }

    #[test]
    fn test_field_codes_and_candidates() {
        let matcher = SpatialFieldMatcher::new();
        let observations = vec![obs("GAMA 100", 0.0, 0.0, 0.5, 0.1), obs("1580", 0.3, 0.1, 0.2, 0.1)];
        let codes = matcher.field_codes(&observations);
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].screen, MeterScreenType::Total);
        assert!(matcher.value_candidates(&observations).is_empty());
    }
}
