//! Reading aggregation
//!
//! Keeps the latest reading per screen type. Every write carries the
//! sequence number of the frame it was recognized from, so a slow result
//! from an older frame cannot overwrite a newer one.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::reading::{MeterReading, MeterScreenType};

/// Outcome of [`ReadingAggregator::record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The reading is now the current value for its type
    Stored,
    /// A reading from a newer frame is already held
    Stale,
}

#[derive(Debug, Clone)]
struct Entry {
    sequence: u64,
    reading: MeterReading,
}

/// Latest reading per screen type
#[derive(Debug, Clone, Default)]
pub struct ReadingAggregator {
    entries: HashMap<MeterScreenType, Entry>,
}

impl ReadingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading produced from frame `sequence`
    pub fn record(&mut self, sequence: u64, reading: MeterReading) -> RecordOutcome {
        let screen = reading.screen();
        if let Some(existing) = self.entries.get(&screen) {
            if existing.sequence > sequence {
                debug!(
                    "Dropping stale {} reading from frame {} (holding frame {})",
                    screen, sequence, existing.sequence
                );
                return RecordOutcome::Stale;
            }
        }

        self.entries.insert(screen, Entry { sequence, reading });
        RecordOutcome::Stored
    }

    /// All current readings, ordered by screen type
    pub fn snapshot(&self) -> BTreeMap<MeterScreenType, MeterReading> {
        self.entries
            .iter()
            .map(|(screen, entry)| (*screen, entry.reading.clone()))
            .collect()
    }

    /// Whether every required type has a value
    pub fn is_complete(&self, required: &[MeterScreenType]) -> bool {
        required.iter().all(|t| self.entries.contains_key(t))
    }

    /// Required types that are still missing
    pub fn missing(&self, required: &[MeterScreenType]) -> Vec<MeterScreenType> {
        required
            .iter()
            .copied()
            .filter(|t| !self.entries.contains_key(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let mut aggregator = ReadingAggregator::new();
        let outcome = aggregator.record(1, MeterReading::new(MeterScreenType::Night, "2345678.9"));
        assert_eq!(outcome, RecordOutcome::Stored);

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&MeterScreenType::Night].value(), "2345678.9");
        assert!(!snapshot.contains_key(&MeterScreenType::Total));
    }

    #[test]
    fn test_newer_reading_overwrites() {
        let mut aggregator = ReadingAggregator::new();
        aggregator.record(1, MeterReading::new(MeterScreenType::Total, "1.0"));
        aggregator.record(2, MeterReading::new(MeterScreenType::Total, "2.0"));
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot[&MeterScreenType::Total].value(), "2.0");
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_same_frame_overwrites() {
        let mut aggregator = ReadingAggregator::new();
        aggregator.record(3, MeterReading::new(MeterScreenType::Total, "1.0"));
        let outcome = aggregator.record(3, MeterReading::new(MeterScreenType::Total, "2.0"));
        assert_eq!(outcome, RecordOutcome::Stored);
        assert_eq!(aggregator.snapshot()[&MeterScreenType::Total].value(), "2.0");
    }

    #[test]
    fn test_stale_reading_rejected() {
        let mut aggregator = ReadingAggregator::new();
        aggregator.record(5, MeterReading::new(MeterScreenType::Day, "new"));
        let outcome = aggregator.record(4, MeterReading::new(MeterScreenType::Day, "old"));
        assert_eq!(outcome, RecordOutcome::Stale);
        assert_eq!(aggregator.snapshot()[&MeterScreenType::Day].value(), "new");
    }

    #[test]
    fn test_stale_check_is_per_type() {
        let mut aggregator = ReadingAggregator::new();
        aggregator.record(5, MeterReading::new(MeterScreenType::Day, "1.0"));
        let outcome = aggregator.record(4, MeterReading::new(MeterScreenType::Night, "2.0"));
        assert_eq!(outcome, RecordOutcome::Stored);
    }

    #[test]
    fn test_is_complete() {
        let required = MeterScreenType::required_by_default();
        let mut aggregator = ReadingAggregator::new();
        assert!(aggregator.snapshot().is_empty());
        assert!(!aggregator.is_complete(&required));

        aggregator.record(1, MeterReading::new(MeterScreenType::Total, "1"));
        aggregator.record(2, MeterReading::new(MeterScreenType::Night, "2"));
        aggregator.record(3, MeterReading::new(MeterScreenType::Day, "3"));
        assert_eq!(aggregator.missing(&required), vec![MeterScreenType::Date]);

        aggregator.record(4, MeterReading::new(MeterScreenType::Date, "01/02/24"));
        assert!(aggregator.is_complete(&required));
        assert!(!aggregator.snapshot().contains_key(&MeterScreenType::Time));
    }
}
