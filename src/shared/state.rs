//! Shared reading state

use std::collections::BTreeMap;

use crate::analysis::{MeterReading, MeterScreenType, ReadingAggregator, RecordOutcome};
use crate::config::AppConfig;

/// State shared between the coordinator and whoever presents the readings
#[derive(Debug, Clone, Default)]
pub struct SharedAppState {
    /// Application configuration
    pub config: AppConfig,
    /// Latest reading per screen
    pub aggregator: ReadingAggregator,
    /// Runtime statistics (not persisted)
    pub runtime: RuntimeState,
}

impl SharedAppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            aggregator: ReadingAggregator::new(),
            runtime: RuntimeState::default(),
        }
    }

    /// Record a reading from frame `sequence`, keeping the counters current
    pub fn record(&mut self, sequence: u64, reading: MeterReading) -> RecordOutcome {
        let outcome = self.aggregator.record(sequence, reading);
        match outcome {
            RecordOutcome::Stored => self.runtime.readings_stored += 1,
            RecordOutcome::Stale => self.runtime.stale_rejected += 1,
        }
        outcome
    }

    pub fn snapshot(&self) -> BTreeMap<MeterScreenType, MeterReading> {
        self.aggregator.snapshot()
    }

    /// Whether every configured required screen has been read
    pub fn is_complete(&self) -> bool {
        self.aggregator.is_complete(&self.config.analysis.required)
    }

    pub fn missing(&self) -> Vec<MeterScreenType> {
        self.aggregator.missing(&self.config.analysis.required)
    }
}

/// Runtime counters
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    /// Frames pulled from the source
    pub frames_seen: u64,
    /// Frames that passed the admission gate
    pub frames_admitted: u64,
    /// Worker results received
    pub results_received: u64,
    /// Worker results that were skipped or failed
    pub frames_failed: u64,
    /// Readings written to the aggregator
    pub readings_stored: u64,
    /// Readings rejected as older than the stored one
    pub stale_rejected: u64,
    /// Last error message (if any)
    pub last_error: Option<String>,
}

impl RuntimeState {
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
