//! Analysis Layer
//!
//! Turns recognized text into typed meter readings:
//! - Field code normalization (OCR confusion tolerant)
//! - Spatial code/value layout matching
//! - Sequential anchor scanning over text lines
//! - Aggregation of the latest reading per screen

pub mod aggregator;
pub mod codes;
pub mod reading;
pub mod sequential;
pub mod spatial;
pub mod strategy;

pub use aggregator::{ReadingAggregator, RecordOutcome};
pub use reading::{normalize_energy_value, MeterReading, MeterScreenType};
pub use sequential::SequentialLineScanner;
pub use spatial::SpatialFieldMatcher;
pub use strategy::{ReadingStrategy, StrategyChain};
