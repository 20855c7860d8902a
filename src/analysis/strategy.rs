//! Ordered fallback over the text-based detection strategies

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::reading::MeterReading;
use super::sequential::SequentialLineScanner;
use super::spatial::SpatialFieldMatcher;
use crate::vision::TextObservation;

/// A text-based detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStrategy {
    /// Code above value layout matching
    Spatial,
    /// Anchor-then-forward scan over lines in reading order
    Sequential,
}

impl ReadingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ReadingStrategy::Spatial => "spatial",
            ReadingStrategy::Sequential => "sequential",
        }
    }
}

/// Strategies tried in order; the first that yields readings wins
#[derive(Debug, Clone)]
pub struct StrategyChain {
    order: Vec<ReadingStrategy>,
    spatial: SpatialFieldMatcher,
    scanner: SequentialLineScanner,
}

impl StrategyChain {
    pub fn new(order: Vec<ReadingStrategy>) -> Self {
        Self {
            order,
            spatial: SpatialFieldMatcher::new(),
            scanner: SequentialLineScanner::new(),
        }
    }

    /// Run the chain over one frame's observations.
    ///
    /// Returns the strategy that produced the readings along with them.
    pub fn detect(&self, observations: &[TextObservation]) -> Option<(ReadingStrategy, Vec<MeterReading>)> {
        if observations.is_empty() {
            return None;
        }

        self.order.iter().find_map(|strategy| {
            let readings = self.run(*strategy, observations);
            (!readings.is_empty()).then_some((*strategy, readings))
        })
    }

    fn run(&self, strategy: ReadingStrategy, observations: &[TextObservation]) -> Vec<MeterReading> {
        match strategy {
            ReadingStrategy::Spatial => self.spatial.match_all(observations),
            ReadingStrategy::Sequential => {
                let lines = reading_order(observations);
                self.scanner.scan(&lines).into_iter().collect()
            }
        }
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::new(vec![ReadingStrategy::Spatial, ReadingStrategy::Sequential])
    }
}

/// Texts sorted top-to-bottom, then left-to-right
pub fn reading_order(observations: &[TextObservation]) -> Vec<String> {
    let mut sorted: Vec<&TextObservation> = observations.iter().collect();
    sorted.sort_by(|a, b| {
        a.bounds
            .min_y()
            .partial_cmp(&b.bounds.min_y())
            .unwrap_or(Ordering::Equal)
            .then(a.bounds.min_x().partial_cmp(&b.bounds.min_x()).unwrap_or(Ordering::Equal))
    });
    sorted.into_iter().map(|o| o.text.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MeterScreenType;
    use crate::vision::NormalizedRect;

    fn obs(text: &str, x: f32, y: f32) -> TextObservation {
        TextObservation::new(text, NormalizedRect::new(x, y, 0.3, 0.08), 0.9)
    }

    #[test]
    fn test_reading_order() {
        let observations = vec![obs("c", 0.5, 0.5), obs("a", 0.1, 0.1), obs("b", 0.1, 0.5)];
        assert_eq!(reading_order(&observations), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_spatial_first() {
        let observations = vec![obs("1580", 0.3, 0.1), obs("12345678", 0.2, 0.3)];
        let (strategy, readings) = StrategyChain::default().detect(&observations).unwrap();
        assert_eq!(strategy, ReadingStrategy::Spatial);
        assert_eq!(readings, vec![MeterReading::new(MeterScreenType::Total, "1234567.8")]);
    }

    #[test]
    fn test_falls_back_to_sequential() {
        // Value sits beside the code, so layout matching fails
        let observations = vec![
            obs("GAMA 100", 0.0, 0.0),
            obs("1582", 0.0, 0.1),
            obs("kWh", 0.0, 0.2),
            obs("12345678", 0.6, 0.3),
            obs("2000 imp", 0.0, 0.4),
        ];
        let (strategy, readings) = StrategyChain::default().detect(&observations).unwrap();
        assert_eq!(strategy, ReadingStrategy::Sequential);
        assert_eq!(readings, vec![MeterReading::new(MeterScreenType::Day, "1234567.8")]);
    }

    #[test]
    fn test_respects_configured_order() {
        let observations = vec![obs("1580", 0.3, 0.1), obs("12345678", 0.2, 0.3)];
        let chain = StrategyChain::new(vec![ReadingStrategy::Sequential]);
        assert!(chain.detect(&observations).is_none());
    }

    #[test]
    fn test_empty_frame() {
        assert!(StrategyChain::default().detect(&[]).is_none());
    }
}
