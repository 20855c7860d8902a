//! Frame admission throttle

use std::time::Duration;

/// Default time between admitted frames
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Admits at most one frame per interval
///
/// Bounds recognition work to roughly one pipeline run per interval
/// regardless of the camera frame rate. Timestamps are offsets from stream
/// start, so callers can drive the gate with a synthetic clock.
#[derive(Debug, Clone)]
pub struct FrameGate {
    interval: Duration,
    last_accepted: Option<Duration>,
}

impl FrameGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: None,
        }
    }

    /// Decide whether a frame captured at `now` is admitted.
    ///
    /// The last-accepted timestamp only moves when this returns true.
    pub fn accept(&mut self, now: Duration) -> bool {
        let admitted = match self.last_accepted {
            None => true,
            Some(last) => now
                .checked_sub(last)
                .is_some_and(|elapsed| elapsed >= self.interval),
        };

        if admitted {
            self.last_accepted = Some(now);
        }
        admitted
    }
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}
