//! Message types for communication between the coordinator and workers

use std::fmt;
use std::sync::Arc;

use crate::analysis::{MeterReading, ReadingStrategy};
use crate::capture::CapturedFrame;

/// An admitted frame tagged with its sequence number
#[derive(Debug, Clone)]
pub struct FrameJob {
    pub sequence: u64,
    pub frame: Arc<CapturedFrame>,
}

/// Messages sent from the coordinator to a worker
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Run the worker's path on a frame
    Process(FrameJob),
    /// Finish and exit the worker thread
    Shutdown,
}

/// The two independent recognition paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePath {
    /// Locator, preprocessing, OCR and text strategies
    Text,
    /// Whole-frame digit classifier
    Digits,
}

impl fmt::Display for PipelinePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelinePath::Text => write!(f, "text"),
            PipelinePath::Digits => write!(f, "digits"),
        }
    }
}

/// What produced a set of readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSource {
    Text(ReadingStrategy),
    Digits,
}

impl fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingSource::Text(strategy) => write!(f, "text/{}", strategy.name()),
            ReadingSource::Digits => write!(f, "digits"),
        }
    }
}

/// Messages sent from a worker back to the coordinator
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The frame produced readings
    Readings {
        sequence: u64,
        source: ReadingSource,
        readings: Vec<MeterReading>,
    },
    /// The frame was processed but nothing was recognized
    NoDetection { sequence: u64, path: PipelinePath },
    /// The frame could not be processed and was skipped
    Skipped {
        sequence: u64,
        path: PipelinePath,
        reason: String,
    },
    /// Unexpected failure while processing the frame
    Error {
        sequence: u64,
        path: PipelinePath,
        message: String,
    },
}
