//! Shared state and messaging between the coordinator and its workers
//!
//! Thread-safe reading state plus the command/event types that travel over
//! the worker channels.

pub mod messages;
pub mod state;

pub use messages::{FrameJob, PipelinePath, ReadingSource, WorkerCommand, WorkerEvent};
pub use state::{RuntimeState, SharedAppState};
