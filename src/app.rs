//! Application Coordinator
//!
//! Owns the admission gate and the shared reading state, hands admitted
//! frames to the text and digit workers, and records what comes back.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analysis::{MeterReading, MeterScreenType, RecordOutcome, StrategyChain};
use crate::capture::{CapturedFrame, FrameGate, FrameSource};
use crate::config::AppConfig;
use crate::error::is_frame_error;
use crate::shared::{FrameJob, PipelinePath, ReadingSource, SharedAppState, WorkerCommand, WorkerEvent};
use crate::vision::{DigitReader, TextObservation, VisionPipeline};

/// Presentation hook, called for every stored reading
pub type ReadingCallback = Box<dyn Fn(&MeterReading) + Send + Sync>;

const IDLE_POLL: Duration = Duration::from_millis(100);

/// A worker thread and its command channel
struct Worker {
    path: PipelinePath,
    commands: Sender<WorkerCommand>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn<F>(path: PipelinePath, events: Sender<WorkerEvent>, mut process: F) -> Result<Self>
    where
        F: FnMut(&FrameJob) -> Result<Option<(ReadingSource, Vec<MeterReading>)>> + Send + 'static,
    {
        let (commands, rx) = unbounded::<WorkerCommand>();

        let handle = std::thread::Builder::new()
            .name(format!("{}-worker", path))
            .spawn(move || {
                debug!("{} worker started", path);
                while let Ok(command) = rx.recv() {
                    let job = match command {
                        WorkerCommand::Process(job) => job,
                        WorkerCommand::Shutdown => break,
                    };
                    let sequence = job.sequence;

                    let event = match process(&job) {
                        Ok(Some((source, readings))) if !readings.is_empty() => WorkerEvent::Readings {
                            sequence,
                            source,
                            readings,
                        },
                        Ok(_) => WorkerEvent::NoDetection { sequence, path },
                        Err(e) if is_frame_error(&e) => WorkerEvent::Skipped {
                            sequence,
                            path,
                            reason: format!("{:#}", e),
                        },
                        Err(e) => WorkerEvent::Error {
                            sequence,
                            path,
                            message: format!("{:#}", e),
                        },
                    };

                    if events.send(event).is_err() {
                        break;
                    }
                }
                debug!("{} worker exiting", path);
            })
            .with_context(|| format!("Failed to spawn {} worker", path))?;

        Ok(Self {
            path,
            commands,
            handle: Some(handle),
        })
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

/// Main application coordinator
pub struct MeterReaderApp {
    /// Readings and runtime counters
    shared_state: Arc<RwLock<SharedAppState>>,
    gate: FrameGate,
    next_sequence: u64,
    /// Used for recorded observations that bypass the workers
    chain: StrategyChain,
    workers: Vec<Worker>,
    events_tx: Sender<WorkerEvent>,
    events: Receiver<WorkerEvent>,
    /// Worker results still owed to the coordinator
    pending: usize,
    callbacks: Vec<ReadingCallback>,
}

impl MeterReaderApp {
    /// Create a coordinator with no workers attached
    pub fn new(config: AppConfig) -> Self {
        let gate = FrameGate::new(config.capture.admission_interval());
        let chain = StrategyChain::new(config.analysis.strategies.clone());
        let (events_tx, events) = unbounded();

        Self {
            shared_state: Arc::new(RwLock::new(SharedAppState::new(config))),
            gate,
            next_sequence: 0,
            chain,
            workers: Vec::new(),
            events_tx,
            events,
            pending: 0,
            callbacks: Vec::new(),
        }
    }

    /// Attach the text path: locate, preprocess, recognize, then the
    /// strategy chain
    pub fn with_text_pipeline(mut self, mut pipeline: VisionPipeline) -> Result<Self> {
        let chain = self.chain.clone();
        let worker = Worker::spawn(PipelinePath::Text, self.events_tx.clone(), move |job| {
            let Some(observations) = pipeline.observe(job.sequence, &job.frame)? else {
                return Ok(None);
            };
            Ok(chain
                .detect(&observations)
                .map(|(strategy, readings)| (ReadingSource::Text(strategy), readings)))
        })?;
        self.workers.push(worker);
        Ok(self)
    }

    /// Attach the digit classifier path
    pub fn with_digit_reader(mut self, mut reader: DigitReader) -> Result<Self> {
        let worker = Worker::spawn(PipelinePath::Digits, self.events_tx.clone(), move |job| {
            let image = job.frame.to_oriented_image()?;
            Ok(reader.read(&image)?.map(|reading| (ReadingSource::Digits, vec![reading])))
        })?;
        self.workers.push(worker);
        Ok(self)
    }

    /// Register a callback for stored readings
    pub fn on_reading(&mut self, callback: ReadingCallback) {
        self.callbacks.push(callback);
    }

    /// Get current shared state
    pub fn state(&self) -> Arc<RwLock<SharedAppState>> {
        self.shared_state.clone()
    }

    /// Offer a frame to the pipeline.
    ///
    /// Returns whether the gate admitted it. Admitted frames are processed
    /// asynchronously; call [`Self::drain`] or [`Self::wait_idle`] to collect
    /// the results.
    pub fn submit(&mut self, frame: CapturedFrame) -> bool {
        self.shared_state.write().runtime.frames_seen += 1;
        if !self.gate.accept(frame.timestamp) {
            return false;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.shared_state.write().runtime.frames_admitted += 1;
        debug!("Admitted frame {} at {:?}", sequence, frame.timestamp);

        let frame = Arc::new(frame);
        for worker in &self.workers {
            let job = FrameJob {
                sequence,
                frame: frame.clone(),
            };
            if worker.commands.send(WorkerCommand::Process(job)).is_ok() {
                self.pending += 1;
            } else {
                warn!("{} worker is gone, frame {} not processed", worker.path, sequence);
            }
        }
        true
    }

    /// Handle every result that is already available
    pub fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    /// Block until every submitted frame has been processed
    pub fn wait_idle(&mut self) {
        while self.pending > 0 {
            match self.events.recv_timeout(IDLE_POLL) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.workers.iter().any(Worker::is_running) {
                        warn!("All workers stopped with {} results outstanding", self.pending);
                        self.pending = 0;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Pull every frame from a source through the pipeline
    pub fn run(&mut self, source: &mut dyn FrameSource) -> Result<()> {
        while let Some(frame) = source.next_frame()? {
            self.submit(frame);
            self.drain();
        }
        self.wait_idle();
        Ok(())
    }

    /// Run one frame's already recognized, top-left origin observations
    /// through the strategy chain and the aggregator
    pub fn replay_observations(&mut self, observations: &[TextObservation]) -> Vec<MeterReading> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        {
            let mut state = self.shared_state.write();
            state.runtime.frames_seen += 1;
            state.runtime.frames_admitted += 1;
        }

        match self.chain.detect(observations) {
            Some((strategy, readings)) => {
                self.record_all(sequence, ReadingSource::Text(strategy), &readings);
                readings
            }
            None => {
                debug!("Frame {}: no reading in recorded observations", sequence);
                Vec::new()
            }
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        self.pending = self.pending.saturating_sub(1);
        self.shared_state.write().runtime.results_received += 1;

        match event {
            WorkerEvent::Readings {
                sequence,
                source,
                readings,
            } => self.record_all(sequence, source, &readings),
            WorkerEvent::NoDetection { sequence, path } => {
                debug!("Frame {}: {} path found nothing", sequence, path);
            }
            WorkerEvent::Skipped {
                sequence,
                path,
                reason,
            } => {
                debug!("Frame {}: {} path skipped: {}", sequence, path, reason);
                self.shared_state.write().runtime.frames_failed += 1;
            }
            WorkerEvent::Error {
                sequence,
                path,
                message,
            } => {
                warn!("Frame {}: {} path failed: {}", sequence, path, message);
                let mut state = self.shared_state.write();
                state.runtime.frames_failed += 1;
                state.runtime.set_error(message);
            }
        }
    }

    fn record_all(&self, sequence: u64, source: ReadingSource, readings: &[MeterReading]) {
        for reading in readings {
            let outcome = self.shared_state.write().record(sequence, reading.clone());
            match outcome {
                RecordOutcome::Stored => {
                    info!("Frame {}: {} via {}", sequence, reading, source);
                    for callback in &self.callbacks {
                        callback(reading);
                    }
                }
                RecordOutcome::Stale => {
                    debug!("Frame {}: dropped stale {} via {}", sequence, reading, source);
                }
            }
        }
    }

    pub fn snapshot(&self) -> BTreeMap<MeterScreenType, MeterReading> {
        self.shared_state.read().snapshot()
    }

    pub fn is_complete(&self) -> bool {
        self.shared_state.read().is_complete()
    }

    pub fn missing(&self) -> Vec<MeterScreenType> {
        self.shared_state.read().missing()
    }
}

impl Drop for MeterReaderApp {
    fn drop(&mut self) {
        // Signal workers to stop
        for worker in &self.workers {
            let _ = worker.commands.send(WorkerCommand::Shutdown);
        }

        // Wait for worker threads to finish
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!("{} worker panicked", worker.path);
                }
            }
        }
    }
}
