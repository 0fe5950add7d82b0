//! Engine facade
//!
//! Wires a [`FrameSource`], the [`FrameQueue`] and a [`PipelineWorker`]
//! together and exposes the control and delivery boundary.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  push   ┌────────────┐  pop   ┌────────────────┐  try_send  ┌────────────────┐
//! │ FrameSource  │ ──────> │ FrameQueue │ ─────> │ PipelineWorker │ ─────────> │ EngineReceiver │
//! │ (device)     │         │ (freshest) │        │ (snapshot)     │            │ results/events │
//! └──────────────┘         └────────────┘        └────────────────┘            └────────────────┘
//!        ^                                              ^
//!        │ pause/resume/switch                          │ publish / update
//!        └──────────────────────── Engine ──────────────┘
//! ```
//!
//! Every pipeline edit goes through the validator and publishes a whole new
//! [`Pipeline`]; the worker picks it up at the start of its next pass.

use crate::capture::{CaptureDevice, FrameSource, SourceExit, SourceState};
use crate::config::EngineConfig;
use crate::error::{EngineError, PipelineError, Result, ResultExt};
use crate::events::{EngineEvent, EventSink};
use crate::filters::SharedRegistry;
use crate::frame::Frame;
use crate::pipeline::{BuildReport, Pipeline, PipelineHandle, Shift, StageRecord};
use crate::queue::FrameQueue;
use crate::worker::{self, PipelineWorker, ProcessedResult, WorkerConfig};
use crossbeam_channel::{bounded, Receiver};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Capacity of the diagnostic event channel
pub const EVENT_BUFFER: usize = 256;

// ==================== Receiver ====================

/// Outbound half handed to the presentation layer
pub struct EngineReceiver {
    pub results: Receiver<ProcessedResult>,
    pub events: Receiver<EngineEvent>,
}

impl EngineReceiver {
    pub fn try_recv_result(&self) -> Option<ProcessedResult> {
        self.results.try_recv().ok()
    }

    /// Wait up to `timeout` for the next result
    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<ProcessedResult> {
        self.results.recv_timeout(timeout).ok()
    }

    /// Newest buffered result, discarding older ones
    pub fn latest_result(&self) -> Option<ProcessedResult> {
        self.results.try_iter().last()
    }

    /// All events buffered so far
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        self.events.try_iter().collect()
    }
}

// ==================== Stats ====================

/// Point-in-time counters from every engine component
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    pub source_state: SourceState,
    pub device_index: u32,
    pub frames_captured: u64,
    pub read_failures: u64,
    pub queue_pushed: u64,
    /// Frames overwritten in the queue before the worker got to them
    pub queue_dropped: u64,
    pub processed: u64,
    pub dropped_results: u64,
    pub stage_failures: u64,
    pub dropped_events: u64,
    pub pipeline_version: u64,
    pub last_pass: Duration,
}

// ==================== Engine ====================

/// Running frame pipeline
pub struct Engine {
    registry: SharedRegistry,
    pipeline: Arc<PipelineHandle>,
    queue: Arc<FrameQueue>,
    source: FrameSource,
    worker: PipelineWorker,
    worker_config: WorkerConfig,
    events: EventSink,
    stopped: bool,
}

impl Engine {
    /// Start the worker and the frame source with an empty pipeline
    pub fn start(
        config: &EngineConfig,
        registry: SharedRegistry,
        device: Box<dyn CaptureDevice>,
    ) -> Result<(Self, EngineReceiver)> {
        let (result_tx, result_rx) = bounded(config.worker.result_buffer.max(1));
        let (event_tx, event_rx) = bounded(EVENT_BUFFER);
        let events = EventSink::new(event_tx);

        let queue = Arc::new(FrameQueue::new(config.queue.capacity));
        let pipeline = Arc::new(PipelineHandle::default());
        let worker_config = config.to_worker_config();

        let worker = PipelineWorker::start(
            Arc::clone(&queue),
            Arc::clone(&pipeline),
            worker_config.clone(),
            result_tx,
            events.clone(),
        )
        .context("Failed to start pipeline worker")?;

        let mut source = FrameSource::new(
            device,
            Arc::clone(&queue),
            config.to_source_config(),
            events.clone(),
        );
        source.start().context("Failed to start frame source")?;

        tracing::info!(
            "Engine started (queue capacity {}, result buffer {})",
            queue.capacity(),
            config.worker.result_buffer
        );

        let engine = Self {
            registry,
            pipeline,
            queue,
            source,
            worker,
            worker_config,
            events,
            stopped: false,
        };
        let receiver = EngineReceiver {
            results: result_rx,
            events: event_rx,
        };
        Ok((engine, receiver))
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    // ==================== Pipeline Control ====================

    /// The currently published pipeline
    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.snapshot()
    }

    pub fn pipeline_version(&self) -> u64 {
        self.pipeline.version()
    }

    /// Publish `pipeline`, returning the new version
    pub fn set_pipeline(&self, pipeline: Pipeline) -> u64 {
        let stages = pipeline.len();
        self.pipeline.publish(pipeline);
        self.announce(stages)
    }

    /// Build a pipeline from records and publish it
    ///
    /// Unknown filters are dropped and reported as [`EngineEvent::FilterDropped`].
    pub fn set_pipeline_records(&self, records: &[StageRecord]) -> BuildReport {
        let (pipeline, report) = Pipeline::from_records(&self.registry, records);
        for name in &report.dropped {
            self.events.emit(EngineEvent::FilterDropped { name: name.clone() });
        }
        self.set_pipeline(pipeline);
        report
    }

    /// Parse a JSON list of stage records and publish it
    pub fn load_pipeline_json(&self, json: &str) -> Result<BuildReport> {
        let records: Vec<StageRecord> = serde_json::from_str(json)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?;
        Ok(self.set_pipeline_records(&records))
    }

    pub fn add_stage(
        &self,
        name: &str,
        raw: &Map<String, Value>,
        index: Option<usize>,
    ) -> Result<Arc<Pipeline>> {
        self.edit(|p| p.with_stage_added(&self.registry, name, raw, index))
    }

    pub fn remove_stage(&self, index: usize) -> Result<Arc<Pipeline>> {
        self.edit(|p| p.without_stage(index))
    }

    pub fn move_stage(&self, from: usize, to: usize) -> Result<Arc<Pipeline>> {
        self.edit(|p| p.with_stage_moved(from, to))
    }

    pub fn shift_stage(&self, index: usize, shift: Shift) -> Result<Arc<Pipeline>> {
        self.edit(|p| p.with_stage_shifted(index, shift))
    }

    pub fn update_stage_params(
        &self,
        index: usize,
        raw: &Map<String, Value>,
    ) -> Result<Arc<Pipeline>> {
        self.edit(|p| p.with_stage_params(index, raw))
    }

    pub fn set_stage_enabled(&self, index: usize, enabled: bool) -> Result<Arc<Pipeline>> {
        self.edit(|p| p.with_stage_enabled(index, enabled))
    }

    fn edit<F>(&self, edit: F) -> Result<Arc<Pipeline>>
    where
        F: FnOnce(&Pipeline) -> std::result::Result<Pipeline, PipelineError>,
    {
        let next = self.pipeline.update(edit)?;
        self.announce(next.len());
        Ok(next)
    }

    fn announce(&self, stages: usize) -> u64 {
        let version = self.pipeline.version();
        tracing::info!("Published pipeline v{} with {} stage(s)", version, stages);
        self.events
            .emit(EngineEvent::PipelineChanged { version, stages });
        version
    }

    // ==================== Source Control ====================

    pub fn pause(&self) {
        self.source.pause();
    }

    pub fn resume(&self) {
        self.source.resume();
    }

    pub fn switch_device(&self, index: u32) {
        self.source.switch_device(index);
    }

    pub fn source_state(&self) -> SourceState {
        self.source.state()
    }

    /// Start the source again after it stopped, for example on an unavailable device
    pub fn restart_source(&mut self) -> Result<()> {
        if self.stopped {
            return Err(EngineError::Stopped);
        }
        self.source.start()
    }

    /// Surface a source that exited on its own
    ///
    /// Returns `Err(DeviceUnavailable)` once the capture thread gave up on its
    /// device; `Ok` while it is still running or after a requested stop.
    pub fn poll_source(&mut self) -> Result<()> {
        if self.source.is_running() {
            return Ok(());
        }
        match self.source.stop()? {
            Some(exit) => exit.error().map_or(Ok(()), Err),
            None => Ok(()),
        }
    }

    pub fn source_exit(&self) -> Option<&SourceExit> {
        self.source.last_exit()
    }

    // ==================== Single Shot ====================

    /// Copy of the most recently captured frame
    pub fn latest_frame(&self) -> Option<Frame> {
        self.source.latest_frame()
    }

    /// Apply a candidate pipeline to the latest frame without publishing it
    pub fn preview(&self, candidate: &Pipeline) -> Option<ProcessedResult> {
        let frame = self.latest_frame()?;
        Some(worker::process(candidate, &frame, &self.worker_config))
    }

    pub fn stats(&self) -> EngineStats {
        let worker = self.worker.stats();
        EngineStats {
            source_state: self.source.state(),
            device_index: self.source.device_index(),
            frames_captured: self.source.frames_captured(),
            read_failures: self.source.read_failures(),
            queue_pushed: self.queue.pushed(),
            queue_dropped: self.queue.dropped(),
            processed: worker.processed(),
            dropped_results: worker.dropped_results(),
            stage_failures: worker.stage_failures(),
            dropped_events: self.events.dropped(),
            pipeline_version: self.pipeline.version(),
            last_pass: worker.last_pass(),
        }
    }

    /// Stop the source, then the worker; idempotent
    pub fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let source = self.source.stop().map(|_| ());
        let worker = self.worker.stop();
        self.queue.clear();
        tracing::info!("Engine stopped");
        source.and(worker)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("Engine did not stop cleanly: {}", e);
        }
    }
}
