//! Pipeline worker (consumer) thread
//!
//! The worker pops the freshest frame from the [`FrameQueue`], runs the
//! published pipeline over it, computes metrics and hands a
//! [`ProcessedResult`] to the presentation side.
//!
//! # Responsibilities
//!
//! - **One pipeline per pass**: the pipeline is snapshotted once per frame,
//!   so a concurrent publish never mixes two chains on one frame
//! - **Fail-soft stages**: stage failures are logged, counted and reported as
//!   [`EngineEvent::StageFailed`]; the frame still goes out
//! - **Backpressure**: results are sent with `try_send`; when the receiver
//!   falls behind the result is dropped and counted instead of blocking
//! - **Clean stop**: the running flag is only checked between passes, so a
//!   pass in progress always completes

use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink};
use crate::frame::Frame;
use crate::metrics::{self, Histogram, HistogramMode, QualityMetrics};
use crate::pipeline::{Pipeline, PipelineHandle, StageFailure};
use crate::queue::FrameQueue;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Worker settings
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Sleep when the queue is empty
    pub idle_sleep: Duration,
    pub histogram_mode: HistogramMode,
    /// Compute PSNR/SSIM against the unprocessed frame
    pub compute_quality: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_millis(1),
            histogram_mode: HistogramMode::Intensity,
            compute_quality: true,
        }
    }
}

/// Output of one pass
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    pub frame: Frame,
    /// Sequence number of the captured frame this came from
    pub source_sequence: u64,
    pub histogram: Histogram,
    pub quality: Option<QualityMetrics>,
    pub stage_failures: Vec<StageFailure>,
    /// Time spent in the pipeline and metrics
    pub elapsed: Duration,
}

/// Run `pipeline` over `frame` and compute metrics
pub fn process(pipeline: &Pipeline, frame: &Frame, config: &WorkerConfig) -> ProcessedResult {
    let started = Instant::now();
    let applied = pipeline.apply(frame);
    let histogram = metrics::histogram(&applied.frame, config.histogram_mode);
    let quality = config
        .compute_quality
        .then(|| metrics::quality(frame, &applied.frame));

    ProcessedResult {
        frame: applied.frame,
        source_sequence: frame.sequence(),
        histogram,
        quality,
        stage_failures: applied.failures,
        elapsed: started.elapsed(),
    }
}

/// Counters readable from any thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    dropped_results: AtomicU64,
    stage_failures: AtomicU64,
    last_pass_us: AtomicU64,
}

impl WorkerStats {
    /// Frames run through the pipeline
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Results discarded because the result channel was full or closed
    pub fn dropped_results(&self) -> u64 {
        self.dropped_results.load(Ordering::Relaxed)
    }

    pub fn stage_failures(&self) -> u64 {
        self.stage_failures.load(Ordering::Relaxed)
    }

    /// Duration of the most recent pass
    pub fn last_pass(&self) -> Duration {
        Duration::from_micros(self.last_pass_us.load(Ordering::Relaxed))
    }
}

/// Handle to the consumer thread
pub struct PipelineWorker {
    running: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    thread: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    /// Spawn the worker thread
    pub fn start(
        queue: Arc<FrameQueue>,
        pipeline: Arc<PipelineHandle>,
        config: WorkerConfig,
        results: Sender<ProcessedResult>,
        events: EventSink,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(WorkerStats::default());

        let mut worker = WorkerLoop {
            queue,
            pipeline,
            config,
            results,
            events,
            running: Arc::clone(&running),
            stats: Arc::clone(&stats),
        };
        let thread = std::thread::Builder::new()
            .name("pipeline-worker".to_string())
            .spawn(move || worker.run())?;

        tracing::info!("Pipeline worker started");
        Ok(Self {
            running,
            stats,
            thread: Some(thread),
        })
    }

    /// Signal the loop to end after the current pass and join it; idempotent
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        thread
            .join()
            .map_err(|_| EngineError::ThreadPanicked("pipeline worker".to_string()))?;
        tracing::info!(
            "Pipeline worker stopped after {} frame(s), {} result(s) dropped",
            self.stats.processed(),
            self.stats.dropped_results()
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    pub fn stats(&self) -> &Arc<WorkerStats> {
        &self.stats
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("Pipeline worker did not stop cleanly: {}", e);
        }
    }
}

struct WorkerLoop {
    queue: Arc<FrameQueue>,
    pipeline: Arc<PipelineHandle>,
    config: WorkerConfig,
    results: Sender<ProcessedResult>,
    events: EventSink,
    running: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
}

impl WorkerLoop {
    fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            match self.queue.pop() {
                Some(frame) => self.process_one(frame),
                None => std::thread::sleep(self.config.idle_sleep),
            }
        }
        tracing::debug!("Pipeline worker loop exited");
    }

    fn process_one(&mut self, frame: Frame) {
        let pipeline = self.pipeline.snapshot();
        let result = process(&pipeline, &frame, &self.config);

        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .last_pass_us
            .store(result.elapsed.as_micros() as u64, Ordering::Relaxed);

        for failure in &result.stage_failures {
            self.stats.stage_failures.fetch_add(1, Ordering::Relaxed);
            self.events.emit(EngineEvent::StageFailed {
                sequence: result.source_sequence,
                failure: failure.clone(),
            });
        }

        tracing::trace!(
            "Processed frame {} through {} stage(s) in {:?}",
            result.source_sequence,
            pipeline.len(),
            result.elapsed
        );
        self.try_send_result(result);
    }

    /// Send a result without blocking, counting it as dropped if the channel is full
    fn try_send_result(&mut self, result: ProcessedResult) {
        match self.results.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.dropped_results.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {
                if self.stats.dropped_results.fetch_add(1, Ordering::Relaxed) == 0 {
                    tracing::warn!("Result receiver disconnected, discarding results");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterRegistry;
    use crate::frame::Channels;
    use crate::pipeline::StageRecord;
    use crossbeam_channel::bounded;
    use serde_json::Map;

    fn recv(rx: &crossbeam_channel::Receiver<ProcessedResult>) -> ProcessedResult {
        rx.recv_timeout(Duration::from_secs(2)).expect("no result in time")
    }

    #[test]
    fn test_process_reports_histogram_and_quality() {
        let registry = FilterRegistry::builtin();
        let (pipeline, _) = Pipeline::from_records(
            &registry,
            &[StageRecord::new("invert_colors", Map::new())],
        );
        let frame = Frame::filled(4, 4, Channels::Rgb, 10);
        let result = process(&pipeline, &frame, &WorkerConfig::default());

        assert_eq!(result.source_sequence, frame.sequence());
        assert_eq!(result.histogram.channel(0).unwrap()[245], 16);
        let quality = result.quality.unwrap();
        assert!(!quality.degenerate);
        assert_eq!(quality.mean_abs_diff, 235.0);
    }

    #[test]
    fn test_worker_processes_queued_frames() {
        let registry = FilterRegistry::builtin();
        let queue = Arc::new(FrameQueue::new(2));
        let (pipeline, _) = Pipeline::from_records(
            &registry,
            &[StageRecord::new("convert_to_grayscale", Map::new())],
        );
        let handle = Arc::new(PipelineHandle::new(pipeline));
        let (tx, rx) = bounded(8);

        let mut worker = PipelineWorker::start(
            Arc::clone(&queue),
            handle,
            WorkerConfig::default(),
            tx,
            EventSink::disabled(),
        )
        .unwrap();

        queue.push(Frame::filled(4, 4, Channels::Rgb, 90));
        let result = recv(&rx);
        assert_eq!(result.frame.channels(), Channels::Intensity);

        worker.stop().unwrap();
        worker.stop().unwrap();
        assert!(!worker.is_running());
        assert_eq!(worker.stats().processed(), 1);
    }

    #[test]
    fn test_published_pipeline_takes_effect() {
        let registry = FilterRegistry::builtin();
        let queue = Arc::new(FrameQueue::new(2));
        let handle = Arc::new(PipelineHandle::new(Pipeline::new()));
        let (tx, rx) = bounded(8);
        let mut worker = PipelineWorker::start(
            Arc::clone(&queue),
            Arc::clone(&handle),
            WorkerConfig::default(),
            tx,
            EventSink::disabled(),
        )
        .unwrap();

        queue.push(Frame::filled(2, 2, Channels::Rgb, 0));
        assert_eq!(recv(&rx).frame.data()[0], 0);

        handle
            .update(|p| p.with_stage_added(&registry, "invert_colors", &Map::new(), None))
            .unwrap();
        queue.push(Frame::filled(2, 2, Channels::Rgb, 0));
        assert_eq!(recv(&rx).frame.data()[0], 255);

        worker.stop().unwrap();
    }

    #[test]
    fn test_stage_failures_are_reported_not_fatal() {
        let registry = FilterRegistry::builtin();
        let queue = Arc::new(FrameQueue::new(2));
        let (pipeline, _) = Pipeline::from_records(
            &registry,
            &[StageRecord::new("sepia_tint", Map::new())],
        );
        let (tx, rx) = bounded(8);
        let (event_tx, event_rx) = bounded(8);
        let mut worker = PipelineWorker::start(
            Arc::clone(&queue),
            Arc::new(PipelineHandle::new(pipeline)),
            WorkerConfig::default(),
            tx,
            EventSink::new(event_tx),
        )
        .unwrap();

        let frame = Frame::filled(3, 3, Channels::Intensity, 40);
        queue.push(frame.clone());
        let result = recv(&rx);
        assert_eq!(result.stage_failures.len(), 1);
        assert!(result.frame.same_pixels(&frame));

        queue.push(Frame::filled(3, 3, Channels::Intensity, 40));
        recv(&rx);
        worker.stop().unwrap();

        assert_eq!(worker.stats().stage_failures(), 2);
        let events: Vec<_> = event_rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], EngineEvent::StageFailed { failure, .. } if failure.filter == "sepia_tint"));
    }

    #[test]
    fn test_full_result_channel_drops() {
        let queue = Arc::new(FrameQueue::new(2));
        let (tx, rx) = bounded(1);
        let mut worker = PipelineWorker::start(
            Arc::clone(&queue),
            Arc::new(PipelineHandle::default()),
            WorkerConfig {
                compute_quality: false,
                ..WorkerConfig::default()
            },
            tx,
            EventSink::disabled(),
        )
        .unwrap();

        for _ in 0..3 {
            queue.push(Frame::filled(2, 2, Channels::Rgb, 1));
            let deadline = Instant::now() + Duration::from_secs(2);
            while !queue.is_empty() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        while worker.stats().processed() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        worker.stop().unwrap();

        assert_eq!(worker.stats().processed(), 3);
        assert_eq!(worker.stats().dropped_results(), 2);
        assert!(rx.try_recv().unwrap().quality.is_none());
    }
}
