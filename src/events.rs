//! Diagnostic events emitted by the engine threads.
//!
//! Events are delivered on a bounded crossbeam channel with `try_send`, so a
//! slow or absent reader never stalls the source or the worker. Events that
//! do not fit are counted and dropped.

use crate::capture::SourceState;
use crate::pipeline::StageFailure;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Something observable happened inside the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The frame source changed state
    SourceState(SourceState),
    /// A device open or read failed; the source is retrying
    DeviceFault { device_index: u32, message: String },
    /// The retry budget ran out and the source stopped
    DeviceUnavailable { device_index: u32, attempts: u32 },
    /// A stage failed while processing a frame
    StageFailed { sequence: u64, failure: StageFailure },
    /// A new pipeline was published
    PipelineChanged { version: u64, stages: usize },
    /// A record named a filter the registry does not have
    FilterDropped { name: String },
}

/// Non-blocking sender half for [`EngineEvent`]s
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<Sender<EngineEvent>>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new(tx: Sender<EngineEvent>) -> Self {
        Self {
            tx: Some(tx),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sink that discards every event
    pub fn disabled() -> Self {
        Self {
            tx: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Try to deliver an event, counting it as dropped if the channel is full
    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            if tx.try_send(event).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events lost to a full or disconnected channel
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
