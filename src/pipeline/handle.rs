//! Shared, atomically replaceable pipeline.

use super::Pipeline;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Holder for the published pipeline
///
/// Readers take a cheap [`snapshot`](Self::snapshot) and keep using it for a
/// whole pass even if a new pipeline is published meanwhile. Writers never
/// edit the published value; they swap in a new one.
#[derive(Debug, Default)]
pub struct PipelineHandle {
    current: RwLock<Arc<Pipeline>>,
    version: AtomicU64,
}

impl PipelineHandle {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            current: RwLock::new(Arc::new(pipeline)),
            version: AtomicU64::new(0),
        }
    }

    /// The pipeline currently published
    pub fn snapshot(&self) -> Arc<Pipeline> {
        self.current.read().clone()
    }

    /// Replace the published pipeline, returning the previous one
    pub fn publish(&self, pipeline: Pipeline) -> Arc<Pipeline> {
        let next = Arc::new(pipeline);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        self.version.fetch_add(1, Ordering::Release);
        previous
    }

    /// Derive a new pipeline from the current one and publish it
    ///
    /// The write lock is held from read to publish, so concurrent updates are
    /// serialized and none of them is lost. If `edit` fails nothing changes.
    pub fn update<F, E>(&self, edit: F) -> Result<Arc<Pipeline>, E>
    where
        F: FnOnce(&Pipeline) -> Result<Pipeline, E>,
    {
        let mut guard = self.current.write();
        let next = Arc::new(edit(&**guard)?);
        *guard = Arc::clone(&next);
        self.version.fetch_add(1, Ordering::Release);
        Ok(next)
    }

    /// Number of publishes so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
