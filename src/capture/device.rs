//! CaptureDevice trait for a unified frame-device interface
//!
//! The frame source only ever talks to a device through this trait, so real
//! cameras, the synthetic pattern generator, image sequences and test mocks
//! are interchangeable.

use crate::error::CaptureError;
use crate::frame::Frame;

/// Default upper bound (exclusive) for [`probe_devices`]
pub const DEFAULT_PROBE_MAX_INDEX: u32 = 10;

/// A source of frames addressed by an integer index
///
/// Implementations must be `Send`: the device is moved into the capture
/// thread and owned by it until the source stops.
#[cfg_attr(test, mockall::automock)]
pub trait CaptureDevice: Send {
    /// Open the device at `index`, replacing any device already open
    fn open(&mut self, index: u32) -> Result<(), CaptureError>;

    /// Read the next frame
    ///
    /// Errors are transient from the caller's point of view; the frame source
    /// decides whether to retry or reacquire.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Release the underlying device; safe to call when not open
    fn release(&mut self);

    /// Whether a device is currently open
    fn is_open(&self) -> bool;

    /// Human-readable device kind, for logs
    fn name(&self) -> String;
}

/// Indices in `0..max_index` that open, and when `require_frame` is set,
/// also deliver a frame
///
/// Each index is released after probing.
pub fn probe_devices(device: &mut dyn CaptureDevice, max_index: u32, require_frame: bool) -> Vec<u32> {
    let mut available = Vec::new();
    for index in 0..max_index {
        if let Err(e) = device.open(index) {
            tracing::debug!("{} {}: {}", device.name(), index, e);
            continue;
        }
        if require_frame {
            if let Err(e) = device.read_frame() {
                tracing::debug!("{} {} opened but returned no frame: {}", device.name(), index, e);
                device.release();
                continue;
            }
        }
        tracing::debug!("{} {} available", device.name(), index);
        available.push(index);
        device.release();
    }
    available
}
