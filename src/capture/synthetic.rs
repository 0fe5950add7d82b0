//! Synthetic capture device
//!
//! Generates deterministic test patterns so the engine can run without a
//! camera. The device index selects the pattern. Failures can be injected to
//! exercise the frame source's retry and reacquire paths.
//!
//! # Patterns
//!
//! - [`SyntheticPattern::Gradient`] - horizontal ramp that scrolls one pixel per frame
//! - [`SyntheticPattern::Checkerboard`] - 8×8 cells that invert every 30 frames
//! - [`SyntheticPattern::ColorBars`] - eight vertical bars
//! - [`SyntheticPattern::Solid`] - constant value

use super::device::CaptureDevice;
use crate::error::CaptureError;
use crate::frame::{Channels, Frame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Picture generated by a [`SyntheticDevice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticPattern {
    Gradient,
    Checkerboard,
    ColorBars,
    Solid(u8),
}

impl SyntheticPattern {
    /// Pattern for a device index
    pub fn for_index(index: u32) -> Self {
        match index % 4 {
            0 => SyntheticPattern::Gradient,
            1 => SyntheticPattern::Checkerboard,
            2 => SyntheticPattern::ColorBars,
            _ => SyntheticPattern::Solid(128),
        }
    }
}

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Pattern-generating capture device
#[derive(Debug)]
pub struct SyntheticDevice {
    width: u32,
    height: u32,
    channels: Channels,
    /// Indices `0..available` can be opened
    available: u32,
    pattern_override: Option<SyntheticPattern>,
    /// Every nth read fails
    fail_every: Option<u64>,
    /// While set, opens and reads fail as if the device were unplugged
    unplugged: Arc<AtomicBool>,
    open_index: Option<u32>,
    reads: u64,
}

impl SyntheticDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            channels: Channels::Rgb,
            available: 4,
            pattern_override: None,
            fail_every: None,
            unplugged: Arc::new(AtomicBool::new(false)),
            open_index: None,
            reads: 0,
        }
    }

    pub fn with_channels(mut self, channels: Channels) -> Self {
        self.channels = channels;
        self
    }

    /// Number of indices that open successfully
    pub fn with_available(mut self, count: u32) -> Self {
        self.available = count;
        self
    }

    /// Use one pattern regardless of the device index
    pub fn with_pattern(mut self, pattern: SyntheticPattern) -> Self {
        self.pattern_override = Some(pattern);
        self
    }

    /// Make every `n`th read fail (n = 0 disables)
    pub fn with_read_failure_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Switch that simulates unplugging the device while set
    pub fn unplug_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.unplugged)
    }

    fn pattern(&self, index: u32) -> SyntheticPattern {
        self.pattern_override
            .unwrap_or_else(|| SyntheticPattern::for_index(index))
    }

    fn render(&self, pattern: SyntheticPattern, tick: u64) -> Vec<u8> {
        let (w, h) = (self.width as u64, self.height as u64);
        let c = self.channels.count() as usize;
        let mut data = Vec::with_capacity((w * h) as usize * c);

        for y in 0..h {
            for x in 0..w {
                let rgb = match pattern {
                    SyntheticPattern::Gradient => {
                        let v = (((x + tick) % w) * 255 / (w - 1).max(1)) as u8;
                        [v, (y * 255 / (h - 1).max(1)) as u8, 255 - v]
                    }
                    SyntheticPattern::Checkerboard => {
                        let phase = (tick / 30) % 2;
                        let on = ((x / 8 + y / 8 + phase) % 2) == 0;
                        let v = if on { 230 } else { 25 };
                        [v, v, v]
                    }
                    SyntheticPattern::ColorBars => BARS[((x * 8) / w) as usize % 8],
                    SyntheticPattern::Solid(v) => [v, v, v],
                };
                match self.channels {
                    Channels::Rgb => data.extend_from_slice(&rgb),
                    Channels::Intensity => {
                        data.push(((rgb[0] as u16 + rgb[1] as u16 + rgb[2] as u16) / 3) as u8)
                    }
                }
            }
        }
        data
    }
}

impl CaptureDevice for SyntheticDevice {
    fn open(&mut self, index: u32) -> Result<(), CaptureError> {
        self.release();
        if self.unplugged.load(Ordering::Acquire) {
            return Err(CaptureError::OpenFailed {
                index,
                message: "device unplugged".to_string(),
            });
        }
        if index >= self.available {
            return Err(CaptureError::OpenFailed {
                index,
                message: format!("only {} synthetic device(s) available", self.available),
            });
        }
        self.open_index = Some(index);
        self.reads = 0;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let index = self.open_index.ok_or(CaptureError::NotOpen)?;
        if self.unplugged.load(Ordering::Acquire) {
            return Err(CaptureError::ReadFailed("device unplugged".to_string()));
        }
        self.reads += 1;
        if let Some(n) = self.fail_every {
            if self.reads % n == 0 {
                return Err(CaptureError::ReadFailed(format!("injected failure on read {}", self.reads)));
            }
        }

        let data = self.render(self.pattern(index), self.reads);
        Frame::from_raw(self.width, self.height, self.channels, data)
            .ok_or_else(|| CaptureError::ReadFailed("pattern size mismatch".to_string()))
    }

    fn release(&mut self) {
        self.open_index = None;
    }

    fn is_open(&self) -> bool {
        self.open_index.is_some()
    }

    fn name(&self) -> String {
        "synthetic".to_string()
    }
}
