//! Frame data model
//!
//! A [`Frame`] is an immutable, interleaved 8-bit pixel buffer with either one
//! (intensity) or three (RGB) channels. The sample buffer lives behind an
//! `Arc<[u8]>`, so cloning a frame is cheap and never hands out a mutable
//! alias: every transform produces a new frame rather than editing one in
//! place. This is what lets the producer, the hand-off queue, the
//! latest-frame snapshot and the consumer share frames across threads.

use crate::error::Result;
use image::{GrayImage, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Number of samples per pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    /// Single intensity channel
    Intensity,
    /// Red, green, blue
    Rgb,
}

impl Channels {
    /// Samples per pixel
    pub fn count(self) -> u8 {
        match self {
            Channels::Intensity => 1,
            Channels::Rgb => 3,
        }
    }

    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            1 => Some(Channels::Intensity),
            3 => Some(Channels::Rgb),
            _ => None,
        }
    }
}

/// An immutable captured or processed image
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: Channels,
    data: Arc<[u8]>,
    /// Capture sequence number, carried through transforms
    sequence: u64,
    /// When the source frame was captured
    captured_at: Instant,
}

impl Frame {
    /// Build a frame from raw interleaved samples.
    ///
    /// Returns `None` if `data.len()` does not match `width * height * channels`.
    pub fn from_raw(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * channels.count() as usize;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            channels,
            data: data.into(),
            sequence: next_sequence(),
            captured_at: Instant::now(),
        })
    }

    /// A frame with every sample set to `value`
    pub fn filled(width: u32, height: u32, channels: Channels, value: u8) -> Self {
        let len = width as usize * height as usize * channels.count() as usize;
        Self {
            width,
            height,
            channels,
            data: vec![value; len].into(),
            sequence: next_sequence(),
            captured_at: Instant::now(),
        }
    }

    /// Build a new frame that keeps this frame's sequence number and capture time.
    ///
    /// Used by transforms so provenance survives the pipeline.
    pub fn derive(&self, width: u32, height: u32, channels: Channels, data: Vec<u8>) -> Option<Self> {
        let mut frame = Self::from_raw(width, height, channels, data)?;
        frame.sequence = self.sequence;
        frame.captured_at = self.captured_at;
        Some(frame)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Samples per pixel as a number
    pub fn channel_count(&self) -> usize {
        self.channels.count() as usize
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Interleaved samples, row-major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Sample at (x, y, channel)
    #[inline]
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> u8 {
        let idx = (y as usize * self.width as usize + x as usize) * self.channel_count() + channel;
        self.data[idx]
    }

    /// Whether two frames carry identical geometry and samples
    pub fn same_pixels(&self, other: &Frame) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.channels == other.channels
            && self.data == other.data
    }

    /// Per-pixel intensity, the truncated mean of the channels
    pub fn intensity(&self) -> Vec<u8> {
        match self.channels {
            Channels::Intensity => self.data.to_vec(),
            Channels::Rgb => self
                .data
                .chunks_exact(3)
                .map(|px| ((px[0] as u16 + px[1] as u16 + px[2] as u16) / 3) as u8)
                .collect(),
        }
    }

    /// Convert to an `image` buffer for IO or resampling
    pub fn to_dynamic_image(&self) -> image::DynamicImage {
        match self.channels {
            Channels::Intensity => GrayImage::from_raw(self.width, self.height, self.data.to_vec())
                .map(image::DynamicImage::ImageLuma8),
            Channels::Rgb => RgbImage::from_raw(self.width, self.height, self.data.to_vec())
                .map(image::DynamicImage::ImageRgb8),
        }
        // from_raw only fails on a length mismatch, which the constructors rule out
        .unwrap_or_else(|| image::DynamicImage::new_rgb8(0, 0))
    }

    /// Build a frame from an `image` buffer, keeping one or three channels
    pub fn from_dynamic_image(img: &image::DynamicImage) -> Self {
        let frame = match img {
            image::DynamicImage::ImageLuma8(gray) => {
                Self::from_raw(gray.width(), gray.height(), Channels::Intensity, gray.as_raw().clone())
            }
            other => {
                let rgb = other.to_rgb8();
                Self::from_raw(rgb.width(), rgb.height(), Channels::Rgb, rgb.into_raw())
            }
        };
        frame.unwrap_or_else(|| Self::filled(0, 0, Channels::Rgb, 0))
    }

    /// Save as an image file; the format follows the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_dynamic_image().save(path.as_ref())?;
        Ok(())
    }
}

fn next_sequence() -> u64 {
    static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);
    FRAME_COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_checks_length() {
        assert!(Frame::from_raw(2, 2, Channels::Rgb, vec![0; 12]).is_some());
        assert!(Frame::from_raw(2, 2, Channels::Rgb, vec![0; 11]).is_none());
        assert!(Frame::from_raw(2, 2, Channels::Intensity, vec![0; 4]).is_some());
    }

    #[test]
    fn test_clone_shares_buffer() {
        let frame = Frame::filled(4, 4, Channels::Rgb, 10);
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.data().as_ptr(), copy.data().as_ptr()));
        assert!(frame.same_pixels(&copy));
    }

    #[test]
    fn test_derive_keeps_sequence() {
        let frame = Frame::filled(2, 2, Channels::Rgb, 1);
        let derived = frame
            .derive(2, 2, Channels::Intensity, vec![5; 4])
            .unwrap();
        assert_eq!(derived.sequence(), frame.sequence());
        assert_eq!(derived.channels(), Channels::Intensity);
    }

    #[test]
    fn test_intensity_truncates_mean() {
        let frame = Frame::from_raw(1, 1, Channels::Rgb, vec![10, 20, 31]).unwrap();
        assert_eq!(frame.intensity(), vec![20]);
    }

    #[test]
    fn test_dynamic_image_conversion() {
        let frame = Frame::from_raw(2, 1, Channels::Rgb, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let back = Frame::from_dynamic_image(&frame.to_dynamic_image());
        assert!(frame.same_pixels(&back));

        let gray = Frame::filled(3, 3, Channels::Intensity, 42);
        let back = Frame::from_dynamic_image(&gray.to_dynamic_image());
        assert_eq!(back.channels(), Channels::Intensity);
        assert!(gray.same_pixels(&back));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        Frame::filled(4, 4, Channels::Rgb, 128).save(&path).unwrap();
        let loaded = image::open(&path).unwrap();
        assert_eq!(loaded.width(), 4);
    }
}
