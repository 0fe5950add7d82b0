//! Image sequence capture device
//!
//! Plays a list of image files as a looping frame stream. The device index
//! selects the file playback starts from. Decoding goes through the `image`
//! crate, so PNG, JPEG and BMP inputs are supported.
//!
//! Reopening the index that was last opened resumes playback where it left
//! off. The read position moves past a file before it is decoded, so an
//! unreadable file fails once and the next read continues with the file
//! after it.

use super::device::CaptureDevice;
use crate::error::CaptureError;
use crate::frame::Frame;
use std::path::{Path, PathBuf};

const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Looping image-file capture device
#[derive(Debug, Clone)]
pub struct ImageSequenceDevice {
    paths: Vec<PathBuf>,
    /// Index passed to the last successful `open`
    start: Option<u32>,
    /// Next file to read
    cursor: usize,
    open: bool,
}

impl ImageSequenceDevice {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            start: None,
            cursor: 0,
            open: false,
        }
    }

    /// All supported images in `dir`, sorted by file name
    pub fn from_directory(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        tracing::debug!("Found {} image(s) in {:?}", paths.len(), dir.as_ref());
        Ok(Self::new(paths))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl CaptureDevice for ImageSequenceDevice {
    fn open(&mut self, index: u32) -> Result<(), CaptureError> {
        self.release();
        if self.paths.is_empty() {
            return Err(CaptureError::NoSources);
        }
        let start = index as usize;
        if start >= self.paths.len() {
            return Err(CaptureError::OpenFailed {
                index,
                message: format!("sequence has {} image(s)", self.paths.len()),
            });
        }
        if self.start != Some(index) {
            self.start = Some(index);
            self.cursor = start;
        }
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        let cursor = self.cursor % self.paths.len();
        let path = &self.paths[cursor];
        self.cursor = (cursor + 1) % self.paths.len();

        let img = image::open(path).map_err(|e| CaptureError::ReadFailed(format!("{}: {}", path.display(), e)))?;
        Ok(Frame::from_dynamic_image(&img))
    }

    fn release(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn name(&self) -> String {
        "image-sequence".to_string()
    }
}
