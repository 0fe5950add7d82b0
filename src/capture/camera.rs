//! Camera capture device
//!
//! [`CameraDevice`] adapts a [`CameraBackend`] (something that can open a
//! camera by index and grab raw BGR frames) to the [`CaptureDevice`] trait.
//! The OpenCV backend is compiled with the `camera` feature; without it the
//! device is still available for custom backends and tests.

use super::device::CaptureDevice;
use crate::error::CaptureError;
use crate::frame::{Channels, Frame};

/// A frame as delivered by a camera backend
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// 1 for mono cameras, 3 for BGR
    pub channels: u8,
    /// Interleaved samples, BGR order when `channels` is 3
    pub data: Vec<u8>,
}

/// Low-level camera access
#[cfg_attr(test, mockall::automock)]
pub trait CameraBackend: Send {
    /// Open the camera at `index`
    fn open(&mut self, index: u32) -> Result<(), String>;

    /// Grab one frame; `Ok(None)` when the camera returned nothing
    fn grab(&mut self) -> Result<Option<RawFrame>, String>;

    fn release(&mut self);

    fn is_opened(&self) -> bool;
}

/// [`CaptureDevice`] over a camera backend
pub struct CameraDevice<B: CameraBackend> {
    backend: B,
    index: Option<u32>,
}

impl<B: CameraBackend> CameraDevice<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            index: None,
        }
    }

    fn to_frame(raw: RawFrame) -> Result<Frame, CaptureError> {
        let channels = Channels::from_count(raw.channels).ok_or_else(|| {
            CaptureError::ReadFailed(format!("unsupported channel count {}", raw.channels))
        })?;
        let (width, height) = (raw.width, raw.height);
        let mut data = raw.data;
        if channels == Channels::Rgb {
            for pixel in data.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
        }
        Frame::from_raw(width, height, channels, data).ok_or_else(|| {
            CaptureError::ReadFailed(format!("frame buffer does not match {}x{}", width, height))
        })
    }
}

impl<B: CameraBackend> CaptureDevice for CameraDevice<B> {
    fn open(&mut self, index: u32) -> Result<(), CaptureError> {
        self.release();
        self.backend
            .open(index)
            .map_err(|message| CaptureError::OpenFailed { index, message })?;
        if !self.backend.is_opened() {
            self.backend.release();
            return Err(CaptureError::OpenFailed {
                index,
                message: "camera did not open".to_string(),
            });
        }
        self.index = Some(index);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.index.is_none() {
            return Err(CaptureError::NotOpen);
        }
        match self.backend.grab().map_err(CaptureError::ReadFailed)? {
            Some(raw) => Self::to_frame(raw),
            None => Err(CaptureError::ReadFailed("camera returned an empty frame".to_string())),
        }
    }

    fn release(&mut self) {
        if self.index.take().is_some() {
            self.backend.release();
        }
    }

    fn is_open(&self) -> bool {
        self.index.is_some()
    }

    fn name(&self) -> String {
        "camera".to_string()
    }
}

impl<B: CameraBackend> Drop for CameraDevice<B> {
    fn drop(&mut self) {
        self.release();
    }
}

// ==================== OpenCV Backend ====================

#[cfg(feature = "camera")]
pub use self::opencv_backend::OpenCvBackend;

#[cfg(feature = "camera")]
mod opencv_backend {
    use super::{CameraBackend, RawFrame};
    use opencv::{
        core::Mat,
        prelude::*,
        videoio::{self, VideoCapture},
    };

    /// Camera access through `opencv::videoio`
    #[derive(Default)]
    pub struct OpenCvBackend {
        capture: Option<VideoCapture>,
        frame: Mat,
    }

    impl OpenCvBackend {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl CameraBackend for OpenCvBackend {
        fn open(&mut self, index: u32) -> Result<(), String> {
            let capture =
                VideoCapture::new(index as i32, videoio::CAP_ANY).map_err(|e| e.to_string())?;
            self.capture = Some(capture);
            Ok(())
        }

        fn grab(&mut self) -> Result<Option<RawFrame>, String> {
            let capture = self.capture.as_mut().ok_or("camera not open")?;
            if !capture.read(&mut self.frame).map_err(|e| e.to_string())? || self.frame.empty() {
                return Ok(None);
            }
            let frame = if self.frame.is_continuous() {
                self.frame.try_clone().map_err(|e| e.to_string())?
            } else {
                let mut copy = Mat::default();
                self.frame.copy_to(&mut copy).map_err(|e| e.to_string())?;
                copy
            };
            let data = frame.data_bytes().map_err(|e| e.to_string())?.to_vec();
            Ok(Some(RawFrame {
                width: frame.cols().max(0) as u32,
                height: frame.rows().max(0) as u32,
                channels: frame.channels().clamp(0, u8::MAX as i32) as u8,
                data,
            }))
        }

        fn release(&mut self) {
            if let Some(mut capture) = self.capture.take() {
                if let Err(e) = capture.release() {
                    tracing::debug!("Releasing camera failed: {}", e);
                }
            }
        }

        fn is_opened(&self) -> bool {
            self.capture
                .as_ref()
                .and_then(|c| c.is_opened().ok())
                .unwrap_or(false)
        }
    }
}

/// Camera device backed by OpenCV
#[cfg(feature = "camera")]
pub fn opencv_camera() -> CameraDevice<OpenCvBackend> {
    CameraDevice::new(OpenCvBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::probe_devices;
    use mockall::predicate::eq;

    fn bgr_frame() -> RawFrame {
        RawFrame {
            width: 2,
            height: 1,
            channels: 3,
            data: vec![1, 2, 3, 4, 5, 6],
        }
    }

    #[test]
    fn test_frames_are_converted_to_rgb() {
        let mut backend = MockCameraBackend::new();
        backend.expect_open().with(eq(0)).returning(|_| Ok(()));
        backend.expect_is_opened().return_const(true);
        backend.expect_grab().returning(|| Ok(Some(bgr_frame())));
        backend.expect_release().times(1).return_const(());

        let mut device = CameraDevice::new(backend);
        device.open(0).unwrap();
        let frame = device.read_frame().unwrap();
        assert_eq!(frame.channels(), Channels::Rgb);
        assert_eq!(frame.data(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_empty_and_malformed_frames_are_read_failures() {
        let mut backend = MockCameraBackend::new();
        backend.expect_open().returning(|_| Ok(()));
        backend.expect_is_opened().return_const(true);
        let mut grabs = 0;
        backend.expect_grab().returning(move || {
            grabs += 1;
            match grabs {
                1 => Ok(None),
                2 => Ok(Some(RawFrame {
                    data: vec![0; 5],
                    ..bgr_frame()
                })),
                _ => Err("device lost".to_string()),
            }
        });
        backend.expect_release().return_const(());

        let mut device = CameraDevice::new(backend);
        assert_eq!(device.read_frame().unwrap_err(), CaptureError::NotOpen);
        device.open(0).unwrap();
        for _ in 0..3 {
            assert!(matches!(device.read_frame(), Err(CaptureError::ReadFailed(_))));
        }
    }

    #[test]
    fn test_enumerates_open_camera_indices() {
        let mut backend = MockCameraBackend::new();
        backend.expect_open().returning(move |index| {
            if index == 0 || index == 2 {
                Ok(())
            } else {
                Err(format!("no camera at {}", index))
            }
        });
        // Index 2 opens but reports itself closed
        let mut calls = 0;
        backend.expect_is_opened().returning(move || {
            calls += 1;
            calls == 1
        });
        backend.expect_grab().returning(|| Ok(Some(bgr_frame())));
        backend.expect_release().times(2).return_const(());

        let mut device = CameraDevice::new(backend);
        assert_eq!(probe_devices(&mut device, 4, true), vec![0]);
        assert!(!device.is_open());
    }
}
