//! Frame capture: devices and the producer thread that drives them.
//!
//! # Components
//!
//! - [`CaptureDevice`] - trait every frame device implements
//! - [`CameraDevice`] - live cameras through a [`CameraBackend`] (OpenCV with the `camera` feature)
//! - [`SyntheticDevice`] - deterministic test patterns, no hardware needed
//! - [`ImageSequenceDevice`] - loops over image files
//! - [`FrameSource`] - owns a device on its own thread and feeds the frame queue
//! - [`probe_devices`] - finds which device indices open and deliver frames

pub mod camera;
pub mod device;
pub mod image_sequence;
pub mod source;
pub mod synthetic;

pub use camera::{CameraBackend, CameraDevice, RawFrame};
#[cfg(feature = "camera")]
pub use camera::{opencv_camera, OpenCvBackend};
pub use device::{probe_devices, CaptureDevice, DEFAULT_PROBE_MAX_INDEX};
pub use image_sequence::ImageSequenceDevice;
pub use source::{FrameSource, SourceConfig, SourceExit, SourceState, DEFAULT_FRAME_INTERVAL};
pub use synthetic::{SyntheticDevice, SyntheticPattern};
