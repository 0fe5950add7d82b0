//! Error handling for the livefilter engine
//!
//! This module defines the crate-level error type and a Result alias, plus
//! the narrower error enums owned by each subsystem. Only a few of these ever
//! reach a caller: parameter problems are corrected by the validator, stage
//! failures are contained inside [`Pipeline::apply`](crate::pipeline::Pipeline::apply)
//! and transient read failures are retried by the frame source.

use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// The capture device could not be (re)acquired within the retry budget
    #[error("Device {device_index} unavailable after {attempts} attempt(s)")]
    DeviceUnavailable { device_index: u32, attempts: u32 },

    /// Errors reported by a capture device
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Errors related to pipeline construction and editing
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// A component was asked to start while it was already running
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    /// The engine was stopped and cannot be restarted
    #[error("Engine has been stopped")]
    Stopped,

    /// A worker or source thread panicked
    #[error("Thread panicked: {0}")]
    ThreadPanicked(String),

    /// Image encoding/decoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<EngineError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Into::<EngineError>::into(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Into::<EngineError>::into(e).with_context(f()))
    }
}

/// Errors raised by a [`CaptureDevice`](crate::capture::CaptureDevice)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Failed to open device {index}: {message}")]
    OpenFailed { index: u32, message: String },

    #[error("Failed to read frame: {0}")]
    ReadFailed(String),

    #[error("Device is not open")]
    NotOpen,

    #[error("No frame sources configured")]
    NoSources,

    #[error("Image error: {0}")]
    Image(String),
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Image(err.to_string())
    }
}

/// Errors that can occur while building or editing a pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Filter '{0}' is not available")]
    UnknownFilter(String),

    #[error("Stage index {index} is out of bounds (pipeline has {len} stages)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors a single transform can raise for a given frame
///
/// These never escape a pipeline pass; they are recorded as stage failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("'{filter}' does not support {channels}-channel frames")]
    UnsupportedChannels { filter: String, channels: u8 },

    #[error("'{filter}' is missing parameter '{param}'")]
    MissingParam { filter: String, param: String },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Config("missing source section".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: missing source section"
        );
    }

    #[test]
    fn test_error_with_context() {
        let err = EngineError::Config("test".to_string());
        let with_ctx = err.with_context("Failed to load");
        assert!(with_ctx.to_string().contains("Failed to load"));
    }

    #[test]
    fn test_device_unavailable_error() {
        let err = EngineError::DeviceUnavailable {
            device_index: 3,
            attempts: 2,
        };
        assert!(err.to_string().contains("Device 3"));
        assert!(err.to_string().contains("2 attempt"));
    }

    #[test]
    fn test_stopped_error_display() {
        assert_eq!(EngineError::Stopped.to_string(), "Engine has been stopped");
    }

    #[test]
    fn test_pipeline_error_converts() {
        let result: std::result::Result<(), PipelineError> =
            Err(PipelineError::UnknownFilter("warp".to_string()));
        let err = result.context("Adding stage").unwrap_err();
        assert!(err.to_string().contains("Adding stage"));
        assert!(err.to_string().contains("warp"));
    }
}
