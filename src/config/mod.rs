//! Configuration module for livefilter-rs
//!
//! This module holds the persistent engine configuration: which device to
//! capture from and how hard to retry it, queue and worker sizing, which
//! metrics to compute, and where logs go.
//!
//! # Config Location
//!
//! The default configuration file lives in the platform config directory:
//! - **Linux**: `~/.config/livefilter-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/livefilter-rs/config.toml`
//! - **Windows**: `%APPDATA%\livefilter-rs\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use livefilter_rs::config::EngineConfig;
//!
//! let mut config = EngineConfig::load_or_default(EngineConfig::default_path()?);
//! config.validate();
//! let device = config.build_device()?;
//! ```

use crate::capture::{
    CaptureDevice, ImageSequenceDevice, SourceConfig, SyntheticDevice, DEFAULT_FRAME_INTERVAL,
};
use crate::error::{EngineError, Result};
use crate::frame::Channels;
use crate::metrics::HistogramMode;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name under the platform config directory
pub const CONFIG_DIR_NAME: &str = "livefilter-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default capacity of the processed-result channel
pub const DEFAULT_RESULT_BUFFER: usize = 4;

/// Upper bound for any retry delay or poll interval, in milliseconds
const MAX_DELAY_MS: u64 = 60_000;

// ==================== Config Directory ====================

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(CONFIG_DIR_NAME))
}

/// Ensure the configuration directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        EngineError::Config("Could not determine config directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            EngineError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== Source ====================

/// Kind of capture device to open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Generated test patterns
    #[default]
    Synthetic,
    /// A looping list of image files
    ImageSequence,
    /// A physical camera; needs the `camera` feature
    Camera,
}

/// Size and layout of synthetic frames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// 1 for intensity, 3 for RGB
    #[serde(default = "default_channels")]
    pub channels: u8,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_channels() -> u8 {
    3
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            channels: default_channels(),
        }
    }
}

/// Frame source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    #[serde(default)]
    pub device: DeviceKind,

    /// Index of the device to open first
    #[serde(default)]
    pub device_index: u32,

    /// Open attempts before the device is declared unavailable
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Consecutive read failures before the device is declared unavailable;
    /// the device is released and reopened after every failure
    #[serde(default = "default_max_read_failures")]
    pub max_read_failures: u32,

    /// Minimum time between captured frames; 0 reads as fast as the device
    /// allows, which busy-loops the synthetic device
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: Option<u64>,

    #[serde(default = "default_pause_poll_ms")]
    pub pause_poll_ms: u64,

    #[serde(default)]
    pub synthetic: SyntheticConfig,

    /// Explicit image files for the image-sequence device
    #[serde(default)]
    pub image_paths: Vec<PathBuf>,

    /// Directory scanned for images when `image_paths` is empty
    #[serde(default)]
    pub image_dir: Option<PathBuf>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_read_failures() -> u32 {
    10
}

fn default_frame_interval_ms() -> Option<u64> {
    Some(DEFAULT_FRAME_INTERVAL.as_millis() as u64)
}

fn default_pause_poll_ms() -> u64 {
    100
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            device: DeviceKind::default(),
            device_index: 0,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_read_failures: default_max_read_failures(),
            frame_interval_ms: default_frame_interval_ms(),
            pause_poll_ms: default_pause_poll_ms(),
            synthetic: SyntheticConfig::default(),
            image_paths: Vec::new(),
            image_dir: None,
        }
    }
}

// ==================== Queue / Worker / Metrics ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSection {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Sleep between polls of an empty queue, in microseconds
    #[serde(default = "default_idle_sleep_us")]
    pub idle_sleep_us: u64,

    /// Capacity of the processed-result channel
    #[serde(default = "default_result_buffer")]
    pub result_buffer: usize,
}

fn default_idle_sleep_us() -> u64 {
    1_000
}

fn default_result_buffer() -> usize {
    DEFAULT_RESULT_BUFFER
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            idle_sleep_us: default_idle_sleep_us(),
            result_buffer: default_result_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSection {
    #[serde(default)]
    pub histogram_mode: HistogramMode,

    /// Compute PSNR/SSIM against the unprocessed frame
    #[serde(default = "default_true")]
    pub quality: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            histogram_mode: HistogramMode::default(),
            quality: true,
        }
    }
}

// ==================== Logging ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Write daily-rotated log files here in addition to stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_file_prefix() -> String {
    "livefilter.log".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

// ==================== Engine Config ====================

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub metrics: MetricsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl EngineConfig {
    /// Path of the default config file
    pub fn default_path() -> Result<PathBuf> {
        config_dir()
            .map(|dir| dir.join(CONFIG_FILE))
            .ok_or_else(|| EngineError::Config("Could not determine config path".to_string()))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            EngineError::Config(format!("Failed to parse config {:?}: {}", path, e))
        })
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to disk as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| EngineError::Config(format!("Failed to write config {:?}: {}", path, e)))
    }

    /// Clamp nonsensical values into range, logging each change.
    ///
    /// Returns the number of fields that were adjusted.
    pub fn validate(&mut self) -> usize {
        let mut fixed = 0;
        let mut clamp = |field: &str, value: &mut u64, min: u64, max: u64| {
            let clamped = (*value).clamp(min, max);
            if clamped != *value {
                tracing::warn!("config: {} = {} out of range, using {}", field, value, clamped);
                *value = clamped;
                fixed += 1;
            }
        };

        let source = &mut self.source;
        let mut max_retries = u64::from(source.max_retries);
        clamp("source.max_retries", &mut max_retries, 1, 1_000);
        source.max_retries = max_retries as u32;

        let mut max_read_failures = u64::from(source.max_read_failures);
        clamp("source.max_read_failures", &mut max_read_failures, 1, 100_000);
        source.max_read_failures = max_read_failures as u32;

        clamp("source.retry_delay_ms", &mut source.retry_delay_ms, 0, MAX_DELAY_MS);
        clamp("source.pause_poll_ms", &mut source.pause_poll_ms, 1, MAX_DELAY_MS);
        if let Some(interval) = source.frame_interval_ms.as_mut() {
            clamp("source.frame_interval_ms", interval, 0, MAX_DELAY_MS);
        }

        let mut width = u64::from(source.synthetic.width);
        clamp("source.synthetic.width", &mut width, 1, 8_192);
        source.synthetic.width = width as u32;
        let mut height = u64::from(source.synthetic.height);
        clamp("source.synthetic.height", &mut height, 1, 8_192);
        source.synthetic.height = height as u32;

        let mut capacity = self.queue.capacity as u64;
        clamp("queue.capacity", &mut capacity, 1, 64);
        self.queue.capacity = capacity as usize;

        let mut result_buffer = self.worker.result_buffer as u64;
        clamp("worker.result_buffer", &mut result_buffer, 1, 1_024);
        self.worker.result_buffer = result_buffer as usize;

        clamp("worker.idle_sleep_us", &mut self.worker.idle_sleep_us, 1, 1_000_000);

        if Channels::from_count(self.source.synthetic.channels).is_none() {
            tracing::warn!(
                "config: source.synthetic.channels = {} unsupported, using 3",
                self.source.synthetic.channels
            );
            self.source.synthetic.channels = 3;
            fixed += 1;
        }

        fixed
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.source.retry_delay_ms)
    }

    pub fn frame_interval(&self) -> Option<Duration> {
        self.source
            .frame_interval_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.source.pause_poll_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.worker.idle_sleep_us)
    }

    /// Settings for the frame source thread
    pub fn to_source_config(&self) -> SourceConfig {
        SourceConfig {
            device_index: self.source.device_index,
            max_retries: self.source.max_retries,
            retry_delay: self.retry_delay(),
            max_read_failures: self.source.max_read_failures,
            frame_interval: self.frame_interval(),
            pause_poll: self.pause_poll(),
        }
    }

    /// Settings for the pipeline worker thread
    pub fn to_worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            idle_sleep: self.idle_sleep(),
            histogram_mode: self.metrics.histogram_mode,
            compute_quality: self.metrics.quality,
        }
    }

    /// Construct the configured capture device
    pub fn build_device(&self) -> Result<Box<dyn CaptureDevice>> {
        match self.source.device {
            DeviceKind::Synthetic => {
                let synthetic = &self.source.synthetic;
                let channels = Channels::from_count(synthetic.channels).ok_or_else(|| {
                    EngineError::Config(format!(
                        "Unsupported channel count {}",
                        synthetic.channels
                    ))
                })?;
                Ok(Box::new(
                    SyntheticDevice::new(synthetic.width, synthetic.height).with_channels(channels),
                ))
            }
            DeviceKind::ImageSequence => {
                if !self.source.image_paths.is_empty() {
                    return Ok(Box::new(ImageSequenceDevice::new(
                        self.source.image_paths.clone(),
                    )));
                }
                let dir = self.source.image_dir.as_ref().ok_or_else(|| {
                    EngineError::Config(
                        "image_sequence device needs image_paths or image_dir".to_string(),
                    )
                })?;
                let device = ImageSequenceDevice::from_directory(dir).map_err(|e| {
                    EngineError::Config(format!("Failed to scan {:?}: {}", dir, e))
                })?;
                Ok(Box::new(device))
            }
            #[cfg(feature = "camera")]
            DeviceKind::Camera => Ok(Box::new(crate::capture::opencv_camera())),
            #[cfg(not(feature = "camera"))]
            DeviceKind::Camera => Err(EngineError::Config(
                "camera device needs livefilter-rs built with the `camera` feature".to_string(),
            )),
        }
    }
}
