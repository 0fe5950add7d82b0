//! # livefilter-rs: Real-time Frame Pipeline Engine
//!
//! Captures frames from a device, runs them through a live, swappable chain of
//! image filters and delivers each processed frame together with a histogram
//! and quality metrics.
//!
//! ## Architecture
//!
//! - **Source**: owns the capture device on its own thread, with bounded
//!   open retries, pause/resume and device switching
//! - **Queue**: a small bounded hand-off where the freshest frame always wins
//! - **Worker**: applies the published [`Pipeline`] to each frame and computes
//!   metrics; stage failures are isolated per stage
//! - **Filters**: a process-wide registry of transforms, each with a parameter
//!   schema; every parameter passes through the validator
//! - **Communication**: Crossbeam channels for results and diagnostic events
//!
//! ## Configuration
//!
//! Engine settings are read from `config.toml` in the platform config
//! directory under `livefilter-rs`:
//!
//! - **Linux**: `~/.config/livefilter-rs/`
//! - **macOS**: `~/Library/Application Support/livefilter-rs/`
//! - **Windows**: `%APPDATA%\livefilter-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use livefilter_rs::{Engine, EngineConfig, FilterRegistry};
//! use std::time::Duration;
//!
//! let config = EngineConfig::default();
//! let device = config.build_device()?;
//! let (mut engine, receiver) = Engine::start(&config, FilterRegistry::builtin().shared(), device)?;
//!
//! engine.load_pipeline_json(r#"[{"name": "apply_gaussian_blur", "params": {"ksize": 7}}]"#)?;
//! if let Some(result) = receiver.recv_result_timeout(Duration::from_secs(1)) {
//!     println!("frame {} in {:?}", result.source_sequence, result.elapsed);
//! }
//! engine.stop()?;
//! ```

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod filters;
pub mod frame;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod worker;

// Re-export commonly used types
pub use capture::{CaptureDevice, FrameSource, SourceState, SyntheticDevice};
pub use config::EngineConfig;
pub use engine::{Engine, EngineReceiver, EngineStats};
pub use error::{EngineError, Result};
pub use events::EngineEvent;
pub use filters::{FilterRegistry, SharedRegistry};
pub use frame::{Channels, Frame};
pub use pipeline::{Pipeline, PipelineHandle, StageRecord};
pub use worker::ProcessedResult;
