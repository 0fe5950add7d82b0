//! Engine and device construction helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use livefilter_rs::{Engine, EngineConfig, EngineReceiver, FilterRegistry, SyntheticDevice};

/// Create test channels with default size
pub fn create_test_channels<T>() -> (Sender<T>, Receiver<T>) {
    bounded(16)
}

/// Config with short delays so tests finish quickly
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.source.frame_interval_ms = Some(2);
    config.source.retry_delay_ms = 1;
    config.source.pause_poll_ms = 2;
    config.source.max_retries = 2;
    config.worker.idle_sleep_us = 200;
    config
}

/// Small RGB synthetic camera
pub fn small_device() -> SyntheticDevice {
    SyntheticDevice::new(24, 16)
}

/// Start an engine over `device` with the builtin filters
pub fn start_engine(config: &EngineConfig, device: SyntheticDevice) -> (Engine, EngineReceiver) {
    Engine::start(config, FilterRegistry::builtin().shared(), Box::new(device))
        .expect("engine should start")
}
