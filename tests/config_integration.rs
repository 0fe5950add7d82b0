//! Integration tests for configuration-driven startup
//!
//! A config file on disk selects an image-sequence device; the engine built
//! from it must deliver frames decoded from those files.

mod common;

use common::builders::gradient_frame;
use common::test_timeout;
use livefilter_rs::config::{DeviceKind, EngineConfig};
use livefilter_rs::metrics::HistogramMode;
use livefilter_rs::{Engine, FilterRegistry};
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn test_image_sequence_from_config_file() {
    let dir = TempDir::new().unwrap();
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    for i in 0..3 {
        gradient_frame(20 + i, 10).save(frames.join(format!("frame_{i}.png"))).unwrap();
    }
    // Not an image, must be skipped
    std::fs::write(frames.join("notes.txt"), "ignore me").unwrap();

    let path = dir.path().join("config.toml");
    let mut config = EngineConfig::default();
    config.source.device = DeviceKind::ImageSequence;
    config.source.image_dir = Some(frames);
    config.source.frame_interval_ms = Some(2);
    config.metrics.histogram_mode = HistogramMode::PerChannel;
    config.save(&path).unwrap();

    let mut loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded.validate(), 0);

    let device = loaded.build_device().unwrap();
    let (mut engine, receiver) =
        Engine::start(&loaded, FilterRegistry::builtin().shared(), device).unwrap();

    let result = receiver.recv_result_timeout(test_timeout()).unwrap();
    assert!((20..23).contains(&result.frame.width()));
    assert_eq!(result.frame.height(), 10);
    assert!(result.histogram.channel(2).is_some());

    engine.stop().unwrap();
}

#[test]
fn test_invalid_values_are_clamped_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[source]\nmax_retries = 0\n\n[queue]\ncapacity = 1000\n\n[worker]\nresult_buffer = 0\n",
    )
    .unwrap();

    let mut config = EngineConfig::load_or_default(&path);
    assert_eq!(config.validate(), 3);
    assert_eq!(config.source.max_retries, 1);
    assert_eq!(config.queue.capacity, 64);
    assert_eq!(config.worker.result_buffer, 1);
}
