//! Integration tests for pipeline editing against a running engine
//!
//! Pipelines are loaded from records, edited stage by stage and swapped while
//! frames are flowing. Results must always reflect exactly one published chain.

mod common;

use common::builders::{gradient_frame, RecordsBuilder};
use common::mock_helpers::{fast_config, small_device, start_engine};
use common::{test_timeout, wait_until};
use livefilter_rs::pipeline::Shift;
use livefilter_rs::{Channels, EngineEvent, FilterRegistry, Pipeline};
use serde_json::{json, Map};
use serial_test::serial;

#[test]
#[serial]
fn test_loaded_pipeline_shapes_results() {
    let (mut engine, receiver) = start_engine(&fast_config(), small_device());

    let json = RecordsBuilder::new()
        .stage("convert_to_grayscale")
        .stage_with("apply_gaussian_blur", json!({"ksize": 8}))
        .to_json();
    let report = engine.load_pipeline_json(&json).unwrap();
    assert!(report.dropped.is_empty());
    assert_eq!(report.corrections.len(), 1);

    let pipeline = engine.pipeline();
    assert_eq!(pipeline.stage(1).unwrap().params().int("ksize"), Some(9));

    assert!(wait_until(|| receiver
        .try_recv_result()
        .map(|r| r.frame.channels() == Channels::Intensity && r.stage_failures.is_empty())
        .unwrap_or(false)));

    engine.stop().unwrap();
}

#[test]
#[serial]
fn test_stage_edits_while_running() {
    let (mut engine, receiver) = start_engine(&fast_config(), small_device());
    let none = Map::new();

    engine.add_stage("invert_colors", &none, None).unwrap();
    engine.add_stage("convert_to_grayscale", &none, Some(0)).unwrap();
    engine.add_stage("apply_median_blur", &none, None).unwrap();
    assert_eq!(
        engine.pipeline().names(),
        vec!["convert_to_grayscale", "invert_colors", "apply_median_blur"]
    );

    engine.shift_stage(2, Shift::Up).unwrap();
    engine.move_stage(0, 2).unwrap();
    assert_eq!(
        engine.pipeline().names(),
        vec!["apply_median_blur", "invert_colors", "convert_to_grayscale"]
    );

    engine.set_stage_enabled(2, false).unwrap();
    assert!(wait_until(|| receiver
        .try_recv_result()
        .map(|r| r.frame.channels() == Channels::Rgb)
        .unwrap_or(false)));

    engine
        .update_stage_params(0, json!({"ksize": 100}).as_object().unwrap())
        .unwrap();
    assert_eq!(engine.pipeline().stage(0).unwrap().params().int("ksize"), Some(15));

    engine.remove_stage(1).unwrap();
    assert_eq!(engine.pipeline().len(), 2);

    // Rejected edits do not publish
    let version = engine.pipeline_version();
    assert!(engine.add_stage("vintage_film", &none, None).is_err());
    assert!(engine.remove_stage(9).is_err());
    assert_eq!(engine.pipeline_version(), version);

    let changes = receiver
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::PipelineChanged { .. }))
        .count();
    assert_eq!(changes as u64, version);

    engine.stop().unwrap();
}

#[test]
#[serial]
fn test_failing_stage_is_isolated() {
    let (mut engine, receiver) = start_engine(&fast_config(), small_device());

    // Saturation needs color, so it fails after the grayscale stage
    let records = RecordsBuilder::new()
        .stage("convert_to_grayscale")
        .stage("adjust_saturation")
        .stage("invert_colors")
        .build();
    engine.set_pipeline_records(&records);

    let result = loop {
        let result = receiver
            .recv_result_timeout(test_timeout())
            .expect("results keep flowing");
        if !result.stage_failures.is_empty() {
            break result;
        }
    };
    assert_eq!(result.stage_failures.len(), 1);
    assert_eq!(result.stage_failures[0].index, 1);
    assert_eq!(result.frame.channels(), Channels::Intensity);

    assert!(wait_until(|| receiver
        .events
        .try_iter()
        .any(|e| matches!(e, EngineEvent::StageFailed { .. }))));
    assert!(engine.stats().stage_failures > 0);

    engine.stop().unwrap();
}

#[test]
#[serial]
fn test_preview_candidate_chain() {
    let (mut engine, _receiver) = start_engine(&fast_config(), small_device());
    assert!(wait_until(|| engine.latest_frame().is_some()));

    let registry = FilterRegistry::builtin();
    let candidate = Pipeline::new()
        .with_stage_added(&registry, "sepia_tint", &Map::new(), None)
        .unwrap();

    let preview = engine.preview(&candidate).unwrap();
    assert_eq!(preview.frame.width(), 24);
    assert!(preview.stage_failures.is_empty());
    assert_eq!(engine.pipeline_version(), 0);
    assert!(engine.pipeline().is_empty());

    engine.stop().unwrap();
}

#[test]
fn test_records_json_roundtrip_offline() {
    let registry = FilterRegistry::builtin();
    let json = RecordsBuilder::new()
        .stage_with("adjust_brightness_contrast", json!({"alpha": 1.5, "beta": "20"}))
        .stage("bokeh_effect")
        .disabled()
        .to_json();

    let (pipeline, report) = Pipeline::from_json(&registry, &json).unwrap();
    assert!(report.dropped.is_empty());
    assert_eq!(pipeline.len(), 2);
    assert!(!pipeline.stage(1).unwrap().is_enabled());

    let (reloaded, _) = Pipeline::from_json(&registry, &pipeline.to_json().unwrap()).unwrap();
    assert_eq!(reloaded.to_records(), pipeline.to_records());

    let frame = gradient_frame(32, 20);
    let first = reloaded.apply(&frame);
    let second = pipeline.apply(&frame);
    assert!(first.frame.same_pixels(&second.frame));
}
