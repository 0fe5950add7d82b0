//! Test data builders for creating test objects

use livefilter_rs::{Channels, Frame, StageRecord};
use serde_json::{Map, Value};

/// Builder for pipeline record lists
#[derive(Default)]
pub struct RecordsBuilder {
    records: Vec<StageRecord>,
}

impl RecordsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage with default parameters
    pub fn stage(self, name: &str) -> Self {
        self.stage_with(name, Value::Object(Map::new()))
    }

    /// Append a stage with raw JSON parameters
    pub fn stage_with(mut self, name: &str, params: Value) -> Self {
        let params = params.as_object().cloned().unwrap_or_default();
        self.records.push(StageRecord::new(name, params));
        self
    }

    /// Disable the most recently added stage
    pub fn disabled(mut self) -> Self {
        if let Some(last) = self.records.last_mut() {
            last.enabled = false;
        }
        self
    }

    pub fn build(self) -> Vec<StageRecord> {
        self.records
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.records).unwrap_or_default()
    }
}

/// RGB frame whose red channel ramps left to right
pub fn gradient_frame(width: u32, height: u32) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for _y in 0..height {
        for x in 0..width {
            let v = (x * 255 / width.saturating_sub(1).max(1)) as u8;
            data.extend_from_slice(&[v, 128, 255 - v]);
        }
    }
    Frame::from_raw(width, height, Channels::Rgb, data).unwrap_or_else(|| Frame::filled(width, height, Channels::Rgb, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_builder() {
        let records = RecordsBuilder::new()
            .stage("convert_to_grayscale")
            .stage_with("apply_gaussian_blur", serde_json::json!({"ksize": 9}))
            .disabled()
            .build();

        assert_eq!(records.len(), 2);
        assert!(records[0].enabled);
        assert!(!records[1].enabled);
        assert_eq!(records[1].params["ksize"], 9);
    }
}
