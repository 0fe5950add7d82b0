//! Pipeline stages and their persisted record form.

use crate::error::FilterError;
use crate::filters::{FilterDefinition, ValidatedParams, ValidationReport};
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One filter application inside a pipeline
///
/// A stage can only be built from raw parameters through the validator, so
/// `params` always satisfies the filter's schema.
#[derive(Debug, Clone)]
pub struct Stage {
    filter: Arc<FilterDefinition>,
    params: ValidatedParams,
    enabled: bool,
}

impl Stage {
    /// Build an enabled stage, sanitizing `raw` against the filter's schema
    pub fn new(filter: Arc<FilterDefinition>, raw: &Map<String, Value>) -> (Self, ValidationReport) {
        let (params, report) = filter.validate(raw);
        (
            Self {
                filter,
                params,
                enabled: true,
            },
            report,
        )
    }

    /// Stage with every parameter at its default
    pub fn with_defaults(filter: Arc<FilterDefinition>) -> Self {
        let params = filter.default_params();
        Self {
            filter,
            params,
            enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        self.filter.name()
    }

    pub fn definition(&self) -> &Arc<FilterDefinition> {
        &self.filter
    }

    pub fn params(&self) -> &ValidatedParams {
        &self.params
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Copy of this stage with new, re-validated parameters
    pub(crate) fn reparameterized(&self, raw: &Map<String, Value>) -> (Self, ValidationReport) {
        let (stage, report) = Self::new(Arc::clone(&self.filter), raw);
        (
            Self {
                enabled: self.enabled,
                ..stage
            },
            report,
        )
    }

    pub(crate) fn toggled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }

    pub(crate) fn run(&self, frame: &Frame) -> Result<Frame, FilterError> {
        self.filter.apply(frame, &self.params)
    }

    pub fn to_record(&self) -> StageRecord {
        StageRecord {
            name: self.name().to_string(),
            params: self.params.to_json_map(),
            enabled: self.enabled,
        }
    }
}

/// Serialized form of a stage
///
/// `params` is kept as loose JSON: records come from files, presets and
/// suggestion tools and are only trusted after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl StageRecord {
    pub fn new(name: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            params,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterRegistry;
    use serde_json::json;

    #[test]
    fn test_stage_params_are_validated() {
        let registry = FilterRegistry::builtin();
        let blur = registry.lookup("apply_gaussian_blur").unwrap();
        let raw = json!({ "ksize": 8, "sigma": 2 });
        let (stage, report) = Stage::new(blur, raw.as_object().unwrap());

        assert_eq!(stage.params().int("ksize"), Some(9));
        assert_eq!(report.unknown_keys, vec!["sigma".to_string()]);
        assert!(stage.is_enabled());
    }

    #[test]
    fn test_reparameterized_keeps_enabled_flag() {
        let registry = FilterRegistry::builtin();
        let stage = Stage::with_defaults(registry.lookup("apply_median_blur").unwrap()).toggled(false);
        let (next, _) = stage.reparameterized(json!({ "ksize": 3 }).as_object().unwrap());
        assert!(!next.is_enabled());
        assert_eq!(next.params().int("ksize"), Some(3));
        assert_eq!(stage.params().int("ksize"), Some(5));
    }

    #[test]
    fn test_record_enabled_defaults_true() {
        let record: StageRecord = serde_json::from_str(r#"{"name":"invert_colors"}"#).unwrap();
        assert!(record.enabled);
        assert!(record.params.is_empty());
    }
}
