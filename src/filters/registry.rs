//! Filter registry
//!
//! Maps a filter name to its schema and transform. A registry is built once
//! at startup, either from the built-in table ([`FilterRegistry::builtin`])
//! or from an explicit list of definitions, and is read-only from then on.
//! Components that need lookups hold an `Arc<FilterRegistry>`.

use super::schema::{FilterSchema, ParamRule, ParamSpec, ValidatedParams};
use super::transforms;
use super::validation::{self, ValidationReport};
use crate::error::FilterError;
use crate::frame::Frame;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Signature every transform implements
pub type TransformFn = fn(&Frame, &ValidatedParams) -> Result<Frame, FilterError>;

/// A named filter: its parameter schema and the function that applies it
#[derive(Clone)]
pub struct FilterDefinition {
    pub schema: FilterSchema,
    pub transform: TransformFn,
}

impl std::fmt::Debug for FilterDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterDefinition")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl FilterDefinition {
    pub fn new(schema: FilterSchema, transform: TransformFn) -> Self {
        Self { schema, transform }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Sanitize raw parameters for this filter
    pub fn validate(&self, raw: &Map<String, Value>) -> (ValidatedParams, ValidationReport) {
        validation::validate_with_report(&self.schema, raw)
    }

    /// Parameters made entirely of schema defaults
    pub fn default_params(&self) -> ValidatedParams {
        validation::validate(&self.schema, &Map::new())
    }

    pub fn apply(&self, frame: &Frame, params: &ValidatedParams) -> Result<Frame, FilterError> {
        (self.transform)(frame, params)
    }
}

/// Read-only lookup table of available filters
#[derive(Debug, Default)]
pub struct FilterRegistry {
    filters: Vec<Arc<FilterDefinition>>,
    index: HashMap<String, usize>,
}

/// Shared handle to a registry
pub type SharedRegistry = Arc<FilterRegistry>;

impl FilterRegistry {
    /// Build a registry from definitions; later duplicates of a name are ignored
    pub fn from_definitions(definitions: impl IntoIterator<Item = FilterDefinition>) -> Self {
        let mut registry = Self::default();
        for definition in definitions {
            let name = definition.schema.name.clone();
            if registry.index.contains_key(&name) {
                tracing::warn!("Duplicate filter '{}' in registry table, keeping the first", name);
                continue;
            }
            registry.index.insert(name, registry.filters.len());
            registry.filters.push(Arc::new(definition));
        }
        tracing::debug!("Filter registry initialized with {} filters", registry.filters.len());
        registry
    }

    /// The built-in filter table
    pub fn builtin() -> Self {
        Self::from_definitions(builtin_definitions())
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(self)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<FilterDefinition>> {
        self.index.get(name).map(|&i| Arc::clone(&self.filters[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Filter names in table order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|f| f.name())
    }

    pub fn schemas(&self) -> impl Iterator<Item = &FilterSchema> {
        self.filters.iter().map(|f| &f.schema)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

fn builtin_definitions() -> Vec<FilterDefinition> {
    vec![
        FilterDefinition::new(
            FilterSchema::new("convert_to_grayscale", "Convert to a single intensity channel"),
            transforms::convert_to_grayscale,
        ),
        FilterDefinition::new(
            FilterSchema::new("apply_gaussian_blur", "Gaussian blur")
                .param(ParamSpec::integer("ksize", 5, 1, 31).odd()),
            transforms::gaussian_blur,
        ),
        FilterDefinition::new(
            FilterSchema::new("apply_median_blur", "Median blur, removes salt-and-pepper noise")
                .param(ParamSpec::integer("ksize", 5, 1, 15).odd()),
            transforms::median_blur,
        ),
        FilterDefinition::new(
            FilterSchema::new("apply_canny_edge_detection", "Canny edge detection")
                .param(ParamSpec::integer("low_threshold", 50, 0, 255))
                .param(ParamSpec::integer("high_threshold", 150, 0, 255)),
            transforms::canny_edges,
        ),
        FilterDefinition::new(
            FilterSchema::new("apply_sobel_edge_detection", "Sobel gradient magnitude")
                .param(ParamSpec::integer("dx", 1, 0, 1))
                .param(ParamSpec::integer("dy", 0, 0, 1))
                .param(ParamSpec::integer("ksize", 3, 1, 7).odd())
                .rule(ParamRule::AnyNonZero {
                    params: vec!["dx".to_string(), "dy".to_string()],
                    fallback: "dx".to_string(),
                }),
            transforms::sobel_edges,
        ),
        FilterDefinition::new(
            FilterSchema::new("apply_laplacian_sharpen", "Laplacian sharpening")
                .param(ParamSpec::real("strength", 1.0, 0.0, 3.0)),
            transforms::laplacian_sharpen,
        ),
        FilterDefinition::new(
            FilterSchema::new("invert_colors", "Invert every channel"),
            transforms::invert_colors,
        ),
        FilterDefinition::new(
            FilterSchema::new("adjust_brightness_contrast", "Scale (alpha) and offset (beta) intensities")
                .param(ParamSpec::real("alpha", 1.0, 0.0, 3.0))
                .param(ParamSpec::integer("beta", 0, -100, 100)),
            transforms::brightness_contrast,
        ),
        FilterDefinition::new(
            FilterSchema::new("adjust_saturation", "Scale color saturation")
                .param(ParamSpec::real("saturation_factor", 1.0, 0.0, 3.0)),
            transforms::adjust_saturation,
        ),
        FilterDefinition::new(
            FilterSchema::new("sepia_tint", "Warm sepia toning")
                .param(ParamSpec::real("strength", 1.0, 0.0, 1.0)),
            transforms::sepia_tint,
        ),
        FilterDefinition::new(
            FilterSchema::new("bokeh_effect", "Blur outside a circular focus area")
                .param(ParamSpec::integer("ksize", 15, 3, 31).odd())
                .param(ParamSpec::real("center_x", 0.5, 0.0, 1.0))
                .param(ParamSpec::real("center_y", 0.5, 0.0, 1.0))
                .param(ParamSpec::real("radius", 0.3, 0.05, 1.0)),
            transforms::bokeh_effect,
        ),
    ]
}
