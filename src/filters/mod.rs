//! Filters: schemas, registry, validation and the built-in transforms.
//!
//! # Architecture
//!
//! ```text
//! raw JSON params ──► validation::validate ──► ValidatedParams ──► transform(frame)
//!                            ▲
//!                  FilterSchema (from FilterRegistry)
//! ```
//!
//! - [`FilterRegistry`] - read-only name → [`FilterDefinition`] table, shared as `Arc`
//! - [`FilterSchema`] / [`ParamSpec`] - declared parameters with ranges and defaults
//! - [`validate`] - the total sanitizer every parameter map passes through
//! - [`transforms`] - pure frame → frame functions

pub mod registry;
pub mod schema;
pub mod transforms;
pub mod validation;

pub use registry::{FilterDefinition, FilterRegistry, SharedRegistry, TransformFn};
pub use schema::{FilterSchema, ParamKind, ParamRule, ParamSpec, ParamValue, ValidatedParams};
pub use validation::{validate, validate_with_report, Correction, CorrectionKind, ValidationReport};
