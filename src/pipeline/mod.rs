//! Ordered filter chains.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s; insertion order is apply
//! order. Pipelines are values: every edit returns a new pipeline and leaves
//! the original untouched, so a pipeline the worker is currently running is
//! never modified under it. The live pipeline is shared through a
//! [`PipelineHandle`], which swaps whole pipelines atomically.
//!
//! # Architecture
//!
//! ```text
//! StageRecord (JSON) ──► from_records ──► Pipeline ──► PipelineHandle::publish
//!                                            │                 │
//!                   with_stage_* edits ◄─────┘        snapshot() per pass
//!                                                              │
//!                                                     Pipeline::apply(frame)
//! ```
//!
//! # Persisted format
//!
//! A pipeline is stored as a JSON list of [`StageRecord`]s:
//!
//! ```json
//! [
//!   { "name": "convert_to_grayscale", "params": {} },
//!   { "name": "apply_gaussian_blur", "params": { "ksize": 9 }, "enabled": false }
//! ]
//! ```

mod apply;
mod handle;
mod stage;

pub use apply::{Applied, StageFailure};
pub use handle::PipelineHandle;
pub use stage::{Stage, StageRecord};

use crate::error::PipelineError;
use crate::filters::{FilterRegistry, ValidationReport};
use crate::frame::Frame;
use serde_json::{Map, Value};

type EditResult = std::result::Result<Pipeline, PipelineError>;

/// Direction for [`Pipeline::with_stage_shifted`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// Toward the start of the chain
    Up,
    /// Toward the end of the chain
    Down,
}

/// What happened while building a pipeline from records
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Records whose filter name is not in the registry
    pub dropped: Vec<String>,
    /// Validation reports with at least one correction or unknown key
    pub corrections: Vec<ValidationReport>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty() && self.corrections.is_empty()
    }
}

/// An immutable, ordered chain of stages
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Empty pipeline; applying it returns the input frame
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Filter names in apply order, disabled stages included
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Run every enabled stage over `frame`
    pub fn apply(&self, frame: &Frame) -> Applied {
        apply::run_stages(&self.stages, frame)
    }

    // ==================== Edits ====================

    fn check_index(&self, index: usize) -> Result<(), PipelineError> {
        if index >= self.stages.len() {
            return Err(PipelineError::IndexOutOfBounds {
                index,
                len: self.stages.len(),
            });
        }
        Ok(())
    }

    fn from_stages(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Add a stage for filter `name`, appending when `index` is `None`
    ///
    /// Unknown filters are refused. `index` may equal the current length.
    pub fn with_stage_added(
        &self,
        registry: &FilterRegistry,
        name: &str,
        raw: &Map<String, Value>,
        index: Option<usize>,
    ) -> EditResult {
        let filter = registry.lookup(name).ok_or_else(|| {
            tracing::warn!("Refusing to add unknown filter '{}'", name);
            PipelineError::UnknownFilter(name.to_string())
        })?;
        let at = index.unwrap_or(self.stages.len());
        if at > self.stages.len() {
            return Err(PipelineError::IndexOutOfBounds {
                index: at,
                len: self.stages.len(),
            });
        }

        let (stage, _report) = Stage::new(filter, raw);
        let mut stages = self.stages.clone();
        stages.insert(at, stage);
        Ok(Self::from_stages(stages))
    }

    pub fn without_stage(&self, index: usize) -> EditResult {
        self.check_index(index)?;
        let mut stages = self.stages.clone();
        stages.remove(index);
        Ok(Self::from_stages(stages))
    }

    /// Move the stage at `from` so that it ends up at position `to`
    pub fn with_stage_moved(&self, from: usize, to: usize) -> EditResult {
        self.check_index(from)?;
        self.check_index(to)?;
        let mut stages = self.stages.clone();
        let stage = stages.remove(from);
        stages.insert(to, stage);
        Ok(Self::from_stages(stages))
    }

    /// Swap a stage with its neighbour; shifting past either end is a no-op
    pub fn with_stage_shifted(&self, index: usize, shift: Shift) -> EditResult {
        self.check_index(index)?;
        let target = match shift {
            Shift::Up => index.checked_sub(1),
            Shift::Down => Some(index + 1).filter(|&i| i < self.stages.len()),
        };
        match target {
            Some(to) => self.with_stage_moved(index, to),
            None => Ok(self.clone()),
        }
    }

    /// Replace a stage's parameters, re-validating them
    pub fn with_stage_params(&self, index: usize, raw: &Map<String, Value>) -> EditResult {
        self.check_index(index)?;
        let mut stages = self.stages.clone();
        let (stage, _report) = stages[index].reparameterized(raw);
        stages[index] = stage;
        Ok(Self::from_stages(stages))
    }

    pub fn with_stage_enabled(&self, index: usize, enabled: bool) -> EditResult {
        self.check_index(index)?;
        let mut stages = self.stages.clone();
        stages[index] = stages[index].toggled(enabled);
        Ok(Self::from_stages(stages))
    }

    // ==================== Records ====================

    pub fn to_records(&self) -> Vec<StageRecord> {
        self.stages.iter().map(Stage::to_record).collect()
    }

    /// Build a pipeline from loose records
    ///
    /// Records naming unknown filters are dropped with a warning and listed
    /// in the report; every other record is validated.
    pub fn from_records(registry: &FilterRegistry, records: &[StageRecord]) -> (Self, BuildReport) {
        let mut report = BuildReport::default();
        let mut stages = Vec::with_capacity(records.len());

        for record in records {
            let Some(filter) = registry.lookup(&record.name) else {
                tracing::warn!("Dropping unknown filter '{}' from pipeline", record.name);
                report.dropped.push(record.name.clone());
                continue;
            };
            let (stage, validation) = Stage::new(filter, &record.params);
            if !validation.is_clean() {
                report.corrections.push(validation);
            }
            stages.push(stage.toggled(record.enabled));
        }

        (Self::from_stages(stages), report)
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string_pretty(&self.to_records())
            .map_err(|e| PipelineError::Serialization(e.to_string()))
    }

    pub fn from_json(registry: &FilterRegistry, json: &str) -> Result<(Self, BuildReport), PipelineError> {
        let records: Vec<StageRecord> =
            serde_json::from_str(json).map_err(|e| PipelineError::Serialization(e.to_string()))?;
        Ok(Self::from_records(registry, &records))
    }
}
