//! Running a pipeline over one frame.
//!
//! Stages are isolated from each other: a stage that returns an error or
//! panics is recorded as a [`StageFailure`] and the pass continues with the
//! frame as it was before that stage. One bad filter never ends the stream.

use super::stage::Stage;
use crate::frame::Frame;
use std::panic::{self, AssertUnwindSafe};

/// A stage that failed during one pass
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    /// Position of the stage in the pipeline
    pub index: usize,
    pub filter: String,
    pub message: String,
    /// Whether the stage panicked rather than returning an error
    pub panicked: bool,
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stage {} ({}): {}", self.index, self.filter, self.message)
    }
}

/// Output of one pipeline pass
#[derive(Debug, Clone)]
pub struct Applied {
    pub frame: Frame,
    pub failures: Vec<StageFailure>,
}

impl Applied {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub(crate) fn run_stages(stages: &[Stage], frame: &Frame) -> Applied {
    let mut current = frame.clone();
    let mut failures = Vec::new();

    for (index, stage) in stages.iter().enumerate() {
        if !stage.is_enabled() {
            continue;
        }
        match run_isolated(stage, &current) {
            Ok(next) => current = next,
            Err((message, panicked)) => {
                tracing::warn!(
                    "Stage {} '{}' failed, passing frame through: {}",
                    index,
                    stage.name(),
                    message
                );
                failures.push(StageFailure {
                    index,
                    filter: stage.name().to_string(),
                    message,
                    panicked,
                });
            }
        }
    }

    Applied {
        frame: current,
        failures,
    }
}

fn run_isolated(stage: &Stage, frame: &Frame) -> Result<Frame, (String, bool)> {
    // Frames are immutable, so nothing observable is left half-updated by a panic
    match panic::catch_unwind(AssertUnwindSafe(|| stage.run(frame))) {
        Ok(Ok(out)) => Ok(out),
        Ok(Err(e)) => Err((e.to_string(), false)),
        Err(payload) => Err((panic_message(payload.as_ref()), true)),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
