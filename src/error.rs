//! Error types for the violation pipeline.

use std::time::Duration;

use thiserror::Error;

/// The detector could not produce detections for a frame.
///
/// Never fatal: the pipeline logs it and treats the frame as having no
/// detections.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionUnavailable {
    #[error("detector rejected frame: {0}")]
    Rejected(String),

    #[error("detector did not answer within {0:?}")]
    TimedOut(Duration),

    #[error("detection worker stopped")]
    WorkerStopped,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("frame dimensions changed mid-stream: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("frame index {found} is not after previous frame {previous}")]
    OutOfOrderFrame { previous: u64, found: u64 },

    #[error("pipeline halted after a fatal stream error")]
    Halted,

    #[error("stream cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PipelineError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
