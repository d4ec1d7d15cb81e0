//! Error types shared across the pipeline.

use thiserror::Error;

/// Startup-time configuration problems. These are fatal: the overlay must not
/// start with a model table that does not match the network output.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("no request kinds configured")]
    NoRequestKinds,

    #[error("anchor count mismatch: expected {expected}, got {got}")]
    AnchorCountMismatch { expected: usize, got: usize },

    #[error("anchor {index} is invalid: {reason}")]
    InvalidAnchor { index: usize, reason: String },

    #[error("background class {background} out of range for {num_classes} classes")]
    BackgroundOutOfRange { background: usize, num_classes: usize },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Per-cycle decode failures. Callers recover these as "no detections".
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PostprocessError {
    #[error("box tensor has {got} anchors, expected {expected}")]
    AnchorCount { expected: usize, got: usize },

    #[error("box tensor rows must hold 4 offsets, got {0}")]
    BoxWidth(usize),

    #[error("class tensor has {got_anchors}x{got_classes}, expected {expected_anchors}x{expected_classes}")]
    ClassShape {
        expected_anchors: usize,
        expected_classes: usize,
        got_anchors: usize,
        got_classes: usize,
    },
}

/// Lifecycle failures of the overlay pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("inference backend rejected its configuration: {0}")]
    BackendConfigure(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("pipeline is already running")]
    AlreadyStarted,

    #[error("pipeline is not running")]
    NotStarted,

    #[error("failed to spawn inference worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("inference worker panicked")]
    WorkerPanicked,
}
