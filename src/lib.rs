//! Detection overlay core.
//!
//! Takes raw SSD-style network output, turns it into a ranked list of
//! detections and keeps a fixed pool of on-screen markers in sync with it,
//! while a single-flight gate keeps at most one inference in progress.

pub mod config;
pub mod detection;
pub mod error;
pub mod integration;
pub mod overlay;

pub use config::{OverlayConfig, RequestKind, RequestKinds};
pub use detection::{
    AnchorBook, AnchorBox, AnchorSpec, BoxDecoder, Detection, DetectionBuilder, LabelMap,
    PostProcessor, Quad, RawOutput, Rect, Suppressor,
};
pub use error::{ConfigError, PipelineError, PostprocessError};
pub use integration::{
    Admission, FrameHandle, FrameSubmitter, ImageFrame, InferenceBackend, InferenceGate,
    OverlayPipeline, Representation, TrackingSession,
};
pub use overlay::{CameraPose, MarkerEntity, MarkerFactory, SlotAssignment, SlotManager, SlotReport};
