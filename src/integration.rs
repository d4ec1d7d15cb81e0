//! Integration module for connecting the overlay with its collaborators.
//!
//! This module provides the traits an inference backend and a tracking
//! session implement, the single-flight gate in front of the backend, and the
//! pipeline that moves results from the inference worker to the slot pool.

mod backend;
mod gate;
mod pipeline;
mod worker;

pub use backend::{
    FrameHandle, ImageFrame, InferenceBackend, Representation, RequestConfig, TrackingSession,
};
pub use gate::{Admission, GateState, GateStats, InFlight, InferenceGate};
pub use pipeline::{FrameSubmitter, OverlayPipeline};
pub use worker::Completion;
