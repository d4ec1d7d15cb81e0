//! Traits for the inference engine and the tracking subsystem.

use crate::config::{OverlayConfig, RequestKinds};
use crate::detection::RawOutput;
use crate::integration::pipeline::FrameSubmitter;

/// Opaque reference to an image buffer owned by the tracking subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Underlying representation of a [`FrameHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Platform video buffer (e.g. a camera pixel buffer)
    PixelBuffer,
    /// GPU texture
    GpuTexture,
}

/// One camera frame offered for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFrame {
    pub handle: FrameHandle,
    pub representation: Representation,
    /// Monotonic frame counter assigned by the producer
    pub sequence: u64,
}

impl ImageFrame {
    pub fn new(handle: FrameHandle, representation: Representation, sequence: u64) -> Self {
        Self {
            handle,
            representation,
            sequence,
        }
    }
}

/// What the backend is asked to run, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestConfig {
    pub kinds: RequestKinds,
    pub max_observations: usize,
}

impl From<&OverlayConfig> for RequestConfig {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            kinds: config.request_kinds,
            max_observations: config.max_observations,
        }
    }
}

/// Trait for object detection inference backends.
///
/// Implement this trait to connect a detection network to the overlay. The
/// backend runs on the inference worker thread, one call at a time.
///
/// # Example
///
/// ```ignore
/// use ar_overlay_rs::integration::{ImageFrame, InferenceBackend};
/// use ar_overlay_rs::RawOutput;
///
/// struct MyNetwork {
///     // Your model here
/// }
///
/// impl InferenceBackend for MyNetwork {
///     type Error = std::io::Error;
///
///     fn run_inference(&mut self, frame: &ImageFrame) -> Result<RawOutput, Self::Error> {
///         // Resolve the frame handle, run the network, return both tensors
///         todo!()
///     }
/// }
/// ```
pub trait InferenceBackend: Send + 'static {
    /// Error type for inference failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Prepare the requested kinds of work. Called once before the worker
    /// starts; an error here aborts startup.
    fn configure(&mut self, _request: &RequestConfig) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Run the network on one frame and return its raw tensors.
    fn run_inference(&mut self, frame: &ImageFrame) -> Result<RawOutput, Self::Error>;
}

/// The AR tracking subsystem's per-frame callback registry.
///
/// The pipeline registers a [`FrameSubmitter`] on start and removes it on
/// stop; the session calls [`FrameSubmitter::submit`] once per camera tick.
pub trait TrackingSession {
    fn register_frame_callback(&mut self, submitter: FrameSubmitter);

    fn deregister_frame_callback(&mut self);
}
