//! Inference worker thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::RequestKind;
use crate::detection::{Detection, PostProcessor, Quad, RawOutput};
use crate::integration::backend::{ImageFrame, InferenceBackend, RequestConfig};
use crate::integration::gate::InFlight;

pub(crate) struct Job {
    pub frame: ImageFrame,
    pub ticket: InFlight,
}

pub(crate) enum WorkerMessage {
    Run(Job),
    Shutdown,
}

/// Result of one inference cycle, handed to the render context.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub sequence: u64,
    /// Ranked detections; empty when the cycle failed
    pub detections: Vec<Detection>,
    /// Recognized rectangles, at most `max_observations`
    pub rectangles: Vec<Quad>,
    /// Backend error message, if the cycle failed
    pub failure: Option<String>,
}

impl Completion {
    fn failed(sequence: u64, failure: String) -> Self {
        Self {
            sequence,
            detections: Vec::new(),
            rectangles: Vec::new(),
            failure: Some(failure),
        }
    }
}

pub(crate) fn spawn<B: InferenceBackend>(
    mut backend: B,
    postprocessor: Arc<PostProcessor>,
    request: RequestConfig,
    jobs: Receiver<WorkerMessage>,
    completions: Sender<Completion>,
) -> std::io::Result<JoinHandle<B>> {
    thread::Builder::new()
        .name("inference-worker".to_string())
        .spawn(move || {
            info!("inference worker started");
            while let Ok(message) = jobs.recv() {
                let Job { frame, ticket } = match message {
                    WorkerMessage::Run(job) => job,
                    WorkerMessage::Shutdown => break,
                };
                let completion = run_cycle(&mut backend, &postprocessor, &request, &frame);
                // Release before forwarding so the next frame is admitted as
                // soon as the result exists.
                ticket.complete();
                if completions.send(completion).is_err() {
                    debug!("completion receiver gone");
                    break;
                }
            }
            info!("inference worker stopped");
            backend
        })
}

fn run_cycle<B: InferenceBackend>(
    backend: &mut B,
    postprocessor: &PostProcessor,
    request: &RequestConfig,
    frame: &ImageFrame,
) -> Completion {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| backend.run_inference(frame)));
    match outcome {
        Ok(Ok(raw)) => {
            let completion = collect(postprocessor, request, frame.sequence, raw);
            debug!(
                sequence = frame.sequence,
                detections = completion.detections.len(),
                rectangles = completion.rectangles.len(),
                elapsed = ?started.elapsed(),
                "inference complete"
            );
            completion
        }
        Ok(Err(e)) => {
            warn!(
                sequence = frame.sequence,
                error = %e,
                "inference failed, treating cycle as empty"
            );
            Completion::failed(frame.sequence, e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                sequence = frame.sequence,
                panic = %message,
                "inference backend panicked, treating cycle as empty"
            );
            Completion::failed(frame.sequence, format!("backend panicked: {message}"))
        }
    }
}

/// Keep only the kinds of results that were requested.
fn collect(
    postprocessor: &PostProcessor,
    request: &RequestConfig,
    sequence: u64,
    raw: RawOutput,
) -> Completion {
    let detections = if request.kinds.contains(RequestKind::Classification) {
        postprocessor.postprocess(&raw)
    } else {
        Vec::new()
    };
    let rectangles = if request.kinds.contains(RequestKind::RectangleRecognition) {
        raw.rectangles
            .into_iter()
            .filter(Quad::is_finite)
            .take(request.max_observations)
            .collect()
    } else {
        Vec::new()
    };
    Completion {
        sequence,
        detections,
        rectangles,
        failure: None,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OverlayConfig, RequestKinds};
    use crate::detection::{AnchorBox, AnchorSpec, LabelMap};
    use crate::integration::backend::{FrameHandle, Representation};
    use nalgebra::Point2;
    use ndarray::{Array2, array};

    #[derive(Debug, thiserror::Error)]
    #[error("mock failure")]
    struct MockError;

    enum Behavior {
        Output(RawOutput),
        Fail,
        Panic,
    }

    struct MockBackend {
        behavior: Behavior,
    }

    impl InferenceBackend for MockBackend {
        type Error = MockError;

        fn run_inference(&mut self, _frame: &ImageFrame) -> Result<RawOutput, Self::Error> {
            match &self.behavior {
                Behavior::Output(raw) => Ok(raw.clone()),
                Behavior::Fail => Err(MockError),
                Behavior::Panic => panic!("model crashed"),
            }
        }
    }

    fn config() -> OverlayConfig {
        OverlayConfig {
            max_observations: 2,
            num_anchors: 1,
            num_classes: 2,
            anchors: AnchorSpec::Table {
                anchors: vec![AnchorBox::new(0.5, 0.5, 0.2, 0.2)],
            },
            ..OverlayConfig::default()
        }
    }

    fn postprocessor() -> PostProcessor {
        PostProcessor::from_config(&config(), LabelMap::default()).unwrap()
    }

    fn frame() -> ImageFrame {
        ImageFrame::new(FrameHandle(7), Representation::GpuTexture, 7)
    }

    fn quad(offset: f32) -> Quad {
        Quad::new(
            Point2::new(0.1 + offset, 0.1),
            Point2::new(0.3 + offset, 0.1),
            Point2::new(0.3 + offset, 0.3),
            Point2::new(0.1 + offset, 0.3),
        )
    }

    #[test]
    fn test_panicking_backend_yields_failed_cycle() {
        let mut backend = MockBackend {
            behavior: Behavior::Panic,
        };
        let request = RequestConfig::from(&config());
        let completion = run_cycle(&mut backend, &postprocessor(), &request, &frame());
        assert_eq!(completion.sequence, 7);
        assert!(completion.detections.is_empty());
        let failure = completion.failure.unwrap();
        assert!(failure.contains("model crashed"));
    }

    #[test]
    fn test_backend_error_yields_failed_cycle() {
        let mut backend = MockBackend {
            behavior: Behavior::Fail,
        };
        let request = RequestConfig::from(&config());
        let completion = run_cycle(&mut backend, &postprocessor(), &request, &frame());
        assert_eq!(completion.failure.as_deref(), Some("mock failure"));
    }

    #[test]
    fn test_rectangles_only_request() {
        let raw = RawOutput::rectangles_only(vec![quad(0.0), quad(0.3), quad(0.6)]);
        let mut backend = MockBackend {
            behavior: Behavior::Output(raw),
        };
        let request = RequestConfig {
            kinds: RequestKinds::empty().with(RequestKind::RectangleRecognition),
            max_observations: 2,
        };
        let completion = run_cycle(&mut backend, &postprocessor(), &request, &frame());
        assert!(completion.failure.is_none());
        assert!(completion.detections.is_empty());
        assert_eq!(completion.rectangles, vec![quad(0.0), quad(0.3)]);
    }

    #[test]
    fn test_unrequested_rectangles_are_ignored() {
        let raw = RawOutput::new(Array2::zeros((1, 4)), array![[0.0, 4.0]])
            .with_rectangles(vec![quad(0.0)]);
        let mut backend = MockBackend {
            behavior: Behavior::Output(raw),
        };
        let request = RequestConfig::from(&config());
        let completion = run_cycle(&mut backend, &postprocessor(), &request, &frame());
        assert_eq!(completion.detections.len(), 1);
        assert!(completion.rectangles.is_empty());
    }
}
