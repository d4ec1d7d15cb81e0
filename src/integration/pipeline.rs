//! OverlayPipeline for combining gated inference with the marker pool.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, trace, warn};

use crate::config::OverlayConfig;
use crate::detection::{LabelMap, PostProcessor, Quad};
use crate::error::PipelineError;
use crate::integration::backend::{ImageFrame, InferenceBackend, RequestConfig, TrackingSession};
use crate::integration::gate::{Admission, GateState, InferenceGate};
use crate::integration::worker::{self, Completion, Job, WorkerMessage};
use crate::overlay::{CameraPose, MarkerFactory, SlotManager, SlotReport};

/// Producer-side handle: offers camera frames to the inference worker.
///
/// Cheap to clone and safe to call from the tracking subsystem's thread.
#[derive(Clone)]
pub struct FrameSubmitter {
    gate: InferenceGate,
    jobs: Sender<WorkerMessage>,
}

impl FrameSubmitter {
    /// Offer a frame. Never blocks.
    ///
    /// Returns [`Admission::Dropped`] while an inference is outstanding, or
    /// when the pipeline has been stopped.
    pub fn submit(&self, frame: ImageFrame) -> Admission {
        let Some(ticket) = self.gate.try_admit() else {
            trace!(sequence = frame.sequence, "inference busy, frame dropped");
            return Admission::Dropped;
        };

        match self.jobs.try_send(WorkerMessage::Run(Job { frame, ticket })) {
            Ok(()) => {
                debug!(sequence = frame.sequence, "frame admitted");
                Admission::Admitted
            }
            // The rejected job carries the ticket; dropping it releases the
            // gate.
            Err(TrySendError::Full(_)) => {
                warn!(sequence = frame.sequence, "inference queue full");
                Admission::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!(sequence = frame.sequence, "pipeline stopped, frame dropped");
                Admission::Dropped
            }
        }
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn gate(&self) -> &InferenceGate {
        &self.gate
    }
}

struct Running<B> {
    submitter: FrameSubmitter,
    completions: Receiver<Completion>,
    worker: JoinHandle<B>,
}

/// Gated inference, post-processing and slot updates wired together.
///
/// The pipeline itself lives in the render context: only
/// [`render_tick`](Self::render_tick) and [`await_results`](Self::await_results)
/// touch the slot pool. Frames come in through the [`FrameSubmitter`] handed
/// to the tracking session on [`start`](Self::start).
pub struct OverlayPipeline<B: InferenceBackend, F: MarkerFactory> {
    config: OverlayConfig,
    postprocessor: Arc<PostProcessor>,
    slots: SlotManager<F>,
    rectangles: Vec<Quad>,
    backend: Option<B>,
    running: Option<Running<B>>,
}

impl<B: InferenceBackend, F: MarkerFactory> OverlayPipeline<B, F> {
    /// Validate the configuration, load the anchor table and configure the
    /// backend. Any failure here is fatal.
    pub fn new(
        config: OverlayConfig,
        labels: LabelMap,
        mut backend: B,
        factory: F,
    ) -> Result<Self, PipelineError> {
        let postprocessor = PostProcessor::from_config(&config, labels)?;

        let request = RequestConfig::from(&config);
        backend
            .configure(&request)
            .map_err(|e| PipelineError::BackendConfigure(Box::new(e)))?;
        info!(
            kinds = request.kinds.bits(),
            max_observations = request.max_observations,
            "inference backend configured"
        );

        let slots = SlotManager::from_config(factory, &config);
        Ok(Self {
            config,
            postprocessor: Arc::new(postprocessor),
            slots,
            rectangles: Vec::new(),
            backend: Some(backend),
            running: None,
        })
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn slots(&self) -> &SlotManager<F> {
        &self.slots
    }

    /// Rectangles recognized in the most recently applied cycle.
    pub fn rectangles(&self) -> &[Quad] {
        &self.rectangles
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Gate of the current run, if started.
    pub fn gate(&self) -> Option<&InferenceGate> {
        self.running.as_ref().map(|r| r.submitter.gate())
    }

    /// Spawn the inference worker and register the frame callback with the
    /// tracking session.
    pub fn start<S: TrackingSession>(
        &mut self,
        session: &mut S,
    ) -> Result<FrameSubmitter, PipelineError> {
        if self.running.is_some() {
            return Err(PipelineError::AlreadyStarted);
        }
        let backend = self.backend.take().ok_or(PipelineError::WorkerPanicked)?;

        // The gate keeps at most one job outstanding; the extra slot absorbs
        // the shutdown message.
        let (jobs_tx, jobs_rx) = crossbeam_channel::bounded(2);
        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();
        let worker = worker::spawn(
            backend,
            Arc::clone(&self.postprocessor),
            RequestConfig::from(&self.config),
            jobs_rx,
            completions_tx,
        )?;

        let submitter = FrameSubmitter {
            gate: InferenceGate::new(),
            jobs: jobs_tx,
        };
        session.register_frame_callback(submitter.clone());
        self.running = Some(Running {
            submitter: submitter.clone(),
            completions: completions_rx,
            worker,
        });
        info!("overlay pipeline started");
        Ok(submitter)
    }

    /// Deregister the frame callback and join the worker. An inference in
    /// flight runs to completion first; its result is discarded.
    pub fn stop<S: TrackingSession>(&mut self, session: &mut S) -> Result<(), PipelineError> {
        let running = self.running.take().ok_or(PipelineError::NotStarted)?;
        session.deregister_frame_callback();

        // Fails only if the worker already exited.
        let _ = running.submitter.jobs.send(WorkerMessage::Shutdown);
        drop(running.completions);
        let backend = running
            .worker
            .join()
            .map_err(|_| PipelineError::WorkerPanicked)?;
        self.backend = Some(backend);
        info!("overlay pipeline stopped");
        Ok(())
    }

    /// Apply every completion that has arrived since the last tick, in
    /// arrival order, then move the markers with the camera.
    ///
    /// Returns the report of the last applied completion, if any.
    pub fn render_tick(&mut self, pose: Option<&CameraPose>) -> Option<SlotReport> {
        let mut report = None;
        if let Some(running) = &self.running {
            for completion in running.completions.try_iter() {
                report = Some(apply_completion(&mut self.slots, &mut self.rectangles, completion));
            }
        }
        if let Some(pose) = pose {
            self.slots.follow_camera(pose);
        }
        report
    }

    /// Block until the next completion arrives and apply it. Returns `None`
    /// on timeout or when the pipeline is not running.
    pub fn await_results(&mut self, timeout: Duration) -> Option<SlotReport> {
        let running = self.running.as_ref()?;
        let completion = running.completions.recv_timeout(timeout).ok()?;
        Some(apply_completion(&mut self.slots, &mut self.rectangles, completion))
    }
}

/// Dropping a running pipeline asks the worker to shut down but does not join
/// it; the thread and its backend are detached. Call
/// [`stop`](OverlayPipeline::stop) to wait for the worker and get the backend
/// back.
impl<B: InferenceBackend, F: MarkerFactory> Drop for OverlayPipeline<B, F> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            // Without the receiver the worker also exits after its next
            // completion.
            let _ = running.submitter.jobs.try_send(WorkerMessage::Shutdown);
        }
    }
}

fn apply_completion<F: MarkerFactory>(
    slots: &mut SlotManager<F>,
    rectangles: &mut Vec<Quad>,
    completion: Completion,
) -> SlotReport {
    if let Some(failure) = &completion.failure {
        debug!(sequence = completion.sequence, failure = %failure, "applying empty cycle");
    }
    *rectangles = completion.rectangles;
    slots.apply(&completion.detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{AnchorBox, AnchorSpec, RawOutput};
    use crate::integration::backend::{FrameHandle, Representation};
    use crate::overlay::MarkerEntity;
    use nalgebra::{Point3, UnitQuaternion, Vector3};
    use ndarray::{Array2, array};

    #[derive(Debug, thiserror::Error)]
    #[error("mock failure")]
    struct MockError;

    struct FixedBackend {
        output: RawOutput,
        configured: bool,
    }

    impl InferenceBackend for FixedBackend {
        type Error = MockError;

        fn configure(&mut self, request: &RequestConfig) -> Result<(), Self::Error> {
            assert_eq!(request.max_observations, 4);
            self.configured = true;
            Ok(())
        }

        fn run_inference(&mut self, _frame: &ImageFrame) -> Result<RawOutput, Self::Error> {
            assert!(self.configured);
            Ok(self.output.clone())
        }
    }

    struct RejectingBackend;

    impl InferenceBackend for RejectingBackend {
        type Error = MockError;

        fn configure(&mut self, _request: &RequestConfig) -> Result<(), Self::Error> {
            Err(MockError)
        }

        fn run_inference(&mut self, _frame: &ImageFrame) -> Result<RawOutput, Self::Error> {
            Err(MockError)
        }
    }

    #[derive(Default)]
    struct Marker {
        visible: bool,
    }

    impl MarkerEntity for Marker {
        fn set_geometry(&mut self, _position: Vector3<f32>, _width: f32, _height: f32) {}
        fn set_label(&mut self, _position: Vector3<f32>, _text: &str) {}
        fn set_visible(&mut self, visible: bool) {
            self.visible = visible;
        }
        fn set_transform(&mut self, _position: Point3<f32>, _rotation: UnitQuaternion<f32>) {}
    }

    struct Factory;

    impl MarkerFactory for Factory {
        type Entity = Marker;

        fn instantiate(&mut self, _slot: usize) -> Marker {
            Marker::default()
        }
    }

    #[derive(Default)]
    struct Session {
        submitter: Option<FrameSubmitter>,
    }

    impl TrackingSession for Session {
        fn register_frame_callback(&mut self, submitter: FrameSubmitter) {
            self.submitter = Some(submitter);
        }

        fn deregister_frame_callback(&mut self) {
            self.submitter = None;
        }
    }

    fn config() -> OverlayConfig {
        OverlayConfig {
            max_observations: 4,
            num_anchors: 2,
            num_classes: 2,
            anchors: AnchorSpec::Table {
                anchors: vec![
                    AnchorBox::new(0.2, 0.2, 0.2, 0.2),
                    AnchorBox::new(0.7, 0.7, 0.2, 0.2),
                ],
            },
            ..OverlayConfig::default()
        }
    }

    fn frame(sequence: u64) -> ImageFrame {
        ImageFrame::new(FrameHandle(sequence), Representation::PixelBuffer, sequence)
    }

    #[test]
    fn test_overlay_pipeline() {
        let backend = FixedBackend {
            output: RawOutput::new(Array2::zeros((2, 4)), array![[0.0, 4.0], [0.0, 4.0]]),
            configured: false,
        };
        let mut pipeline = OverlayPipeline::new(config(), LabelMap::default(), backend, Factory).unwrap();
        let mut session = Session::default();
        let submitter = pipeline.start(&mut session).unwrap();
        assert!(session.submitter.is_some());

        assert_eq!(submitter.submit(frame(1)), Admission::Admitted);
        let report = pipeline.await_results(Duration::from_secs(5)).unwrap();
        assert_eq!(report.shown, 2);
        assert_eq!(pipeline.slots().occupied(), 2);

        pipeline.stop(&mut session).unwrap();
        assert!(session.submitter.is_none());
        assert!(!pipeline.is_running());
        assert_eq!(submitter.submit(frame(2)), Admission::Dropped);

        // The backend comes back on stop, so the pipeline can run again.
        let submitter = pipeline.start(&mut session).unwrap();
        assert_eq!(submitter.submit(frame(3)), Admission::Admitted);
        assert!(pipeline.await_results(Duration::from_secs(5)).is_some());
        pipeline.stop(&mut session).unwrap();
    }

    #[test]
    fn test_stale_submitter_drops_quietly() {
        let backend = FixedBackend {
            output: RawOutput::new(Array2::zeros((2, 4)), Array2::zeros((2, 2))),
            configured: false,
        };
        let mut pipeline = OverlayPipeline::new(config(), LabelMap::default(), backend, Factory).unwrap();
        let mut session = Session::default();
        let submitter = pipeline.start(&mut session).unwrap();
        pipeline.stop(&mut session).unwrap();

        // Every tick after stop hits a closed channel; the ticket is returned
        // each time.
        for sequence in 0..5 {
            assert_eq!(submitter.submit(frame(sequence)), Admission::Dropped);
            assert_eq!(submitter.gate_state(), GateState::Idle);
        }
        assert_eq!(submitter.gate().stats().admitted, 5);
    }

    #[test]
    fn test_backend_configure_failure_is_fatal() {
        let result = OverlayPipeline::new(config(), LabelMap::default(), RejectingBackend, Factory);
        assert!(matches!(result, Err(PipelineError::BackendConfigure(_))));
    }

    #[test]
    fn test_anchor_mismatch_is_fatal() {
        let config = OverlayConfig {
            num_anchors: 3,
            ..config()
        };
        let result = OverlayPipeline::new(config, LabelMap::default(), RejectingBackend, Factory);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_lifecycle_errors() {
        let backend = FixedBackend {
            output: RawOutput::new(Array2::zeros((2, 4)), Array2::zeros((2, 2))),
            configured: false,
        };
        let mut pipeline = OverlayPipeline::new(config(), LabelMap::default(), backend, Factory).unwrap();
        let mut session = Session::default();
        assert!(matches!(pipeline.stop(&mut session), Err(PipelineError::NotStarted)));
        pipeline.start(&mut session).unwrap();
        assert!(matches!(pipeline.start(&mut session), Err(PipelineError::AlreadyStarted)));
        pipeline.stop(&mut session).unwrap();
    }
}
