//! Frame pipeline: camera binding, keep-latest analysis, batch publishing.
//!
//! The pipeline owns one dedicated analysis worker. Capture threads hand
//! frames to a `FrameAnalyzer`, which parks them in a single-slot mailbox and
//! returns at once. The worker takes the newest frame, runs the detector and
//! publishes one `Detection` batch per analyzed frame. A frame waiting in the
//! slot when a newer one arrives is dropped, releasing its buffer.
//!
//! Binding is an explicit state machine driven by `start`, the provider-ready
//! event and `shutdown`. Nothing rebinds on its own.

mod mailbox;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};

use crate::capture::{CameraProvider, PreviewSurface};
use crate::detect::{DetectedObject, Detection, DetectorBackend};
use crate::frame::{Frame, FrameContext};
use mailbox::{LatestSlot, Put};

/// Camera binding state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    /// `start` was called; waiting for the camera provider.
    Binding,
    Bound,
    /// The last bind attempt failed. `start` again to retry.
    Failed,
}

/// Snapshot of pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_received: u64,
    /// Replaced in the mailbox by a newer frame, or arrived after shutdown.
    pub frames_dropped: u64,
    /// Delivered without an image.
    pub frames_skipped: u64,
    pub frames_analyzed: u64,
    pub analysis_failures: u64,
    pub batches_published: u64,
}

#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    frames_skipped: AtomicU64,
    frames_analyzed: AtomicU64,
    analysis_failures: AtomicU64,
    batches_published: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            analysis_failures: self.analysis_failures.load(Ordering::Relaxed),
            batches_published: self.batches_published.load(Ordering::Relaxed),
        }
    }
}

/// Analysis sink handed to the capture source on bind.
///
/// `analyze` never waits for the detector.
#[derive(Clone)]
pub struct FrameAnalyzer {
    mailbox: Arc<LatestSlot<Frame>>,
    counters: Arc<Counters>,
}

impl FrameAnalyzer {
    pub fn analyze(&self, frame: Frame) {
        Counters::bump(&self.counters.frames_received);
        match self.mailbox.put(frame) {
            Put::Stored => {}
            Put::Replaced(stale) => {
                Counters::bump(&self.counters.frames_dropped);
                log::trace!("dropping frame {} in favor of a newer one", stale.sequence());
            }
            Put::Closed(_) => {
                Counters::bump(&self.counters.frames_dropped);
            }
        }
    }
}

impl std::fmt::Debug for FrameAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAnalyzer").finish_non_exhaustive()
    }
}

/// Detector output for one frame, paired with the frame it came from.
struct AnalysisResponse {
    context: FrameContext,
    outcome: Result<Vec<DetectedObject>>,
}

/// Camera session: preview binding plus the analysis worker.
pub struct FramePipeline {
    state: BindingState,
    surface: Option<PreviewSurface>,
    mailbox: Arc<LatestSlot<Frame>>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<()>>,
}

impl FramePipeline {
    /// Spawn the analysis worker. `publish` receives every completed batch,
    /// always from the worker thread and never concurrently with itself.
    pub fn new(
        detector: Box<dyn DetectorBackend>,
        publish: impl FnMut(Vec<Detection>) + Send + 'static,
    ) -> Result<Self> {
        let mailbox = Arc::new(LatestSlot::new());
        let counters = Arc::new(Counters::default());
        let worker = {
            let mailbox = mailbox.clone();
            let counters = counters.clone();
            std::thread::Builder::new()
                .name("frame-analysis".to_string())
                .spawn(move || run_worker(detector, mailbox, counters, publish))
                .context("failed to spawn frame analysis worker")?
        };

        Ok(Self {
            state: BindingState::Unbound,
            surface: None,
            mailbox,
            counters,
            worker: Some(worker),
        })
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Sink for frames. Capture sources normally get this through `bind`.
    pub fn analyzer(&self) -> FrameAnalyzer {
        FrameAnalyzer {
            mailbox: self.mailbox.clone(),
            counters: self.counters.clone(),
        }
    }

    /// Request a camera binding for `surface`. Returns immediately; binding
    /// happens on the next `provider_ready`.
    ///
    /// Calling this while bound schedules a release-then-rebind.
    pub fn start(&mut self, surface: PreviewSurface) {
        match self.state {
            BindingState::Bound => log::info!("rebinding camera session to {}", surface.name()),
            BindingState::Binding => log::debug!("start called again before camera provider was ready"),
            BindingState::Unbound | BindingState::Failed => {
                log::debug!("camera binding requested for {}", surface.name())
            }
        }
        self.surface = Some(surface);
        self.state = BindingState::Binding;
    }

    /// Camera provider became available: release old bindings, then bind
    /// preview and analysis. Failures are logged and leave the pipeline in
    /// `Failed`; they are never returned.
    pub fn provider_ready(&mut self, provider: &mut dyn CameraProvider) -> BindingState {
        if self.state != BindingState::Binding {
            log::debug!("camera provider ready while {:?}; ignoring", self.state);
            return self.state;
        }
        let Some(surface) = self.surface.clone() else {
            self.state = BindingState::Failed;
            log::error!("camera binding failed: no preview surface");
            return self.state;
        };
        if self.mailbox.is_closed() {
            self.state = BindingState::Failed;
            log::error!("camera binding failed: analysis worker stopped");
            return self.state;
        }

        provider.unbind_all();
        match provider.bind(surface.clone(), self.analyzer()) {
            Ok(()) => {
                self.state = BindingState::Bound;
                log::info!("camera bound: preview={} analysis=keep-latest", surface.name());
            }
            Err(err) => {
                self.state = BindingState::Failed;
                log::error!("camera binding failed: {:#}", err);
            }
        }
        self.state
    }

    /// Stop accepting frames, stop the worker and release the detector.
    ///
    /// Analysis already running finishes but its result is not published.
    pub fn shutdown(mut self) -> Result<()> {
        if self.mailbox.close().is_some() {
            Counters::bump(&self.counters.frames_dropped);
        }
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("frame analysis worker panicked"))?;
        }
        self.state = BindingState::Unbound;
        log::info!("camera session shut down");
        Ok(())
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        // Wake the worker if shutdown was never called.
        self.mailbox.close();
    }
}

fn run_worker(
    mut detector: Box<dyn DetectorBackend>,
    mailbox: Arc<LatestSlot<Frame>>,
    counters: Arc<Counters>,
    mut publish: impl FnMut(Vec<Detection>),
) {
    log::debug!("frame analysis worker started (detector={})", detector.name());
    while let Some(frame) = mailbox.take() {
        let Some(response) = submit(detector.as_mut(), frame) else {
            Counters::bump(&counters.frames_skipped);
            continue;
        };
        Counters::bump(&counters.frames_analyzed);

        let Some(batch) = complete(response) else {
            Counters::bump(&counters.analysis_failures);
            continue;
        };
        if mailbox.is_closed() {
            log::debug!("discarding detection batch completed after shutdown");
            break;
        }
        Counters::bump(&counters.batches_published);
        publish(batch);
    }
    detector.close();
    log::debug!("frame analysis worker stopped");
}

/// Run the detector on one frame. The frame is released before returning.
fn submit(detector: &mut dyn DetectorBackend, frame: Frame) -> Option<AnalysisResponse> {
    let context = frame.context();
    let Some(input) = frame.input_image() else {
        log::debug!("frame {} has no image; skipping", context.sequence);
        return None;
    };
    let outcome = detector.process(&input);
    Some(AnalysisResponse { context, outcome })
}

fn complete(response: AnalysisResponse) -> Option<Vec<Detection>> {
    match response.outcome {
        Ok(objects) => Some(
            objects
                .iter()
                .map(|object| Detection::from_object(object, &response.context))
                .collect(),
        ),
        Err(err) => {
            log::warn!(
                "object detection failed for frame {}: {:#}",
                response.context.sequence,
                err
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::geometry::{BoundingBox, Rotation};
    use std::sync::mpsc;
    use std::time::Duration;

    fn frame(sequence: u64) -> Frame {
        Frame::new(sequence, 4, 4, Rotation::Deg0, vec![0; 48]).unwrap()
    }

    #[test]
    fn publishes_batch_with_frame_dimensions() {
        let object = DetectedObject::unlabeled(BoundingBox::new(0.0, 0.0, 2.0, 2.0));
        let (tx, rx) = mpsc::channel();
        let pipeline = FramePipeline::new(
            Box::new(StubBackend::with_objects(vec![object])),
            move |batch| {
                let _ = tx.send(batch);
            },
        )
        .unwrap();

        pipeline.analyzer().analyze(
            Frame::new(1, 8, 2, Rotation::Deg270, vec![0; 48]).unwrap(),
        );
        let batch = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].image_width(), 8);
        assert_eq!(batch[0].image_height(), 2);
        assert_eq!(batch[0].rotation(), Rotation::Deg270);

        pipeline.shutdown().unwrap();
    }

    #[test]
    fn empty_result_publishes_empty_batch() {
        let (tx, rx) = mpsc::channel();
        let pipeline = FramePipeline::new(Box::new(StubBackend::new()), move |batch| {
            let _ = tx.send(batch);
        })
        .unwrap();
        pipeline.analyzer().analyze(frame(1));
        let batch = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(batch.is_empty());
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn failures_and_missing_images_publish_nothing() {
        let (tx, rx) = mpsc::channel::<Vec<Detection>>();
        let pipeline = FramePipeline::new(Box::new(StubBackend::failing("boom")), move |batch| {
            let _ = tx.send(batch);
        })
        .unwrap();
        let analyzer = pipeline.analyzer();
        analyzer.analyze(frame(1));
        std::thread::sleep(Duration::from_millis(100));
        analyzer.analyze(Frame::without_image(2, 4, 4, Rotation::Deg0));
        std::thread::sleep(Duration::from_millis(100));

        assert!(rx.try_recv().is_err());
        let stats = pipeline.stats();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.analysis_failures, 1);
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(stats.batches_published, 0);
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn frames_after_shutdown_are_dropped() {
        let pipeline = FramePipeline::new(Box::new(StubBackend::new()), |_| {}).unwrap();
        let analyzer = pipeline.analyzer();
        pipeline.shutdown().unwrap();
        analyzer.analyze(frame(9));
        let stats = analyzer.counters.snapshot();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.frames_dropped, 1);
    }
}
