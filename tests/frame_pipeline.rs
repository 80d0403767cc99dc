//! Frame pipeline: keep-latest backpressure, frame release, binding states.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use live_detect::{
    BindingState, BoundingBox, CameraProvider, CpuBackend, DetectedObject, Detection,
    DetectorBackend, Frame, FramePipeline, InputImage, ObjectLabel, PreviewSurface, Rotation,
    StubBackend, SyntheticCamera, SyntheticCameraConfig, Viewport, UNKNOWN_LABEL,
};

const WAIT: Duration = Duration::from_secs(5);

/// Blocks inside `process` until the test lets it go. Frames carry their
/// sequence number in the first pixel byte.
struct GatedBackend {
    entered: Sender<u8>,
    release: Mutex<Receiver<()>>,
}

impl DetectorBackend for GatedBackend {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn process(&mut self, input: &InputImage<'_>) -> Result<Vec<DetectedObject>> {
        let tag = input.pixels[0];
        let _ = self.entered.send(tag);
        let _ = self.release.lock().unwrap().recv();
        Ok(vec![DetectedObject {
            bounding_box: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            labels: vec![ObjectLabel {
                text: format!("frame-{}", tag),
                confidence: 0.9,
                index: tag as usize,
            }],
            tracking_id: None,
        }])
    }
}

fn tagged_frame(tag: u8, released: &Arc<AtomicUsize>) -> Frame {
    let released = released.clone();
    Frame::new(tag as u64, 2, 2, Rotation::Deg0, vec![tag; 12])
        .unwrap()
        .with_release_hook(move |_| {
            released.fetch_add(1, Ordering::SeqCst);
        })
}

fn publisher() -> (Sender<Vec<Detection>>, Receiver<Vec<Detection>>) {
    mpsc::channel()
}

fn surface() -> PreviewSurface {
    PreviewSurface::new("test-preview", Viewport::new(1080.0, 1920.0).unwrap())
}

#[test]
fn frame_waiting_behind_busy_worker_is_replaced_by_newer_frame() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let backend = GatedBackend {
        entered: entered_tx,
        release: Mutex::new(release_rx),
    };
    let (tx, rx) = publisher();
    let pipeline = FramePipeline::new(Box::new(backend), move |batch| {
        let _ = tx.send(batch);
    })
    .unwrap();
    let analyzer = pipeline.analyzer();
    let released = Arc::new(AtomicUsize::new(0));

    // Frame 0 occupies the worker.
    analyzer.analyze(tagged_frame(0, &released));
    assert_eq!(entered_rx.recv_timeout(WAIT).unwrap(), 0);

    // Two frames in rapid succession while frame 0 is still in analysis.
    analyzer.analyze(tagged_frame(1, &released));
    analyzer.analyze(tagged_frame(2, &released));
    // Frame 1 was replaced and released without being analyzed.
    assert_eq!(released.load(Ordering::SeqCst), 1);

    release_tx.send(()).unwrap();
    let first = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(first[0].label(), "frame-0");

    assert_eq!(entered_rx.recv_timeout(WAIT).unwrap(), 2);
    release_tx.send(()).unwrap();
    let second = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(second[0].label(), "frame-2");

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    let stats = pipeline.stats();
    assert_eq!(stats.frames_received, 3);
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.frames_analyzed, 2);
    assert_eq!(stats.batches_published, 2);

    pipeline.shutdown().unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 3);
}

#[test]
fn analysis_in_flight_at_shutdown_is_not_published() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let backend = GatedBackend {
        entered: entered_tx,
        release: Mutex::new(release_rx),
    };
    let (tx, rx) = publisher();
    let pipeline = FramePipeline::new(Box::new(backend), move |batch| {
        let _ = tx.send(batch);
    })
    .unwrap();
    let analyzer = pipeline.analyzer();
    let released = Arc::new(AtomicUsize::new(0));

    analyzer.analyze(tagged_frame(0, &released));
    assert_eq!(entered_rx.recv_timeout(WAIT).unwrap(), 0);

    // shutdown closes the mailbox, then waits for the worker.
    let stopper = std::thread::spawn(move || pipeline.shutdown());
    std::thread::sleep(Duration::from_millis(200));
    release_tx.send(()).unwrap();
    stopper.join().unwrap().unwrap();

    assert!(rx.try_recv().is_err());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn every_frame_is_released_exactly_once() {
    let released = Arc::new(AtomicUsize::new(0));
    let pipeline = FramePipeline::new(Box::new(StubBackend::failing("flaky model")), |_| {})
        .unwrap();
    let analyzer = pipeline.analyzer();

    for tag in 0..20u8 {
        analyzer.analyze(tagged_frame(tag, &released));
    }
    let empty_released = released.clone();
    analyzer.analyze(
        Frame::without_image(20, 2, 2, Rotation::Deg0).with_release_hook(move |_| {
            empty_released.fetch_add(1, Ordering::SeqCst);
        }),
    );
    std::thread::sleep(Duration::from_millis(200));
    pipeline.shutdown().unwrap();

    // Frames offered after shutdown are released too.
    analyzer.analyze(tagged_frame(99, &released));
    assert_eq!(released.load(Ordering::SeqCst), 22);
}

#[test]
fn batch_labels_are_remapped() {
    let labeled = |text: &str, confidence: f32| DetectedObject {
        bounding_box: BoundingBox::new(10.0, 10.0, 20.0, 20.0),
        labels: vec![ObjectLabel {
            text: text.to_string(),
            confidence,
            index: 0,
        }],
        tracking_id: None,
    };
    let objects = vec![
        labeled("Food", 0.75),
        labeled("Bicycle", 0.5),
        labeled("", 0.4),
        DetectedObject::unlabeled(BoundingBox::new(0.0, 0.0, 5.0, 5.0)),
    ];
    let (tx, rx) = publisher();
    let pipeline = FramePipeline::new(Box::new(StubBackend::with_objects(objects)), move |b| {
        let _ = tx.send(b);
    })
    .unwrap();
    let released = Arc::new(AtomicUsize::new(0));
    pipeline.analyzer().analyze(tagged_frame(1, &released));

    let batch = rx.recv_timeout(WAIT).unwrap();
    let labels: Vec<&str> = batch.iter().map(|d| d.label()).collect();
    assert_eq!(labels, ["Étel", "Bicycle", UNKNOWN_LABEL, UNKNOWN_LABEL]);
    assert_eq!(batch[0].confidence(), 0.75);
    assert_eq!(batch[3].confidence(), 0.0);
    pipeline.shutdown().unwrap();
}

fn small_camera(max_frames: u64) -> SyntheticCamera {
    SyntheticCamera::new(SyntheticCameraConfig {
        width: 160,
        height: 120,
        rotation: Rotation::Deg90,
        target_fps: 100,
        max_frames: Some(max_frames),
        square_size: 32,
    })
    .unwrap()
}

#[test]
fn start_binds_on_provider_ready() {
    let mut pipeline = FramePipeline::new(Box::new(StubBackend::new()), |_| {}).unwrap();
    let mut camera = small_camera(5);
    assert_eq!(pipeline.state(), BindingState::Unbound);

    // Provider events before start are ignored.
    assert_eq!(pipeline.provider_ready(&mut camera), BindingState::Unbound);
    assert!(!camera.is_bound());

    pipeline.start(surface());
    assert_eq!(pipeline.state(), BindingState::Binding);
    assert!(!camera.is_bound());

    assert_eq!(pipeline.provider_ready(&mut camera), BindingState::Bound);
    assert!(camera.is_bound());
    assert_eq!(camera.preview().unwrap().name(), "test-preview");

    camera.unbind_all();
    pipeline.shutdown().unwrap();
}

#[test]
fn restart_releases_previous_binding_first() {
    let mut pipeline = FramePipeline::new(Box::new(StubBackend::new()), |_| {}).unwrap();
    let mut camera = small_camera(50);

    pipeline.start(surface());
    pipeline.provider_ready(&mut camera);
    pipeline.start(PreviewSurface::new(
        "rotated-preview",
        Viewport::new(1920.0, 1080.0).unwrap(),
    ));
    assert_eq!(pipeline.state(), BindingState::Binding);
    assert_eq!(pipeline.provider_ready(&mut camera), BindingState::Bound);

    assert_eq!(camera.bind_count(), 2);
    let preview = camera.preview().unwrap();
    assert_eq!(preview.name(), "rotated-preview");
    assert_eq!(preview.viewport(), Viewport::new(1920.0, 1080.0).unwrap());

    camera.unbind_all();
    pipeline.shutdown().unwrap();
}

#[test]
fn binding_failure_is_contained() {
    let mut pipeline = FramePipeline::new(Box::new(StubBackend::new()), |_| {}).unwrap();
    let mut camera = SyntheticCamera::unavailable();

    pipeline.start(surface());
    assert_eq!(pipeline.provider_ready(&mut camera), BindingState::Failed);
    // No automatic retry.
    assert_eq!(pipeline.provider_ready(&mut camera), BindingState::Failed);

    pipeline.start(surface());
    assert_eq!(pipeline.provider_ready(&mut camera), BindingState::Failed);
    assert!(!camera.is_bound());
    pipeline.shutdown().unwrap();
}

#[test]
fn synthetic_session_publishes_default_detections() {
    let (tx, rx) = publisher();
    let mut pipeline = FramePipeline::new(Box::new(CpuBackend::default()), move |batch| {
        let _ = tx.send(batch);
    })
    .unwrap();
    let mut camera = small_camera(10);

    pipeline.start(surface());
    assert_eq!(pipeline.provider_ready(&mut camera), BindingState::Bound);

    let batch = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(batch.len(), 1);
    let detection = &batch[0];
    assert_eq!(detection.label(), UNKNOWN_LABEL);
    assert_eq!(detection.confidence(), 0.0);
    assert_eq!(detection.image_width(), 160);
    assert_eq!(detection.image_height(), 120);
    assert_eq!(detection.rotation(), Rotation::Deg90);
    // Upright frame is 120x160: the box lies inside it.
    let bbox = detection.bounding_box();
    assert!(bbox.left >= 0.0 && bbox.right <= 120.0);
    assert!(bbox.top >= 0.0 && bbox.bottom <= 160.0);

    while camera.frames_captured() < 10 {
        std::thread::sleep(Duration::from_millis(10));
    }
    camera.unbind_all();
    pipeline.shutdown().unwrap();
    assert_eq!(camera.buffers_outstanding(), 0);
}
