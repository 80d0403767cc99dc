use anyhow::Result;

use crate::detect::result::DetectedObject;
use crate::frame::InputImage;

/// How successive inputs relate to each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorMode {
    /// Successive frames of one continuous camera session. Detectors may keep
    /// state across calls (tracking ids, cached results).
    Stream,
    /// Independent still images; no state is carried between calls.
    SingleImage,
}

/// Detector configuration fixed at construction time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectorOptions {
    pub mode: DetectorMode,
    pub classification: bool,
    pub multiple_objects: bool,
    /// Upper bound on labels reported per object.
    pub max_labels_per_object: usize,
}

impl DetectorOptions {
    /// Options for a bundled custom model.
    pub fn custom_model(max_labels_per_object: usize) -> Self {
        Self {
            mode: DetectorMode::Stream,
            classification: true,
            multiple_objects: true,
            max_labels_per_object,
        }
    }

    /// Options for the built-in detector.
    pub fn default_model() -> Self {
        Self {
            mode: DetectorMode::Stream,
            classification: true,
            multiple_objects: true,
            max_labels_per_object: 1,
        }
    }
}

/// Detector backend trait.
///
/// A backend is owned by exactly one analysis worker and is never called
/// concurrently, so `process` takes `&mut self` and needs no locking.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame.
    ///
    /// Boxes are reported in frame pixels, in the upright axis convention
    /// given by `input.rotation`. The pixel slice must not be retained.
    fn process(&mut self, input: &InputImage<'_>) -> Result<Vec<DetectedObject>>;

    /// Release model resources. Called once when the session ends.
    fn close(&mut self) {}
}
