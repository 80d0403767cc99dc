//! Live object-detection overlay kernel.
//!
//! This crate connects a camera feed, an on-device object detector and an
//! overlay renderer.
//!
//! # Architecture
//!
//! - **Detector selection**: a bundled custom model is preferred; a missing
//!   asset or a model that fails to load falls back to the built-in detector.
//!   The choice is made once per session.
//! - **Frame pipeline**: capture threads hand frames to a keep-latest
//!   mailbox; a single worker analyzes them one at a time and publishes one
//!   immutable `Detection` batch per analyzed frame.
//! - **Coordinate mapping**: the overlay maps each box from sensor pixels to
//!   viewport pixels under aspect-fill scaling, at render time.
//!
//! # Module Structure
//!
//! - `geometry`: rotation, boxes, viewport, aspect-fill mapping
//! - `frame`: captured frames, per-frame context, detector input
//! - `detect`: detector backends, label remapping, detector selection
//! - `capture`: camera provider trait and the synthetic camera
//! - `pipeline`: binding state machine and analysis worker
//! - `config`: file + environment configuration

pub mod capture;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod pipeline;

pub use capture::{CameraProvider, PreviewSurface, SyntheticCamera, SyntheticCameraConfig};
pub use detect::{
    display_label, select_detector, AssetBundle, BuiltinFactory, CpuBackend, DetectedObject,
    Detection, DetectorBackend, DetectorConfig, DetectorFactory, DetectorMode, DetectorOptions,
    ModelAssets, ObjectLabel, SelectedDetector, StubBackend, UNKNOWN_LABEL,
};
pub use frame::{Frame, FrameContext, InputImage};
pub use geometry::{map_box, AspectFill, BoundingBox, Rotation, Viewport};
pub use pipeline::{BindingState, FrameAnalyzer, FramePipeline, PipelineStats};
