//! Camera capture sources.
//!
//! A `CameraProvider` binds a preview surface and a frame analyzer to a
//! camera. The pipeline always calls `unbind_all` before `bind`, so a
//! provider has at most one active binding.
//!
//! - `SyntheticCamera`: generated frames, for the demo binary and tests.

pub mod synthetic;

use anyhow::Result;

use crate::geometry::Viewport;
use crate::pipeline::FrameAnalyzer;

pub use synthetic::{SyntheticCamera, SyntheticCameraConfig};

/// Surface the upright preview is rendered into.
#[derive(Clone, Debug, PartialEq)]
pub struct PreviewSurface {
    name: String,
    viewport: Viewport,
}

impl PreviewSurface {
    pub fn new(name: &str, viewport: Viewport) -> Self {
        Self {
            name: name.to_string(),
            viewport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }
}

/// Platform camera access.
pub trait CameraProvider {
    /// Release every preview and analysis binding. No-op when unbound.
    fn unbind_all(&mut self);

    /// Start delivering preview to `preview` and frames to `analyzer`.
    ///
    /// Frames must be delivered from capture threads without waiting for
    /// analysis. Fails when no camera can be opened.
    fn bind(&mut self, preview: PreviewSurface, analyzer: FrameAnalyzer) -> Result<()>;
}
