//! Per-frame data carried from capture to analysis.
//!
//! - `Frame`: one captured camera frame. Owns its pixels and a release hook
//!   that hands the buffer back to the capture source exactly once, on drop.
//! - `FrameContext`: immutable metadata (sequence, size, rotation) captured
//!   with the frame and carried through to the completion.
//! - `InputImage`: the detector's read-only view of a frame, tagged with the
//!   rotation needed to present it upright.

use anyhow::{anyhow, Result};

use crate::geometry::Rotation;

/// Bytes per pixel of the RGB8 layout frames are delivered in.
pub const RGB_CHANNELS: usize = 3;

/// Metadata of the frame a detector actually analyzed.
///
/// Built once at capture time. Completions read dimensions from here and
/// never from the capture source, which may already be on a newer frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameContext {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
}

/// Callback returning a frame buffer to its capture source.
pub type ReleaseHook = Box<dyn FnOnce(FrameContext) + Send>;

/// A captured frame.
///
/// Not `Clone`: a frame is a lease on a capture buffer, and the release hook
/// runs once when the frame is dropped, whichever path dropped it.
pub struct Frame {
    context: FrameContext,
    pixels: Option<Vec<u8>>,
    release: Option<ReleaseHook>,
}

impl Frame {
    /// Wrap RGB8 pixels captured by a camera.
    pub fn new(
        sequence: u64,
        width: u32,
        height: u32,
        rotation: Rotation,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be positive"));
        }
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected_len,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            context: FrameContext {
                sequence,
                width,
                height,
                rotation,
            },
            pixels: Some(pixels),
            release: None,
        })
    }

    /// A frame the capture source handed back without an image.
    pub fn without_image(sequence: u64, width: u32, height: u32, rotation: Rotation) -> Self {
        Self {
            context: FrameContext {
                sequence,
                width,
                height,
                rotation,
            },
            pixels: None,
            release: None,
        }
    }

    pub fn with_release_hook(mut self, hook: impl FnOnce(FrameContext) + Send + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn context(&self) -> FrameContext {
        self.context
    }

    pub fn sequence(&self) -> u64 {
        self.context.sequence
    }

    pub fn has_image(&self) -> bool {
        self.pixels.is_some()
    }

    /// Detector input for this frame, or `None` when no image was captured.
    pub fn input_image(&self) -> Option<InputImage<'_>> {
        self.pixels.as_deref().map(|pixels| InputImage {
            pixels,
            width: self.context.width,
            height: self.context.height,
            rotation: self.context.rotation,
        })
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.context);
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("context", &self.context)
            .field("has_image", &self.has_image())
            .finish()
    }
}

/// Read-only detector input.
///
/// Width and height are in sensor orientation; `rotation` says how to turn
/// the image upright. Detectors report boxes in the upright convention.
#[derive(Clone, Copy, Debug)]
pub struct InputImage<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
}

impl<'a> InputImage<'a> {
    /// Dimensions after turning the image upright.
    pub fn upright_size(&self) -> (u32, u32) {
        if self.rotation.swaps_axes() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    /// RGB triple at sensor coordinates.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }
}
