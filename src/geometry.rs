//! Sensor-space to viewport-space mapping.
//!
//! The preview is displayed with aspect-fill (cover) scaling: the upright
//! image is scaled uniformly until it covers the viewport in both dimensions
//! and the overflowing dimension is cropped symmetrically. Detection boxes are
//! reported in sensor pixels, so the overlay has to apply the same transform.
//!
//! Nothing here rotates box coordinates. Rotation only decides whether the
//! source width and height swap before the scale is computed; the detector
//! already reports boxes in the upright axis convention.

use anyhow::{anyhow, Result};

/// Rotation needed to present a frame upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Result<Self> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(anyhow!(
                "rotation must be one of 0, 90, 180, 270 (got {})",
                other
            )),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// True when presenting upright swaps portrait and landscape.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Axis-aligned rectangle in pixel coordinates.
///
/// `left < right` and `top < bottom` are not enforced; inverted boxes coming
/// out of a detector are carried through untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Display area the preview is rendered into, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    width: f32,
    height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Result<Self> {
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            return Err(anyhow!(
                "viewport dimensions must be positive (got {}x{})",
                width,
                height
            ));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }
}

/// Uniform scale and centering offsets of an aspect-fill presentation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AspectFill {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl AspectFill {
    /// Compute the cover transform for a sensor image shown in `viewport`.
    ///
    /// Offsets are negative along the axis that overflows and gets cropped.
    pub fn compute(
        image_width: u32,
        image_height: u32,
        rotation: Rotation,
        viewport: Viewport,
    ) -> Self {
        let (source_width, source_height) = if rotation.swaps_axes() {
            (image_height as f32, image_width as f32)
        } else {
            (image_width as f32, image_height as f32)
        };

        let width_ratio = viewport.width / source_width;
        let height_ratio = viewport.height / source_height;
        let scale = width_ratio.max(height_ratio);

        let scaled_width = source_width * scale;
        let scaled_height = source_height * scale;

        Self {
            scale,
            offset_x: (viewport.width - scaled_width) / 2.0,
            offset_y: (viewport.height - scaled_height) / 2.0,
        }
    }

    pub fn apply(&self, bbox: BoundingBox) -> BoundingBox {
        BoundingBox {
            left: bbox.left * self.scale + self.offset_x,
            top: bbox.top * self.scale + self.offset_y,
            right: bbox.right * self.scale + self.offset_x,
            bottom: bbox.bottom * self.scale + self.offset_y,
        }
    }
}

/// Re-express a box found in sensor pixels in the upright axis convention.
///
/// Rotations are clockwise. The result is normalized so `left <= right` and
/// `top <= bottom`; this is for detectors, the mapper never calls it.
pub fn upright_box(bbox: BoundingBox, width: u32, height: u32, rotation: Rotation) -> BoundingBox {
    let (w, h) = (width as f32, height as f32);
    let turn = |x: f32, y: f32| match rotation {
        Rotation::Deg0 => (x, y),
        Rotation::Deg90 => (h - y, x),
        Rotation::Deg180 => (w - x, h - y),
        Rotation::Deg270 => (y, w - x),
    };
    let (x0, y0) = turn(bbox.left, bbox.top);
    let (x1, y1) = turn(bbox.right, bbox.bottom);
    BoundingBox {
        left: x0.min(x1),
        top: y0.min(y1),
        right: x0.max(x1),
        bottom: y0.max(y1),
    }
}

/// Map a sensor-space box into viewport pixels.
pub fn map_box(
    bbox: BoundingBox,
    image_width: u32,
    image_height: u32,
    rotation: Rotation,
    viewport: Viewport,
) -> BoundingBox {
    AspectFill::compute(image_width, image_height, rotation, viewport).apply(bbox)
}
