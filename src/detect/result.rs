use crate::detect::labels::display_label;
use crate::frame::FrameContext;
use crate::geometry::{map_box, BoundingBox, Rotation, Viewport};

/// One classification of a detected object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectLabel {
    pub text: String,
    pub confidence: f32,
    pub index: usize,
}

/// Raw detector output for one object.
///
/// `labels` are sorted by descending confidence.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedObject {
    pub bounding_box: BoundingBox,
    pub labels: Vec<ObjectLabel>,
    pub tracking_id: Option<u32>,
}

impl DetectedObject {
    pub fn unlabeled(bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            labels: Vec::new(),
            tracking_id: None,
        }
    }

    pub fn top_label(&self) -> Option<&ObjectLabel> {
        self.labels.first()
    }
}

/// One detected object of one analyzed frame, as published to the overlay.
///
/// Immutable once built. Image size and rotation come from the frame that was
/// analyzed, so the overlay can map the box without asking the camera.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    label: String,
    confidence: f32,
    bounding_box: BoundingBox,
    image_width: u32,
    image_height: u32,
    rotation: Rotation,
}

impl Detection {
    pub fn from_object(object: &DetectedObject, context: &FrameContext) -> Self {
        let top = object.top_label();
        Self {
            label: display_label(top.map(|label| label.text.as_str())),
            confidence: top.map_or(0.0, |label| label.confidence.clamp(0.0, 1.0)),
            bounding_box: object.bounding_box,
            image_width: context.width,
            image_height: context.height,
            rotation: context.rotation,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Box in `viewport` pixels under aspect-fill presentation.
    pub fn map_to_viewport(&self, viewport: Viewport) -> BoundingBox {
        map_box(
            self.bounding_box,
            self.image_width,
            self.image_height,
            self.rotation,
            viewport,
        )
    }
}
