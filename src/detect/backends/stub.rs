use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::DetectedObject;
use crate::frame::InputImage;

/// Stub backend for testing. Returns a fixed result for every frame.
pub struct StubBackend {
    objects: Vec<DetectedObject>,
    failure: Option<String>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::with_objects(Vec::new())
    }

    /// Report `objects` for every frame.
    pub fn with_objects(objects: Vec<DetectedObject>) -> Self {
        Self {
            objects,
            failure: None,
            calls: 0,
        }
    }

    /// Fail every frame with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            objects: Vec::new(),
            failure: Some(message.to_string()),
            calls: 0,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn process(&mut self, _input: &InputImage<'_>) -> Result<Vec<DetectedObject>> {
        self.calls += 1;
        match &self.failure {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(self.objects.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, Rotation};

    #[test]
    fn stub_returns_scripted_result() {
        let pixels = [0u8; 12];
        let input = InputImage {
            pixels: &pixels,
            width: 2,
            height: 2,
            rotation: Rotation::Deg0,
        };

        let object = DetectedObject::unlabeled(BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        let mut ok = StubBackend::with_objects(vec![object.clone()]);
        assert_eq!(ok.process(&input).unwrap(), vec![object]);
        assert_eq!(ok.calls(), 1);

        let mut failing = StubBackend::failing("model crashed");
        let err = failing.process(&input).unwrap_err();
        assert!(err.to_string().contains("model crashed"));
    }
}
