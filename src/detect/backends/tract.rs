#![cfg(feature = "backend-tract")]

use std::io::Read;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, DetectorOptions};
use crate::detect::result::{DetectedObject, ObjectLabel};
use crate::frame::InputImage;
use crate::geometry::{BoundingBox, Rotation};

/// Square input edge used when the caller does not say otherwise.
pub const DEFAULT_INPUT_SIZE: u32 = 320;

/// Tract-based backend for a bundled ONNX detection model.
///
/// The model takes `[1, 3, H, W]` f32 RGB in 0..1 and produces `[1, N, 4 + K]`
/// rows: a normalized `left, top, right, bottom` box followed by K class
/// scores. Frames are turned upright and resized before inference, so boxes
/// come back in the upright convention.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    class_names: Vec<String>,
    options: DetectorOptions,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load a model from an opened asset.
    pub fn from_reader(
        reader: &mut dyn Read,
        class_names: Vec<String>,
        options: DetectorOptions,
    ) -> Result<Self> {
        Self::with_input_size(
            reader,
            class_names,
            options,
            DEFAULT_INPUT_SIZE,
            DEFAULT_INPUT_SIZE,
        )
    }

    pub fn with_input_size(
        reader: &mut dyn Read,
        class_names: Vec<String>,
        options: DetectorOptions,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(reader)
            .context("failed to parse ONNX model")?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            class_names,
            options,
            confidence_threshold: 0.5,
        })
    }

    fn build_input(&self, input: &InputImage<'_>) -> Result<Tensor> {
        let sensor = RgbImage::from_raw(input.width, input.height, input.pixels.to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", input.width, input.height))?;
        let upright = match input.rotation {
            Rotation::Deg0 => sensor,
            Rotation::Deg90 => imageops::rotate90(&sensor),
            Rotation::Deg180 => imageops::rotate180(&sensor),
            Rotation::Deg270 => imageops::rotate270(&sensor),
        };
        let resized = imageops::resize(&upright, self.width, self.height, FilterType::Triangle);

        let tensor = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(tensor.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, input: &InputImage<'_>) -> Result<Vec<DetectedObject>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[2] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let columns = shape[2];
        let values: Vec<f32> = view.iter().copied().collect();
        let (upright_width, upright_height) = input.upright_size();

        let mut objects = Vec::new();
        for row in values.chunks_exact(columns) {
            let mut scores: Vec<(usize, f32)> = row[4..].iter().copied().enumerate().collect();
            scores.sort_by(|a, b| b.1.total_cmp(&a.1));
            let Some(&(_, best)) = scores.first() else {
                continue;
            };
            if !best.is_finite() || best < self.confidence_threshold {
                continue;
            }

            let labels = if self.options.classification {
                scores
                    .iter()
                    .take(self.options.max_labels_per_object)
                    .filter(|(_, score)| *score >= self.confidence_threshold)
                    .map(|&(index, confidence)| ObjectLabel {
                        text: self
                            .class_names
                            .get(index)
                            .cloned()
                            .unwrap_or_else(|| index.to_string()),
                        confidence,
                        index,
                    })
                    .collect()
            } else {
                Vec::new()
            };

            objects.push(DetectedObject {
                bounding_box: BoundingBox::new(
                    row[0] * upright_width as f32,
                    row[1] * upright_height as f32,
                    row[2] * upright_width as f32,
                    row[3] * upright_height as f32,
                ),
                labels,
                tracking_id: None,
            });
            if !self.options.multiple_objects {
                break;
            }
        }
        Ok(objects)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn process(&mut self, input: &InputImage<'_>) -> Result<Vec<DetectedObject>> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, input)
    }
}
