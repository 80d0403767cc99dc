use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::detect::backend::{DetectorBackend, DetectorMode, DetectorOptions};
use crate::detect::result::DetectedObject;
use crate::frame::InputImage;
use crate::geometry::{upright_box, BoundingBox};

const DEFAULT_CELL_SIZE: u32 = 16;
const DEFAULT_THRESHOLD: f32 = 48.0;
/// Most objects reported per frame.
const MAX_OBJECTS: usize = 5;
/// Minimum overlap for an object to keep its tracking id across frames.
const TRACKING_IOU: f32 = 0.3;

/// Built-in detector used when no custom model is bundled.
///
/// Splits the frame into a grid of cells and marks a cell salient when its
/// mean luma stands out from the frame mean. Salient cells are grouped into
/// 4-connected regions; each region is one unlabeled object. In stream mode
/// objects keep tracking ids across frames and an unchanged frame reuses the
/// previous result.
///
/// There is no model behind this detector, so `classification` and
/// `max_labels_per_object` are ignored: objects never carry labels and render
/// under the unknown-label sentinel.
pub struct CpuBackend {
    options: DetectorOptions,
    cell_size: u32,
    threshold: f32,
    last_digest: Option<[u8; 32]>,
    last_objects: Vec<DetectedObject>,
    next_tracking_id: u32,
}

impl CpuBackend {
    pub fn new(options: DetectorOptions) -> Self {
        Self {
            options,
            cell_size: DEFAULT_CELL_SIZE,
            threshold: DEFAULT_THRESHOLD,
            last_digest: None,
            last_objects: Vec::new(),
            next_tracking_id: 0,
        }
    }

    pub fn with_cell_size(mut self, cell_size: u32) -> Self {
        self.cell_size = cell_size.max(1);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    fn cell_means(&self, input: &InputImage<'_>) -> (Vec<f32>, usize, usize, f32) {
        let cell = self.cell_size;
        let cols = input.width.div_ceil(cell) as usize;
        let rows = input.height.div_ceil(cell) as usize;
        let mut sums = vec![0f32; cols * rows];
        let mut counts = vec![0u32; cols * rows];
        let mut total = 0f32;

        for y in 0..input.height {
            let row = (y / cell) as usize;
            for x in 0..input.width {
                let [r, g, b] = input.pixel(x, y);
                let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
                let idx = row * cols + (x / cell) as usize;
                sums[idx] += luma;
                counts[idx] += 1;
                total += luma;
            }
        }

        let means = sums
            .iter()
            .zip(&counts)
            .map(|(sum, count)| sum / (*count).max(1) as f32)
            .collect();
        let frame_mean = total / (input.width as f32 * input.height as f32);
        (means, cols, rows, frame_mean)
    }

    fn find_objects(&self, input: &InputImage<'_>) -> Vec<DetectedObject> {
        let (means, cols, rows, frame_mean) = self.cell_means(input);
        let salient: Vec<bool> = means
            .iter()
            .map(|mean| (mean - frame_mean).abs() > self.threshold)
            .collect();

        let mut regions = connected_regions(&salient, cols, rows);
        regions.sort_by(|a, b| b.cells.cmp(&a.cells));
        let limit = if self.options.multiple_objects {
            MAX_OBJECTS
        } else {
            1
        };
        regions.truncate(limit);

        let cell = self.cell_size;
        regions
            .into_iter()
            .map(|region| {
                let sensor_box = BoundingBox::new(
                    (region.min_col as u32 * cell) as f32,
                    (region.min_row as u32 * cell) as f32,
                    ((region.max_col as u32 + 1) * cell).min(input.width) as f32,
                    ((region.max_row as u32 + 1) * cell).min(input.height) as f32,
                );
                DetectedObject::unlabeled(upright_box(
                    sensor_box,
                    input.width,
                    input.height,
                    input.rotation,
                ))
            })
            .collect()
    }

    /// Each previous object passes its id on to at most one current object.
    fn assign_tracking_ids(&mut self, objects: &mut [DetectedObject]) {
        let mut taken = vec![false; self.last_objects.len()];
        for object in objects.iter_mut() {
            let best = self
                .last_objects
                .iter()
                .enumerate()
                .filter(|(idx, _)| !taken[*idx])
                .filter_map(|(idx, prev)| {
                    let overlap = iou(&prev.bounding_box, &object.bounding_box);
                    (overlap >= TRACKING_IOU).then_some((idx, overlap))
                })
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(idx, _)| idx);
            if let Some(idx) = best {
                taken[idx] = true;
            }
            let matched = best.and_then(|idx| self.last_objects[idx].tracking_id);
            object.tracking_id = Some(match matched {
                Some(id) => id,
                None => {
                    let id = self.next_tracking_id;
                    self.next_tracking_id = self.next_tracking_id.wrapping_add(1);
                    id
                }
            });
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(DetectorOptions::default_model())
    }
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn process(&mut self, input: &InputImage<'_>) -> Result<Vec<DetectedObject>> {
        let expected_len = input.width as usize * input.height as usize * 3;
        if input.pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                input.pixels.len()
            ));
        }

        if self.options.mode == DetectorMode::SingleImage {
            return Ok(self.find_objects(input));
        }

        let digest = frame_digest(input);
        if self.last_digest == Some(digest) {
            return Ok(self.last_objects.clone());
        }

        let mut objects = self.find_objects(input);
        self.assign_tracking_ids(&mut objects);
        self.last_digest = Some(digest);
        self.last_objects = objects.clone();
        Ok(objects)
    }

    fn close(&mut self) {
        self.last_digest = None;
        self.last_objects.clear();
    }
}

/// Frame geometry is part of the key: the same bytes at another rotation or
/// shape yield boxes in different axes.
fn frame_digest(input: &InputImage<'_>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input.width.to_le_bytes());
    hasher.update(input.height.to_le_bytes());
    hasher.update(input.rotation.degrees().to_le_bytes());
    hasher.update(input.pixels);
    hasher.finalize().into()
}

struct Region {
    cells: usize,
    min_col: usize,
    min_row: usize,
    max_col: usize,
    max_row: usize,
}

fn connected_regions(active: &[bool], cols: usize, rows: usize) -> Vec<Region> {
    let mut visited = vec![false; active.len()];
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..active.len() {
        if !active[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut region = Region {
            cells: 0,
            min_col: start % cols,
            min_row: start / cols,
            max_col: start % cols,
            max_row: start / cols,
        };

        while let Some(idx) = queue.pop_front() {
            let (col, row) = (idx % cols, idx / cols);
            region.cells += 1;
            region.min_col = region.min_col.min(col);
            region.min_row = region.min_row.min(row);
            region.max_col = region.max_col.max(col);
            region.max_row = region.max_row.max(row);

            let mut neighbours = Vec::with_capacity(4);
            if col > 0 {
                neighbours.push(idx - 1);
            }
            if col + 1 < cols {
                neighbours.push(idx + 1);
            }
            if row > 0 {
                neighbours.push(idx - cols);
            }
            if row + 1 < rows {
                neighbours.push(idx + cols);
            }
            for next in neighbours {
                if active[next] && !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        regions.push(region);
    }
    regions
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let width = (a.right.min(b.right) - a.left.max(b.left)).max(0.0);
    let height = (a.bottom.min(b.bottom) - a.top.max(b.top)).max(0.0);
    let intersection = width * height;
    let union = a.width().abs() * a.height().abs() + b.width().abs() * b.height().abs()
        - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}
