//! Synthetic camera.
//!
//! Stands in for platform capture: on `bind` it spawns a capture thread that
//! renders a bright square drifting across a noisy dark background and hands
//! each frame to the analyzer. Frame buffers are counted out and back in
//! through the frame release hook, so callers can check nothing leaks.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use rand::Rng;

use crate::capture::{CameraProvider, PreviewSurface};
use crate::frame::{Frame, RGB_CHANNELS};
use crate::geometry::Rotation;
use crate::pipeline::FrameAnalyzer;

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticCameraConfig {
    /// Sensor frame width.
    pub width: u32,
    /// Sensor frame height.
    pub height: u32,
    /// Rotation reported with every frame.
    pub rotation: Rotation,
    /// Frames per second.
    pub target_fps: u32,
    /// Stop capturing after this many frames (across all bindings).
    pub max_frames: Option<u64>,
    /// Edge of the moving square in pixels.
    pub square_size: u32,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            rotation: Rotation::Deg90,
            target_fps: 30,
            max_frames: None,
            square_size: 96,
        }
    }
}

struct CaptureSession {
    preview: PreviewSurface,
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Camera provider producing generated frames.
pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    available: bool,
    session: Option<CaptureSession>,
    frames_captured: Arc<AtomicU64>,
    outstanding: Arc<AtomicUsize>,
    bind_count: u64,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            bail!("synthetic camera frame size must be positive");
        }
        if config.target_fps == 0 {
            bail!("synthetic camera fps must be >= 1");
        }
        if config.square_size == 0 || config.square_size > config.width.min(config.height) {
            bail!(
                "square size {} does not fit a {}x{} frame",
                config.square_size,
                config.width,
                config.height
            );
        }
        Ok(Self {
            config,
            available: true,
            session: None,
            frames_captured: Arc::new(AtomicU64::new(0)),
            outstanding: Arc::new(AtomicUsize::new(0)),
            bind_count: 0,
        })
    }

    /// A provider with no camera behind it; every bind fails.
    pub fn unavailable() -> Self {
        Self {
            config: SyntheticCameraConfig::default(),
            available: false,
            session: None,
            frames_captured: Arc::new(AtomicU64::new(0)),
            outstanding: Arc::new(AtomicUsize::new(0)),
            bind_count: 0,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }

    pub fn preview(&self) -> Option<&PreviewSurface> {
        self.session.as_ref().map(|session| &session.preview)
    }

    /// Successful binds so far.
    pub fn bind_count(&self) -> u64 {
        self.bind_count
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::SeqCst)
    }

    /// Frame buffers handed out and not yet released.
    pub fn buffers_outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl CameraProvider for SyntheticCamera {
    fn unbind_all(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.stop.store(true, Ordering::SeqCst);
        if session.join.join().is_err() {
            log::error!("SyntheticCamera: capture thread panicked");
        }
        log::info!("SyntheticCamera: unbound preview {}", session.preview.name());
    }

    fn bind(&mut self, preview: PreviewSurface, analyzer: FrameAnalyzer) -> Result<()> {
        if !self.available {
            return Err(anyhow!("no camera available"));
        }
        if self.session.is_some() {
            bail!("camera already bound; unbind first");
        }

        let stop = Arc::new(AtomicBool::new(false));
        let capture = CaptureLoop {
            config: self.config.clone(),
            stop: stop.clone(),
            frames_captured: self.frames_captured.clone(),
            outstanding: self.outstanding.clone(),
            analyzer,
        };
        let join = std::thread::Builder::new()
            .name("synthetic-capture".to_string())
            .spawn(move || capture.run())
            .context("failed to spawn capture thread")?;

        log::info!(
            "SyntheticCamera: bound preview {} ({}x{} @ {} fps, rotation {})",
            preview.name(),
            self.config.width,
            self.config.height,
            self.config.target_fps,
            self.config.rotation.degrees()
        );
        self.bind_count += 1;
        self.session = Some(CaptureSession {
            preview,
            stop,
            join,
        });
        Ok(())
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

struct CaptureLoop {
    config: SyntheticCameraConfig,
    stop: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
    outstanding: Arc<AtomicUsize>,
    analyzer: FrameAnalyzer,
}

impl CaptureLoop {
    fn run(self) {
        let interval = Duration::from_millis(1000 / self.config.target_fps as u64);
        while !self.stop.load(Ordering::SeqCst) {
            let sequence = self.frames_captured.load(Ordering::SeqCst);
            if self.config.max_frames.is_some_and(|max| sequence >= max) {
                break;
            }
            let frame = match self.capture(sequence) {
                Ok(frame) => frame,
                Err(err) => {
                    log::error!("SyntheticCamera: capture failed: {:#}", err);
                    break;
                }
            };
            self.frames_captured.fetch_add(1, Ordering::SeqCst);
            self.analyzer.analyze(frame);
            std::thread::sleep(interval);
        }
    }

    fn capture(&self, sequence: u64) -> Result<Frame> {
        let pixels = self.render(sequence);
        let frame = Frame::new(
            sequence,
            self.config.width,
            self.config.height,
            self.config.rotation,
            pixels,
        )?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let outstanding = self.outstanding.clone();
        Ok(frame.with_release_hook(move |_| {
            outstanding.fetch_sub(1, Ordering::SeqCst);
        }))
    }

    /// Dark noisy background with a bright square sweeping left to right.
    fn render(&self, sequence: u64) -> Vec<u8> {
        let (width, height, size) = (self.config.width, self.config.height, self.config.square_size);
        let mut rng = rand::thread_rng();
        let mut pixels = vec![0u8; width as usize * height as usize * RGB_CHANNELS];
        rng.fill(&mut pixels[..]);
        for value in pixels.iter_mut() {
            *value %= 16;
        }

        let travel = (width - size).max(1) as u64;
        let left = ((sequence * 8) % travel) as u32;
        let top = (height - size) / 2;
        for y in top..top + size {
            let row = y as usize * width as usize;
            for x in left..left + size {
                let idx = (row + x as usize) * RGB_CHANNELS;
                pixels[idx..idx + RGB_CHANNELS].copy_from_slice(&[240, 200, 60]);
            }
        }
        pixels
    }
}
