use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::capture::SyntheticCameraConfig;
use crate::detect::selector::{
    ModelAssets, CUSTOM_MAX_LABELS, DEFAULT_LABELS_ASSET, DEFAULT_MODEL_ASSET,
};
use crate::geometry::{Rotation, Viewport};

const DEFAULT_ASSET_DIR: &str = "assets";
const DEFAULT_VIEWPORT_WIDTH: f32 = 1080.0;
const DEFAULT_VIEWPORT_HEIGHT: f32 = 1920.0;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_ROTATION: u32 = 90;
const DEFAULT_CAMERA_FPS: u32 = 30;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    asset_dir: Option<PathBuf>,
    model: Option<ModelConfigFile>,
    viewport: Option<ViewportConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<String>,
    labels_path: Option<String>,
    max_labels_per_object: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ViewportConfigFile {
    width: Option<f32>,
    height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    rotation: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub asset_dir: PathBuf,
    pub model: ModelAssets,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: u32,
    pub target_fps: u32,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVE_DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let asset_dir = file
            .asset_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSET_DIR));
        let model = ModelAssets {
            model: file
                .model
                .as_ref()
                .and_then(|model| model.path.clone())
                .unwrap_or_else(|| DEFAULT_MODEL_ASSET.to_string()),
            labels: file
                .model
                .as_ref()
                .and_then(|model| model.labels_path.clone())
                .unwrap_or_else(|| DEFAULT_LABELS_ASSET.to_string()),
            max_labels_per_object: file
                .model
                .as_ref()
                .and_then(|model| model.max_labels_per_object)
                .unwrap_or(CUSTOM_MAX_LABELS),
        };
        let viewport_width = file
            .viewport
            .as_ref()
            .and_then(|viewport| viewport.width)
            .unwrap_or(DEFAULT_VIEWPORT_WIDTH);
        let viewport_height = file
            .viewport
            .as_ref()
            .and_then(|viewport| viewport.height)
            .unwrap_or(DEFAULT_VIEWPORT_HEIGHT);
        let camera = CameraSettings {
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
            rotation_degrees: file
                .camera
                .as_ref()
                .and_then(|camera| camera.rotation)
                .unwrap_or(DEFAULT_CAMERA_ROTATION),
            target_fps: file
                .camera
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_CAMERA_FPS),
        };
        Self {
            asset_dir,
            model,
            viewport_width,
            viewport_height,
            camera,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("LIVE_DETECT_ASSET_DIR") {
            if !dir.trim().is_empty() {
                self.asset_dir = PathBuf::from(dir);
            }
        }
        if let Ok(model) = std::env::var("LIVE_DETECT_MODEL") {
            if !model.trim().is_empty() {
                self.model.model = model;
            }
        }
        if let Ok(viewport) = std::env::var("LIVE_DETECT_VIEWPORT") {
            let (width, height) = parse_dimensions(&viewport)
                .ok_or_else(|| anyhow!("LIVE_DETECT_VIEWPORT must look like 1080x1920"))?;
            self.viewport_width = width;
            self.viewport_height = height;
        }
        if let Ok(rotation) = std::env::var("LIVE_DETECT_ROTATION") {
            self.camera.rotation_degrees = rotation
                .trim()
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_ROTATION must be an integer number of degrees"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.viewport()?;
        self.rotation()?;
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera frame size must be positive"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera fps must be greater than zero"));
        }
        if self.model.max_labels_per_object == 0 {
            return Err(anyhow!("max_labels_per_object must be greater than zero"));
        }
        Ok(())
    }

    pub fn viewport(&self) -> Result<Viewport> {
        Viewport::new(self.viewport_width, self.viewport_height)
    }

    pub fn rotation(&self) -> Result<Rotation> {
        Rotation::from_degrees(self.camera.rotation_degrees)
    }

    /// Synthetic camera matching the configured frame geometry.
    pub fn synthetic_camera(&self) -> Result<SyntheticCameraConfig> {
        Ok(SyntheticCameraConfig {
            width: self.camera.width,
            height: self.camera.height,
            rotation: self.rotation()?,
            target_fps: self.camera.target_fps,
            square_size: (self.camera.width.min(self.camera.height) / 5).max(1),
            ..SyntheticCameraConfig::default()
        })
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

/// Parse `WIDTHxHEIGHT`.
pub fn parse_dimensions(value: &str) -> Option<(f32, f32)> {
    let (width, height) = value.trim().split_once(['x', 'X'])?;
    Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
}
