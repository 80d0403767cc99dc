//! One-shot detector selection.
//!
//! At session start the selector looks for a custom model in the read-only
//! asset bundle. If the asset opens and a detector can be built from it, that
//! detector is used; otherwise the built-in detector is. Neither a missing
//! asset nor a broken model is an error: both just route to the default.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectorBackend, DetectorOptions};
use crate::detect::backends::CpuBackend;

/// Model asset looked up when nothing else is configured.
pub const DEFAULT_MODEL_ASSET: &str = "model.onnx";
/// Optional class-name sidecar, one name per line.
pub const DEFAULT_LABELS_ASSET: &str = "labels.txt";
/// Labels reported per object by a custom model.
pub const CUSTOM_MAX_LABELS: usize = 3;

/// Read-only directory of bundled assets.
#[derive(Clone, Debug)]
pub struct AssetBundle {
    root: PathBuf,
}

impl AssetBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open an asset by bundle-relative path.
    ///
    /// Absolute paths and paths leaving the bundle are rejected.
    pub fn open(&self, relative: &str) -> Result<File> {
        let relative_path = Path::new(relative);
        let escapes = relative.trim().is_empty()
            || relative_path
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(anyhow!("asset path '{}' is not bundle-relative", relative));
        }
        let path = self.root.join(relative_path);
        File::open(&path).map_err(|e| anyhow!("failed to open asset {}: {}", path.display(), e))
    }
}

/// Names of the assets the selector looks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelAssets {
    pub model: String,
    pub labels: String,
    pub max_labels_per_object: usize,
}

impl Default for ModelAssets {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_ASSET.to_string(),
            labels: DEFAULT_LABELS_ASSET.to_string(),
            max_labels_per_object: CUSTOM_MAX_LABELS,
        }
    }
}

/// Which detector a session runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorConfig {
    /// Bundled model at this bundle-relative path.
    Custom(PathBuf),
    /// Built-in detector.
    Default,
}

impl DetectorConfig {
    /// Selection rule. The custom model wins only when its asset opened and a
    /// detector was built from it.
    pub fn decide(model: &str, asset_opened: bool, custom_built: bool) -> Self {
        if asset_opened && custom_built {
            DetectorConfig::Custom(PathBuf::from(model))
        } else {
            DetectorConfig::Default
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, DetectorConfig::Custom(_))
    }
}

/// Builds detector backends for the selector.
pub trait DetectorFactory {
    /// Build a detector from a custom model. May fail for any reason.
    fn custom(
        &self,
        model: &mut dyn Read,
        class_names: Vec<String>,
        options: &DetectorOptions,
    ) -> Result<Box<dyn DetectorBackend>>;

    /// Build the built-in detector. Cannot fail.
    fn default_backend(&self, options: &DetectorOptions) -> Box<dyn DetectorBackend>;
}

/// Factory shipping with the crate: tract for custom models (feature
/// `backend-tract`), `CpuBackend` otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinFactory;

impl DetectorFactory for BuiltinFactory {
    #[cfg(feature = "backend-tract")]
    fn custom(
        &self,
        model: &mut dyn Read,
        class_names: Vec<String>,
        options: &DetectorOptions,
    ) -> Result<Box<dyn DetectorBackend>> {
        let backend =
            crate::detect::backends::TractBackend::from_reader(model, class_names, options.clone())?;
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "backend-tract"))]
    fn custom(
        &self,
        _model: &mut dyn Read,
        _class_names: Vec<String>,
        _options: &DetectorOptions,
    ) -> Result<Box<dyn DetectorBackend>> {
        Err(anyhow!("custom models require the backend-tract feature"))
    }

    fn default_backend(&self, options: &DetectorOptions) -> Box<dyn DetectorBackend> {
        Box::new(CpuBackend::new(options.clone()))
    }
}

/// The detector a session runs, fixed for its lifetime.
pub struct SelectedDetector {
    pub config: DetectorConfig,
    pub backend: Box<dyn DetectorBackend>,
}

impl std::fmt::Debug for SelectedDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedDetector")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Resolve the session detector. Never fails.
pub fn select_detector(
    bundle: &AssetBundle,
    assets: &ModelAssets,
    factory: &dyn DetectorFactory,
) -> SelectedDetector {
    let opened = match bundle.open(&assets.model) {
        Ok(file) => Some(file),
        Err(err) => {
            log::debug!("custom model unavailable: {}", err);
            None
        }
    };
    let asset_opened = opened.is_some();

    let custom = opened.and_then(|file| {
        let options = DetectorOptions::custom_model(assets.max_labels_per_object);
        let class_names = load_class_names(bundle, &assets.labels);
        let mut reader = BufReader::new(file);
        match factory.custom(&mut reader, class_names, &options) {
            Ok(backend) => Some(backend),
            Err(err) => {
                log::warn!(
                    "failed to load custom model '{}', using default detector: {:#}",
                    assets.model,
                    err
                );
                None
            }
        }
    });

    let config = DetectorConfig::decide(&assets.model, asset_opened, custom.is_some());
    let backend = match custom {
        Some(backend) if config.is_custom() => backend,
        _ => factory.default_backend(&DetectorOptions::default_model()),
    };

    match &config {
        DetectorConfig::Custom(path) => log::info!(
            "using custom object detector model {} (backend={})",
            path.display(),
            backend.name()
        ),
        DetectorConfig::Default => {
            log::info!("using default object detector (backend={})", backend.name())
        }
    }

    SelectedDetector { config, backend }
}

fn load_class_names(bundle: &AssetBundle, labels: &str) -> Vec<String> {
    let file = match bundle.open(labels) {
        Ok(file) => file,
        Err(_) => return Vec::new(),
    };
    BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .map(|line| line.trim().to_string())
        .collect()
}
