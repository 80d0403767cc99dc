mod backend;
mod backends;
pub mod labels;
mod result;
pub mod selector;

pub use backend::{DetectorBackend, DetectorMode, DetectorOptions};
pub use backends::{CpuBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{display_label, UNKNOWN_LABEL};
pub use result::{DetectedObject, Detection, ObjectLabel};
pub use selector::{
    select_detector, AssetBundle, BuiltinFactory, DetectorConfig, DetectorFactory, ModelAssets,
    SelectedDetector,
};
