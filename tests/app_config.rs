use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use live_detect::config::AppConfig;
use live_detect::Rotation;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LIVE_DETECT_CONFIG",
        "LIVE_DETECT_ASSET_DIR",
        "LIVE_DETECT_MODEL",
        "LIVE_DETECT_VIEWPORT",
        "LIVE_DETECT_ROTATION",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AppConfig::load().expect("load config");

    assert_eq!(cfg.asset_dir, PathBuf::from("assets"));
    assert_eq!(cfg.model.model, "model.onnx");
    assert_eq!(cfg.model.labels, "labels.txt");
    assert_eq!(cfg.model.max_labels_per_object, 3);
    assert_eq!(cfg.viewport_width, 1080.0);
    assert_eq!(cfg.viewport_height, 1920.0);
    assert_eq!(cfg.rotation().unwrap(), Rotation::Deg90);
    assert_eq!(cfg.camera.target_fps, 30);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "asset_dir": "/opt/overlay/assets",
            "model": {
                "path": "models/shop.onnx",
                "labels_path": "models/shop.txt",
                "max_labels_per_object": 2
            },
            "viewport": { "width": 720, "height": 1280 },
            "camera": { "width": 1280, "height": 720, "rotation": 0, "target_fps": 15 }
        }"#,
    );
    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_MODEL", "models/override.onnx");
    std::env::set_var("LIVE_DETECT_VIEWPORT", "1920x1080");
    std::env::set_var("LIVE_DETECT_ROTATION", "270");

    let cfg = AppConfig::load().expect("load config");

    assert_eq!(cfg.asset_dir, PathBuf::from("/opt/overlay/assets"));
    assert_eq!(cfg.model.model, "models/override.onnx");
    assert_eq!(cfg.model.labels, "models/shop.txt");
    assert_eq!(cfg.model.max_labels_per_object, 2);
    assert_eq!(cfg.viewport_width, 1920.0);
    assert_eq!(cfg.viewport_height, 1080.0);
    assert_eq!(cfg.rotation().unwrap(), Rotation::Deg270);

    let camera = cfg.synthetic_camera().unwrap();
    assert_eq!(camera.width, 1280);
    assert_eq!(camera.height, 720);
    assert_eq!(camera.target_fps, 15);
    assert_eq!(camera.square_size, 144);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_ROTATION", "45");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_VIEWPORT", "wide");
    assert!(AppConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "viewport": { "width": 0, "height": 1920 } }"#);
    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    assert!(AppConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "camera": { "target_fps": 0 } }"#);
    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    assert!(AppConfig::load().is_err());
    clear_env();

    let file = write_config("not json");
    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    assert!(AppConfig::load().is_err());
    clear_env();
}
