use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use drone_geolocator::{AngleModel, GeolocatorConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "GEOLOCATOR_CONFIG",
        "GEOLOCATOR_API_ADDR",
        "GEOLOCATOR_MAX_UPLOAD_BYTES",
        "GEOLOCATOR_MAX_CONNECTIONS",
        "GEOLOCATOR_BACKEND",
        "GEOLOCATOR_MODEL_PATH",
        "GEOLOCATOR_CONFIDENCE",
        "GEOLOCATOR_CLASSES",
        "GEOLOCATOR_ANGLE_MODEL",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "api": {
            "addr": "0.0.0.0:9000",
            "max_upload_bytes": 1048576,
            "max_connections": 4,
            "request_timeout_secs": 5
        },
        "detector": {
            "backend": "tract",
            "model_path": "/opt/models/yolov8n.onnx",
            "input_size": 416,
            "confidence_threshold": 0.4,
            "iou_threshold": 0.5,
            "max_detections": 25,
            "classes": ["person"]
        },
        "camera": { "angle_model": "perspective" }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("GEOLOCATOR_CONFIG", file.path());
    std::env::set_var("GEOLOCATOR_CONFIDENCE", "0.65");
    std::env::set_var("GEOLOCATOR_CLASSES", "person, car");
    std::env::set_var("GEOLOCATOR_MAX_CONNECTIONS", "8");

    let cfg = GeolocatorConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "0.0.0.0:9000");
    assert_eq!(cfg.max_upload_bytes, 1_048_576);
    assert_eq!(cfg.max_connections, 8);
    assert_eq!(cfg.request_timeout, std::time::Duration::from_secs(5));
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(
        cfg.detector.model_path,
        Some(PathBuf::from("/opt/models/yolov8n.onnx"))
    );
    assert_eq!(cfg.detector.input_size, 416);
    assert_eq!(cfg.detector.confidence_threshold, 0.65);
    assert_eq!(cfg.detector.iou_threshold, 0.5);
    assert_eq!(cfg.detector.max_detections, 25);
    assert_eq!(cfg.detector.classes, vec!["person", "car"]);
    assert_eq!(cfg.camera.angle_model, AngleModel::Perspective);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[api]
addr = "127.0.0.1:8100"

[detector]
confidence_threshold = 0.3

[camera]
angle_model = "linear"
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("GEOLOCATOR_CONFIG", file.path());
    std::env::set_var("GEOLOCATOR_ANGLE_MODEL", "pinhole");

    let cfg = GeolocatorConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "127.0.0.1:8100");
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.confidence_threshold, 0.3);
    assert_eq!(cfg.camera.angle_model, AngleModel::Perspective);

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = GeolocatorConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "127.0.0.1:8000");
    assert_eq!(cfg.max_upload_bytes, 20 * 1024 * 1024);
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.confidence_threshold, 0.5);
    assert_eq!(cfg.camera.angle_model, AngleModel::Linear);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("GEOLOCATOR_CONFIDENCE", "very");
    assert!(GeolocatorConfig::load().is_err());
    clear_env();

    std::env::set_var("GEOLOCATOR_ANGLE_MODEL", "fisheye");
    assert!(GeolocatorConfig::load().is_err());
    clear_env();

    std::env::set_var("GEOLOCATOR_MAX_CONNECTIONS", "0");
    let err = GeolocatorConfig::load().unwrap_err();
    assert!(err.to_string().contains("max_connections"));
    clear_env();

    std::env::set_var("GEOLOCATOR_BACKEND", "tract");
    let err = GeolocatorConfig::load().unwrap_err();
    assert!(err.to_string().contains("model_path"));
    clear_env();
}

#[test]
fn reports_unreadable_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("GEOLOCATOR_CONFIG", "/nonexistent/geolocator.json");
    let err = GeolocatorConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
    clear_env();
}
