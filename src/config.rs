use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::geometry::AngleModel;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_MAX_CONNECTIONS: usize = 16;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MAX_DETECTIONS: usize = 100;

#[derive(Debug, Deserialize, Default)]
struct GeolocatorConfigFile {
    api: Option<ApiConfigFile>,
    detector: Option<DetectorConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
    max_connections: Option<usize>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    angle_model: Option<AngleModel>,
}

#[derive(Debug, Clone)]
pub struct GeolocatorConfig {
    pub api_addr: String,
    pub max_upload_bytes: usize,
    pub max_connections: usize,
    pub request_timeout: Duration,
    pub detector: DetectorSettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Label allowlist; empty reports every class.
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CameraSettings {
    pub angle_model: AngleModel,
}

impl Default for GeolocatorConfig {
    fn default() -> Self {
        Self::from_file(GeolocatorConfigFile::default())
    }
}

impl GeolocatorConfig {
    /// Load from `GEOLOCATOR_CONFIG` (JSON, or TOML by extension) plus env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GEOLOCATOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GeolocatorConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_upload_bytes: api.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            max_connections: api.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            request_timeout: Duration::from_secs(
                api.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector.model_path,
                labels_path: detector.labels_path,
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                max_detections: detector.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
                classes: detector.classes.unwrap_or_default(),
            },
            camera: CameraSettings {
                angle_model: camera.angle_model.unwrap_or_default(),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("GEOLOCATOR_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(limit) = std::env::var("GEOLOCATOR_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = limit.trim().parse().map_err(|_| {
                anyhow!("GEOLOCATOR_MAX_UPLOAD_BYTES must be an integer number of bytes")
            })?;
        }
        if let Ok(limit) = std::env::var("GEOLOCATOR_MAX_CONNECTIONS") {
            self.max_connections = limit.trim().parse().map_err(|_| {
                anyhow!("GEOLOCATOR_MAX_CONNECTIONS must be a whole number of connections")
            })?;
        }
        if let Ok(backend) = std::env::var("GEOLOCATOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(path) = std::env::var("GEOLOCATOR_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(threshold) = std::env::var("GEOLOCATOR_CONFIDENCE") {
            self.detector.confidence_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("GEOLOCATOR_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(classes) = std::env::var("GEOLOCATOR_CLASSES") {
            self.detector.classes = split_csv(&classes);
        }
        if let Ok(model) = std::env::var("GEOLOCATOR_ANGLE_MODEL") {
            self.camera.angle_model = AngleModel::parse(&model).ok_or_else(|| {
                anyhow!(
                    "GEOLOCATOR_ANGLE_MODEL must be 'linear' or 'perspective', got '{}'",
                    model
                )
            })?;
        }
        Ok(())
    }

    /// Check ranges and cross-field requirements.
    pub fn validate(&self) -> Result<()> {
        let detector = &self.detector;
        for (name, value) in [
            ("confidence_threshold", detector.confidence_threshold),
            ("iou_threshold", detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        if detector.max_detections == 0 {
            return Err(anyhow!("detector max_detections must be greater than zero"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("max_connections must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("request_timeout_secs must be greater than zero"));
        }
        match detector.backend.as_str() {
            "stub" => {}
            "tract" => {
                if detector.model_path.is_none() {
                    return Err(anyhow!("tract backend requires detector.model_path"));
                }
            }
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<GeolocatorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
