//! geolocate - geolocate the detections in one aerial image

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use drone_geolocator::{
    AngleModel, CameraFov, DecodedImage, DetectionPipeline, DronePose, GeolocatorConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file (JPEG or PNG).
    image: PathBuf,
    /// Drone latitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,
    /// Drone longitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,
    /// Altitude above ground in metres.
    #[arg(long)]
    altitude: f64,
    /// Horizontal field of view in degrees.
    #[arg(long)]
    fov_h: f64,
    /// Vertical field of view in degrees.
    #[arg(long)]
    fov_v: f64,
    /// Detector backend (overrides config).
    #[arg(long, env = "GEOLOCATOR_BACKEND")]
    backend: Option<String>,
    /// ONNX model path (overrides config).
    #[arg(long, env = "GEOLOCATOR_MODEL_PATH")]
    model: Option<PathBuf>,
    /// Minimum detection confidence (overrides config).
    #[arg(long)]
    confidence: Option<f32>,
    /// Pixel-to-angle model: linear or perspective (overrides config).
    #[arg(long)]
    angle_model: Option<String>,
    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = GeolocatorConfig::load()?;
    if let Some(backend) = args.backend {
        config.detector.backend = backend.to_lowercase();
    }
    if let Some(model) = args.model {
        config.detector.model_path = Some(model);
    }
    if let Some(confidence) = args.confidence {
        config.detector.confidence_threshold = confidence;
    }
    if let Some(model) = args.angle_model.as_deref() {
        config.camera.angle_model = AngleModel::parse(model)
            .ok_or_else(|| anyhow!("unknown angle model '{}'", model))?;
    }
    config.validate()?;

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read image {}", args.image.display()))?;
    let image = DecodedImage::decode(&bytes)
        .with_context(|| format!("failed to decode image {}", args.image.display()))?;

    let pipeline = DetectionPipeline::from_config(&config)?;
    let pose = DronePose::new(args.lat, args.lon, args.altitude);
    let fov = CameraFov::new(args.fov_h, args.fov_v);
    let report = pipeline.run_image(&image, &pose, &fov)?;

    let skipped = report.skipped();
    if !skipped.is_empty() {
        log::warn!("{} detection(s) could not be geolocated", skipped.len());
    }
    let results = report.into_results();
    let output = if args.pretty {
        serde_json::to_string_pretty(&results)?
    } else {
        serde_json::to_string(&results)?
    };
    println!("{}", output);
    Ok(())
}
