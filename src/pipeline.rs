//! Detection pipeline: image bytes in, geolocated detections out.
//!
//! Every detection is projected on its own. A detection whose geometry is
//! degenerate becomes a `Skipped` outcome and the rest of the frame is still
//! reported. Only decode and detector failures fail the whole request.

use anyhow::Result;
use serde::Serialize;

use crate::config::{DetectorSettings, GeolocatorConfig};
use crate::detect::{BackendRegistry, Detection, Detector, StubBackend};
use crate::error::GeoError;
use crate::frame::DecodedImage;
use crate::geometry::{offset_to_latlon, project, AngleModel, CameraFov, DronePose, GeoCoordinate};

/// One entry of the response list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    pub label: String,
    pub confidence: f32,
    #[serde(flatten)]
    pub coordinate: GeoCoordinate,
}

/// What happened to a single detection.
#[derive(Debug)]
pub enum ProjectionOutcome {
    Located(DetectionResult),
    Skipped {
        detection: Detection,
        reason: GeoError,
    },
}

/// A detection that could not be projected, in response form.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedDetection {
    pub label: String,
    pub confidence: f32,
    pub reason: String,
}

/// All outcomes of one invocation, in detector order.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<ProjectionOutcome>,
}

impl PipelineReport {
    pub fn results(&self) -> Vec<DetectionResult> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ProjectionOutcome::Located(result) => Some(result.clone()),
                ProjectionOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> Vec<SkippedDetection> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ProjectionOutcome::Located(_) => None,
                ProjectionOutcome::Skipped { detection, reason } => Some(SkippedDetection {
                    label: detection.label.clone(),
                    confidence: detection.confidence,
                    reason: reason.to_string(),
                }),
            })
            .collect()
    }

    pub fn into_results(self) -> Vec<DetectionResult> {
        self.outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                ProjectionOutcome::Located(result) => Some(result),
                ProjectionOutcome::Skipped { .. } => None,
            })
            .collect()
    }
}

/// Geolocate the centroid of one detection.
pub fn locate(
    detection: &Detection,
    width: u32,
    height: u32,
    pose: &DronePose,
    fov: &CameraFov,
    model: AngleModel,
) -> Result<GeoCoordinate, GeoError> {
    let (cx, cy) = detection.bbox.centroid();
    let angle = model.pixel_to_angle(cx, cy, width, height, fov)?;
    let offset = project(angle.yaw_deg, angle.pitch_deg, pose.altitude)?;
    let coordinate = offset_to_latlon(pose, &offset)?;
    log::debug!(
        "{} at ({:.1}, {:.1}) px -> yaw {:.3} deg pitch {:.3} deg -> {:.2} m fwd {:.2} m right",
        detection.label,
        cx,
        cy,
        angle.yaw_deg,
        angle.pitch_deg,
        offset.forward_m,
        offset.right_m
    );
    Ok(coordinate)
}

/// Detector plus camera model. Shareable across threads.
#[derive(Clone)]
pub struct DetectionPipeline {
    detector: Detector,
    angle_model: AngleModel,
}

impl DetectionPipeline {
    pub fn new(detector: Detector) -> Self {
        Self {
            detector,
            angle_model: AngleModel::default(),
        }
    }

    pub fn with_angle_model(mut self, model: AngleModel) -> Self {
        self.angle_model = model;
        self
    }

    /// Build the pipeline described by `config`.
    pub fn from_config(config: &GeolocatorConfig) -> Result<Self> {
        let registry = build_registry(&config.detector)?;
        let backend = registry.require(&config.detector.backend)?;
        backend.warm_up()?;
        let detector = Detector::new(backend)
            .with_min_confidence(config.detector.confidence_threshold)
            .with_classes(config.detector.classes.clone());
        log::info!(
            "pipeline ready: backend={} angle_model={} min_confidence={}",
            detector.backend_name(),
            config.camera.angle_model.as_str(),
            config.detector.confidence_threshold
        );
        Ok(Self::new(detector).with_angle_model(config.camera.angle_model))
    }

    pub fn angle_model(&self) -> AngleModel {
        self.angle_model
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Decode `image_bytes` and geolocate every detection.
    pub fn run(
        &self,
        image_bytes: &[u8],
        pose: &DronePose,
        fov: &CameraFov,
    ) -> Result<Vec<DetectionResult>, GeoError> {
        let image = DecodedImage::decode(image_bytes)?;
        Ok(self.run_image(&image, pose, fov)?.into_results())
    }

    /// Geolocate every detection in an already decoded image.
    pub fn run_image(
        &self,
        image: &DecodedImage,
        pose: &DronePose,
        fov: &CameraFov,
    ) -> Result<PipelineReport, GeoError> {
        let detections = self.detector.detect(image)?;
        Ok(self.project_detections(detections, image.width(), image.height(), pose, fov))
    }

    /// Geolocate detections produced for a `width x height` image.
    ///
    /// Each detection is projected independently; failures become `Skipped`.
    pub fn project_detections(
        &self,
        detections: Vec<Detection>,
        width: u32,
        height: u32,
        pose: &DronePose,
        fov: &CameraFov,
    ) -> PipelineReport {
        let outcomes = detections
            .into_iter()
            .map(
                |detection| match locate(&detection, width, height, pose, fov, self.angle_model) {
                    Ok(coordinate) => ProjectionOutcome::Located(DetectionResult {
                        label: detection.label,
                        confidence: detection.confidence,
                        coordinate,
                    }),
                    Err(reason) => {
                        log::warn!(
                            "skipping {} detection ({:.2}): {}",
                            detection.label,
                            detection.confidence,
                            reason
                        );
                        ProjectionOutcome::Skipped { detection, reason }
                    }
                },
            )
            .collect();
        PipelineReport { outcomes }
    }
}

fn build_registry(settings: &DetectorSettings) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::empty());

    #[cfg(not(feature = "backend-tract"))]
    if settings.backend == "tract" {
        return Err(anyhow::anyhow!(
            "tract backend requires the backend-tract feature"
        ));
    }

    #[cfg(feature = "backend-tract")]
    if let Some(model_path) = &settings.model_path {
        let labels = match &settings.labels_path {
            Some(path) => crate::detect::yolo::load_labels(path)?,
            None => crate::detect::yolo::coco_labels(),
        };
        let params = crate::detect::yolo::YoloParams {
            confidence_threshold: settings.confidence_threshold,
            iou_threshold: settings.iou_threshold,
            max_detections: settings.max_detections,
        };
        let backend = crate::detect::TractBackend::new(model_path, settings.input_size)?
            .with_labels(labels)
            .with_params(params);
        registry.register(backend);
    }

    registry.set_default(&settings.backend)?;
    Ok(registry)
}
