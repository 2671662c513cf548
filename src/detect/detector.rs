use std::sync::Arc;

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::DecodedImage;

/// Default minimum confidence for reported detections.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Backend plus the reporting policy applied to its raw output.
///
/// Drops detections below `min_confidence` or outside the class allowlist,
/// and clamps boxes to the image so every returned box satisfies
/// `0 <= min < max <= size` on both axes.
#[derive(Clone)]
pub struct Detector {
    backend: Arc<dyn DetectorBackend>,
    min_confidence: f32,
    classes: Vec<String>,
}

impl Detector {
    pub fn new(backend: Arc<dyn DetectorBackend>) -> Self {
        Self {
            backend,
            min_confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            classes: Vec::new(),
        }
    }

    pub fn with_min_confidence(mut self, threshold: f32) -> Self {
        self.min_confidence = threshold;
        self
    }

    /// Only report these labels. Empty means every label.
    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn detect(&self, image: &DecodedImage) -> Result<Vec<Detection>> {
        let raw = self.backend.detect(image)?;
        let total = raw.len();
        let detections: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= self.min_confidence)
            .filter(|d| self.classes.is_empty() || self.classes.iter().any(|c| c == &d.label))
            .filter_map(|d| {
                let bbox = d.bbox.clamped(image.width(), image.height())?;
                Some(Detection {
                    confidence: d.confidence.min(1.0),
                    bbox,
                    ..d
                })
            })
            .collect();
        log::debug!(
            "{} backend reported {} detections, {} kept",
            self.backend.name(),
            total,
            detections.len()
        );
        Ok(detections)
    }
}
