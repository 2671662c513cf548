use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::DecodedImage;

/// A detection scripted in normalized `0..1` image coordinates.
#[derive(Clone, Debug)]
pub struct ScriptedDetection {
    pub label: String,
    pub confidence: f32,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl ScriptedDetection {
    pub fn new(label: &str, confidence: f32, bounds: [f32; 4]) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            x_min: bounds[0],
            y_min: bounds[1],
            x_max: bounds[2],
            y_max: bounds[3],
        }
    }

    /// Square box of normalized half-size `half` centred on `(cx, cy)`.
    pub fn centred(label: &str, confidence: f32, cx: f32, cy: f32, half: f32) -> Self {
        Self::new(label, confidence, [cx - half, cy - half, cx + half, cy + half])
    }
}

/// Stub backend for testing and model-less runs.
///
/// Replays the same scripted detections for every image, scaled to the image
/// size. Constructed empty it reports nothing, which is still a valid result.
#[derive(Default)]
pub struct StubBackend {
    script: Vec<ScriptedDetection>,
    fail_with: Option<String>,
}

impl StubBackend {
    pub fn new(script: Vec<ScriptedDetection>) -> Self {
        Self {
            script,
            fail_with: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A backend whose inference always fails.
    pub fn failing(message: &str) -> Self {
        Self {
            script: Vec::new(),
            fail_with: Some(message.to_string()),
        }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, image: &DecodedImage) -> Result<Vec<Detection>> {
        if let Some(message) = &self.fail_with {
            return Err(anyhow!("{}", message));
        }
        let w = image.width() as f32;
        let h = image.height() as f32;
        Ok(self
            .script
            .iter()
            .map(|s| {
                Detection::new(
                    s.label.clone(),
                    s.confidence,
                    BoundingBox::new(s.x_min * w, s.y_min * h, s.x_max * w, s.y_max * h),
                )
            })
            .collect())
    }
}
