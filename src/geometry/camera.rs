use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// Full angular field of view in degrees, centred on a nadir boresight.
///
/// Each axis must lie in `(0, 180]`. The closed upper bound lets the linear
/// model place an image-edge centroid exactly 90 degrees off boresight, which
/// projection then rejects; the perspective model refuses 180 outright.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraFov {
    pub horizontal: f64,
    pub vertical: f64,
}

impl CameraFov {
    pub fn new(horizontal: f64, vertical: f64) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    fn validate(&self) -> Result<(), GeoError> {
        for (axis, value) in [("horizontal", self.horizontal), ("vertical", self.vertical)] {
            if !value.is_finite() || value <= 0.0 || value > 180.0 {
                return Err(GeoError::undefined(format!(
                    "{} field of view {} must be in (0, 180] degrees",
                    axis, value
                )));
            }
        }
        Ok(())
    }
}

/// Angular offset of a ray from the boresight, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AngularOffset {
    /// Tilt along the right axis (image x).
    pub yaw_deg: f64,
    /// Tilt along the forward axis (image y).
    pub pitch_deg: f64,
}

/// How normalized pixel offsets map to view angles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleModel {
    /// `angle = n * fov / 2`. Small-FOV approximation: compared with a pinhole
    /// lens, off-centre angles come out too small as the FOV widens.
    #[default]
    Linear,
    /// Pinhole model, `angle = atan(n * tan(fov / 2))`.
    Perspective,
}

impl AngleModel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linear" => Some(AngleModel::Linear),
            "perspective" | "pinhole" => Some(AngleModel::Perspective),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AngleModel::Linear => "linear",
            AngleModel::Perspective => "perspective",
        }
    }

    /// Convert a pixel position to its angular offset from the boresight.
    pub fn pixel_to_angle(
        &self,
        cx: f64,
        cy: f64,
        width: u32,
        height: u32,
        fov: &CameraFov,
    ) -> Result<AngularOffset, GeoError> {
        if width == 0 || height == 0 {
            return Err(GeoError::undefined(format!(
                "image dimensions {}x{} are degenerate",
                width, height
            )));
        }
        fov.validate()?;

        let half_w = width as f64 / 2.0;
        let half_h = height as f64 / 2.0;
        let nx = (cx - half_w) / half_w;
        let ny = (cy - half_h) / half_h;

        let half_h_fov = fov.horizontal / 2.0;
        let half_v_fov = fov.vertical / 2.0;

        match self {
            AngleModel::Linear => Ok(AngularOffset {
                yaw_deg: nx * half_h_fov,
                pitch_deg: ny * half_v_fov,
            }),
            AngleModel::Perspective => {
                if half_h_fov >= 90.0 || half_v_fov >= 90.0 {
                    return Err(GeoError::undefined(
                        "perspective model requires a field of view below 180 degrees",
                    ));
                }
                Ok(AngularOffset {
                    yaw_deg: perspective_angle(nx, half_h_fov),
                    pitch_deg: perspective_angle(ny, half_v_fov),
                })
            }
        }
    }
}

fn perspective_angle(normalized: f64, half_fov_deg: f64) -> f64 {
    // Keep the corner guarantee exact instead of going through tan/atan.
    if normalized == 0.0 {
        0.0
    } else if normalized.abs() == 1.0 {
        normalized * half_fov_deg
    } else {
        (normalized * half_fov_deg.to_radians().tan()).atan().to_degrees()
    }
}

/// Linear pixel-to-angle mapping.
pub fn pixel_to_angle(
    cx: f64,
    cy: f64,
    width: u32,
    height: u32,
    fov: &CameraFov,
) -> Result<AngularOffset, GeoError> {
    AngleModel::Linear.pixel_to_angle(cx, cy, width, height, fov)
}
