use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// Ground displacement from the point directly beneath the drone.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundOffset {
    pub forward_m: f64,
    pub right_m: f64,
}

/// Intersect a boresight-relative ray with flat ground `altitude_m` below.
pub fn project(yaw_deg: f64, pitch_deg: f64, altitude_m: f64) -> Result<GroundOffset, GeoError> {
    if !(altitude_m > 0.0) || !altitude_m.is_finite() {
        return Err(GeoError::undefined(format!(
            "altitude {} m must be a positive height above ground",
            altitude_m
        )));
    }
    for (axis, angle) in [("yaw", yaw_deg), ("pitch", pitch_deg)] {
        if !angle.is_finite() || angle.abs() >= 90.0 {
            return Err(GeoError::undefined(format!(
                "{} offset {} deg does not intersect the ground plane",
                axis, angle
            )));
        }
    }
    Ok(GroundOffset {
        forward_m: altitude_m * pitch_deg.to_radians().tan(),
        right_m: altitude_m * yaw_deg.to_radians().tan(),
    })
}
