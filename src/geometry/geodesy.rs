use serde::{Deserialize, Serialize};

use crate::error::GeoError;

use super::projection::GroundOffset;

/// Metres per degree of latitude on the local tangent plane.
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Latitudes at or beyond this magnitude are rejected.
pub const POLE_LIMIT_DEG: f64 = 89.9;

/// Drone telemetry at capture time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DronePose {
    pub lat: f64,
    pub lon: f64,
    /// Metres above the ground plane.
    pub altitude: f64,
}

impl DronePose {
    pub fn new(lat: f64, lon: f64, altitude: f64) -> Self {
        Self { lat, lon, altitude }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    #[serde(rename = "latitude")]
    pub lat: f64,
    #[serde(rename = "longitude")]
    pub lon: f64,
}

/// Shift the drone position by a metre offset using a flat-earth approximation.
///
/// Good for sub-kilometre offsets; error grows with distance and latitude.
pub fn offset_to_latlon(
    pose: &DronePose,
    offset: &GroundOffset,
) -> Result<GeoCoordinate, GeoError> {
    if !(pose.lat.abs() < POLE_LIMIT_DEG) {
        return Err(GeoError::PoleSingularity { lat: pose.lat });
    }
    let dlat = offset.forward_m / METRES_PER_DEGREE;
    let dlon = offset.right_m / (METRES_PER_DEGREE * pose.lat.to_radians().cos());
    Ok(GeoCoordinate {
        lat: pose.lat + dlat,
        lon: pose.lon + dlon,
    })
}
