//! Flat-ground geometry: pixel → view angle → ground offset → lat/lon.

pub mod camera;
pub mod geodesy;
pub mod projection;

pub use camera::{pixel_to_angle, AngleModel, AngularOffset, CameraFov};
pub use geodesy::{offset_to_latlon, DronePose, GeoCoordinate, METRES_PER_DEGREE, POLE_LIMIT_DEG};
pub use projection::{project, GroundOffset};
