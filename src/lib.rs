//! Drone detection geolocator
//!
//! Estimates the ground coordinates of objects detected in a still aerial
//! image, given the drone's position, altitude and camera field of view.
//!
//! # Architecture
//!
//! 1. **Detector** (`detect`): model backend plus confidence/class filtering.
//! 2. **Camera geometry** (`geometry::camera`): pixel → angle off the nadir boresight.
//! 3. **Ground projection** (`geometry::projection`): angle + altitude → metres on flat ground.
//! 4. **Geographic conversion** (`geometry::geodesy`): metres → latitude/longitude.
//! 5. **Pipeline** (`pipeline`): runs the above per detection, skipping degenerate ones.
//!
//! The `api` module serves the pipeline over HTTP; `config` loads settings
//! from a file and the environment.

pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod pipeline;

pub use config::GeolocatorConfig;
pub use detect::{
    BackendRegistry, BoundingBox, Detection, Detector, DetectorBackend, ScriptedDetection,
    StubBackend,
};
pub use error::GeoError;
pub use frame::DecodedImage;
pub use geometry::{
    offset_to_latlon, pixel_to_angle, project, AngleModel, AngularOffset, CameraFov, DronePose,
    GeoCoordinate, GroundOffset,
};
pub use pipeline::{
    locate, DetectionPipeline, DetectionResult, PipelineReport, ProjectionOutcome,
    SkippedDetection,
};
