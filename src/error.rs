use thiserror::Error;

/// Errors raised while turning an image into geolocated detections.
///
/// `Decode` and `Detector` invalidate the whole request. The geometric
/// variants only ever concern a single detection and are recovered by the
/// pipeline, which drops that detection and keeps going.
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("projection undefined: {0}")]
    ProjectionUndefined(String),

    #[error("latitude {lat} is too close to a pole for the flat-earth conversion")]
    PoleSingularity { lat: f64 },

    #[error(transparent)]
    Detector(#[from] anyhow::Error),
}

impl GeoError {
    pub(crate) fn undefined(reason: impl Into<String>) -> Self {
        GeoError::ProjectionUndefined(reason.into())
    }

    /// True for errors that only affect one detection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GeoError::ProjectionUndefined(_) | GeoError::PoleSingularity { .. }
        )
    }

    /// Short machine-readable tag used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            GeoError::Decode(_) => "decode_error",
            GeoError::ProjectionUndefined(_) => "projection_undefined",
            GeoError::PoleSingularity { .. } => "pole_singularity",
            GeoError::Detector(_) => "detector_error",
        }
    }
}
