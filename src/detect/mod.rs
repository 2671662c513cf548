mod backend;
mod backends;
mod detector;
mod registry;
mod result;
pub mod yolo;

pub use backend::DetectorBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{ScriptedDetection, StubBackend};
pub use detector::{Detector, DEFAULT_CONFIDENCE_THRESHOLD};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
