use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::DecodedImage;

/// Detector backend trait.
///
/// Backends hold their model weights immutably: `detect` takes `&self` so a
/// single loaded model can serve concurrent requests without locking.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a still image.
    ///
    /// Boxes are returned in source-image pixel coordinates, in the order the
    /// backend ranks them. Implementations must not retain the image.
    fn detect(&self, image: &DecodedImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
