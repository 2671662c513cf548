//! Decoded still images.
//!
//! A `DecodedImage` is produced once per request from uploaded bytes and is
//! dropped as soon as the pipeline returns. Backends only ever borrow it.

use std::io::Cursor;

use image::{ImageReader, RgbImage};

use crate::error::GeoError;

/// Upper bound on decoded raster size (100 megapixels).
pub const MAX_PIXELS: u64 = 100_000_000;

/// RGB8 raster owned by a single pipeline invocation.
pub struct DecodedImage {
    rgb: RgbImage,
}

impl DecodedImage {
    /// Decode JPEG or PNG bytes.
    ///
    /// Dimensions are read from the header and checked before any pixel
    /// buffer is allocated.
    pub fn decode(bytes: &[u8]) -> Result<Self, GeoError> {
        if bytes.is_empty() {
            return Err(GeoError::Decode("image payload is empty".to_string()));
        }
        let (width, height) = reader(bytes)?
            .into_dimensions()
            .map_err(|e| GeoError::Decode(e.to_string()))?;
        check_dimensions(width, height)?;
        let image = reader(bytes)?
            .decode()
            .map_err(|e| GeoError::Decode(e.to_string()))?;
        Ok(Self {
            rgb: image.into_rgb8(),
        })
    }

    /// Wrap an already decoded raster.
    pub fn from_rgb(rgb: RgbImage) -> Result<Self, GeoError> {
        check_dimensions(rgb.width(), rgb.height())?;
        Ok(Self { rgb })
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, GeoError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| GeoError::Decode(e.to_string()))
}

fn check_dimensions(width: u32, height: u32) -> Result<(), GeoError> {
    if width == 0 || height == 0 {
        return Err(GeoError::Decode(format!(
            "invalid image dimensions {}x{}",
            width, height
        )));
    }
    if (width as u64).saturating_mul(height as u64) > MAX_PIXELS {
        return Err(GeoError::Decode(format!(
            "image {}x{} exceeds {} pixels",
            width, height, MAX_PIXELS
        )));
    }
    Ok(())
}
