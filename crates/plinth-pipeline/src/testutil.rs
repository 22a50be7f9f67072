//! Shared fixtures for unit tests.

#![allow(clippy::unwrap_used)]

use image::ImageEncoder;
use image::codecs::png::PngEncoder;

use crate::types::RgbaImage;

/// Encode an RGBA image as PNG bytes.
pub fn png(image: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
    out
}
