//! Raster primitives: decode, rotate, trim, resize, composite, encode.
//!
//! Everything here is a pure transform over [`RgbaImage`]: inputs are
//! borrowed and every operation returns a new buffer. The compositing
//! stages never touch the `image` or `imageproc` crates directly except
//! through this module, apart from the region scan which reads pixel
//! rows of an already decoded background.

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbImage, imageops};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};

use crate::types::{CompositionError, Dimensions, OutputFormat, ResizeFilter, RgbaImage};

/// Fill color for canvas areas exposed by a rotation.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Decode raw image bytes (PNG, JPEG, BMP, WebP) into RGBA.
///
/// # Errors
///
/// Returns [`CompositionError::EmptyInput`] if `bytes` is empty.
/// Returns [`CompositionError::ImageDecode`] if the format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, CompositionError> {
    if bytes.is_empty() {
        return Err(CompositionError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Rotate `image` clockwise by `degrees`.
///
/// The canvas grows to the rotated bounding box so no source pixel is
/// clipped. Quarter turns are exact; other angles are resampled
/// bilinearly onto a box with a small `fill` margin on every side, and
/// the exposed corners are painted with `fill`.
#[must_use]
pub fn rotate(image: &RgbaImage, degrees: i32, fill: Rgba<u8>) -> RgbaImage {
    match degrees.rem_euclid(360) {
        0 => image.clone(),
        90 => imageops::rotate90(image),
        180 => imageops::rotate180(image),
        270 => imageops::rotate270(image),
        _ => rotate_expanded(image, f64::from(degrees).to_radians(), fill),
    }
}

/// Bounding box of a `width`x`height` rectangle rotated by `theta` radians.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rotated_bounds(width: u32, height: u32, theta: f64) -> Dimensions {
    let (sin, cos) = theta.sin_cos();
    let w = f64::from(width);
    let h = f64::from(height);
    // Shave float noise before ceil so e.g. 100.0000001 stays 100.
    let fit = |v: f64| ((v - 1e-6).ceil().max(1.0)) as u32;
    Dimensions::new(
        fit(w.mul_add(cos.abs(), h * sin.abs())),
        fit(w.mul_add(sin.abs(), h * cos.abs())),
    )
}

/// Transparent pixels kept on every side of a resampled rotation. The
/// bilinear footprint reaches about a pixel past the exact rotated edge,
/// and the rotation pivot sits half a pixel off the image center.
const ROTATION_MARGIN: u32 = 2;

/// Grow `tight` by the margin and match the parity of `source`, so the
/// source and the crop window both sit exactly centered on the canvas.
fn padded_extent(tight: u32, source: u32) -> u32 {
    let padded = tight + 2 * ROTATION_MARGIN;
    if padded.abs_diff(source) % 2 == 0 {
        padded
    } else {
        padded + 1
    }
}

#[allow(clippy::cast_possible_truncation)]
fn rotate_expanded(image: &RgbaImage, theta: f64, fill: Rgba<u8>) -> RgbaImage {
    let tight = rotated_bounds(image.width(), image.height(), theta);
    let out_w = padded_extent(tight.width, image.width());
    let out_h = padded_extent(tight.height, image.height());
    let canvas_w = out_w.max(image.width());
    let canvas_h = out_h.max(image.height());

    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, fill);
    imageops::replace(
        &mut canvas,
        image,
        i64::from((canvas_w - image.width()) / 2),
        i64::from((canvas_h - image.height()) / 2),
    );

    let rotated = rotate_about_center(&canvas, theta as f32, Interpolation::Bilinear, fill);
    if canvas_w == out_w && canvas_h == out_h {
        return rotated;
    }

    // The canvas had to stay at least as large as the source; cut it
    // back down to the padded bounding box.
    let x = (canvas_w - out_w) / 2;
    let y = (canvas_h - out_h) / 2;
    imageops::crop_imm(&rotated, x, y, out_w, out_h).to_image()
}

/// Crop away uniform borders.
///
/// The top-left pixel defines the border color. When it is fully
/// transparent, any fully transparent pixel counts as border regardless
/// of its color channels. An image that is entirely border is returned
/// unchanged.
#[must_use]
pub fn trim(image: &RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let reference = *image.get_pixel(0, 0);
    let is_border = |p: &Rgba<u8>| {
        if reference.0[3] == 0 {
            p.0[3] == 0
        } else {
            *p == reference
        }
    };

    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0;
    let mut max_y = 0;
    for (x, y, pixel) in image.enumerate_pixels() {
        if !is_border(pixel) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if min_x > max_x || min_y > max_y {
        return image.clone();
    }

    imageops::crop_imm(image, min_x, min_y, max_x - min_x + 1, max_y - min_y + 1).to_image()
}

/// Resize to exactly `width`x`height`.
#[must_use]
pub fn resize(image: &RgbaImage, width: u32, height: u32, filter: ResizeFilter) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, filter.to_image_filter())
}

/// Alpha-blend `overlay` onto a copy of `base` with its top-left corner
/// at (`x`, `y`). Parts of the overlay outside `base` are dropped.
#[must_use]
pub fn composite(base: &RgbaImage, overlay: &RgbaImage, x: i64, y: i64) -> RgbaImage {
    let mut out = base.clone();
    imageops::overlay(&mut out, overlay, x, y);
    out
}

/// Encode an RGBA image in the requested format.
///
/// # Errors
///
/// Returns [`CompositionError::ImageEncode`] if the encoder rejects the
/// image.
pub fn encode(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>, CompositionError> {
    let (width, height) = image.dimensions();
    let mut buf = Vec::new();
    let result = match format {
        OutputFormat::Png => PngEncoder::new(&mut buf).write_image(
            image.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
        OutputFormat::Jpeg { quality } => {
            let rgb: RgbImage = image.convert();
            JpegEncoder::new_with_quality(&mut buf, quality).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Webp => WebPEncoder::new_lossless(&mut buf).write_image(
            image.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
    };
    result.map_err(|e| CompositionError::ImageEncode(e.to_string()))?;
    Ok(buf)
}
