//! plinth-pipeline: Pure product-on-background compositing (sans-IO).
//!
//! Places a product image onto a background image through:
//! decode -> target selection (white band or whole canvas) ->
//! rotation -> uniform scale-to-fit -> alignment -> composite -> encode.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. Reading and writing files
//! lives in the `plinth` command-line tool.

pub mod batch;
pub mod diagnostics;
pub mod pipeline;
pub mod placement;
pub mod raster;
pub mod region;
pub mod rotation;
pub mod trim_resize;
pub mod types;

#[cfg(test)]
mod testutil;

pub use batch::{BatchError, BinaryData, Item, process_item, process_items, process_items_strict};
pub use diagnostics::{Clock, CompositionDiagnostics, compose_with_diagnostics};
pub use pipeline::Pipeline;
pub use trim_resize::{TrimResizeConfig, trim_and_resize, trim_resize_items};
pub use types::{
    Alignment, ComposedImage, CompositionConfig, CompositionError, CompositionMode, Dimensions,
    HorizontalAlignment, OutputFormat, Placement, Rect, ResizeFilter, VerticalAlignment,
};

/// Compose `product` onto `background`.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP) and a configuration,
/// then produces the encoded composite together with the geometry that
/// was chosen. The output always has the background's dimensions.
///
/// # Steps
///
/// 1. Validate the configuration, decode both images
/// 2. Pick the target rectangle: a white band, or the whole canvas in
///    fill mode
/// 3. Pick the rotation: aspect rule or manual angle, or the angle search
///    in fill mode
/// 4. Scale uniformly to fit inside the padded target and align
/// 5. Draw over the background and encode
///
/// # Errors
///
/// Returns [`CompositionError::InvalidConfig`] for a bad configuration.
/// Returns [`CompositionError::EmptyInput`] or
/// [`CompositionError::ImageDecode`] for unusable image bytes.
/// Returns [`CompositionError::SelectionPrecondition`] when the preferred
/// white band does not exist.
/// Returns [`CompositionError::InsufficientArea`] when padding leaves no
/// room for the product.
pub fn compose(
    background: &[u8],
    product: &[u8],
    config: &CompositionConfig,
) -> Result<ComposedImage, CompositionError> {
    Pipeline::new(background, product, config.clone())
        .decode()?
        .plan()?
        .render()
        .encode()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::testutil::png;

    #[test]
    fn compose_matches_staged_pipeline() {
        let bg = png(&RgbaImage::from_pixel(90, 60, Rgba([250, 250, 250, 255])));
        let product = png(&RgbaImage::from_pixel(30, 10, Rgba([10, 20, 30, 255])));
        let config = CompositionConfig::default();

        let direct = compose(&bg, &product, &config).unwrap();
        let staged = Pipeline::new(&bg, &product, config)
            .decode()
            .unwrap()
            .plan()
            .unwrap()
            .render()
            .encode()
            .unwrap();
        assert_eq!(direct.data, staged.data);
        assert_eq!(direct.placement, staged.placement);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let product = png(&RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let err = compose(b"not an image", &product, &CompositionConfig::default()).unwrap_err();
        assert!(matches!(err, CompositionError::ImageDecode(_)));
    }
}
