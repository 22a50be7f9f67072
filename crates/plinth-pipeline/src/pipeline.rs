//! Staged compositing: advance one step at a time, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use plinth_pipeline::{CompositionConfig, CompositionError, Pipeline};
//! # fn run(background: &[u8], product: &[u8]) -> Result<(), CompositionError> {
//! let composed = Pipeline::new(background, product, CompositionConfig::default())
//!     .decode()?
//!     .plan()?
//!     .render()
//!     .encode()?;
//! println!("{} bytes", composed.data.len());
//! # Ok(())
//! # }
//! ```
//!
//! Each stage consumes `self` and returns the next state, so a stage can
//! never run twice or out of order. The flow is strictly linear: decode,
//! choose the target and rotation, plan the placement, render, encode.

use log::debug;

use crate::placement::{align, plan_placement, working_rotation};
use crate::raster::{self, TRANSPARENT};
use crate::region::detect_target;
use crate::rotation::{fixed_rotation, optimize_rotation};
use crate::types::{
    ComposedImage, CompositionConfig, CompositionError, CompositionMode, Dimensions, Placement,
    Rect, RgbaImage,
};

/// Entry point for the staged pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline over raw background and product bytes.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new<'a>(
        background: &'a [u8],
        product: &'a [u8],
        config: CompositionConfig,
    ) -> Pending<'a> {
        Pending {
            config,
            background,
            product,
        }
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Nothing decoded yet. Call [`decode`](Self::decode) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending<'a> {
    config: CompositionConfig,
    background: &'a [u8],
    product: &'a [u8],
}

impl Pending<'_> {
    /// Validate the configuration and decode both images.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::InvalidConfig`] for a bad config,
    /// [`CompositionError::EmptyInput`] or [`CompositionError::ImageDecode`]
    /// for unusable image bytes.
    pub fn decode(self) -> Result<Decoded, CompositionError> {
        self.config.validate()?;
        let input_bytes = self.background.len() + self.product.len();
        let background = raster::decode(self.background)?;
        let product = raster::decode(self.product)?;
        debug!(
            "decoded background {} and product {}",
            Dimensions::of(&background),
            Dimensions::of(&product)
        );
        Ok(Decoded {
            config: self.config,
            background,
            product,
            input_bytes,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Both images decoded. Call [`plan`](Self::plan) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .plan() to continue"]
pub struct Decoded {
    config: CompositionConfig,
    background: RgbaImage,
    product: RgbaImage,
    input_bytes: usize,
}

impl Decoded {
    /// The decoded background.
    #[must_use]
    pub const fn background(&self) -> &RgbaImage {
        &self.background
    }

    /// The decoded product, before any rotation.
    #[must_use]
    pub const fn product(&self) -> &RgbaImage {
        &self.product
    }

    /// Combined size of the two encoded inputs.
    #[must_use]
    pub const fn input_bytes(&self) -> usize {
        self.input_bytes
    }

    /// Choose the target rectangle and rotation, then plan the placement.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::SelectionPrecondition`] when the
    /// preferred white band is missing and
    /// [`CompositionError::InsufficientArea`] when the padding leaves no
    /// room for the product.
    pub fn plan(self) -> Result<Planned, CompositionError> {
        let canvas = Dimensions::of(&self.background);
        let config = &self.config;

        let (target, rotation_degrees, product, placement, candidates) = match config.mode {
            CompositionMode::DetectWhiteRegion => {
                let (target, candidates) = detect_target(
                    &self.background,
                    config.white_threshold,
                    config.alignment.vertical,
                )?;
                let angle = working_rotation(
                    Dimensions::of(&self.product),
                    config.manual_rotation_degrees,
                    config.auto_rotate_aspect,
                );
                let product = if angle == 0 {
                    self.product
                } else {
                    raster::rotate(&self.product, angle, TRANSPARENT)
                };
                let placement = plan_placement(
                    target,
                    Dimensions::of(&product),
                    config.padding,
                    config.alignment,
                )?;
                (target, angle, product, placement, candidates)
            }
            CompositionMode::FillEntireBackground => {
                let target = Rect::whole(canvas);
                let plan = if config.manual_rotation_degrees == 0 {
                    optimize_rotation(
                        &self.product,
                        canvas,
                        config.padding,
                        config.rotation_step_degrees,
                    )?
                } else {
                    fixed_rotation(
                        &self.product,
                        canvas,
                        config.padding,
                        config.manual_rotation_degrees,
                    )?
                };
                let placement = align(target, plan.scaled, config.padding, config.alignment);
                (
                    target,
                    plan.angle_degrees,
                    plan.image,
                    placement,
                    plan.candidates_evaluated,
                )
            }
        };

        debug!(
            "{} plan: target {target}, rotation {rotation_degrees}°, product {} at ({}, {})",
            config.mode, placement.scaled, placement.offset_x, placement.offset_y
        );

        Ok(Planned {
            config: self.config,
            background: self.background,
            product,
            target,
            rotation_degrees,
            placement,
            candidates,
        })
    }
}

// ───────────────────────── Stage 2: Planned ──────────────────────────

/// Geometry decided. Call [`render`](Self::render) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .render() to continue"]
pub struct Planned {
    config: CompositionConfig,
    background: RgbaImage,
    product: RgbaImage,
    target: Rect,
    rotation_degrees: i32,
    placement: Placement,
    candidates: usize,
}

impl Planned {
    /// Rectangle the product is fitted into.
    #[must_use]
    pub const fn target(&self) -> Rect {
        self.target
    }

    /// Clockwise rotation applied to the product.
    #[must_use]
    pub const fn rotation_degrees(&self) -> i32 {
        self.rotation_degrees
    }

    /// Final size and offset of the product.
    #[must_use]
    pub const fn placement(&self) -> Placement {
        self.placement
    }

    /// The product after rotation, before scaling.
    #[must_use]
    pub const fn product(&self) -> &RgbaImage {
        &self.product
    }

    /// White-band candidates (region mode) or angles evaluated (fill mode).
    #[must_use]
    pub const fn candidates(&self) -> usize {
        self.candidates
    }

    /// Scale the product and draw it over the background.
    pub fn render(self) -> Rendered {
        let Placement {
            scaled,
            offset_x,
            offset_y,
        } = self.placement;
        let scaled_product = raster::resize(
            &self.product,
            scaled.width,
            scaled.height,
            self.config.resize_filter,
        );
        let image = raster::composite(
            &self.background,
            &scaled_product,
            i64::from(offset_x),
            i64::from(offset_y),
        );
        Rendered {
            config: self.config,
            image,
            target: self.target,
            rotation_degrees: self.rotation_degrees,
            placement: self.placement,
        }
    }
}

// ───────────────────────── Stage 3: Rendered ─────────────────────────

/// Flattened image in memory. Call [`encode`](Self::encode) to finish.
#[must_use = "pipeline stages are consumed by advancing; call .encode() to continue"]
pub struct Rendered {
    config: CompositionConfig,
    image: RgbaImage,
    target: Rect,
    rotation_degrees: i32,
    placement: Placement,
}

impl Rendered {
    /// The composed raster.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Encode in the configured output format.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::ImageEncode`] if encoding fails.
    pub fn encode(self) -> Result<ComposedImage, CompositionError> {
        let format = self.config.output_format;
        let data = raster::encode(&self.image, format)?;
        Ok(ComposedImage {
            data,
            format,
            dimensions: Dimensions::of(&self.image),
            target: self.target,
            rotation_degrees: self.rotation_degrees,
            placement: self.placement,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::testutil::png;
    use crate::types::{Alignment, HorizontalAlignment, VerticalAlignment};

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn invalid_config_is_rejected_before_decoding() {
        let config = CompositionConfig {
            rotation_step_degrees: 0,
            ..CompositionConfig::default()
        };
        let result = Pipeline::new(&[], &[], config).decode();
        assert!(matches!(result, Err(CompositionError::InvalidConfig(_))));
    }

    #[test]
    fn empty_product_is_rejected() {
        let bg = png(&RgbaImage::from_pixel(10, 10, WHITE));
        let result = Pipeline::new(&bg, &[], CompositionConfig::default()).decode();
        assert!(matches!(result, Err(CompositionError::EmptyInput)));
    }

    #[test]
    fn bottom_band_is_used_under_top_content() {
        let bg = RgbaImage::from_fn(500, 800, |_, y| if y < 400 { BLACK } else { WHITE });
        let product = RgbaImage::from_pixel(100, 100, RED);
        let planned = Pipeline::new(&png(&bg), &png(&product), CompositionConfig::default())
            .decode()
            .unwrap()
            .plan()
            .unwrap();
        assert_eq!(planned.target(), Rect::new(0, 400, 500, 400));
        assert_eq!(planned.rotation_degrees(), 0);
        assert_eq!(planned.placement().scaled, Dimensions::new(380, 380));
        // Bottom alignment: 800 - 380 - 10.
        assert_eq!(planned.placement().offset_y, 410);
    }

    #[test]
    fn rendered_pixels_land_inside_placement() {
        let bg = RgbaImage::from_pixel(200, 100, WHITE);
        let product = RgbaImage::from_pixel(50, 50, RED);
        let config = CompositionConfig {
            alignment: Alignment::new(HorizontalAlignment::Start, VerticalAlignment::Top),
            ..CompositionConfig::default()
        };
        let rendered = Pipeline::new(&png(&bg), &png(&product), config)
            .decode()
            .unwrap()
            .plan()
            .unwrap()
            .render();
        let img = rendered.image();
        assert_eq!(img.dimensions(), (200, 100));
        // Product scaled to 80x80 at (10, 10).
        assert_eq!(*img.get_pixel(50, 50), RED);
        assert_eq!(*img.get_pixel(5, 5), WHITE);
        assert_eq!(*img.get_pixel(150, 50), WHITE);
    }

    #[test]
    fn fill_mode_uses_whole_canvas() {
        let bg = RgbaImage::from_pixel(300, 300, BLACK);
        let product = RgbaImage::from_pixel(100, 400, RED);
        let config = CompositionConfig {
            mode: CompositionMode::FillEntireBackground,
            ..CompositionConfig::default()
        };
        let planned = Pipeline::new(&png(&bg), &png(&product), config)
            .decode()
            .unwrap()
            .plan()
            .unwrap();
        assert_eq!(planned.target(), Rect::new(0, 0, 300, 300));
        assert_ne!(planned.rotation_degrees(), 0);
        assert_eq!(planned.candidates(), 37);
    }

    #[test]
    fn fill_mode_manual_rotation_skips_search() {
        let bg = RgbaImage::from_pixel(300, 300, WHITE);
        let product = RgbaImage::from_pixel(100, 400, RED);
        let config = CompositionConfig {
            mode: CompositionMode::FillEntireBackground,
            manual_rotation_degrees: 90,
            ..CompositionConfig::default()
        };
        let planned = Pipeline::new(&png(&bg), &png(&product), config)
            .decode()
            .unwrap()
            .plan()
            .unwrap();
        assert_eq!(planned.rotation_degrees(), 90);
        assert_eq!(planned.candidates(), 1);
        assert_eq!(planned.product().dimensions(), (400, 100));
    }

    #[test]
    fn encode_reports_background_dimensions() {
        let bg = RgbaImage::from_pixel(64, 32, WHITE);
        let product = RgbaImage::from_pixel(8, 8, RED);
        let composed = Pipeline::new(&png(&bg), &png(&product), CompositionConfig::default())
            .decode()
            .unwrap()
            .plan()
            .unwrap()
            .render()
            .encode()
            .unwrap();
        assert_eq!(composed.dimensions, Dimensions::new(64, 32));
        assert_eq!(&composed.data[1..4], b"PNG");
    }
}
