//! Shared types for the plinth compositing pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can hold decoded rasters
/// without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of a decoded raster.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Total pixel count.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in background pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The rectangle covering an entire canvas.
    #[must_use]
    pub const fn whole(canvas: Dimensions) -> Self {
        Self::new(0, 0, canvas.width, canvas.height)
    }

    /// `width * height`, widened so large canvases cannot overflow.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// A rectangle with zero width or height cannot hold a product.
    #[must_use]
    pub const fn is_degenerate(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}x{}]",
            self.x, self.y, self.width, self.height
        )
    }
}

/// How the target placement rectangle is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompositionMode {
    /// Scan the background for rows of non-white content and place the
    /// product in the white band above or below it.
    #[default]
    DetectWhiteRegion,
    /// Use the whole background and search rotation angles for the
    /// largest scaled footprint.
    FillEntireBackground,
}

impl fmt::Display for CompositionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DetectWhiteRegion => f.write_str("DetectWhiteRegion"),
            Self::FillEntireBackground => f.write_str("FillEntireBackground"),
        }
    }
}

/// Horizontal position of the product inside its target rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HorizontalAlignment {
    /// Flush with the left padding.
    Start,
    /// Centered.
    #[default]
    Center,
    /// Flush with the right padding.
    End,
}

/// Vertical position of the product inside its target rectangle.
///
/// In [`CompositionMode::DetectWhiteRegion`] this is also the preference
/// used to pick between the white band above and below the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerticalAlignment {
    /// Flush with the top padding; prefers the band above the content.
    Top,
    /// Centered; prefers the larger band.
    Center,
    /// Flush with the bottom padding; prefers the band below the content.
    #[default]
    Bottom,
}

impl fmt::Display for VerticalAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("Top"),
            Self::Center => f.write_str("Center"),
            Self::Bottom => f.write_str("Bottom"),
        }
    }
}

/// Horizontal and vertical alignment policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Alignment {
    /// Horizontal alignment.
    pub horizontal: HorizontalAlignment,
    /// Vertical alignment (and region preference).
    pub vertical: VerticalAlignment,
}

impl Alignment {
    /// Create a new alignment policy.
    #[must_use]
    pub const fn new(horizontal: HorizontalAlignment, vertical: VerticalAlignment) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }
}

/// Resampling filter used when scaling the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation.
    Triangle,
    /// Bicubic (Catmull-Rom).
    CatmullRom,
    /// Gaussian.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    #[default]
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    #[must_use]
    pub const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// Encoding of the composed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Lossless PNG with alpha.
    #[default]
    Png,
    /// Baseline JPEG; alpha is discarded.
    Jpeg {
        /// Encoder quality, 1 to 100.
        quality: u8,
    },
    /// Lossless WebP with alpha.
    Webp,
}

impl OutputFormat {
    /// MIME type of the encoded bytes.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }

    /// Conventional file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => f.write_str("png"),
            Self::Jpeg { quality } => write!(f, "jpeg(q={quality})"),
            Self::Webp => f.write_str("webp"),
        }
    }
}

/// Configuration for a compositing run.
///
/// Built once per invocation and shared read-only by every item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// Minimum margin in pixels between the product and the edges of its
    /// target rectangle.
    pub padding: u32,

    /// How the target rectangle is chosen.
    pub mode: CompositionMode,

    /// Product alignment inside the target rectangle.
    pub alignment: Alignment,

    /// Clockwise rotation applied to the product, in degrees.
    /// `0` means no override: automatic rotation rules apply.
    pub manual_rotation_degrees: i32,

    /// A pixel is white background when its red, green, and blue channels
    /// all exceed this value.
    pub white_threshold: u8,

    /// Height-to-width ratio above which the product is turned on its
    /// side (`-90°`) in [`CompositionMode::DetectWhiteRegion`].
    pub auto_rotate_aspect: f64,

    /// Step between candidate angles of the rotation search, in degrees.
    /// Candidates run from `-90` upward while `<= 90`.
    pub rotation_step_degrees: u32,

    /// Filter used to scale the product.
    pub resize_filter: ResizeFilter,

    /// Encoding of the composed image.
    pub output_format: OutputFormat,

    /// Item binary key holding the background image.
    pub background_key: String,

    /// Item binary key holding the product image.
    pub product_key: String,

    /// Item binary key the composed image is written to.
    pub output_key: String,
}

impl CompositionConfig {
    /// Default padding in pixels.
    pub const DEFAULT_PADDING: u32 = 10;
    /// Default white threshold on the 0-255 channel scale.
    pub const DEFAULT_WHITE_THRESHOLD: u8 = 240;
    /// Default aspect ratio that triggers automatic rotation.
    pub const DEFAULT_AUTO_ROTATE_ASPECT: f64 = 1.8;
    /// Default rotation search step in degrees.
    pub const DEFAULT_ROTATION_STEP_DEGREES: u32 = 5;
    /// Default background binary key.
    pub const DEFAULT_BACKGROUND_KEY: &'static str = "background";
    /// Default product binary key.
    pub const DEFAULT_PRODUCT_KEY: &'static str = "product";
    /// Default output binary key.
    pub const DEFAULT_OUTPUT_KEY: &'static str = "data";

    /// Check invariants that the type system does not enforce.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::InvalidConfig`] when the rotation step
    /// is zero, the auto-rotate aspect is not a positive finite number,
    /// JPEG quality is outside `1..=100`, or an item key is empty.
    pub fn validate(&self) -> Result<(), CompositionError> {
        if self.rotation_step_degrees == 0 {
            return Err(CompositionError::InvalidConfig(
                "rotation step must be at least 1 degree".to_string(),
            ));
        }
        if !self.auto_rotate_aspect.is_finite() || self.auto_rotate_aspect <= 0.0 {
            return Err(CompositionError::InvalidConfig(format!(
                "auto-rotate aspect must be positive and finite, got {}",
                self.auto_rotate_aspect
            )));
        }
        if let OutputFormat::Jpeg { quality } = self.output_format
            && !(1..=100).contains(&quality)
        {
            return Err(CompositionError::InvalidConfig(format!(
                "JPEG quality must be between 1 and 100, got {quality}"
            )));
        }
        for (name, key) in [
            ("background", &self.background_key),
            ("product", &self.product_key),
            ("output", &self.output_key),
        ] {
            if key.is_empty() {
                return Err(CompositionError::InvalidConfig(format!(
                    "{name} key must not be empty"
                )));
            }
        }
        Ok(())
    }
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            padding: Self::DEFAULT_PADDING,
            mode: CompositionMode::default(),
            alignment: Alignment::default(),
            manual_rotation_degrees: 0,
            white_threshold: Self::DEFAULT_WHITE_THRESHOLD,
            auto_rotate_aspect: Self::DEFAULT_AUTO_ROTATE_ASPECT,
            rotation_step_degrees: Self::DEFAULT_ROTATION_STEP_DEGREES,
            resize_filter: ResizeFilter::default(),
            output_format: OutputFormat::default(),
            background_key: Self::DEFAULT_BACKGROUND_KEY.to_string(),
            product_key: Self::DEFAULT_PRODUCT_KEY.to_string(),
            output_key: Self::DEFAULT_OUTPUT_KEY.to_string(),
        }
    }
}

/// The rotation chosen for the product and its footprint after scaling.
///
/// `image` is the rotated and trimmed product at its pre-scale size.
#[derive(Debug, Clone)]
pub struct RotationPlan {
    /// Clockwise rotation in degrees.
    pub angle_degrees: i32,
    /// Scaled footprint inside the padded target.
    pub scaled: Dimensions,
    /// Rotated, trimmed product before scaling.
    pub image: RgbaImage,
    /// Number of candidate angles that were evaluated.
    pub candidates_evaluated: usize,
}

/// Final geometry of the product on the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Product size after scaling.
    pub scaled: Dimensions,
    /// Left edge of the product on the background.
    pub offset_x: u32,
    /// Top edge of the product on the background.
    pub offset_y: u32,
}

/// Result of compositing one product onto one background.
#[derive(Debug, Clone)]
pub struct ComposedImage {
    /// Encoded image bytes.
    pub data: Vec<u8>,
    /// Encoding used for `data`.
    pub format: OutputFormat,
    /// Pixel dimensions of the composed image (always the background's).
    pub dimensions: Dimensions,
    /// Rectangle the product was fitted into.
    pub target: Rect,
    /// Clockwise rotation applied to the product, in degrees.
    pub rotation_degrees: i32,
    /// Where and how large the product was drawn.
    pub placement: Placement,
}

/// Errors that can occur while compositing.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode an input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Failed to encode the composed image.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// A required image is absent from the item.
    #[error("item has no binary data under key '{key}'")]
    MissingInputImage {
        /// The binary key that was looked up.
        key: String,
    },

    /// The target rectangle minus padding leaves no room for the product.
    #[error(
        "not enough room for the product: {available_width}x{available_height} px left after padding"
    )]
    InsufficientArea {
        /// Target width minus twice the padding.
        available_width: i64,
        /// Target height minus twice the padding.
        available_height: i64,
    },

    /// The preferred white band does not exist on this background.
    #[error("no white region matches the '{preference}' preference")]
    SelectionPrecondition {
        /// The vertical alignment used as preference.
        preference: VerticalAlignment,
    },

    /// Configuration is invalid.
    #[error("invalid composition configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_whole_covers_canvas() {
        let r = Rect::whole(Dimensions::new(640, 480));
        assert_eq!(r, Rect::new(0, 0, 640, 480));
        assert_eq!(r.area(), 640 * 480);
    }

    #[test]
    fn rect_area_does_not_overflow() {
        let r = Rect::new(0, 0, u32::MAX, u32::MAX);
        assert_eq!(r.area(), u64::from(u32::MAX) * u64::from(u32::MAX));
    }

    #[test]
    fn degenerate_rects() {
        assert!(Rect::new(0, 0, 0, 10).is_degenerate());
        assert!(Rect::new(0, 0, 10, 0).is_degenerate());
        assert!(!Rect::new(0, 0, 1, 1).is_degenerate());
    }

    #[test]
    fn config_defaults() {
        let config = CompositionConfig::default();
        assert_eq!(config.padding, 10);
        assert_eq!(config.mode, CompositionMode::DetectWhiteRegion);
        assert_eq!(config.alignment.horizontal, HorizontalAlignment::Center);
        assert_eq!(config.alignment.vertical, VerticalAlignment::Bottom);
        assert_eq!(config.manual_rotation_degrees, 0);
        assert_eq!(config.white_threshold, 240);
        assert_eq!(config.rotation_step_degrees, 5);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_rotation_step_is_invalid() {
        let config = CompositionConfig {
            rotation_step_degrees: 0,
            ..CompositionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CompositionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bad_aspect_is_invalid() {
        for aspect in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = CompositionConfig {
                auto_rotate_aspect: aspect,
                ..CompositionConfig::default()
            };
            assert!(config.validate().is_err(), "aspect {aspect} accepted");
        }
    }

    #[test]
    fn jpeg_quality_bounds() {
        let mut config = CompositionConfig {
            output_format: OutputFormat::Jpeg { quality: 0 },
            ..CompositionConfig::default()
        };
        assert!(config.validate().is_err());
        config.output_format = OutputFormat::Jpeg { quality: 101 };
        assert!(config.validate().is_err());
        config.output_format = OutputFormat::Jpeg { quality: 85 };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_key_is_invalid() {
        let config = CompositionConfig {
            output_key: String::new(),
            ..CompositionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn config_round_trips_through_json_with_partial_fields() {
        let config: CompositionConfig =
            serde_json::from_str(r#"{"padding": 20, "mode": "FillEntireBackground"}"#).unwrap();
        assert_eq!(config.padding, 20);
        assert_eq!(config.mode, CompositionMode::FillEntireBackground);
        assert_eq!(config.white_threshold, 240);
    }

    #[test]
    fn output_format_labels() {
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
        assert_eq!(OutputFormat::Jpeg { quality: 90 }.extension(), "jpg");
        assert_eq!(OutputFormat::Webp.extension(), "webp");
    }

    #[test]
    fn error_messages_are_human_readable() {
        let err = CompositionError::SelectionPrecondition {
            preference: VerticalAlignment::Top,
        };
        assert_eq!(err.to_string(), "no white region matches the 'Top' preference");
        let err = CompositionError::InsufficientArea {
            available_width: -4,
            available_height: 10,
        };
        assert!(err.to_string().contains("-4x10"));
    }
}
