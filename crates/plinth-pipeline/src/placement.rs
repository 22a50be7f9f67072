//! Placement planning: uniform scale-to-fit and alignment offsets.
//!
//! Given a target rectangle, the product's working size and a padding,
//! the product is scaled uniformly to the largest size that fits inside
//! the rectangle shrunk by the padding on every side, then positioned
//! per the alignment policy.

use log::debug;

use crate::types::{
    Alignment, CompositionError, Dimensions, HorizontalAlignment, Placement, Rect,
    VerticalAlignment,
};

/// Clockwise rotation to apply before measuring the product.
///
/// A non-zero `manual_degrees` always wins. Otherwise a product whose
/// height exceeds `aspect_limit` times its width is turned on its side
/// (`-90°`); anything else stays upright.
#[must_use]
pub fn working_rotation(product: Dimensions, manual_degrees: i32, aspect_limit: f64) -> i32 {
    if manual_degrees != 0 {
        return manual_degrees;
    }
    if product.width > 0 && f64::from(product.height) / f64::from(product.width) > aspect_limit {
        -90
    } else {
        0
    }
}

/// Room left inside `rect` after removing `padding` from every side.
///
/// # Errors
///
/// Returns [`CompositionError::InsufficientArea`] if either side is not
/// positive.
pub fn available_space(rect: Rect, padding: u32) -> Result<Dimensions, CompositionError> {
    let available_width = i64::from(rect.width) - 2 * i64::from(padding);
    let available_height = i64::from(rect.height) - 2 * i64::from(padding);
    if available_width <= 0 || available_height <= 0 {
        return Err(CompositionError::InsufficientArea {
            available_width,
            available_height,
        });
    }
    // Both are positive and bounded by the u32 rect sides.
    match (u32::try_from(available_width), u32::try_from(available_height)) {
        (Ok(width), Ok(height)) => Ok(Dimensions::new(width, height)),
        _ => Err(CompositionError::InsufficientArea {
            available_width,
            available_height,
        }),
    }
}

/// Largest uniform scale of `product` that fits in `available`.
///
/// Each side is `round(scale * side)`, at least one pixel.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scale_to_fit(product: Dimensions, available: Dimensions) -> Dimensions {
    let pw = f64::from(product.width.max(1));
    let ph = f64::from(product.height.max(1));
    let scale = (f64::from(available.width) / pw).min(f64::from(available.height) / ph);
    let side = |v: f64, limit: u32| ((v * scale).round() as u32).clamp(1, limit.max(1));
    Dimensions::new(
        side(pw, available.width),
        side(ph, available.height),
    )
}

/// Start/center/end offset along one axis.
const fn axis_offset(origin: u32, extent: u32, size: u32, padding: u32, anchor: Anchor) -> u32 {
    match anchor {
        Anchor::Start => origin + padding,
        Anchor::Center => origin + extent.saturating_sub(size) / 2,
        Anchor::End => (origin + extent).saturating_sub(size + padding),
    }
}

#[derive(Clone, Copy)]
enum Anchor {
    Start,
    Center,
    End,
}

impl From<HorizontalAlignment> for Anchor {
    fn from(value: HorizontalAlignment) -> Self {
        match value {
            HorizontalAlignment::Start => Self::Start,
            HorizontalAlignment::Center => Self::Center,
            HorizontalAlignment::End => Self::End,
        }
    }
}

impl From<VerticalAlignment> for Anchor {
    fn from(value: VerticalAlignment) -> Self {
        match value {
            VerticalAlignment::Top => Self::Start,
            VerticalAlignment::Center => Self::Center,
            VerticalAlignment::Bottom => Self::End,
        }
    }
}

/// Position an already scaled product inside `rect`.
#[must_use]
pub fn align(rect: Rect, scaled: Dimensions, padding: u32, alignment: Alignment) -> Placement {
    Placement {
        scaled,
        offset_x: axis_offset(
            rect.x,
            rect.width,
            scaled.width,
            padding,
            alignment.horizontal.into(),
        ),
        offset_y: axis_offset(
            rect.y,
            rect.height,
            scaled.height,
            padding,
            alignment.vertical.into(),
        ),
    }
}

/// Scale `product` to fit `rect` minus `padding` and position it.
///
/// `product` is the working size, i.e. after any rotation.
///
/// # Errors
///
/// Returns [`CompositionError::InsufficientArea`] if the padded rectangle
/// is empty.
pub fn plan_placement(
    rect: Rect,
    product: Dimensions,
    padding: u32,
    alignment: Alignment,
) -> Result<Placement, CompositionError> {
    let available = available_space(rect, padding)?;
    let scaled = scale_to_fit(product, available);
    let placement = align(rect, scaled, padding, alignment);
    debug!(
        "placement: product {product} -> {scaled} at ({}, {}) in {rect}",
        placement.offset_x, placement.offset_y
    );
    Ok(placement)
}
