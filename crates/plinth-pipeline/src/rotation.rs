//! Rotation search for fill-the-background compositing.
//!
//! Each candidate angle rotates the product onto a transparent canvas,
//! trims the transparent margin, and scales the result to fit the padded
//! background. The angle with the largest scaled footprint wins; ties go
//! to the earliest angle, starting at `-90°`.
//!
//! The search is a fixed grid with no refinement pass.

use std::borrow::Cow;

use log::{debug, trace};

use crate::placement::{available_space, scale_to_fit};
use crate::raster::{self, TRANSPARENT};
use crate::types::{CompositionError, Dimensions, Rect, RgbaImage, RotationPlan};

/// Lowest candidate angle in degrees.
pub const MIN_ANGLE: i32 = -90;
/// Highest candidate angle in degrees.
pub const MAX_ANGLE: i32 = 90;

/// Candidate angles from [`MIN_ANGLE`] upward in `step` increments,
/// stopping at [`MAX_ANGLE`]. A zero step is treated as one degree.
pub fn candidate_angles(step: u32) -> impl Iterator<Item = i32> {
    let step = usize::try_from(step.max(1)).unwrap_or(1);
    (MIN_ANGLE..=MAX_ANGLE).step_by(step)
}

/// The product turned by `angle` with its transparent margin trimmed.
///
/// Angle `0` is the untouched original: no rotate/trim round-trip.
#[must_use]
pub fn orient(product: &RgbaImage, angle: i32) -> Cow<'_, RgbaImage> {
    if angle == 0 {
        Cow::Borrowed(product)
    } else {
        Cow::Owned(raster::trim(&raster::rotate(product, angle, TRANSPARENT)))
    }
}

/// Evaluate a single angle against the padded background.
///
/// # Errors
///
/// Returns [`CompositionError::InsufficientArea`] if the padding leaves
/// no room on the background.
pub fn fixed_rotation(
    product: &RgbaImage,
    background: Dimensions,
    padding: u32,
    angle: i32,
) -> Result<RotationPlan, CompositionError> {
    let available = available_space(Rect::whole(background), padding)?;
    let image = orient(product, angle).into_owned();
    let scaled = scale_to_fit(Dimensions::of(&image), available);
    Ok(RotationPlan {
        angle_degrees: angle,
        scaled,
        image,
        candidates_evaluated: 1,
    })
}

/// Search the angle grid for the largest scaled footprint.
///
/// # Errors
///
/// Returns [`CompositionError::InsufficientArea`] if the padding leaves
/// no room on the background.
pub fn optimize_rotation(
    product: &RgbaImage,
    background: Dimensions,
    padding: u32,
    step: u32,
) -> Result<RotationPlan, CompositionError> {
    let available = available_space(Rect::whole(background), padding)?;

    let mut best: Option<RotationPlan> = None;
    let mut evaluated = 0;
    for angle in candidate_angles(step) {
        let oriented = orient(product, angle);
        let scaled = scale_to_fit(Dimensions::of(&oriented), available);
        evaluated += 1;
        trace!("angle {angle:>4}: {} -> {scaled}", Dimensions::of(&oriented));

        if best
            .as_ref()
            .is_none_or(|b| scaled.area() > b.scaled.area())
        {
            best = Some(RotationPlan {
                angle_degrees: angle,
                scaled,
                image: oriented.into_owned(),
                candidates_evaluated: 0,
            });
        }
    }

    let Some(mut plan) = best else {
        return Err(CompositionError::InvalidConfig(
            "rotation search produced no candidates".to_string(),
        ));
    };
    plan.candidates_evaluated = evaluated;
    debug!(
        "rotation: best angle {}° of {evaluated} -> {}",
        plan.angle_degrees, plan.scaled
    );
    Ok(plan)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::placement::plan_placement;
    use crate::types::Alignment;

    const OPAQUE: Rgba<u8> = Rgba([40, 90, 200, 255]);

    #[test]
    fn default_grid_has_thirty_seven_angles() {
        let angles: Vec<i32> = candidate_angles(5).collect();
        assert_eq!(angles.len(), 37);
        assert_eq!(angles.first(), Some(&-90));
        assert_eq!(angles.last(), Some(&90));
        assert!(angles.contains(&0));
    }

    #[test]
    fn coarse_grid_stops_before_max() {
        let angles: Vec<i32> = candidate_angles(17).collect();
        assert_eq!(angles, vec![-90, -73, -56, -39, -22, -5, 12, 29, 46, 63, 80]);
    }

    #[test]
    fn zero_step_is_clamped() {
        assert_eq!(candidate_angles(0).count(), 181);
    }

    #[test]
    fn angle_zero_borrows_original() {
        let img = RgbaImage::from_pixel(10, 30, OPAQUE);
        assert!(matches!(orient(&img, 0), Cow::Borrowed(_)));
    }

    #[test]
    fn quarter_turn_swaps_and_trims_nothing() {
        let img = RgbaImage::from_pixel(10, 30, OPAQUE);
        assert_eq!(orient(&img, -90).dimensions(), (30, 10));
    }

    #[test]
    fn tall_product_on_square_background_rotates() {
        let product = RgbaImage::from_pixel(100, 400, OPAQUE);
        let plan = optimize_rotation(&product, Dimensions::new(300, 300), 10, 5).unwrap();
        let upright = fixed_rotation(&product, Dimensions::new(300, 300), 10, 0).unwrap();

        assert_ne!(plan.angle_degrees, 0);
        assert!(plan.scaled.area() > upright.scaled.area());
        assert!(plan.scaled.width <= 280 && plan.scaled.height <= 280);
        assert_eq!(plan.candidates_evaluated, 37);
    }

    #[test]
    fn square_product_prefers_first_best_angle() {
        // A square rotates to a square bounding box at every angle, so no
        // candidate beats the full background and -90 is evaluated first.
        let product = RgbaImage::from_pixel(50, 50, OPAQUE);
        let plan = optimize_rotation(&product, Dimensions::new(200, 200), 0, 5).unwrap();
        assert_eq!(plan.angle_degrees, -90);
        assert_eq!(plan.scaled, Dimensions::new(200, 200));
    }

    #[test]
    fn angle_zero_matches_direct_placement() {
        let product = RgbaImage::from_pixel(123, 77, OPAQUE);
        let background = Dimensions::new(640, 480);
        let plan = fixed_rotation(&product, background, 12, 0).unwrap();
        let direct = plan_placement(
            Rect::whole(background),
            Dimensions::of(&product),
            12,
            Alignment::default(),
        )
        .unwrap();
        assert_eq!(Dimensions::of(&plan.image), Dimensions::of(&product));
        assert_eq!(plan.scaled, direct.scaled);
    }

    #[test]
    fn padding_swallowing_background_fails() {
        let product = RgbaImage::from_pixel(10, 10, OPAQUE);
        let result = optimize_rotation(&product, Dimensions::new(30, 30), 15, 5);
        assert!(matches!(
            result,
            Err(CompositionError::InsufficientArea { .. })
        ));
    }
}
