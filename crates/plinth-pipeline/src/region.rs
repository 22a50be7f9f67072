//! White-region detection on the background.
//!
//! The background is projected onto its rows: a row holds content when
//! any of its pixels is not white. The bands above the first content row
//! and below the last one are the placement candidates. Candidates always
//! span the full background width.

use log::{debug, trace};

use crate::types::{CompositionError, Dimensions, Rect, RgbaImage, VerticalAlignment};

/// First and last rows containing at least one non-white pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRows {
    /// Smallest row index with content.
    pub min_y: u32,
    /// Largest row index with content.
    pub max_y: u32,
}

/// Placement candidates derived from a background scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionCandidates {
    /// White bands above and/or below the content, top band first.
    Split(Vec<Rect>),
    /// No usable band: the whole canvas is the only candidate.
    WholeCanvas(Rect),
}

impl RegionCandidates {
    /// Number of candidate rectangles.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Split(rects) => rects.len(),
            Self::WholeCanvas(_) => 1,
        }
    }

    /// Always `false`: there is at least one candidate.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// A pixel is white background when red, green, and blue all exceed
/// `threshold`. Alpha is not considered.
const fn is_white(pixel: &image::Rgba<u8>, threshold: u8) -> bool {
    let [r, g, b, _] = pixel.0;
    r > threshold && g > threshold && b > threshold
}

/// Find the first and last rows that contain a non-white pixel.
///
/// Returns `None` for an all-white background.
#[must_use]
pub fn content_rows(image: &RgbaImage, threshold: u8) -> Option<ContentRows> {
    let mut bounds: Option<ContentRows> = None;
    for (y, mut row) in (0u32..).zip(image.rows()) {
        if row.any(|p| !is_white(p, threshold)) {
            bounds = Some(match bounds {
                None => ContentRows { min_y: y, max_y: y },
                Some(b) => ContentRows { max_y: y, ..b },
            });
        }
    }
    trace!("content rows: {bounds:?}");
    bounds
}

/// Build the candidate rectangles for a canvas given its content rows.
#[must_use]
pub fn candidate_rects(canvas: Dimensions, content: Option<ContentRows>) -> RegionCandidates {
    let whole = Rect::whole(canvas);
    let Some(ContentRows { min_y, max_y }) = content else {
        return RegionCandidates::WholeCanvas(whole);
    };

    let mut rects = Vec::with_capacity(2);
    if min_y > 0 {
        rects.push(Rect::new(0, 0, canvas.width, min_y));
    }
    if max_y + 1 < canvas.height {
        rects.push(Rect::new(
            0,
            max_y + 1,
            canvas.width,
            canvas.height - max_y - 1,
        ));
    }
    rects.retain(|r| !r.is_degenerate());

    if rects.is_empty() {
        RegionCandidates::WholeCanvas(whole)
    } else {
        RegionCandidates::Split(rects)
    }
}

/// Pick the target rectangle according to the vertical preference.
///
/// `Top` wants the band starting at row 0, `Bottom` the band that does
/// not, and `Center` the largest band (earlier candidate on ties). The
/// whole-canvas fallback satisfies every preference.
///
/// # Errors
///
/// Returns [`CompositionError::SelectionPrecondition`] when `Top` or
/// `Bottom` is requested but that band was not generated.
pub fn select_rect(
    candidates: &RegionCandidates,
    preference: VerticalAlignment,
) -> Result<Rect, CompositionError> {
    let rects = match candidates {
        RegionCandidates::WholeCanvas(rect) => return Ok(*rect),
        RegionCandidates::Split(rects) => rects,
    };

    let chosen = match preference {
        VerticalAlignment::Top => rects.iter().find(|r| r.y == 0).copied(),
        VerticalAlignment::Bottom => rects.iter().find(|r| r.y != 0).copied(),
        VerticalAlignment::Center => rects.iter().copied().reduce(|best, r| {
            if r.area() > best.area() { r } else { best }
        }),
    };

    chosen.ok_or(CompositionError::SelectionPrecondition { preference })
}

/// Scan the background and return the selected target rectangle along
/// with how many candidates were considered.
///
/// # Errors
///
/// See [`select_rect`].
pub fn detect_target(
    background: &RgbaImage,
    threshold: u8,
    preference: VerticalAlignment,
) -> Result<(Rect, usize), CompositionError> {
    let canvas = Dimensions::of(background);
    let candidates = candidate_rects(canvas, content_rows(background, threshold));
    let target = select_rect(&candidates, preference)?;
    debug!(
        "white region: {} candidate(s), preference {preference}, selected {target}",
        candidates.len()
    );
    Ok((target, candidates.len()))
}
