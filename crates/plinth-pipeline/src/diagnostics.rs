//! Composition diagnostics: timing and geometry for each stage.
//!
//! [`compose_with_diagnostics`] runs the staged [`Pipeline`] and records
//! how long each stage took alongside the numbers it produced. Time is
//! read through the caller's [`Clock`].
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;
use crate::types::{
    ComposedImage, CompositionConfig, CompositionError, CompositionMode, Dimensions, OutputFormat,
    Rect,
};

/// Source of monotonic timestamps.
///
/// The `plinth` binary supplies one backed by [`std::time::Instant`].
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionDiagnostics {
    /// Decoding both inputs.
    pub decode: StageDiagnostics,
    /// Target selection, rotation and placement.
    pub plan: StageDiagnostics,
    /// Scaling and compositing.
    pub render: StageDiagnostics,
    /// Output encoding.
    pub encode: StageDiagnostics,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the outcome.
    pub summary: CompositionSummary,
}

/// Diagnostics for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding.
    Decode {
        /// Combined size of the two encoded inputs.
        input_bytes: usize,
        /// Decoded background size.
        background: Dimensions,
        /// Decoded product size.
        product: Dimensions,
    },
    /// Geometry planning.
    Plan {
        /// Composition mode used.
        mode: CompositionMode,
        /// Rectangle the product was fitted into.
        target: Rect,
        /// Clockwise rotation applied to the product.
        rotation_degrees: i32,
        /// White bands found, or angles evaluated in fill mode.
        candidates: usize,
        /// Scaled product size.
        scaled: Dimensions,
        /// Left edge of the product.
        offset_x: u32,
        /// Top edge of the product.
        offset_y: u32,
    },
    /// Scaling and compositing.
    Render {
        /// Composed image width.
        width: u32,
        /// Composed image height.
        height: u32,
    },
    /// Output encoding.
    Encode {
        /// Output encoding.
        format: OutputFormat,
        /// Size of the encoded output.
        output_bytes: usize,
    },
}

/// High-level outcome of a composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionSummary {
    /// Output size, equal to the background size.
    pub output: Dimensions,
    /// Fraction of the output covered by the product's bounding box.
    pub coverage: f64,
}

impl CompositionDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Composition Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!("Output: {}", self.summary.output));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<12} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Decode", &self.decode),
            ("Plan", &self.plan),
            ("Render", &self.render),
            ("Encode", &self.encode),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<12} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Product covers {:.1}% of the output",
            self.summary.coverage * 100.0
        ));

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            background,
            product,
        } => format!("{input_bytes} bytes -> background {background}, product {product}"),
        StageMetrics::Plan {
            mode,
            target,
            rotation_degrees,
            candidates,
            scaled,
            offset_x,
            offset_y,
        } => format!(
            "{mode} target={target} rot={rotation_degrees}° candidates={candidates} {scaled} at ({offset_x}, {offset_y})"
        ),
        StageMetrics::Render { width, height } => format!("{width}x{height}"),
        StageMetrics::Encode {
            format,
            output_bytes,
        } => format!("{format} {output_bytes} bytes"),
    }
}

#[allow(clippy::cast_precision_loss)]
fn coverage(scaled: Dimensions, output: Dimensions) -> f64 {
    if output.area() == 0 {
        0.0
    } else {
        scaled.area() as f64 / output.area() as f64
    }
}

/// Compose like [`crate::compose`], timing every stage with `clock`.
///
/// # Errors
///
/// Returns the same errors as [`crate::compose`].
pub fn compose_with_diagnostics(
    background: &[u8],
    product: &[u8],
    config: &CompositionConfig,
    clock: &impl Clock,
) -> Result<(ComposedImage, CompositionDiagnostics), CompositionError> {
    let start = clock.now();

    let t = clock.now();
    let decoded = Pipeline::new(background, product, config.clone()).decode()?;
    let decode = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Decode {
            input_bytes: decoded.input_bytes(),
            background: Dimensions::of(decoded.background()),
            product: Dimensions::of(decoded.product()),
        },
    };

    let t = clock.now();
    let planned = decoded.plan()?;
    let duration = clock.elapsed(&t);
    let placement = planned.placement();
    let plan = StageDiagnostics {
        duration,
        metrics: StageMetrics::Plan {
            mode: config.mode,
            target: planned.target(),
            rotation_degrees: planned.rotation_degrees(),
            candidates: planned.candidates(),
            scaled: placement.scaled,
            offset_x: placement.offset_x,
            offset_y: placement.offset_y,
        },
    };

    let t = clock.now();
    let rendered = planned.render();
    let duration = clock.elapsed(&t);
    let (width, height) = rendered.image().dimensions();
    let render = StageDiagnostics {
        duration,
        metrics: StageMetrics::Render { width, height },
    };

    let t = clock.now();
    let composed = rendered.encode()?;
    let encode = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Encode {
            format: composed.format,
            output_bytes: composed.data.len(),
        },
    };

    let diagnostics = CompositionDiagnostics {
        decode,
        plan,
        render,
        encode,
        total_duration: clock.elapsed(&start),
        summary: CompositionSummary {
            output: composed.dimensions,
            coverage: coverage(composed.placement.scaled, composed.dimensions),
        },
    };
    Ok((composed, diagnostics))
}
