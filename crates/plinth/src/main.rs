//! plinth: composite product images onto backgrounds from the command line.
//!
//! Thin file-system front end over `plinth-pipeline`:
//!
//! - `compose`: one background and one product into one output image
//! - `batch`: a JSON manifest of items, each with its own images
//! - `trim-resize`: crop an image to its content and resize it
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin plinth -- compose bg.png shoe.png -o out.png
//! cargo run --release --bin plinth -- batch items.json --output-dir out/
//! RUST_LOG=plinth_pipeline=debug plinth compose ...
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};
use plinth_pipeline::batch::{ERROR_FIELD, SUCCESS_FIELD};
use plinth_pipeline::diagnostics::Clock;
use plinth_pipeline::{
    Alignment, BinaryData, CompositionConfig, CompositionMode, Dimensions, HorizontalAlignment,
    Item, OutputFormat, ResizeFilter, TrimResizeConfig, VerticalAlignment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Composite product images onto background images.
#[derive(Parser)]
#[command(name = "plinth", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Composite one product onto one background.
    Compose {
        /// Background image (PNG, JPEG, BMP, WebP).
        background: PathBuf,

        /// Product image, ideally with a transparent or white surround.
        product: PathBuf,

        /// Where to write the composed image.
        #[arg(short, long)]
        output: PathBuf,

        /// Print per-stage diagnostics to stderr.
        #[arg(long)]
        diagnostics: bool,

        /// Print diagnostics as JSON to stdout.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Composite every item of a JSON manifest.
    ///
    /// The manifest is an array of objects with optional `fields` (carried
    /// through) and `binary` mapping item keys to image paths relative to
    /// the manifest. A JSON report of the processed items is printed to
    /// stdout. An entry whose images cannot be read is reported as
    /// failed; outputs that would share a file name get the item index
    /// appended.
    Batch {
        /// Manifest path.
        manifest: PathBuf,

        /// Directory for composed images.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Stop at the first failing item.
        #[arg(long)]
        strict: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Trim a uniform border and resize to an exact size.
    TrimResize {
        /// Input image.
        input: PathBuf,

        /// Where to write the result.
        #[arg(short, long)]
        output: PathBuf,

        /// Output width in pixels.
        #[arg(long, default_value_t = TrimResizeConfig::DEFAULT_EDGE)]
        width: u32,

        /// Output height in pixels.
        #[arg(long, default_value_t = TrimResizeConfig::DEFAULT_EDGE)]
        height: u32,

        /// Resampling filter.
        #[arg(long, value_enum, default_value_t = Filter::Lanczos3)]
        filter: Filter,

        /// Output encoding.
        #[arg(long, value_enum, default_value_t = Format::Png)]
        format: Format,

        /// JPEG quality (1-100), used with `--format jpeg`.
        #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
        quality: u8,
    },
}

/// Composition parameters shared by `compose` and `batch`.
#[derive(Args)]
struct ConfigArgs {
    /// Margin in pixels between the product and its target rectangle.
    #[arg(long, default_value_t = CompositionConfig::DEFAULT_PADDING)]
    padding: u32,

    /// How the target rectangle is chosen.
    #[arg(long, value_enum, default_value_t = Mode::Detect)]
    mode: Mode,

    /// Horizontal alignment inside the target.
    #[arg(long, value_enum, default_value_t = Horizontal::Center)]
    horizontal: Horizontal,

    /// Vertical alignment inside the target; also picks the white band.
    #[arg(long, value_enum, default_value_t = Vertical::Bottom)]
    vertical: Vertical,

    /// Clockwise product rotation in degrees (0 = automatic).
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    rotation: i32,

    /// Channel value above which a pixel counts as white.
    #[arg(long, default_value_t = CompositionConfig::DEFAULT_WHITE_THRESHOLD)]
    white_threshold: u8,

    /// Height/width ratio above which the product is turned on its side.
    #[arg(long, default_value_t = CompositionConfig::DEFAULT_AUTO_ROTATE_ASPECT)]
    auto_rotate_aspect: f64,

    /// Step between candidate angles of the fill-mode rotation search.
    #[arg(long, default_value_t = CompositionConfig::DEFAULT_ROTATION_STEP_DEGREES, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..=180))]
    rotation_step: u32,

    /// Resampling filter for scaling the product.
    #[arg(long, value_enum, default_value_t = Filter::Lanczos3)]
    filter: Filter,

    /// Output encoding.
    #[arg(long, value_enum, default_value_t = Format::Png)]
    format: Format,

    /// JPEG quality (1-100), used with `--format jpeg`.
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    quality: u8,

    /// Full composition config as a JSON string.
    ///
    /// When provided, all other composition flags are ignored. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Target selection mode.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Largest white band above or below the background content.
    Detect,
    /// Whole background, with a rotation search.
    Fill,
}

#[derive(Clone, Copy, ValueEnum)]
enum Horizontal {
    Start,
    Center,
    End,
}

#[derive(Clone, Copy, ValueEnum)]
enum Vertical {
    Top,
    Center,
    Bottom,
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation.
    Triangle,
    /// Bicubic Catmull-Rom.
    CatmullRom,
    /// Gaussian (smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Png,
    Jpeg,
    Webp,
}

impl From<Filter> for ResizeFilter {
    fn from(value: Filter) -> Self {
        match value {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

const fn output_format(format: Format, quality: u8) -> OutputFormat {
    match format {
        Format::Png => OutputFormat::Png,
        Format::Jpeg => OutputFormat::Jpeg { quality },
        Format::Webp => OutputFormat::Webp,
    }
}

/// Build a [`CompositionConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual flags are ignored.
fn config_from_cli(args: &ConfigArgs) -> Result<CompositionConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(CompositionConfig {
        padding: args.padding,
        mode: match args.mode {
            Mode::Detect => CompositionMode::DetectWhiteRegion,
            Mode::Fill => CompositionMode::FillEntireBackground,
        },
        alignment: Alignment::new(
            match args.horizontal {
                Horizontal::Start => HorizontalAlignment::Start,
                Horizontal::Center => HorizontalAlignment::Center,
                Horizontal::End => HorizontalAlignment::End,
            },
            match args.vertical {
                Vertical::Top => VerticalAlignment::Top,
                Vertical::Center => VerticalAlignment::Center,
                Vertical::Bottom => VerticalAlignment::Bottom,
            },
        ),
        manual_rotation_degrees: args.rotation,
        white_threshold: args.white_threshold,
        auto_rotate_aspect: args.auto_rotate_aspect,
        rotation_step_degrees: args.rotation_step,
        resize_filter: args.filter.into(),
        output_format: output_format(args.format, args.quality),
        ..CompositionConfig::default()
    })
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

fn read(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

fn write(path: &Path, data: &[u8]) -> Result<(), String> {
    std::fs::write(path, data).map_err(|e| format!("Error writing {}: {e}", path.display()))
}

/// MIME type guessed from a file extension.
fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

fn run_compose(
    background: &Path,
    product: &Path,
    output: &Path,
    config: &CompositionConfig,
    diagnostics: bool,
    json: bool,
) -> Result<(), String> {
    let background_bytes = read(background)?;
    let product_bytes = read(product)?;
    debug!("config: {config:?}");

    let (composed, diag) = plinth_pipeline::compose_with_diagnostics(
        &background_bytes,
        &product_bytes,
        config,
        &StdClock,
    )
    .map_err(|e| format!("Composition error: {e}"))?;

    write(output, &composed.data)?;
    info!(
        "wrote {} ({} bytes, {})",
        output.display(),
        composed.data.len(),
        composed.dimensions
    );

    if json {
        let text = serde_json::to_string_pretty(&diag)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{text}");
    }
    if diagnostics {
        eprintln!("{}", diag.report());
    }
    Ok(())
}

/// One manifest entry: carried-through fields plus image paths by key.
#[derive(Deserialize)]
struct ManifestEntry {
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    binary: BTreeMap<String, PathBuf>,
}

/// One processed item as reported on stdout.
#[derive(Serialize)]
struct ReportEntry {
    fields: Map<String, Value>,
    files: BTreeMap<String, PathBuf>,
}

impl ReportEntry {
    fn succeeded(&self) -> bool {
        self.fields.get(SUCCESS_FIELD) == Some(&Value::Bool(true))
    }
}

/// A manifest entry with an image that could not be read.
struct LoadFailure {
    item: Item,
    message: String,
}

impl LoadFailure {
    /// Record the read error on the item the same way composition
    /// failures are recorded.
    fn into_failed_item(self) -> Item {
        let mut item = self.item;
        item.fields
            .insert(SUCCESS_FIELD.to_string(), Value::Bool(false));
        item.fields
            .insert(ERROR_FIELD.to_string(), Value::String(self.message));
        item
    }
}

fn load_entry(base: &Path, entry: ManifestEntry) -> Result<Item, LoadFailure> {
    let mut item = Item {
        fields: entry.fields,
        ..Item::default()
    };
    for (key, relative) in entry.binary {
        let path = base.join(&relative);
        let bytes = match read(&path) {
            Ok(bytes) => bytes,
            Err(message) => return Err(LoadFailure { item, message }),
        };
        let mut data = BinaryData::new(bytes, mime_for(&path));
        if let Some(name) = relative.file_name().and_then(|n| n.to_str()) {
            data = data.with_file_name(name);
        }
        item.binary.insert(key, data);
    }
    Ok(item)
}

/// Parse the manifest and read each entry's images. An unreadable image
/// only fails its own entry; an unreadable or malformed manifest fails
/// the whole run.
fn load_manifest(manifest: &Path) -> Result<Vec<Result<Item, LoadFailure>>, String> {
    let text = std::fs::read_to_string(manifest)
        .map_err(|e| format!("Error reading {}: {e}", manifest.display()))?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&text)
        .map_err(|e| format!("Error parsing {}: {e}", manifest.display()))?;
    let base = manifest.parent().unwrap_or_else(|| Path::new("."));

    Ok(entries
        .into_iter()
        .map(|entry| load_entry(base, entry))
        .collect())
}

/// Claim a file name not yet written in this run. A repeated name gets
/// the item index appended to its stem.
fn unique_file_name(name: &str, index: usize, taken: &mut BTreeSet<String>) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());

    let mut candidate = name.to_string();
    let mut attempt = 0usize;
    while taken.contains(&candidate) {
        let suffix = if attempt == 0 {
            index.to_string()
        } else {
            format!("{index}_{attempt}")
        };
        candidate = ext.map_or_else(
            || format!("{stem}_{suffix}"),
            |ext| format!("{stem}_{suffix}.{ext}"),
        );
        attempt += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Write every binary of `item` under `dir` and describe it for the report.
fn save_item(
    item: Item,
    dir: &Path,
    index: usize,
    taken: &mut BTreeSet<String>,
) -> Result<ReportEntry, String> {
    let mut files = BTreeMap::new();
    for (key, data) in item.binary {
        let wanted = data
            .file_name
            .unwrap_or_else(|| format!("item_{index}_{key}"));
        let name = unique_file_name(&wanted, index, taken);
        if name != wanted {
            debug!("item {index}: {wanted} already written, using {name}");
        }
        let path = dir.join(name);
        write(&path, &data.data)?;
        files.insert(key, path);
    }
    Ok(ReportEntry {
        fields: item.fields,
        files,
    })
}

/// Compose every manifest entry and write the outputs to `output_dir`.
///
/// Entries whose images cannot be read are reported as failed and the
/// rest still run, unless `strict` is set, in which case the first
/// unreadable or failing entry aborts the run.
fn run_batch(
    manifest: &Path,
    output_dir: &Path,
    strict: bool,
    config: &CompositionConfig,
) -> Result<Vec<ReportEntry>, String> {
    config.validate().map_err(|e| e.to_string())?;
    let loaded = load_manifest(manifest)?;
    info!("loaded {} item(s) from {}", loaded.len(), manifest.display());

    let processed = if strict {
        let items = loaded
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                entry.map_err(|failure| format!("item {index} failed: {}", failure.message))
            })
            .collect::<Result<Vec<_>, String>>()?;
        plinth_pipeline::process_items_strict(items, config).map_err(|e| e.to_string())?
    } else {
        loaded
            .into_iter()
            .enumerate()
            .map(|(index, entry)| match entry {
                Ok(item) => plinth_pipeline::process_item(index, item, config),
                Err(failure) => {
                    warn!("item {index}: {}", failure.message);
                    failure.into_failed_item()
                }
            })
            .collect()
    };

    std::fs::create_dir_all(output_dir)
        .map_err(|e| format!("Error creating {}: {e}", output_dir.display()))?;

    // Only successful items carry a composed image worth writing.
    let mut taken = BTreeSet::new();
    processed
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if item.succeeded() == Some(true) {
                let output = item
                    .binary
                    .get(&config.output_key)
                    .cloned()
                    .map(|data| (config.output_key.clone(), data));
                let item = Item {
                    binary: output.into_iter().collect(),
                    ..item
                };
                save_item(item, output_dir, index, &mut taken)
            } else {
                Ok(ReportEntry {
                    fields: item.fields,
                    files: BTreeMap::new(),
                })
            }
        })
        .collect()
}

/// Run a batch, print its report, and fail if any item failed.
fn batch_command(
    manifest: &Path,
    output_dir: &Path,
    strict: bool,
    config: &CompositionConfig,
) -> Result<(), String> {
    let report = run_batch(manifest, output_dir, strict, config)?;
    let text = serde_json::to_string_pretty(&report)
        .map_err(|e| format!("Error serializing report: {e}"))?;
    println!("{text}");

    let failed = report.iter().filter(|entry| !entry.succeeded()).count();
    if failed == 0 {
        Ok(())
    } else {
        Err(format!("{failed} of {} item(s) failed", report.len()))
    }
}

fn run_trim_resize(input: &Path, output: &Path, config: &TrimResizeConfig) -> Result<(), String> {
    let bytes = read(input)?;
    let data = plinth_pipeline::trim_and_resize(&bytes, config)
        .map_err(|e| format!("Trim/resize error: {e}"))?;
    write(output, &data)?;
    info!("wrote {} ({} bytes)", output.display(), data.len());
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Compose {
            background,
            product,
            output,
            diagnostics,
            json,
            config,
        } => config_from_cli(&config).and_then(|config| {
            run_compose(&background, &product, &output, &config, diagnostics, json)
        }),
        Command::Batch {
            manifest,
            output_dir,
            strict,
            config,
        } => config_from_cli(&config)
            .and_then(|config| batch_command(&manifest, &output_dir, strict, &config)),
        Command::TrimResize {
            input,
            output,
            width,
            height,
            filter,
            format,
            quality,
        } => {
            let config = TrimResizeConfig {
                size: Dimensions::new(width, height),
                filter: filter.into(),
                format: output_format(format, quality),
                ..TrimResizeConfig::default()
            };
            run_trim_resize(&input, &output, &config)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use clap::CommandFactory;
    use image::{Rgba, RgbaImage};
    use serde_json::json;

    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const RED: Rgba<u8> = Rgba([220, 20, 20, 255]);
    const BLUE: Rgba<u8> = Rgba([20, 20, 220, 255]);

    fn unique_temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("plinth-{label}-test-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    /// Write a solid-color PNG at `dir/relative`, creating parent dirs.
    fn write_png(dir: &Path, relative: &str, width: u32, height: u32, color: Rgba<u8>) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbaImage::from_pixel(width, height, color).save(&path).unwrap();
    }

    fn write_manifest(dir: &Path, entries: &Value) -> PathBuf {
        let path = dir.join("manifest.json");
        std::fs::write(&path, serde_json::to_vec_pretty(entries).unwrap()).unwrap();
        path
    }

    fn entry(sku: &str, product: &str) -> Value {
        json!({
            "fields": { "sku": sku },
            "binary": { "background": "bg.png", "product": product },
        })
    }

    fn compose_args(args: &[&str]) -> ConfigArgs {
        let argv = ["plinth", "compose", "bg.png", "p.png", "-o", "out.png"]
            .into_iter()
            .chain(args.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Compose { config, .. } => config,
            _ => unreachable!("parsed a compose command"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flag_defaults_match_library_defaults() {
        let config = config_from_cli(&compose_args(&[])).unwrap();
        assert_eq!(config, CompositionConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let config = config_from_cli(&compose_args(&[
            "--mode",
            "fill",
            "--rotation",
            "-15",
            "--vertical",
            "top",
            "--format",
            "jpeg",
            "--quality",
            "70",
        ]))
        .unwrap();
        assert_eq!(config.mode, CompositionMode::FillEntireBackground);
        assert_eq!(config.manual_rotation_degrees, -15);
        assert_eq!(config.alignment.vertical, VerticalAlignment::Top);
        assert_eq!(config.output_format, OutputFormat::Jpeg { quality: 70 });
    }

    #[test]
    fn config_json_wins_over_flags() {
        let config =
            config_from_cli(&compose_args(&["--padding", "99", "--config-json", r#"{"padding": 3}"#]))
                .unwrap();
        assert_eq!(config.padding, 3);
        assert_eq!(config.white_threshold, CompositionConfig::DEFAULT_WHITE_THRESHOLD);
    }

    #[test]
    fn bad_config_json_is_reported() {
        let err = config_from_cli(&compose_args(&["--config-json", "{"])).unwrap_err();
        assert!(err.starts_with("Error parsing --config-json"));
    }

    #[test]
    fn zero_rotation_step_is_rejected_by_parser() {
        let argv = [
            "plinth",
            "batch",
            "items.json",
            "--rotation-step",
            "0",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn mime_guess_by_extension() {
        assert_eq!(mime_for(Path::new("a/b.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("x.webp")), "image/webp");
        assert_eq!(mime_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn repeated_product_names_get_distinct_outputs() {
        let dir = unique_temp_dir("same-stem");
        write_png(&dir, "bg.png", 200, 200, WHITE);
        write_png(&dir, "a/mug.png", 40, 40, RED);
        write_png(&dir, "b/mug.png", 40, 40, BLUE);
        let manifest = write_manifest(&dir, &json!([entry("1", "a/mug.png"), entry("2", "b/mug.png")]));
        let out = dir.join("out");

        let report = run_batch(&manifest, &out, false, &CompositionConfig::default()).unwrap();

        assert!(report.iter().all(ReportEntry::succeeded));
        let first = &report[0].files["data"];
        let second = &report[1].files["data"];
        assert_ne!(first, second);
        assert_eq!(first, &out.join("mug_composited.png"));
        assert_eq!(second, &out.join("mug_composited_1.png"));
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);

        // Each file holds its own product, nothing was overwritten.
        let center = |path: &Path| *image::open(path).unwrap().to_rgba8().get_pixel(100, 100);
        assert!(center(first).0[0] > 180 && center(first).0[2] < 60);
        assert!(center(second).0[2] > 180 && center(second).0[0] < 60);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unique_file_name_keeps_first_and_suffixes_repeats() {
        let mut taken = BTreeSet::new();
        assert_eq!(unique_file_name("mug.png", 0, &mut taken), "mug.png");
        assert_eq!(unique_file_name("mug.png", 3, &mut taken), "mug_3.png");
        assert_eq!(unique_file_name("mug.png", 3, &mut taken), "mug_3_1.png");
        assert_eq!(unique_file_name("raw", 5, &mut taken), "raw");
        assert_eq!(unique_file_name("raw", 6, &mut taken), "raw_6");
    }

    #[test]
    fn unreadable_image_fails_only_its_item() {
        let dir = unique_temp_dir("missing-file");
        write_png(&dir, "bg.png", 200, 200, WHITE);
        write_png(&dir, "first.png", 40, 40, RED);
        write_png(&dir, "third.png", 40, 40, BLUE);
        let manifest = write_manifest(
            &dir,
            &json!([entry("1", "first.png"), entry("2", "missing.png"), entry("3", "third.png")]),
        );
        let out = dir.join("out");

        let report = run_batch(&manifest, &out, false, &CompositionConfig::default()).unwrap();

        let skus: Vec<_> = report.iter().map(|e| e.fields["sku"].clone()).collect();
        assert_eq!(skus, [json!("1"), json!("2"), json!("3")]);
        assert!(report[0].succeeded());
        assert!(report[2].succeeded());
        assert_eq!(report[1].fields[SUCCESS_FIELD], json!(false));
        let error = report[1].fields[ERROR_FIELD].as_str().unwrap();
        assert!(error.contains("missing.png"), "{error}");
        assert!(report[1].files.is_empty());
        assert!(report[0].files["data"].exists());
        assert!(report[2].files["data"].exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn strict_batch_stops_on_unreadable_image() {
        let dir = unique_temp_dir("missing-file-strict");
        write_png(&dir, "bg.png", 200, 200, WHITE);
        write_png(&dir, "first.png", 40, 40, RED);
        let manifest = write_manifest(&dir, &json!([entry("1", "first.png"), entry("2", "missing.png")]));

        let err = run_batch(&manifest, &dir.join("out"), true, &CompositionConfig::default())
            .err()
            .unwrap();
        assert!(err.starts_with("item 1 failed"), "{err}");
        assert!(err.contains("missing.png"), "{err}");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_manifest_fails_the_run() {
        let dir = unique_temp_dir("bad-manifest");
        let manifest = dir.join("manifest.json");
        std::fs::write(&manifest, "{ not json").unwrap();

        let err = run_batch(&manifest, &dir.join("out"), false, &CompositionConfig::default())
            .err()
            .unwrap();
        assert!(err.starts_with("Error parsing"), "{err}");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
