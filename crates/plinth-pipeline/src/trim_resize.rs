//! Crop-to-content followed by a fixed-size resize.
//!
//! A reduced use of the same raster primitives as compositing: the
//! uniform border is trimmed and the remainder is stretched to exactly
//! the configured size. Items lacking the image pass through untouched.

use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::{BinaryData, Item, SUCCESS_FIELD};
use crate::raster;
use crate::types::{CompositionError, Dimensions, OutputFormat, ResizeFilter};

/// Settings for [`trim_and_resize`] and [`trim_resize_items`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimResizeConfig {
    /// Item binary key holding the image, replaced in place.
    pub key: String,
    /// Output size.
    pub size: Dimensions,
    /// Resampling filter.
    pub filter: ResizeFilter,
    /// Output encoding.
    pub format: OutputFormat,
}

impl TrimResizeConfig {
    /// Default output edge length in pixels.
    pub const DEFAULT_EDGE: u32 = 1000;

    fn validate(&self) -> Result<(), CompositionError> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(CompositionError::InvalidConfig(format!(
                "output size must be non-zero, got {}",
                self.size
            )));
        }
        Ok(())
    }
}

impl Default for TrimResizeConfig {
    fn default() -> Self {
        Self {
            key: "data".to_string(),
            size: Dimensions::new(Self::DEFAULT_EDGE, Self::DEFAULT_EDGE),
            filter: ResizeFilter::default(),
            format: OutputFormat::default(),
        }
    }
}

/// Decode, trim, resize to exactly `config.size`, and encode.
///
/// # Errors
///
/// Returns an error for an invalid size or when decoding or encoding
/// fails.
pub fn trim_and_resize(bytes: &[u8], config: &TrimResizeConfig) -> Result<Vec<u8>, CompositionError> {
    config.validate()?;
    let image = raster::decode(bytes)?;
    let trimmed = raster::trim(&image);
    debug!(
        "trimmed {} -> {}, resizing to {}",
        Dimensions::of(&image),
        Dimensions::of(&trimmed),
        config.size
    );
    let resized = raster::resize(&trimmed, config.size.width, config.size.height, config.filter);
    raster::encode(&resized, config.format)
}

/// Apply [`trim_and_resize`] to each item's image under `config.key`.
///
/// Items without that key are returned unchanged. Outcomes are recorded
/// on the item like in [`crate::batch::process_items`].
#[must_use]
pub fn trim_resize_items(items: Vec<Item>, config: &TrimResizeConfig) -> Vec<Item> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, mut item)| {
            let Some(input) = item.binary.get(&config.key) else {
                debug!("item {index}: no '{}' binary, passing through", config.key);
                return item;
            };
            match trim_and_resize(&input.data, config) {
                Ok(data) => {
                    let file_name = input.file_name.as_deref().map(|name| {
                        Path::new(name)
                            .with_extension(config.format.extension())
                            .to_string_lossy()
                            .into_owned()
                    });
                    let mut output = BinaryData::new(data, config.format.mime_type());
                    output.file_name = file_name;
                    item.binary.insert(config.key.clone(), output);
                    item.fields
                        .insert(SUCCESS_FIELD.to_string(), Value::Bool(true));
                }
                Err(e) => {
                    warn!("item {index}: {e}");
                    item.mark_failed(&e);
                }
            }
            item
        })
        .collect()
}
