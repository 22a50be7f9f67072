//! Per-item processing of workflow items.
//!
//! An [`Item`] pairs free-form JSON fields with named binary payloads.
//! Items are composed independently and in order; a failing item is
//! marked with `success: false` and an `error` message instead of
//! aborting the rest of the batch.

use std::collections::BTreeMap;
use std::path::Path;

use log::{info, warn};
use serde_json::{Map, Value};

use crate::types::{ComposedImage, CompositionConfig, CompositionError};

/// Field set to `true` or `false` on every processed item.
pub const SUCCESS_FIELD: &str = "success";
/// Field holding the error message of a failed item.
pub const ERROR_FIELD: &str = "error";

/// A named binary payload attached to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryData {
    /// Raw bytes.
    pub data: Vec<u8>,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Original or generated file name.
    pub file_name: Option<String>,
}

impl BinaryData {
    /// Wrap raw bytes with a MIME type and no file name.
    #[must_use]
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    /// Attach a file name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// One unit of work: JSON fields plus binary payloads keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    /// Non-image fields, carried through unchanged.
    pub fields: Map<String, Value>,
    /// Binary payloads by key.
    pub binary: BTreeMap<String, BinaryData>,
}

impl Item {
    /// Whether the item was processed successfully. `None` if it has not
    /// been processed.
    #[must_use]
    pub fn succeeded(&self) -> Option<bool> {
        self.fields.get(SUCCESS_FIELD).and_then(Value::as_bool)
    }

    /// Error message of a failed item.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.fields.get(ERROR_FIELD).and_then(Value::as_str)
    }

    pub(crate) fn require_binary(&self, key: &str) -> Result<&BinaryData, CompositionError> {
        self.binary
            .get(key)
            .ok_or_else(|| CompositionError::MissingInputImage {
                key: key.to_string(),
            })
    }

    pub(crate) fn mark_failed(&mut self, error: &CompositionError) {
        self.fields
            .insert(SUCCESS_FIELD.to_string(), Value::Bool(false));
        self.fields
            .insert(ERROR_FIELD.to_string(), Value::String(error.to_string()));
    }
}

/// The first failure of a strict batch run.
#[derive(Debug, thiserror::Error)]
#[error("item {index} failed: {source}")]
pub struct BatchError {
    /// Position of the failing item.
    pub index: usize,
    /// What went wrong.
    #[source]
    pub source: CompositionError,
}

/// File name for a composed image: the product's stem when known,
/// otherwise the item position.
fn output_file_name(item: &Item, config: &CompositionConfig, index: usize) -> String {
    let ext = config.output_format.extension();
    item.binary
        .get(&config.product_key)
        .and_then(|b| b.file_name.as_deref())
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .map_or_else(
            || format!("composited_{index}.{ext}"),
            |stem| format!("{stem}_composited.{ext}"),
        )
}

fn compose_item(
    item: &Item,
    config: &CompositionConfig,
) -> Result<ComposedImage, CompositionError> {
    let background = item.require_binary(&config.background_key)?;
    let product = item.require_binary(&config.product_key)?;
    crate::compose(&background.data, &product.data, config)
}

/// Replace the consumed inputs with the composed image.
fn attach_output(
    mut item: Item,
    composed: ComposedImage,
    config: &CompositionConfig,
    index: usize,
) -> Item {
    let file_name = output_file_name(&item, config, index);
    item.binary.remove(&config.background_key);
    item.binary.remove(&config.product_key);
    item.binary.insert(
        config.output_key.clone(),
        BinaryData::new(composed.data, composed.format.mime_type()).with_file_name(file_name),
    );
    item.fields
        .insert(SUCCESS_FIELD.to_string(), Value::Bool(true));
    item
}

/// Compose one item. Failures are recorded on the item.
#[must_use]
pub fn process_item(index: usize, item: Item, config: &CompositionConfig) -> Item {
    match compose_item(&item, config) {
        Ok(composed) => {
            info!(
                "item {index}: composed {} ({} bytes)",
                composed.dimensions,
                composed.data.len()
            );
            attach_output(item, composed, config, index)
        }
        Err(e) => {
            warn!("item {index}: {e}");
            let mut item = item;
            item.mark_failed(&e);
            item
        }
    }
}

/// Compose every item, keeping input order. A failing item never stops
/// the others.
#[must_use]
pub fn process_items(items: Vec<Item>, config: &CompositionConfig) -> Vec<Item> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| process_item(index, item, config))
        .collect()
}

/// Compose every item, stopping at the first failure.
///
/// # Errors
///
/// Returns a [`BatchError`] naming the first item that failed.
pub fn process_items_strict(
    items: Vec<Item>,
    config: &CompositionConfig,
) -> Result<Vec<Item>, BatchError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match compose_item(&item, config) {
            Ok(composed) => Ok(attach_output(item, composed, config, index)),
            Err(source) => Err(BatchError { index, source }),
        })
        .collect()
}
