//! Static per-model configuration: barcode fields and GS1 lengths.
//!
//! The defaults describe the warehouse models scanned by the barcode app.
//! A session may replace them from a TOML file:
//!
//! ```toml
//! gs1_nomenclature = true
//!
//! [barcode_fields]
//! "stock.location" = "barcode"
//! "stock.lot" = "name"
//!
//! [gs1_lengths]
//! "stock.location" = 13
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read cache config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cache config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A file replaces the built-in tables wholesale; sections it omits are
/// empty rather than defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Model name to the field holding its barcode.
    #[serde(default)]
    pub barcode_fields: BTreeMap<String, String>,
    /// Model name to the digit length of its GS1 segment.
    #[serde(default)]
    pub gs1_lengths: BTreeMap<String, usize>,
    /// Whether scanned barcodes follow the GS1 nomenclature. Padding
    /// aliases are only built when this is set.
    #[serde(default = "default_gs1_nomenclature")]
    pub gs1_nomenclature: bool,
}

fn default_gs1_nomenclature() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        let barcode_fields = [
            ("stock.location", "barcode"),
            ("product.product", "barcode"),
            ("product.packaging", "barcode"),
            ("stock.package.type", "barcode"),
            ("stock.picking", "name"),
            ("stock.quant.package", "name"),
            ("stock.lot", "name"),
        ];
        let gs1_lengths = [
            ("product.product", 14),
            ("product.packaging", 14),
            ("stock.location", 13),
            ("stock.quant.package", 18),
        ];

        Self {
            barcode_fields: barcode_fields
                .into_iter()
                .map(|(model, field)| (model.to_string(), field.to_string()))
                .collect(),
            gs1_lengths: gs1_lengths
                .into_iter()
                .map(|(model, length)| (model.to_string(), length))
                .collect(),
            gs1_nomenclature: true,
        }
    }
}

impl CacheConfig {
    /// A configuration with no models at all.
    pub fn empty() -> Self {
        Self {
            barcode_fields: BTreeMap::new(),
            gs1_lengths: BTreeMap::new(),
            gs1_nomenclature: true,
        }
    }

    pub fn with_barcode_field(
        mut self,
        model: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.barcode_fields.insert(model.into(), field.into());
        self
    }

    pub fn with_gs1_length(mut self, model: impl Into<String>, length: usize) -> Self {
        self.gs1_lengths.insert(model.into(), length);
        self
    }

    pub fn with_gs1_nomenclature(mut self, enabled: bool) -> Self {
        self.gs1_nomenclature = enabled;
        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn barcode_field(&self, model: &str) -> Option<&str> {
        self.barcode_fields.get(model).map(String::as_str)
    }

    /// GS1 length for `model`, or `None` when the model does not take part
    /// in GS1 padding (or the nomenclature is not GS1).
    pub fn gs1_length(&self, model: &str) -> Option<usize> {
        if !self.gs1_nomenclature {
            return None;
        }
        self.gs1_lengths.get(model).copied()
    }

    pub fn is_configured(&self, model: &str) -> bool {
        self.barcode_fields.contains_key(model)
    }

    /// Models that can be looked up by barcode.
    pub fn barcode_models(&self) -> impl Iterator<Item = &str> {
        self.barcode_fields.keys().map(String::as_str)
    }
}
