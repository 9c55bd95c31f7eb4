//! Records - untyped field bags delivered by the remote source of truth.
//!
//! A record is a JSON object that always carries an integer `id` and, for
//! barcode-bearing models, a barcode field whose name depends on the model
//! (see [`CacheConfig`](crate::CacheConfig)). The cache never interprets any
//! other field; filters compare them as plain JSON values.
//!
//! ## Example
//!
//! ```ignore
//! use barcode_cache::{Record, Snapshot};
//!
//! let product = Record::with_id(7).with("barcode", "601647855631").with("name", "Desk");
//! let mut snapshot = Snapshot::new();
//! snapshot.insert("product.product".into(), vec![product]);
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Record identifier. Unique per model.
pub type RecordId = i64;

/// Bulk payload of records grouped by model name.
///
/// Used both to seed a cache and as the result shape of every remote fetch.
pub type Snapshot = HashMap<String, Vec<Record>>;

/// Batched lookup request: model name to the barcodes to resolve for it.
pub type BatchRequest = BTreeMap<String, Vec<String>>;

/// A single business record.
///
/// `Clone` is a full structural copy, so a record handed out by the cache
/// can be mutated freely without touching the cached copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Create a record carrying only its `id`.
    pub fn with_id(id: RecordId) -> Self {
        Self::new().with("id", id)
    }

    /// Builder form of [`Record::set`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The record's `id`, if present and integral.
    pub fn id(&self) -> Option<RecordId> {
        self.0.get("id").and_then(Value::as_i64)
    }

    /// Read `field` as a barcode string.
    ///
    /// Strings are returned verbatim and integers are stringified. Empty
    /// values (`false`, `null`, `""`) and missing fields have no barcode.
    pub fn barcode(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
