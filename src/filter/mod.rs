//! Filters - caller-supplied predicates that disambiguate shared barcodes.
//!
//! One barcode may legitimately resolve to several records of the same model
//! (e.g. the same lot name in two companies). Callers narrow the candidates
//! with a [`Filters`] set: per model, a list of `field = value` or
//! `field in [values]` conditions. The same set is converted to remote-side
//! [`DomainTerm`]s when the cache has to ask the server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;

/// Expected value for one filtered field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Field must be one of the listed values.
    AnyOf(Vec<Value>),
    /// Field must equal the value.
    One(Value),
}

impl FilterValue {
    /// Test a field value. A missing field compares as `null`.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = actual.unwrap_or(&Value::Null);
        match self {
            FilterValue::One(expected) => expected == actual,
            FilterValue::AnyOf(expected) => expected.contains(actual),
        }
    }
}

/// Field name to expected value, for a single model.
pub type FieldFilter = BTreeMap<String, FilterValue>;

/// Per-model record filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, FieldFilter>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `model.field == value`.
    pub fn field(
        mut self,
        model: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.0
            .entry(model.into())
            .or_default()
            .insert(field.into(), FilterValue::One(value.into()));
        self
    }

    /// Require `model.field` to be one of `values`.
    pub fn any_of<V: Into<Value>>(
        mut self,
        model: impl Into<String>,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.0
            .entry(model.into())
            .or_default()
            .insert(field.into(), FilterValue::AnyOf(values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|fields| fields.is_empty())
    }

    pub fn for_model(&self, model: &str) -> Option<&FieldFilter> {
        self.0.get(model)
    }

    /// Whether `record` of `model` passes every condition set for `model`.
    /// Models without conditions accept every record.
    pub fn matches(&self, model: &str, record: &Record) -> bool {
        match self.for_model(model) {
            Some(fields) => fields
                .iter()
                .all(|(field, expected)| expected.matches(record.get(field))),
            None => true,
        }
    }

    /// Convert to remote-side predicates grouped per model.
    pub fn to_domains(&self) -> DomainsByModel {
        self.0
            .iter()
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(model, fields)| {
                let terms = fields
                    .iter()
                    .map(|(field, expected)| DomainTerm::from_filter(field, expected))
                    .collect();
                (model.clone(), terms)
            })
            .collect()
    }

    /// Canonical, order-insensitive key for memoizing lookups.
    pub fn key(&self) -> FilterKey {
        let models = self
            .0
            .iter()
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(model, fields)| {
                let fields = fields
                    .iter()
                    .map(|(field, expected)| (field.clone(), canonical(expected)))
                    .collect();
                (model.clone(), fields)
            })
            .collect();
        FilterKey(models)
    }
}

/// Canonical form of a [`Filters`] set.
///
/// Models and fields are sorted and every expected value is rendered as
/// compact JSON, so equal filter sets hash identically whatever order they
/// were built in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterKey(BTreeMap<String, BTreeMap<String, String>>);

impl FilterKey {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn canonical(expected: &FilterValue) -> String {
    // serde_json objects are key-sorted, so Display output is canonical.
    match expected {
        FilterValue::One(value) => value.to_string(),
        FilterValue::AnyOf(values) => format!("in{}", Value::Array(values.clone())),
    }
}

/// Comparison used by a remote domain term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "in")]
    In,
}

/// A single remote-side predicate: `field <operator> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTerm {
    pub field: String,
    pub operator: DomainOperator,
    pub value: Value,
}

impl DomainTerm {
    fn from_filter(field: &str, expected: &FilterValue) -> Self {
        match expected {
            FilterValue::One(value) => DomainTerm {
                field: field.to_string(),
                operator: DomainOperator::Eq,
                value: value.clone(),
            },
            FilterValue::AnyOf(values) => DomainTerm {
                field: field.to_string(),
                operator: DomainOperator::In,
                value: Value::Array(values.clone()),
            },
        }
    }

    /// Evaluate this term against a record.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(&self.field).unwrap_or(&Value::Null);
        match self.operator {
            DomainOperator::Eq => &self.value == actual,
            DomainOperator::In => self
                .value
                .as_array()
                .map(|values| values.contains(actual))
                .unwrap_or(false),
        }
    }
}

/// Remote-side predicates grouped per model.
pub type DomainsByModel = BTreeMap<String, Vec<DomainTerm>>;
