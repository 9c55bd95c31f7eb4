//! Indices behind the barcode cache.
//!
//! Invariants kept by [`CacheState::merge`]:
//! - every record in `records[model][id]` is listed under its barcode in
//!   `barcodes[model]`, and under its GS1-padded barcode when the model has
//!   a GS1 length, unless that alias already belonged to another record;
//! - an id appears at most once per bucket, and buckets keep insertion order;
//! - `records`, `barcodes` and `attempted` only grow.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CacheConfig;
use crate::filter::{FilterKey, Filters};
use crate::gs1;
use crate::record::{Record, RecordId, Snapshot};

/// A GS1 alias that could not be registered because it already resolves to
/// another record. The earlier mapping is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasCollision {
    pub model: String,
    /// The record's own barcode.
    pub barcode: String,
    /// The padded form that collided.
    pub alias: String,
    /// First id already registered under `alias`.
    pub kept_id: RecordId,
    /// Id of the record whose alias was rejected.
    pub rejected_id: RecordId,
}

/// Identity of one remote lookup, used to fetch each miss at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct LookupKey {
    barcode: String,
    model: Option<String>,
    filters: FilterKey,
}

impl LookupKey {
    pub(crate) fn new(barcode: &str, model: Option<&str>, filters: &Filters) -> Self {
        Self {
            barcode: barcode.to_string(),
            model: model.map(str::to_string),
            filters: filters.key(),
        }
    }

    /// Same lookup with no filters: a broader request that already covers
    /// this one.
    pub(crate) fn unfiltered(&self) -> Self {
        Self {
            barcode: self.barcode.clone(),
            model: self.model.clone(),
            filters: FilterKey::default(),
        }
    }
}

/// A lookup queued by `fetch_later`.
#[derive(Debug, Clone)]
pub(crate) struct DeferredLookup {
    pub(crate) barcode: String,
    pub(crate) model: Option<String>,
    pub(crate) filters: Filters,
}

/// Outcome of reading a model-scoped lookup from the indices.
pub(crate) enum Probe {
    UnknownModel,
    NoBucket,
    NoMatch,
    Hit(Record),
}

#[derive(Debug, Default)]
pub(crate) struct CacheState {
    /// model -> id -> record
    pub(crate) records: HashMap<String, HashMap<RecordId, Record>>,
    /// model -> barcode -> ids, in insertion order
    pub(crate) barcodes: HashMap<String, HashMap<String, Vec<RecordId>>>,
    /// lookups already sent to the server (or in flight)
    pub(crate) attempted: HashSet<LookupKey>,
    pub(crate) deferred: Vec<DeferredLookup>,
    pub(crate) collisions: Vec<AliasCollision>,
}

impl CacheState {
    pub(crate) fn is_known(&self, config: &CacheConfig, model: &str) -> bool {
        config.is_configured(model)
            || self.records.contains_key(model)
            || self.barcodes.contains_key(model)
    }

    /// Merge a snapshot into the indices. Returns the alias collisions that
    /// were seen for the first time.
    pub(crate) fn merge(
        &mut self,
        config: &CacheConfig,
        snapshot: &Snapshot,
    ) -> Vec<AliasCollision> {
        let mut collisions = Vec::new();

        for (model, records) in snapshot {
            let by_id = self.records.entry(model.clone()).or_default();
            let by_barcode = self.barcodes.entry(model.clone()).or_default();
            let field = config.barcode_field(model);
            let gs1_length = config.gs1_length(model);

            for record in records {
                let Some(id) = record.id() else {
                    warn!(model = %model, "skipping record without an integer id");
                    continue;
                };
                by_id.insert(id, record.clone());

                let Some(barcode) = field.and_then(|field| record.barcode(field)) else {
                    continue;
                };
                let bucket = by_barcode.entry(barcode.clone()).or_default();
                if !bucket.contains(&id) {
                    bucket.push(id);
                }

                let Some(alias) = gs1_length.and_then(|length| gs1::pad(&barcode, length)) else {
                    continue;
                };
                // Buckets are never empty, so `ids[0]` is the earliest owner.
                let existing = by_barcode
                    .get(&alias)
                    .map(|ids| (ids.contains(&id), ids[0]));
                match existing {
                    None => {
                        by_barcode.insert(alias, vec![id]);
                    }
                    Some((true, _)) => {}
                    Some((false, kept_id)) => {
                        let collision = AliasCollision {
                            model: model.clone(),
                            barcode,
                            alias,
                            kept_id,
                            rejected_id: id,
                        };
                        if !self.collisions.contains(&collision) {
                            warn!(
                                model = %collision.model,
                                barcode = %collision.barcode,
                                alias = %collision.alias,
                                kept_id = collision.kept_id,
                                rejected_id = collision.rejected_id,
                                "GS1 alias already used by another record, keeping the first one"
                            );
                            self.collisions.push(collision.clone());
                            collisions.push(collision);
                        }
                    }
                }
            }
        }

        collisions
    }

    /// Read a model-scoped lookup without touching the server.
    pub(crate) fn probe(
        &self,
        config: &CacheConfig,
        barcode: &str,
        model: &str,
        filters: &Filters,
    ) -> Probe {
        if !self.is_known(config, model) {
            return Probe::UnknownModel;
        }
        let Some(ids) = self.barcodes.get(model).and_then(|index| index.get(barcode)) else {
            return Probe::NoBucket;
        };
        match self.first_match(model, ids, filters) {
            Some(record) => Probe::Hit(record.clone()),
            None => Probe::NoMatch,
        }
    }

    /// First record per model listed under `barcode` that passes `filters`.
    pub(crate) fn matches_across_models<'a>(
        &'a self,
        barcode: &'a str,
        filters: &'a Filters,
    ) -> impl Iterator<Item = (&'a String, &'a Record)> + 'a {
        self.barcodes.iter().filter_map(move |(model, index)| {
            let ids = index.get(barcode)?;
            self.first_match(model, ids, filters)
                .map(|record| (model, record))
        })
    }

    fn first_match(&self, model: &str, ids: &[RecordId], filters: &Filters) -> Option<&Record> {
        let by_id = self.records.get(model)?;
        ids.iter()
            .filter_map(|id| by_id.get(id))
            .find(|record| filters.matches(model, record))
    }
}
