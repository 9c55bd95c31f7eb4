//! InMemoryFetcher - catalog-backed fetcher for tests and offline sessions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;

use super::RemoteFetcher;
use crate::config::CacheConfig;
use crate::filter::DomainsByModel;
use crate::gs1;
use crate::record::{BatchRequest, Record, Snapshot};

/// Fetcher answering from an in-process catalog of records.
///
/// A record matches a scanned barcode when its barcode field equals it, or,
/// for GS1 models, when its padded barcode equals it. Call counts are kept
/// so tests can assert how many round trips a scenario cost.
///
/// Clone-friendly via Arc: clones share the catalog and the counters.
#[derive(Clone)]
pub struct InMemoryFetcher {
    config: Arc<CacheConfig>,
    catalog: Arc<RwLock<BTreeMap<String, Vec<Record>>>>,
    fetch_one_calls: Arc<AtomicUsize>,
    fetch_batch_calls: Arc<AtomicUsize>,
    last_batch: Arc<Mutex<Option<BatchRequest>>>,
    fail_next: Arc<Mutex<Option<String>>>,
}

impl InMemoryFetcher {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(RwLock::new(BTreeMap::new())),
            fetch_one_calls: Arc::new(AtomicUsize::new(0)),
            fetch_batch_calls: Arc::new(AtomicUsize::new(0)),
            last_batch: Arc::new(Mutex::new(None)),
            fail_next: Arc::new(Mutex::new(None)),
        }
    }

    /// Builder form of [`InMemoryFetcher::insert`].
    pub fn with_record(self, model: impl Into<String>, record: Record) -> Self {
        self.insert(model, record);
        self
    }

    /// Add a record to the server-side catalog.
    pub fn insert(&self, model: impl Into<String>, record: Record) {
        if let Ok(mut catalog) = self.catalog.write() {
            catalog.entry(model.into()).or_default().push(record);
        }
    }

    /// Make the next fetch (of either kind) fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        if let Ok(mut fail) = self.fail_next.lock() {
            *fail = Some(message.into());
        }
    }

    pub fn fetch_one_calls(&self) -> usize {
        self.fetch_one_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_batch_calls(&self) -> usize {
        self.fetch_batch_calls.load(Ordering::SeqCst)
    }

    /// The request passed to the most recent `fetch_batch`.
    pub fn last_batch(&self) -> Option<BatchRequest> {
        self.last_batch.lock().ok().and_then(|batch| batch.clone())
    }

    fn take_failure(&self) -> anyhow::Result<()> {
        let mut fail = self
            .fail_next
            .lock()
            .map_err(|_| anyhow!("in-memory fetcher lock poisoned"))?;
        match fail.take() {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    fn matches_barcode(&self, model: &str, record: &Record, barcode: &str) -> bool {
        let Some(field) = self.config.barcode_field(model) else {
            return false;
        };
        let Some(own) = record.barcode(field) else {
            return false;
        };
        if own == barcode {
            return true;
        }
        self.config
            .gs1_length(model)
            .and_then(|length| gs1::pad(&own, length))
            .map_or(false, |padded| padded == barcode)
    }

    fn search(
        &self,
        model: &str,
        barcodes: &[&str],
        domains: &DomainsByModel,
    ) -> anyhow::Result<Vec<Record>> {
        let catalog = self
            .catalog
            .read()
            .map_err(|_| anyhow!("in-memory fetcher lock poisoned"))?;
        let terms = domains.get(model).map(Vec::as_slice).unwrap_or_default();

        Ok(catalog
            .get(model)
            .into_iter()
            .flatten()
            .filter(|record| {
                barcodes
                    .iter()
                    .any(|barcode| self.matches_barcode(model, record, barcode))
            })
            .filter(|record| terms.iter().all(|term| term.matches(record)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RemoteFetcher for InMemoryFetcher {
    async fn fetch_one(
        &self,
        barcode: &str,
        model: Option<&str>,
        domains: &DomainsByModel,
    ) -> anyhow::Result<Snapshot> {
        self.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;

        let models: Vec<String> = match model {
            Some(model) => vec![model.to_string()],
            None => self.config.barcode_models().map(str::to_string).collect(),
        };

        let mut snapshot = Snapshot::new();
        for model in models {
            let records = self.search(&model, &[barcode], domains)?;
            if !records.is_empty() {
                snapshot.insert(model, records);
            }
        }
        Ok(snapshot)
    }

    async fn fetch_batch(&self, request: &BatchRequest) -> anyhow::Result<Snapshot> {
        self.fetch_batch_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_batch.lock() {
            *last = Some(request.clone());
        }
        self.take_failure()?;

        let no_domains = DomainsByModel::new();
        let mut snapshot = Snapshot::new();
        for (model, barcodes) in request {
            let barcodes: Vec<&str> = barcodes.iter().map(String::as_str).collect();
            let records = self.search(model, &barcodes, &no_domains)?;
            if !records.is_empty() {
                snapshot.insert(model.clone(), records);
            }
        }
        Ok(snapshot)
    }
}
