use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;
#[cfg(feature = "emitter")]
use std::sync::Mutex;

use tracing::{debug, trace, warn};

use super::state::{AliasCollision, CacheState, DeferredLookup, LookupKey, Probe};
use super::{CacheError, CacheStats, GetOptions, LookupOptions, StatsCounters};
use crate::config::CacheConfig;
use crate::fetcher::RemoteFetcher;
use crate::filter::Filters;
use crate::record::{BatchRequest, Record, RecordId, Snapshot};

#[cfg(feature = "emitter")]
const COLLISION_EVENT: &str = "barcode_alias_collision";

/// Write-through, multi-indexed barcode lookup cache for one scanning session.
///
/// Records are indexed by `(model, id)` and by `(model, barcode)`. A miss is
/// fetched from the [`RemoteFetcher`] at most once per distinct
/// `(barcode, model, filters)` lookup, or queued with
/// [`LookupOptions::fetch_later`] and resolved in one batch by
/// [`get_missing_records`](Self::get_missing_records).
///
/// Every record handed out is a copy. There is no eviction: build a new
/// cache to start over.
///
/// ## Example
///
/// ```ignore
/// use barcode_cache::{BarcodeCache, CacheConfig, InMemoryFetcher, LookupOptions};
///
/// let config = CacheConfig::default();
/// let cache = BarcodeCache::new(config.clone(), InMemoryFetcher::new(config));
/// cache.seed(&todays_snapshot)?;
///
/// let location = cache
///     .get_record_by_barcode("WH-STOCK", "stock.location", &LookupOptions::new())
///     .await?;
/// ```
pub struct BarcodeCache<F> {
    config: CacheConfig,
    fetcher: F,
    state: RwLock<CacheState>,
    stats: StatsCounters,
    #[cfg(feature = "emitter")]
    emitter: Mutex<EventEmitter>,
}

impl<F: RemoteFetcher> BarcodeCache<F> {
    pub fn new(config: CacheConfig, fetcher: F) -> Self {
        BarcodeCache {
            config,
            fetcher,
            state: RwLock::new(CacheState::default()),
            stats: StatsCounters::default(),
            #[cfg(feature = "emitter")]
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    /// Create a cache already holding `snapshot`.
    pub fn with_snapshot(
        config: CacheConfig,
        fetcher: F,
        snapshot: &Snapshot,
    ) -> Result<Self, CacheError> {
        let cache = Self::new(config, fetcher);
        cache.seed(snapshot)?;
        Ok(cache)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Merge records into the cache.
    ///
    /// A record already cached under the same id is replaced. Seeding the
    /// same snapshot twice leaves the cache unchanged. Records must carry an
    /// integer `id`; those that do not are skipped with a warning.
    pub fn seed(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        let collisions = {
            let mut state = self.write("seed")?;
            state.merge(&self.config, snapshot)
        };
        debug!(
            models = snapshot.len(),
            records = snapshot.values().map(Vec::len).sum::<usize>(),
            "merged records into barcode cache"
        );
        self.emit_collisions(&collisions);
        Ok(())
    }

    /// Look a record up by id.
    ///
    /// Ids should come from an earlier server response, so by default an
    /// unknown model or id is an error. With [`GetOptions::lenient`] both
    /// yield `None`.
    pub fn get_record_by_id(
        &self,
        model: &str,
        id: RecordId,
        options: GetOptions,
    ) -> Result<Option<Record>, CacheError> {
        let state = self.read("get_record_by_id")?;
        if !state.is_known(&self.config, model) {
            return if options.raise_if_missing {
                Err(CacheError::unknown_model(model))
            } else {
                Ok(None)
            };
        }

        match state.records.get(model).and_then(|by_id| by_id.get(&id)) {
            Some(record) => Ok(Some(record.clone())),
            None if options.raise_if_missing => Err(CacheError::not_found(model, id)),
            None => Ok(None),
        }
    }

    /// Look several records of one model up by id, in the order given.
    ///
    /// Lenient lookups leave missing ids out of the result.
    pub fn get_records_by_ids(
        &self,
        model: &str,
        ids: &[RecordId],
        options: GetOptions,
    ) -> Result<Vec<Record>, CacheError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_record_by_id(model, *id, options)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Resolve a scanned barcode to a record of `model`.
    ///
    /// Candidates sharing the barcode are tried in the order they were
    /// cached; the first one passing `options.filters` wins. On a miss the
    /// server is asked once (unless `only_in_cache` or `fetch_later` say
    /// otherwise) and the cache is read again.
    ///
    /// On a miss `fetch_later` wins over `only_in_cache`: the lookup is
    /// queued either way and the call returns `None`.
    ///
    /// An unknown model is an error unless the lookup is cache-only or
    /// deferred. An unknown barcode is never an error.
    pub async fn get_record_by_barcode(
        &self,
        barcode: &str,
        model: &str,
        options: &LookupOptions,
    ) -> Result<Option<Record>, CacheError> {
        let probe = {
            let state = self.read("get_record_by_barcode")?;
            state.probe(&self.config, barcode, model, &options.filters)
        };

        let unknown_model = match probe {
            Probe::Hit(record) => {
                self.stats.hit();
                trace!(barcode, model, id = ?record.id(), "barcode cache hit");
                return Ok(Some(record));
            }
            Probe::UnknownModel => true,
            Probe::NoBucket | Probe::NoMatch => false,
        };

        self.stats.miss();
        if options.fetch_later {
            self.defer(barcode, Some(model), &options.filters)?;
            return Ok(None);
        }
        if options.only_in_cache {
            return Ok(None);
        }
        if unknown_model {
            return Err(CacheError::unknown_model(model));
        }

        self.fetch_missing(barcode, Some(model), &options.filters).await?;

        let state = self.read("get_record_by_barcode")?;
        match state.probe(&self.config, barcode, model, &options.filters) {
            Probe::Hit(record) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Resolve a scanned barcode across every cached model.
    ///
    /// Returns, per model, the first record listed under `barcode` that
    /// passes `options.filters`. Models without a match are left out; an
    /// empty map means nothing matched anywhere.
    pub async fn get_records_by_barcode(
        &self,
        barcode: &str,
        options: &LookupOptions,
    ) -> Result<BTreeMap<String, Record>, CacheError> {
        let found = self.collect_matches(barcode, &options.filters)?;
        if !found.is_empty() {
            self.stats.hit();
            trace!(barcode, models = found.len(), "barcode cache hit across models");
            return Ok(found);
        }

        self.stats.miss();
        if options.fetch_later {
            self.defer(barcode, None, &options.filters)?;
            return Ok(found);
        }
        if options.only_in_cache {
            return Ok(found);
        }

        self.fetch_missing(barcode, None, &options.filters).await?;
        self.collect_matches(barcode, &options.filters)
    }

    /// Resolve every lookup queued with `fetch_later` in one batched request.
    ///
    /// Lookups already attempted are dropped. If the fetch fails, the queue
    /// is restored so a later call can retry it.
    ///
    /// The queue is drained when the batch starts. A second call made while
    /// that batch is still in flight finds it empty and returns at once,
    /// before the first batch's records are merged; await the first call
    /// before reading its results with `only_in_cache`.
    pub async fn get_missing_records(&self) -> Result<(), CacheError> {
        let (pending, request, marked) = {
            let mut state = self.write("get_missing_records")?;
            if state.deferred.is_empty() {
                return Ok(());
            }
            let pending = std::mem::take(&mut state.deferred);
            let (request, marked) = self.plan_batch(&mut state, &pending);
            (pending, request, marked)
        };

        if request.is_empty() {
            debug!(queued = pending.len(), "deferred barcodes were all attempted already");
            return Ok(());
        }

        self.stats.batch_fetch();
        debug!(
            models = request.len(),
            barcodes = request.values().map(Vec::len).sum::<usize>(),
            "fetching deferred barcodes"
        );

        match self.fetcher.fetch_batch(&request).await {
            Ok(snapshot) => {
                self.seed(&snapshot)?;
                Ok(())
            }
            Err(err) => {
                self.stats.fetch_failure();
                warn!(error = %err, "batched barcode fetch failed");
                let mut state = self.write("get_missing_records")?;
                for key in &marked {
                    state.attempted.remove(key);
                }
                let queued_meanwhile = std::mem::take(&mut state.deferred);
                state.deferred = pending;
                state.deferred.extend(queued_meanwhile);
                Err(CacheError::Fetch(err))
            }
        }
    }

    /// Whether a record of `model` with `id` is cached.
    pub fn contains(&self, model: &str, id: RecordId) -> bool {
        self.read("contains")
            .map(|state| {
                state
                    .records
                    .get(model)
                    .map_or(false, |by_id| by_id.contains_key(&id))
            })
            .unwrap_or(false)
    }

    /// Number of cached records of `model`.
    pub fn len(&self, model: &str) -> usize {
        self.read("len")
            .map(|state| state.records.get(model).map_or(0, |by_id| by_id.len()))
            .unwrap_or(0)
    }

    /// Models holding at least one cached record, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self
            .read("models")
            .map(|state| {
                state
                    .records
                    .iter()
                    .filter(|(_, by_id)| !by_id.is_empty())
                    .map(|(model, _)| model.clone())
                    .collect()
            })
            .unwrap_or_default();
        models.sort();
        models
    }

    /// Number of lookups waiting for `get_missing_records`.
    pub fn pending_fetches(&self) -> usize {
        self.read("pending_fetches")
            .map(|state| state.deferred.len())
            .unwrap_or(0)
    }

    /// Whether this exact lookup was already sent to the server.
    pub fn was_attempted(&self, barcode: &str, model: Option<&str>, filters: &Filters) -> bool {
        let key = LookupKey::new(barcode, model, filters);
        self.read("was_attempted")
            .map(|state| state.attempted.contains(&key))
            .unwrap_or(false)
    }

    /// GS1 alias collisions seen so far, oldest first.
    pub fn collisions(&self) -> Vec<AliasCollision> {
        self.read("collisions")
            .map(|state| state.collisions.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Register a listener called for every new GS1 alias collision.
    #[cfg(feature = "emitter")]
    pub fn on_collision<L>(&self, listener: L) -> Result<(), CacheError>
    where
        L: Fn(AliasCollision) + Send + Sync + 'static,
    {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| CacheError::LockPoisoned("on_collision"))?;
        emitter.on(COLLISION_EVENT, move |payload: String| {
            if let Ok(collision) = serde_json::from_str::<AliasCollision>(&payload) {
                listener(collision);
            }
        });
        Ok(())
    }

    #[cfg(feature = "emitter")]
    fn emit_collisions(&self, collisions: &[AliasCollision]) {
        if collisions.is_empty() {
            return;
        }
        let Ok(mut emitter) = self.emitter.lock() else {
            return;
        };
        for collision in collisions {
            if let Ok(payload) = serde_json::to_string(collision) {
                emitter.emit(COLLISION_EVENT, payload);
            }
        }
    }

    #[cfg(not(feature = "emitter"))]
    fn emit_collisions(&self, _collisions: &[AliasCollision]) {}

    /// Fetch a single miss unless the same lookup (or its unfiltered form)
    /// was already attempted.
    ///
    /// The key is recorded before awaiting, so overlapping identical misses
    /// cost a single round trip. It is removed again if the fetch fails.
    async fn fetch_missing(
        &self,
        barcode: &str,
        model: Option<&str>,
        filters: &Filters,
    ) -> Result<(), CacheError> {
        let key = LookupKey::new(barcode, model, filters);
        {
            let mut state = self.write("fetch_missing")?;
            if state.attempted.contains(&key) || state.attempted.contains(&key.unfiltered()) {
                self.stats.deduplicated();
                trace!(barcode, model = ?model, "barcode already fetched, not asking again");
                return Ok(());
            }
            state.attempted.insert(key.clone());
        }

        self.stats.remote_fetch();
        debug!(barcode, model = ?model, "fetching missing barcode");

        let domains = filters.to_domains();
        match self.fetcher.fetch_one(barcode, model, &domains).await {
            Ok(snapshot) => self.seed(&snapshot),
            Err(err) => {
                self.stats.fetch_failure();
                warn!(barcode, model = ?model, error = %err, "barcode fetch failed");
                self.write("fetch_missing")?.attempted.remove(&key);
                Err(CacheError::Fetch(err))
            }
        }
    }

    fn defer(
        &self,
        barcode: &str,
        model: Option<&str>,
        filters: &Filters,
    ) -> Result<(), CacheError> {
        let key = LookupKey::new(barcode, model, filters);
        let mut state = self.write("defer")?;
        if state.attempted.contains(&key) || state.attempted.contains(&key.unfiltered()) {
            self.stats.deduplicated();
            return Ok(());
        }
        state.deferred.push(DeferredLookup {
            barcode: barcode.to_string(),
            model: model.map(str::to_string),
            filters: filters.clone(),
        });
        self.stats.deferred();
        debug!(barcode, model = ?model, queued = state.deferred.len(), "deferred barcode fetch");
        Ok(())
    }

    /// Group pending lookups per model and mark them attempted. Unscoped
    /// lookups are asked for in every model with a barcode field.
    ///
    /// Returns the request and the keys newly marked, for rollback.
    fn plan_batch(
        &self,
        state: &mut CacheState,
        pending: &[DeferredLookup],
    ) -> (BatchRequest, Vec<LookupKey>) {
        let mut request = BatchRequest::new();
        let mut marked = Vec::new();
        let no_filters = Filters::new();

        for lookup in pending {
            let exact = LookupKey::new(&lookup.barcode, lookup.model.as_deref(), &lookup.filters);
            if state.attempted.contains(&exact) || state.attempted.contains(&exact.unfiltered()) {
                continue;
            }

            let models: Vec<&str> = match lookup.model.as_deref() {
                Some(model) => vec![model],
                None => self.config.barcode_models().collect(),
            };
            for model in models {
                let key = LookupKey::new(&lookup.barcode, Some(model), &no_filters);
                if state.attempted.contains(&key) {
                    continue;
                }
                let barcodes = request.entry(model.to_string()).or_default();
                if !barcodes.contains(&lookup.barcode) {
                    barcodes.push(lookup.barcode.clone());
                }
            }

            if state.attempted.insert(exact.clone()) {
                marked.push(exact);
            }
        }

        for (model, barcodes) in &request {
            for barcode in barcodes {
                let key = LookupKey::new(barcode, Some(model.as_str()), &no_filters);
                if state.attempted.insert(key.clone()) {
                    marked.push(key);
                }
            }
        }

        (request, marked)
    }

    fn collect_matches(
        &self,
        barcode: &str,
        filters: &Filters,
    ) -> Result<BTreeMap<String, Record>, CacheError> {
        let state = self.read("get_records_by_barcode")?;
        Ok(state
            .matches_across_models(barcode, filters)
            .map(|(model, record)| (model.clone(), record.clone()))
            .collect())
    }

    fn read(
        &self,
        operation: &'static str,
    ) -> Result<RwLockReadGuard<'_, CacheState>, CacheError> {
        self.state
            .read()
            .map_err(|_| CacheError::LockPoisoned(operation))
    }

    fn write(
        &self,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, CacheState>, CacheError> {
        self.state
            .write()
            .map_err(|_| CacheError::LockPoisoned(operation))
    }
}
