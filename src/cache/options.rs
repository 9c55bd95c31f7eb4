use crate::filter::Filters;

/// Options for id lookups.
#[derive(Debug, Clone, Copy)]
pub struct GetOptions {
    /// Fail with an error instead of returning `None` when the model or the
    /// id is unknown.
    pub raise_if_missing: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            raise_if_missing: true,
        }
    }
}

impl GetOptions {
    /// Options for speculative lookups: a miss is `None`, never an error.
    pub fn lenient() -> Self {
        Self {
            raise_if_missing: false,
        }
    }
}

/// Options for barcode lookups.
///
/// When both flags are set, a miss is still queued by `fetch_later`; the
/// call returns `None` without contacting the server.
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    /// Never contact the server; answer from what is cached.
    pub only_in_cache: bool,
    /// On a miss, queue the lookup for the next
    /// [`get_missing_records`](crate::BarcodeCache::get_missing_records)
    /// instead of fetching right away.
    pub fetch_later: bool,
    /// Per-model conditions a candidate record must satisfy.
    pub filters: Filters,
}

impl LookupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only_in_cache(mut self) -> Self {
        self.only_in_cache = true;
        self
    }

    pub fn fetch_later(mut self) -> Self {
        self.fetch_later = true;
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }
}
