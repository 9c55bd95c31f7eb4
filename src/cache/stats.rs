use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the cache counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Barcode lookups answered from the cache.
    pub hits: u64,
    /// Barcode lookups that found nothing usable in the cache.
    pub misses: u64,
    /// Single-barcode fetches sent to the server.
    pub remote_fetches: u64,
    /// Batched fetches sent by `get_missing_records`.
    pub batch_fetches: u64,
    /// Lookups queued with `fetch_later`.
    pub deferred: u64,
    /// Fetches skipped because the same lookup was already attempted.
    pub deduplicated: u64,
    /// Fetches (single or batched) that returned an error.
    pub fetch_failures: u64,
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    remote_fetches: AtomicU64,
    batch_fetches: AtomicU64,
    deferred: AtomicU64,
    deduplicated: AtomicU64,
    fetch_failures: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remote_fetch(&self) {
        self.remote_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_fetch(&self) {
        self.batch_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            batch_fetches: self.batch_fetches.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }
}
