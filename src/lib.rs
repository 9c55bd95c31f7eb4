//! Lazy barcode cache for warehouse scanning sessions.
//!
//! Resolves scanned barcodes to business records, indexing what the session
//! already knows and fetching the rest from the server on demand, one lookup
//! at a time or in deferred batches. GS1 composite barcodes are handled by
//! indexing zero-padded aliases of short numeric barcodes.

mod cache;
mod config;
mod fetcher;
mod filter;
mod gs1;
mod record;

pub use cache::{
    AliasCollision, BarcodeCache, CacheError, CacheStats, GetOptions, LookupOptions,
};
pub use config::{CacheConfig, ConfigError};
pub use fetcher::{InMemoryFetcher, RemoteFetcher};
pub use filter::{
    DomainOperator, DomainTerm, DomainsByModel, FieldFilter, FilterKey, FilterValue, Filters,
};
pub use gs1::pad as gs1_pad;
pub use record::{BatchRequest, Record, RecordId, Snapshot};
