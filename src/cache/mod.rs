//! Barcode cache - resolve scanned barcodes to records, fetching on demand.
//!
//! The cache keeps four pieces of state for one scanning session:
//!
//! - the primary index, `(model, id) -> record`;
//! - the barcode index, `(model, barcode) -> [id]` in insertion order, with
//!   GS1 zero-padded aliases for models that have a GS1 length;
//! - the memo of lookups already sent to the server, so a miss is fetched at
//!   most once;
//! - the queue of lookups deferred with `fetch_later`.
//!
//! Each lookup key goes `unattempted -> deferred | in flight -> attempted`.
//! `attempted` is final for that key; a failed fetch returns the key to
//! `unattempted`.

mod barcode_cache;
mod error;
mod options;
mod state;
mod stats;

pub use barcode_cache::BarcodeCache;
pub use error::CacheError;
pub use options::{GetOptions, LookupOptions};
pub use state::AliasCollision;
pub use stats::CacheStats;

pub(crate) use stats::StatsCounters;
