//! RemoteFetcher - the collaborator that asks the server for unknown barcodes.
//!
//! The cache never talks to the network itself. It is constructed with a
//! fetcher and calls it on a miss (`fetch_one`) or when flushing deferred
//! lookups (`fetch_batch`). Both calls return a [`Snapshot`] that the cache
//! merges as-is. Errors are returned untouched to whoever triggered the fetch.
//!
//! Retries, timeouts and cancellation belong to the fetcher's transport.
//!
//! A fetcher can be handed to the cache by value, by reference or behind an
//! `Arc`, so the caller keeps access to it.

mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::filter::DomainsByModel;
use crate::record::{BatchRequest, Snapshot};

pub use in_memory::InMemoryFetcher;

#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Resolve a single barcode.
    ///
    /// `model` is `None` for a cross-model search. `domains` narrows the
    /// candidates per model and is empty when the caller set no filters.
    async fn fetch_one(
        &self,
        barcode: &str,
        model: Option<&str>,
        domains: &DomainsByModel,
    ) -> anyhow::Result<Snapshot>;

    /// Resolve many barcodes, grouped by model, in one round trip.
    async fn fetch_batch(&self, request: &BatchRequest) -> anyhow::Result<Snapshot>;
}

#[async_trait]
impl<F: RemoteFetcher + ?Sized> RemoteFetcher for Arc<F> {
    async fn fetch_one(
        &self,
        barcode: &str,
        model: Option<&str>,
        domains: &DomainsByModel,
    ) -> anyhow::Result<Snapshot> {
        (**self).fetch_one(barcode, model, domains).await
    }

    async fn fetch_batch(&self, request: &BatchRequest) -> anyhow::Result<Snapshot> {
        (**self).fetch_batch(request).await
    }
}

#[async_trait]
impl<'a, F: RemoteFetcher + ?Sized> RemoteFetcher for &'a F {
    async fn fetch_one(
        &self,
        barcode: &str,
        model: Option<&str>,
        domains: &DomainsByModel,
    ) -> anyhow::Result<Snapshot> {
        (**self).fetch_one(barcode, model, domains).await
    }

    async fn fetch_batch(&self, request: &BatchRequest) -> anyhow::Result<Snapshot> {
        (**self).fetch_batch(request).await
    }
}
