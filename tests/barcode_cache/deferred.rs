use barcode_cache::{BarcodeCache, Filters, LookupOptions};

use crate::fixtures::{cache_with_server, config, lot, product, server, snapshot, GatedFetcher};

#[tokio::test]
async fn deferred_lookups_resolve_in_one_batch() {
    let server = server()
        .with_record("product", product(1, "111"))
        .with_record("product", product(2, "222"));
    let cache = cache_with_server(server.clone());

    let later = LookupOptions::new().fetch_later();
    assert!(cache
        .get_record_by_barcode("111", "product", &later)
        .await
        .unwrap()
        .is_none());
    assert!(cache
        .get_record_by_barcode("222", "product", &later)
        .await
        .unwrap()
        .is_none());
    assert_eq!(server.fetch_one_calls(), 0);
    assert_eq!(server.fetch_batch_calls(), 0);
    assert_eq!(cache.pending_fetches(), 2);

    cache.get_missing_records().await.unwrap();
    assert_eq!(server.fetch_batch_calls(), 1);
    let batch = server.last_batch().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch["product"], vec!["111".to_string(), "222".to_string()]);
    assert_eq!(cache.pending_fetches(), 0);

    let cached = LookupOptions::new().only_in_cache();
    for (barcode, id) in [("111", 1), ("222", 2)] {
        let record = cache
            .get_record_by_barcode(barcode, "product", &cached)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id(), Some(id));
    }
    assert_eq!(server.fetch_one_calls(), 0);
    assert_eq!(cache.stats().deferred, 2);
    assert_eq!(cache.stats().batch_fetches, 1);
}

#[tokio::test]
async fn flushing_an_empty_queue_is_a_no_op() {
    let server = server();
    let cache = cache_with_server(server.clone());
    cache.get_missing_records().await.unwrap();
    assert_eq!(server.fetch_batch_calls(), 0);
}

#[tokio::test]
async fn batch_skips_barcodes_already_attempted() {
    let server = server().with_record("product", product(1, "111"));
    let cache = cache_with_server(server.clone());

    // Fetched (and missed) right away: attempted.
    cache
        .get_record_by_barcode("333", "product", &LookupOptions::new())
        .await
        .unwrap();

    let later = LookupOptions::new().fetch_later();
    cache.get_record_by_barcode("111", "product", &later).await.unwrap();
    cache.get_record_by_barcode("111", "product", &later).await.unwrap();
    cache.get_record_by_barcode("333", "product", &later).await.unwrap();
    assert_eq!(cache.pending_fetches(), 2);

    cache.get_missing_records().await.unwrap();
    let batch = server.last_batch().unwrap();
    assert_eq!(batch["product"], vec!["111".to_string()]);

    // Everything queued is now attempted; flushing again costs nothing.
    cache.get_record_by_barcode("111", "product", &later).await.unwrap();
    cache.get_missing_records().await.unwrap();
    assert_eq!(server.fetch_batch_calls(), 1);
}

#[tokio::test]
async fn deferred_unknown_model_is_queued_not_rejected() {
    let server = server();
    let cache = cache_with_server(server.clone());

    let found = cache
        .get_record_by_barcode("X1", "no.such.model", &LookupOptions::new().fetch_later())
        .await
        .unwrap();
    assert!(found.is_none());
    assert_eq!(cache.pending_fetches(), 1);

    cache.get_missing_records().await.unwrap();
    assert_eq!(
        server.last_batch().unwrap()["no.such.model"],
        vec!["X1".to_string()]
    );
}

#[tokio::test]
async fn deferred_filtered_lookup_is_not_refetched() {
    let server = server().with_record("lot", lot(2, "LOT-B", "done"));
    let cache = cache_with_server(server.clone());
    let done = Filters::new().field("lot", "state", "done");

    cache
        .get_record_by_barcode(
            "LOT-B",
            "lot",
            &LookupOptions::new().fetch_later().with_filters(done.clone()),
        )
        .await
        .unwrap();
    cache.get_missing_records().await.unwrap();
    assert!(cache.was_attempted("LOT-B", Some("lot"), &done));

    let found = cache
        .get_record_by_barcode("LOT-B", "lot", &LookupOptions::new().with_filters(done))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), Some(2));
    assert_eq!(server.fetch_one_calls(), 0);
}

#[tokio::test]
async fn deferred_unscoped_lookup_fans_out_over_barcode_models() {
    let server = server().with_record("lot", lot(5, "ANY-1", "done"));
    let cache = cache_with_server(server.clone());

    let found = cache
        .get_records_by_barcode("ANY-1", &LookupOptions::new().fetch_later())
        .await
        .unwrap();
    assert!(found.is_empty());

    cache.get_missing_records().await.unwrap();
    let batch = server.last_batch().unwrap();
    for model in ["location", "lot", "package", "product"] {
        assert_eq!(batch[model], vec!["ANY-1".to_string()]);
    }

    let found = cache
        .get_records_by_barcode("ANY-1", &LookupOptions::new().only_in_cache())
        .await
        .unwrap();
    assert_eq!(found["lot"].id(), Some(5));
}

#[tokio::test]
async fn fetch_later_wins_over_only_in_cache() {
    let server = server().with_record("lot", lot(3, "LOT-A", "done"));
    let cache = cache_with_server(server.clone());
    cache
        .seed(&snapshot("lot", vec![lot(1, "LOT-A", "draft")]))
        .unwrap();

    let both = LookupOptions::new().only_in_cache().fetch_later();
    let done = both
        .clone()
        .with_filters(Filters::new().field("lot", "state", "done"));

    // Candidates exist but none passes the filter.
    assert!(cache
        .get_record_by_barcode("LOT-A", "lot", &done)
        .await
        .unwrap()
        .is_none());
    // No candidate at all.
    assert!(cache
        .get_record_by_barcode("LOT-N", "lot", &both)
        .await
        .unwrap()
        .is_none());
    assert_eq!(cache.pending_fetches(), 2);
    assert_eq!(server.fetch_one_calls(), 0);

    cache.get_missing_records().await.unwrap();
    assert_eq!(
        server.last_batch().unwrap()["lot"],
        vec!["LOT-A".to_string(), "LOT-N".to_string()]
    );
    let found = cache
        .get_record_by_barcode("LOT-A", "lot", &done)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), Some(3));
}

#[tokio::test]
async fn overlapping_flush_returns_before_batch_is_merged() {
    let gated = GatedFetcher::new(server().with_record("product", product(1, "111")));
    let cache = BarcodeCache::new(config(), gated.clone());
    cache
        .get_record_by_barcode("111", "product", &LookupOptions::new().fetch_later())
        .await
        .unwrap();

    let (first, (second, seen_early), ()) = tokio::join!(
        cache.get_missing_records(),
        async {
            let flushed = cache.get_missing_records().await;
            (flushed, cache.contains("product", 1))
        },
        async {
            tokio::task::yield_now().await;
            gated.release();
        },
    );

    first.unwrap();
    second.unwrap();
    // The second flush found the queue already drained.
    assert!(!seen_early);
    assert!(cache.contains("product", 1));
    assert_eq!(gated.inner().fetch_batch_calls(), 1);
}
