use barcode_cache::{AliasCollision, LookupOptions, Record};

use crate::fixtures::{cache_with_server, product, server, snapshot};

#[tokio::test]
async fn short_numeric_barcode_gets_padded_alias() {
    let cache = cache_with_server(server());
    cache.seed(&snapshot("product", vec![product(1, "123")])).unwrap();

    let found = cache
        .get_record_by_barcode("00000000000123", "product", &LookupOptions::new().only_in_cache())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), Some(1));
}

#[tokio::test]
async fn padding_uses_each_models_length() {
    let cache = cache_with_server(server());
    cache
        .seed(&snapshot(
            "location",
            vec![Record::with_id(2).with("barcode", "42")],
        ))
        .unwrap();
    cache
        .seed(&snapshot("package", vec![Record::with_id(3).with("name", "42")]))
        .unwrap();

    let options = LookupOptions::new().only_in_cache();
    let location = cache
        .get_record_by_barcode("0000000000042", "location", &options)
        .await
        .unwrap();
    assert_eq!(location.unwrap().id(), Some(2));

    let package = cache
        .get_record_by_barcode("000000000000000042", "package", &options)
        .await
        .unwrap();
    assert_eq!(package.unwrap().id(), Some(3));

    // A GTIN-14 style alias means nothing for a location.
    assert!(cache
        .get_record_by_barcode("00000000000042", "location", &options)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn full_length_and_non_numeric_barcodes_are_not_padded() {
    let cache = cache_with_server(server());
    cache
        .seed(&snapshot(
            "product",
            vec![
                product(1, "12345678901234"),
                product(2, "123456789012345"),
                product(3, "ABC-123"),
            ],
        ))
        .unwrap();

    let options = LookupOptions::new().only_in_cache();
    for barcode in ["012345678901234", "0123456789012345", "0000000ABC-123"] {
        assert!(cache
            .get_record_by_barcode(barcode, "product", &options)
            .await
            .unwrap()
            .is_none());
    }
    assert_eq!(
        cache
            .get_record_by_barcode("12345678901234", "product", &options)
            .await
            .unwrap()
            .unwrap()
            .id(),
        Some(1)
    );
}

#[tokio::test]
async fn models_without_gs1_length_are_not_padded() {
    let cache = cache_with_server(server());
    cache
        .seed(&snapshot("lot", vec![Record::with_id(1).with("name", "77")]))
        .unwrap();

    assert!(cache
        .get_record_by_barcode("00000000000077", "lot", &LookupOptions::new().only_in_cache())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn colliding_alias_keeps_first_record() {
    let cache = cache_with_server(server());
    cache
        .seed(&snapshot(
            "product",
            vec![product(1, "123"), product(2, "00123")],
        ))
        .unwrap();

    let options = LookupOptions::new().only_in_cache();
    let alias = cache
        .get_record_by_barcode("00000000000123", "product", &options)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alias.id(), Some(1));

    // The second record is still reachable under its own barcode.
    let own = cache
        .get_record_by_barcode("00123", "product", &options)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(own.id(), Some(2));

    assert_eq!(
        cache.collisions(),
        vec![AliasCollision {
            model: "product".into(),
            barcode: "00123".into(),
            alias: "00000000000123".into(),
            kept_id: 1,
            rejected_id: 2,
        }]
    );
}

#[tokio::test]
async fn alias_never_overrides_an_existing_full_barcode() {
    let cache = cache_with_server(server());
    cache
        .seed(&snapshot("product", vec![product(1, "00000000000123")]))
        .unwrap();
    cache.seed(&snapshot("product", vec![product(2, "123")])).unwrap();

    let found = cache
        .get_record_by_barcode("00000000000123", "product", &LookupOptions::new().only_in_cache())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), Some(1));
    assert_eq!(cache.collisions().len(), 1);
}

#[cfg(feature = "emitter")]
#[test]
fn collision_listener_is_notified() {
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;

    let cache = cache_with_server(server());
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    cache
        .on_collision(move |collision| {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(collision);
            }
        })
        .unwrap();

    cache
        .seed(&snapshot(
            "product",
            vec![product(1, "55"), product(2, "055")],
        ))
        .unwrap();

    let collision = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(collision.kept_id, 1);
    assert_eq!(collision.rejected_id, 2);
    assert_eq!(collision.alias, "00000000000055");
}
