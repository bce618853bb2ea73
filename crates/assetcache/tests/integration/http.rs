use assetcache::{AssetKind, LoadError, SlotState};
use futures::future;

use crate::{AssetServer, configured_http_cache, http_cache, read_fixture};

#[tokio::test]
async fn test_concurrent_image_loads() {
    let server = AssetServer::new();
    let cache = http_cache(&server);

    let loads: Vec<_> = (0..8).map(|_| cache.load("img/checkers.png")).collect();
    let results = future::join_all(loads).await;

    let first = results[0].as_ref().unwrap();
    let bitmap = first.as_image().expect("decoded image");
    assert_eq!((bitmap.width, bitmap.height), (2, 2));
    for result in &results {
        assert!(first.ptr_eq(result.as_ref().unwrap()));
    }

    assert_eq!(server.hits("/assets/img/checkers.png"), 1);

    let cached = cache.get_cache();
    assert_eq!(
        &cached["img/checkers.png"][..],
        &read_fixture("assets/img/checkers.png")[..]
    );
}

#[tokio::test]
async fn test_batch() {
    let server = AssetServer::new();
    let cache = http_cache(&server);

    let assets = cache
        .load_batch(["hello.txt", "img/checkers.png", "hello.txt", "data.bin"])
        .await
        .unwrap();

    let kinds: Vec<_> = assets.iter().map(|asset| asset.kind()).collect();
    assert_eq!(
        kinds,
        [
            AssetKind::Binary,
            AssetKind::Image,
            AssetKind::Binary,
            AssetKind::Binary
        ]
    );
    assert_eq!(&assets[0].as_bytes().unwrap()[..], b"hello world\n");
    assert!(assets[0].ptr_eq(&assets[2]));
    assert_eq!(
        &assets[3].as_bytes().unwrap()[..],
        &read_fixture("assets/data.bin")[..]
    );

    assert_eq!(server.hits("/assets/hello.txt"), 1);
    assert_eq!(server.accesses(), 3);

    // everything is served from the cache now
    cache
        .load_batch(["data.bin", "img/checkers.png"])
        .await
        .unwrap();
    assert_eq!(server.accesses(), 3);
}

#[tokio::test]
async fn test_broken_image() {
    let server = AssetServer::new();
    let cache = http_cache(&server);

    let err = cache.load("img/broken.png").await.unwrap_err();
    assert!(matches!(err, LoadError::Decode(_)));
    assert_eq!(cache.state("img/broken.png"), SlotState::Failed);

    // the raw contents are cached, only decoding is retried
    let err = cache.load("img/broken.png").await.unwrap_err();
    assert!(matches!(err, LoadError::Decode(_)));
    assert_eq!(server.hits("/assets/img/broken.png"), 1);
}

#[tokio::test]
async fn test_missing_asset_is_refetched() {
    let server = AssetServer::new();
    let cache = http_cache(&server);

    let result = cache.load("i-do-not-exist.png").await;
    assert_eq!(result.unwrap_err(), LoadError::NotFound);
    assert_eq!(cache.state("i-do-not-exist.png"), SlotState::Absent);
    assert!(cache.is_empty());

    let result = cache.load("i-do-not-exist.png").await;
    assert_eq!(result.unwrap_err(), LoadError::NotFound);
    assert_eq!(server.hits("/assets/i-do-not-exist.png"), 2);
}

#[tokio::test]
async fn test_remove_refetches() {
    let server = AssetServer::new();
    let cache = configured_http_cache(&server);

    cache.load("hello.txt").await.unwrap();
    cache.remove("hello.txt");
    assert!(!cache.contains("hello.txt"));

    cache.load("hello.txt").await.unwrap();
    assert_eq!(server.hits("/assets/hello.txt"), 2);

    // removing through the live view has the same effect
    cache.get_cache().remove("hello.txt");
    cache.load("hello.txt").await.unwrap();
    assert_eq!(server.hits("/assets/hello.txt"), 3);

    cache.remove_all();
    assert!(cache.get_cache().is_empty());
}
