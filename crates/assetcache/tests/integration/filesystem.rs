use assetcache::{LoadError, SlotState};

use crate::filesystem_cache;

#[tokio::test]
async fn test_load_from_config() {
    let cache = filesystem_cache();

    let text = cache.load("hello.txt").await.unwrap();
    assert_eq!(&text.as_bytes().unwrap()[..], b"hello world\n");

    let image = cache.load("img/checkers.png").await.unwrap();
    let bitmap = image.as_image().unwrap();
    assert_eq!(bitmap.pixels.len(), 16);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.state("img/checkers.png"), SlotState::Resolved);
}

#[tokio::test]
async fn test_escaping_paths_are_not_found() {
    let cache = filesystem_cache();

    let result = cache.load("../fixtures/assets/hello.txt").await;
    assert_eq!(result.unwrap_err(), LoadError::NotFound);
    assert!(cache.is_empty());
}
