use std::sync::Arc;

use assetcache::config::{Config, FilesystemSourceConfig, HttpSourceConfig, SourceConfig};
use assetcache::{AssetCache, HttpTransport, ImageDecoder};
use assetcache_test as test;

pub use test::{AssetServer, fixture, read_fixture};

/// Creates a cache that downloads assets from the `/assets/` directory of `server`.
pub fn http_cache(server: &AssetServer) -> AssetCache {
    test::setup();

    let config = Config::default();
    let source = HttpSourceConfig {
        url: Some(server.url("assets/")),
        ..Default::default()
    };
    let transport = HttpTransport::from_config(&config, &source).unwrap();

    AssetCache::new(Arc::new(transport), Arc::new(ImageDecoder::new()))
}

/// Creates a cache reading from the asset fixtures, the way it is configured from a config file.
pub fn filesystem_cache() -> AssetCache {
    test::setup();

    let config = Config {
        source: SourceConfig::Filesystem(FilesystemSourceConfig {
            path: fixture("assets"),
        }),
        ..Default::default()
    };

    AssetCache::from_config(&config).unwrap()
}

/// Like [`http_cache`], but configured through [`AssetCache::from_config`].
pub fn configured_http_cache(server: &AssetServer) -> AssetCache {
    test::setup();

    let config = Config {
        source: SourceConfig::Http(HttpSourceConfig {
            url: Some(server.url("assets/")),
            ..Default::default()
        }),
        ..Default::default()
    };

    AssetCache::from_config(&config).unwrap()
}
