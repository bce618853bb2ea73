//! Transports that retrieve the raw contents of assets.
//!
//! The [`AssetCache`](crate::AssetCache) is generic over the [`Transport`] it fetches from.
//! Two implementations are provided:
//!
//! - [`HttpTransport`] fetches via HTTP(S), resolving relative paths against a base URL.
//! - [`FilesystemTransport`] reads from a local directory, which is mostly useful for testing and
//!   for bundled assets.

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::LoadResult;

mod filesystem;
mod http;

pub use filesystem::FilesystemTransport;
pub use http::HttpTransport;

/// The user agent sent with every HTTP request.
pub const USER_AGENT: &str = concat!("assetcache/", env!("CARGO_PKG_VERSION"));

/// Retrieves the raw contents of an asset by its path.
///
/// Implementations do not need to do any caching or deduplication themselves; the
/// [`AssetCache`](crate::AssetCache) guarantees that a path is only fetched again after a failed
/// fetch or an explicit removal.
pub trait Transport: Send + Sync + 'static {
    /// Fetches the contents of the asset at `path`.
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, LoadResult<Bytes>>;
}
