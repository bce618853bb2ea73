//! An in-memory cache for remote assets.
//!
//! The [`AssetCache`] fetches every asset at most once through a [`Transport`], optionally decodes
//! it through a [`Decoder`], and deduplicates concurrent requests for the same path so that all
//! callers converge on a single in-flight computation.

#[macro_use]
pub mod metrics;

pub mod asset;
pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod logging;
pub mod transport;


pub use asset::{Asset, AssetKind, Bitmap};
pub use cache::{AssetCache, CacheStore, CacheView, SlotState};
pub use decode::{Decoder, ImageDecoder};
pub use error::{LoadError, LoadResult};
pub use transport::{FilesystemTransport, HttpTransport, Transport};
