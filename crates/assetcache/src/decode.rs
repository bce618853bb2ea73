//! Decoding of image assets into bitmaps.

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::asset::Bitmap;
use crate::error::{LoadError, LoadResult};

/// Turns the raw contents of an image asset into a [`Bitmap`].
///
/// The decoder is only invoked for paths classified as
/// [`AssetKind::Image`](crate::AssetKind::Image).
pub trait Decoder: Send + Sync + 'static {
    fn decode(&self, raw: Bytes) -> BoxFuture<'static, LoadResult<Bitmap>>;
}

/// Decodes PNG and JPEG images with the `image` crate.
///
/// Decoding is CPU-bound and runs on tokio's blocking thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl ImageDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes `raw` into an RGBA8 bitmap on the current thread.
    pub fn decode_blocking(raw: &[u8]) -> LoadResult<Bitmap> {
        let image =
            image::load_from_memory(raw).map_err(|err| LoadError::Decode(err.to_string()))?;

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Bitmap {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

impl Decoder for ImageDecoder {
    fn decode(&self, raw: Bytes) -> BoxFuture<'static, LoadResult<Bitmap>> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::decode_blocking(&raw))
                .await
                .unwrap_or_else(|err| {
                    let dynerr: &dyn std::error::Error = &err; // tracing expects a `&dyn Error`
                    tracing::error!(error = dynerr, "Image decoding task failed");
                    Err(LoadError::Interrupted)
                })
        })
    }
}
