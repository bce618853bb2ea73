use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// The kind of content an asset path refers to.
///
/// The kind decides whether the fetched bytes are handed to a [`Decoder`](crate::Decoder)
/// before being cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Opaque bytes, cached and returned as-is.
    Binary,
    /// An image that is decoded into a [`Bitmap`].
    Image,
}

impl AssetKind {
    /// Substrings that mark a path as an image.
    ///
    /// These are matched anywhere in the path, case-sensitive, so `a.png?v=2` and
    /// `thumbs.png/raw` are both images while `A.PNG` is not.
    const IMAGE_MARKERS: &'static [&'static str] = &[".jpg", ".png"];

    /// Classifies an asset path.
    pub fn classify(path: &str) -> Self {
        if Self::IMAGE_MARKERS
            .iter()
            .any(|marker| path.contains(marker))
        {
            Self::Image
        } else {
            Self::Binary
        }
    }

    /// Returns the name of this kind, as used in metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded image in RGBA8 layout.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Row-major pixel data, four bytes per pixel.
    pub pixels: Vec<u8>,
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &format_args!("[{} bytes]", self.pixels.len()))
            .finish()
    }
}

/// A fully resolved asset.
///
/// Cloning an asset is cheap and shares the underlying buffer, so every caller that awaited the
/// same load observes the identical value.
#[derive(Clone, Debug)]
pub enum Asset {
    /// The raw bytes of a non-image asset.
    Binary(Bytes),
    /// The decoded bitmap of an image asset.
    Image(Arc<Bitmap>),
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Binary(_) => AssetKind::Binary,
            Self::Image(_) => AssetKind::Image,
        }
    }

    /// Returns the raw bytes, if this is a binary asset.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            Self::Image(_) => None,
        }
    }

    /// Returns the decoded bitmap, if this is an image asset.
    pub fn as_image(&self) -> Option<&Arc<Bitmap>> {
        match self {
            Self::Binary(_) => None,
            Self::Image(bitmap) => Some(bitmap),
        }
    }

    /// Whether `self` and `other` share the same underlying buffer or bitmap.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Binary(a), Self::Binary(b)) => {
                a.len() == b.len() && std::ptr::eq(a.as_ptr(), b.as_ptr())
            }
            (Self::Image(a), Self::Image(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
