//! Support to load assets from the local filesystem.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use futures::future::BoxFuture;

use super::Transport;
use crate::error::{LoadError, LoadResult};

/// Transport that reads assets relative to a root directory.
#[derive(Debug, Clone)]
pub struct FilesystemTransport {
    root: PathBuf,
}

impl FilesystemTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves `path` within the root directory.
    ///
    /// Returns `None` for paths that would escape the root, such as absolute paths or paths
    /// containing `..`.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return None;
        }

        Some(self.root.join(relative))
    }

    async fn read(&self, path: &str) -> LoadResult<Bytes> {
        let Some(full_path) = self.resolve(path) else {
            tracing::debug!("Rejecting asset path {:?} outside of the root", path);
            return Err(LoadError::NotFound);
        };

        tracing::debug!("Reading asset from {:?}", full_path);
        let contents = tokio::fs::read(&full_path).await?;
        Ok(Bytes::from(contents))
    }
}

impl Transport for FilesystemTransport {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, LoadResult<Bytes>> {
        Box::pin(self.read(path))
    }
}
