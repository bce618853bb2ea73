use std::time::Duration;

use thiserror::Error;

/// An error that happens when loading an asset.
///
/// The error is shared between every caller awaiting the same load, hence it is cheaply
/// clonable and carries its details as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The asset was not found at the remote source.
    #[error("not found")]
    NotFound,
    /// The asset could not be fetched due to missing permissions.
    ///
    /// The attached string contains the remote source's response.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The asset could not be fetched within the configured timeout.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The asset could not be fetched due to another problem,
    /// like connection loss, DNS resolution, or a 5xx server response.
    #[error("download failed: {0}")]
    Transport(String),
    /// The asset was fetched, but decoding its contents failed.
    ///
    /// The raw contents stay cached, a subsequent load re-attempts decoding without fetching.
    #[error("failed to decode: {0}")]
    Decode(String),
    /// The computation loading the asset died before producing a result.
    #[error("asset computation interrupted")]
    Interrupted,
}

impl LoadError {
    /// Whether this error originates from the transport, rather than from decoding.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::PermissionDenied(_) | Self::Timeout(_) | Self::Transport(_)
        )
    }

    /// A short, static name of this error kind, used for metrics tags.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            Self::NotFound => "notfound",
            Self::PermissionDenied(_) => "permissiondenied",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::Interrupted => "interrupted",
        }
    }
}

impl From<std::io::Error> for LoadError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            _ => {
                let dynerr: &dyn std::error::Error = &err; // tracing expects a `&dyn Error`
                tracing::debug!(error = dynerr, "asset I/O failed");
                Self::Transport(err.to_string())
            }
        }
    }
}

/// The result of loading an asset.
pub type LoadResult<T = crate::Asset> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(LoadError::from(err), LoadError::NotFound);

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(LoadError::from(err), LoadError::PermissionDenied("nope".into()));

        let err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        assert_eq!(LoadError::from(err), LoadError::Transport("short read".into()));
    }

    #[test]
    fn test_error_classes() {
        assert!(LoadError::NotFound.is_transport());
        assert!(LoadError::Timeout(Duration::from_secs(1)).is_transport());
        assert!(!LoadError::Decode("bad header".into()).is_transport());
        assert!(!LoadError::Interrupted.is_transport());
    }
}
