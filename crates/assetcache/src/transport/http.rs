//! Support to load assets from HTTP servers.

use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use url::Url;

use super::{Transport, USER_AGENT};
use crate::config::{Config, HttpSourceConfig};
use crate::error::{LoadError, LoadResult};

/// Various timeouts for HTTP downloads.
#[derive(Copy, Clone, Debug)]
pub struct DownloadTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// Global timeout for one download, including the response body.
    pub max_download: Duration,
}

impl DownloadTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect: config.connect_timeout,
            max_download: config.max_download_timeout,
        }
    }
}

impl Default for DownloadTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(1),
            max_download: Duration::from_secs(60),
        }
    }
}

/// Transport that downloads assets via HTTP.
///
/// Paths that are absolute `http` or `https` URLs are downloaded as-is. All other paths are
/// resolved relative to the base URL, if one is configured.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: Option<Url>,
    headers: HeaderMap,
    timeouts: DownloadTimeouts,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: Option<Url>, timeouts: DownloadTimeouts) -> Self {
        Self {
            client,
            base_url: base_url.map(with_trailing_slash),
            headers: HeaderMap::new(),
            timeouts,
        }
    }

    /// Creates a transport for the given HTTP source.
    pub fn from_config(config: &Config, source: &HttpSourceConfig) -> anyhow::Result<Self> {
        let timeouts = DownloadTimeouts::from_config(config);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeouts.connect)
            .build()
            .context("failed to create HTTP client")?;

        let mut headers = HeaderMap::new();
        for (key, value) in &source.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .with_context(|| format!("invalid header name `{key}`"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header `{key}`"))?;
            headers.insert(name, value);
        }

        Ok(Self::new(client, source.url.clone(), timeouts).with_headers(headers))
    }

    /// Adds headers that are sent with every request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Resolves the download URL for `path`.
    fn url_for(&self, path: &str) -> LoadResult<Url> {
        if let Ok(url) = Url::parse(path) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(url);
            }
        }

        let base_url = self.base_url.as_ref().ok_or_else(|| {
            LoadError::Transport(format!("cannot resolve relative path `{path}` without a base url"))
        })?;
        base_url
            .join(path.trim_start_matches('/'))
            .map_err(|_| LoadError::NotFound)
    }

    async fn download(&self, url: Url) -> LoadResult<Bytes> {
        tracing::debug!("Fetching asset from `{}`", url);

        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|err| self.map_error(err))?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!("Success hitting `{}`", response.url());
            return response.bytes().await.map_err(|err| self.map_error(err));
        }

        tracing::debug!("Unexpected status code from `{}`: {}", response.url(), status);
        match status {
            StatusCode::NOT_FOUND => Err(LoadError::NotFound),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(LoadError::PermissionDenied(status.to_string()))
            }
            _ => Err(LoadError::Transport(status.to_string())),
        }
    }

    /// Maps a client error.
    ///
    /// The overall download timeout is enforced in [`fetch`](Transport::fetch). Other timeouts
    /// configured on a custom client have no known duration and count as transport errors.
    fn map_error(&self, err: reqwest::Error) -> LoadError {
        if err.is_connect() && err.is_timeout() {
            LoadError::Timeout(self.timeouts.connect)
        } else {
            let dynerr: &dyn std::error::Error = &err; // tracing expects a `&dyn Error`
            tracing::debug!(error = dynerr, "HTTP request failed");
            LoadError::Transport(err.to_string())
        }
    }
}

impl Transport for HttpTransport {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, LoadResult<Bytes>> {
        Box::pin(async move {
            let url = self.url_for(path)?;
            let max_download = self.timeouts.max_download;

            match tokio::time::timeout(max_download, self.download(url)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(LoadError::Timeout(max_download)),
            }
        })
    }
}

/// Makes sure relative paths are joined below the full base path, not next to its last segment.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
