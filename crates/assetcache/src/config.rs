use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the asset cache.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: std::env::var("STATSD_SERVER").ok(),
            prefix: "assetcache".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Configuration of a source that serves assets via HTTP.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpSourceConfig {
    /// The URL relative asset paths are resolved against.
    ///
    /// Without a base URL, only absolute `http` and `https` paths can be loaded.
    pub url: Option<Url>,
    /// Additional headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

/// Configuration of a source that reads assets from a local directory.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FilesystemSourceConfig {
    /// The directory asset paths are resolved in.
    pub path: PathBuf,
}

/// Where the asset cache fetches assets from.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Assets are downloaded via HTTP.
    Http(HttpSourceConfig),
    /// Assets are read from the local filesystem.
    Filesystem(FilesystemSourceConfig),
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Http(HttpSourceConfig::default())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// The source assets are fetched from.
    pub source: SourceConfig,

    /// The timeout for establishing a connection in a download.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// The maximum timeout for downloads, including the response body.
    #[serde(with = "humantime_serde")]
    pub max_download_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: Logging::default(),
            metrics: Metrics::default(),
            source: SourceConfig::default(),
            connect_timeout: Duration::from_secs(1),
            max_download_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, or returns the default configuration.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(E::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}
