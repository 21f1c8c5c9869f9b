// ABOUTME: Configuration for archive runs including ItemFormat, Options and ArchiverBuilder.
// ABOUTME: ArchiverBuilder provides a fluent API for constructing Archiver instances.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archiver::Archiver;
use crate::fetcher::{Fetcher, HttpFetcher};

/// Version string recorded in run configs and capture files.
pub const DUMPER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default User-Agent for every outbound request.
pub fn default_user_agent() -> String {
    format!("rssdump/{} (+https://github.com/rssdump)", DUMPER_VERSION)
}

/// On-disk format of per-item records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemFormat {
    #[default]
    Json,
    #[serde(rename = "md")]
    Markdown,
}

impl ItemFormat {
    /// File extension used for item files.
    pub fn extension(self) -> &'static str {
        match self {
            ItemFormat::Json => "json",
            ItemFormat::Markdown => "md",
        }
    }
}

impl fmt::Display for ItemFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Returned when an item format name is neither `json` nor `md`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown item format {0:?} (expected json or md)")]
pub struct UnknownItemFormat(pub String);

impl FromStr for ItemFormat {
    type Err = UnknownItemFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ItemFormat::Json),
            "markdown" | "md" => Ok(ItemFormat::Markdown),
            _ => Err(UnknownItemFormat(s.to_string())),
        }
    }
}

/// Configuration options for an archive run.
#[derive(Debug, Clone)]
pub struct Options {
    pub timeout: Duration,
    pub user_agent: String,
    pub item_format: ItemFormat,
    /// Convert `.ico` downloads to PNG when the `icon-raster` feature is compiled in.
    pub convert_icons: bool,
    /// Write a WARC capture of every exchange to `feed.warc.gz`.
    pub capture: bool,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub http_client: Option<reqwest::Client>,
    pub headers: HashMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: default_user_agent(),
            item_format: ItemFormat::Json,
            convert_icons: true,
            capture: false,
            max_retries: 5,
            backoff_base: Duration::from_millis(1500),
            http_client: None,
            headers: HashMap::new(),
        }
    }
}

/// Builder for constructing Archiver instances with custom configuration.
#[derive(Clone)]
pub struct ArchiverBuilder {
    opts: Options,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl ArchiverBuilder {
    /// Create a new ArchiverBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: Options::default(),
            fetcher: None,
        }
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Set the item file format.
    pub fn item_format(mut self, format: ItemFormat) -> Self {
        self.opts.item_format = format;
        self
    }

    pub fn convert_icons(mut self, convert: bool) -> Self {
        self.opts.convert_icons = convert;
        self
    }

    /// Enable or disable the WARC capture file.
    pub fn capture(mut self, capture: bool) -> Self {
        self.opts.capture = capture;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.opts.max_retries = retries;
        self
    }

    /// Base delay of the exponential backoff.
    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.opts.backoff_base = base;
        self
    }

    /// Use a custom HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Add a custom header to all requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Replace the HTTP fetcher entirely (tests, alternative transports).
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Build the Archiver with the configured options.
    pub fn build(self) -> Archiver {
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::new(&self.opts)));
        Archiver::new(self.opts, fetcher)
    }
}

impl Default for ArchiverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_format_parsing() {
        assert_eq!("md".parse::<ItemFormat>(), Ok(ItemFormat::Markdown));
        assert_eq!("Markdown".parse::<ItemFormat>(), Ok(ItemFormat::Markdown));
        assert_eq!("json".parse::<ItemFormat>(), Ok(ItemFormat::Json));
        assert_eq!(
            "mdd".parse::<ItemFormat>(),
            Err(UnknownItemFormat("mdd".to_string()))
        );
        assert!("xml".parse::<ItemFormat>().is_err());
        assert_eq!(ItemFormat::Markdown.extension(), "md");
        assert_eq!(
            serde_json::to_string(&ItemFormat::Markdown).unwrap(),
            "\"md\""
        );
    }

    #[test]
    fn defaults() {
        let opts = Options::default();
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.max_retries, 5);
        assert_eq!(opts.backoff_base, Duration::from_millis(1500));
        assert!(opts.user_agent.starts_with("rssdump/"));
        assert!(opts.convert_icons);
        assert!(!opts.capture);
    }
}
