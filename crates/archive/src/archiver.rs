// ABOUTME: Archiver orchestrates one run: lock, fetch, raw backup, parse, metadata, items, summary.
// ABOUTME: Fatal failures are returned as ArchiveError; per-asset failures only show up as absence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};
use rssdump_feed::{parse_feed_bytes, standardize_url, FeedError};
use tracing::{info, warn};

use crate::capture::{CaptureSink, WarcWriter};
use crate::config::{load_config, update_config, RunConfig, RunStatus};
use crate::download::MediaDownloader;
use crate::error::ArchiveError;
use crate::fetcher::Fetcher;
use crate::item::extract_item;
use crate::lock::ArchiveLock;
use crate::metadata::extract_metadata;
use crate::options::{ArchiverBuilder, Options, DUMPER_VERSION};
use crate::summary::Summary;
use crate::writer::ArchiveWriter;

/// `<host, ':' replaced by '_'>_<YYYYMMDD_HHMMSS>` for a feed URL.
pub fn default_output_dir<Tz: TimeZone>(feed_url: &str, now: DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    let host = url::Url::parse(feed_url)
        .ok()
        .and_then(|u| {
            u.host_str().map(|h| match u.port() {
                Some(port) => format!("{}:{}", h, port),
                None => h.to_string(),
            })
        })
        .unwrap_or_else(|| "feed".to_string());
    PathBuf::from(format!("{}_{}", host.replace(':', "_"), now.format("%Y%m%d_%H%M%S")))
}

/// Default output directory using the local clock.
pub fn default_output_dir_now(feed_url: &str) -> PathBuf {
    default_output_dir(feed_url, Local::now())
}

/// Runs the feed-to-archive pipeline.
pub struct Archiver {
    opts: Options,
    fetcher: Arc<dyn Fetcher>,
}

impl Archiver {
    pub fn new(opts: Options, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { opts, fetcher }
    }

    pub fn builder() -> ArchiverBuilder {
        ArchiverBuilder::new()
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Archives `url` into `root`, creating the directory if needed.
    ///
    /// A root already holding an archive of another feed is refused before anything is written.
    /// The run config in `dumpMeta/` is marked `success` or `failed` accordingly.
    pub async fn run(&self, url: &str, root: &Path) -> Result<Summary, ArchiveError> {
        let feed_url = standardize_url(url)
            .map_err(|e| ArchiveError::invalid_url(url, "Archive", Some(anyhow::Error::new(e))))?;

        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| ArchiveError::io(root.display().to_string(), "CreateRoot", e))?;
        let _lock = ArchiveLock::acquire(root)?;

        // A root is reused only by the feed that created it.
        if let Some(existing) = load_config(root).await.source_url {
            if existing != feed_url {
                return Err(ArchiveError::source_mismatch(feed_url, &existing));
            }
        }

        update_config(
            root,
            &RunConfig {
                source_url: Some(feed_url.clone()),
                dumper_version: Some(DUMPER_VERSION.to_string()),
                started_at: Some(now_rfc3339()),
                item_format: Some(self.opts.item_format),
                status: Some(RunStatus::Running),
                ..Default::default()
            },
        )
        .await?;

        let result = self.archive(&feed_url, root).await;

        let completion = match &result {
            Ok(summary) => RunConfig {
                completed_at: Some(now_rfc3339()),
                items_downloaded: Some(summary.items),
                media_downloaded: Some(summary.total_media()),
                status: Some(RunStatus::Success),
                ..Default::default()
            },
            Err(_) => RunConfig {
                completed_at: Some(now_rfc3339()),
                status: Some(RunStatus::Failed),
                ..Default::default()
            },
        };
        if let Err(e) = update_config(root, &completion).await {
            warn!(error = %e, "could not record run completion");
        }
        result
    }

    async fn archive(&self, feed_url: &str, root: &Path) -> Result<Summary, ArchiveError> {
        let mut writer = ArchiveWriter::create(root, self.opts.item_format).await?;

        let capture: Option<Arc<dyn CaptureSink>> = if self.opts.capture {
            Some(Arc::new(WarcWriter::open(root, &self.opts.user_agent)?))
        } else {
            None
        };

        info!(url = %feed_url, "fetching feed");
        let response = self.fetcher.get(feed_url, &[]).await?;
        let fetched_at = now_rfc3339();
        if let Some(sink) = &capture {
            if let Err(e) = sink.record(&response) {
                warn!(url = %feed_url, error = %e, "capture failed");
            }
        }
        writer.write_raw_feed(&response.body).await?;

        let parsed = parse_feed_bytes(&response.body, feed_url).map_err(|e| match e {
            FeedError::Empty => ArchiveError::empty_feed(feed_url, "ParseFeed"),
            other => ArchiveError::parse(feed_url, "ParseFeed", Some(anyhow::Error::new(other))),
        })?;
        for (prefix, uri) in parsed.namespaces() {
            info!(prefix = %prefix, uri = %uri, "namespace");
        }

        let store = MediaDownloader::new(root, self.fetcher.clone())
            .with_capture(capture.clone())
            .with_icon_conversion(self.opts.convert_icons);

        let metadata = extract_metadata(&parsed, self.fetcher.as_ref(), &store, &fetched_at).await;
        writer.write_metadata(&metadata).await?;

        let mut summary = Summary {
            root: root.to_path_buf(),
            feed_title: metadata.title.clone(),
            ..Default::default()
        };
        for entry in parsed.entries() {
            let record = extract_item(&entry, &store).await;
            let path = writer.write_item(&record, entry.index + 1).await?;
            info!(path = %path, title = record.title.as_deref().unwrap_or_default(), "item archived");
            summary.items += 1;
            summary.add_media(&record.media);
        }

        info!(items = summary.items, media = summary.total_media(), "feed archived");
        Ok(summary)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dir_from_host_and_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(
            default_output_dir("https://example.com/feed.xml", now),
            PathBuf::from("example.com_20240115_103000")
        );
        assert_eq!(
            default_output_dir("http://localhost:8080/rss", now),
            PathBuf::from("localhost_8080_20240115_103000")
        );
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        let err = Archiver::builder()
            .build()
            .run("ftp://example.com/feed", &root)
            .await
            .unwrap_err();
        assert!(err.is_invalid_url());
        assert!(!root.exists());
    }
}
