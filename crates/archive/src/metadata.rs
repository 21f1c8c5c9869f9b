// ABOUTME: Builds the channel-level FeedMetadata record, including the channel image download.
// ABOUTME: Declared images win; otherwise the site's favicon is used when the channel has a link.

use rssdump_feed::{ChannelImage, FeedMetadata, MediaCategory, ParsedFeed};
use tracing::{debug, info};

use crate::download::MediaStore;
use crate::favicon::discover_favicon;
use crate::fetcher::Fetcher;

/// Channel record for `parsed`, with `image` resolved and downloaded into `images/`.
///
/// Image failures leave `local_path` empty or drop the image; they never fail the record.
pub async fn extract_metadata(
    parsed: &ParsedFeed,
    fetcher: &dyn Fetcher,
    store: &dyn MediaStore,
    fetched_at: &str,
) -> FeedMetadata {
    let mut metadata = parsed.base_metadata(fetched_at);
    let referer = metadata.link.clone();

    if let Some(declared) = parsed.declared_image() {
        let local_path = store
            .fetch_and_store(&declared.url, MediaCategory::Image, referer.as_deref())
            .await;
        info!(url = %declared.url, stored = local_path.is_some(), "channel image");
        metadata.image = Some(ChannelImage {
            url: declared.url,
            local_path,
            is_favicon: false,
            title: declared.title,
            link: declared.link,
        });
        return metadata;
    }

    let Some(site) = metadata.link.clone() else {
        debug!("no channel image and no channel link");
        return metadata;
    };
    if let Some(icon) = discover_favicon(fetcher, &site).await {
        let local_path = store
            .fetch_and_store(&icon, MediaCategory::Image, Some(&site))
            .await;
        info!(url = %icon, stored = local_path.is_some(), "favicon");
        metadata.image = Some(ChannelImage {
            url: icon,
            local_path,
            is_favicon: true,
            title: None,
            link: Some(site),
        });
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::MediaDownloader;
    use crate::fetcher::HttpFetcher;
    use crate::options::Options;
    use httpmock::prelude::*;
    use rssdump_feed::parse_feed_bytes;
    use std::sync::Arc;

    fn fetcher() -> Arc<HttpFetcher> {
        Arc::new(HttpFetcher::new(&Options {
            max_retries: 0,
            ..Options::default()
        }))
    }

    fn feed(channel_extra: &str, link: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
  <title>Show</title>
  <link>{link}</link>
  <description>About the show</description>
  <language>en</language>
  <dc:creator>Jane</dc:creator>
  {channel_extra}
  <item><title>One</title><guid>1</guid></item>
</channel>
</rss>"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn downloads_declared_image() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/art.jpg");
            then.status(200).body("jpg");
        });
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let store = MediaDownloader::new(dir.path(), fetcher.clone());
        let bytes = feed(
            &format!(r#"<itunes:image href="{}"/>"#, server.url("/art.jpg")),
            "https://example.com/",
        );
        let parsed = parse_feed_bytes(&bytes, "https://example.com/feed").unwrap();

        let meta = extract_metadata(&parsed, fetcher.as_ref(), &store, "2024-01-01T00:00:00Z").await;

        let image = meta.image.unwrap();
        assert_eq!(image.local_path.as_deref(), Some("images/art.jpg"));
        assert!(!image.is_favicon);
        assert_eq!(meta.title.as_deref(), Some("Show"));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.items_count, 1);
        assert_eq!(meta.extensions["dc:creator"].first(), Some("Jane"));
    }

    #[tokio::test]
    async fn falls_back_to_favicon() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body(r#"<link rel="icon" href="/icon.png">"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/icon.png");
            then.status(200).body("png");
        });
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let store = MediaDownloader::new(dir.path(), fetcher.clone());
        let bytes = feed("", &server.url("/"));
        let parsed = parse_feed_bytes(&bytes, &server.url("/feed")).unwrap();

        let meta = extract_metadata(&parsed, fetcher.as_ref(), &store, "2024-01-01T00:00:00Z").await;

        let image = meta.image.unwrap();
        assert!(image.is_favicon);
        assert_eq!(image.url, server.url("/icon.png"));
        assert_eq!(image.local_path.as_deref(), Some("images/icon.png"));
    }

    #[tokio::test]
    async fn failed_declared_image_keeps_url_without_path() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gone.jpg");
            then.status(404);
        });
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let store = MediaDownloader::new(dir.path(), fetcher.clone());
        let bytes = feed(
            &format!("<image><url>{}</url><title>Logo</title></image>", server.url("/gone.jpg")),
            "https://example.com/",
        );
        let parsed = parse_feed_bytes(&bytes, "https://example.com/feed").unwrap();

        let meta = extract_metadata(&parsed, fetcher.as_ref(), &store, "2024-01-01T00:00:00Z").await;

        let image = meta.image.unwrap();
        assert_eq!(image.url, server.url("/gone.jpg"));
        assert_eq!(image.local_path, None);
        assert_eq!(image.title.as_deref(), Some("Logo"));
    }
}
