// ABOUTME: Turns one feed entry into an ItemRecord with rewritten HTML and downloaded media.
// ABOUTME: Declared media keep their bucket even when the download fails; inline images only on success.

use rssdump_feed::{EntryView, ItemRecord};
use tracing::debug;

use crate::download::MediaStore;
use crate::rewrite::rewrite_images;

/// Builds the record for `entry`, downloading everything it references through `store`.
///
/// Images are rewritten in `content` when it is non-blank, otherwise in `description`;
/// the other field is left as published.
pub async fn extract_item(entry: &EntryView<'_>, store: &dyn MediaStore) -> ItemRecord {
    let mut record = entry.base_record();
    let base_url = entry.base_url();

    let has_content = record
        .content
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    let html_field = if has_content {
        &mut record.content
    } else {
        &mut record.description
    };
    let mut inline = Vec::new();
    if let Some(html) = html_field.clone() {
        let (rewritten, downloaded) = rewrite_images(&html, base_url.as_deref(), store).await;
        *html_field = Some(rewritten);
        inline = downloaded;
    }

    for media_ref in entry.media_refs() {
        let category = media_ref.category;
        let mut media = media_ref.entry;
        media.local_path = store
            .fetch_and_store(&media.original_url, category, base_url.as_deref())
            .await;
        record.media.push(category, media);
    }
    record.media.images.extend(inline);

    debug!(guid = %record.guid, images = record.media.images.len(), "item extracted");
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rssdump_feed::{parse_feed_bytes, MediaCategory, MediaSource};
    use std::sync::Mutex;

    struct StubStore {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaStore for StubStore {
        async fn fetch_and_store(
            &self,
            url: &str,
            category: MediaCategory,
            _referer: Option<&str>,
        ) -> Option<String> {
            self.calls.lock().unwrap().push(url.to_string());
            if url.contains("broken") {
                return None;
            }
            Some(format!("{}/{}", category.dir_name(), url.rsplit('/').next()?))
        }
    }

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"
     xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:media="http://search.yahoo.com/mrss/"
     xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
  <title>Blog</title>
  <link>https://example.com/</link>
  <item>
    <title>Post</title>
    <link>https://example.com/post</link>
    <guid>post-1</guid>
    <description><![CDATA[<p>Summary <img src="/teaser.png"></p>]]></description>
    <content:encoded><![CDATA[<p>Body</p><img src="/body.png">]]></content:encoded>
    <dc:creator>Ada</dc:creator>
    <media:thumbnail url="https://cdn.example.com/broken.jpg"/>
    <enclosure url="https://cdn.example.com/ep.mp3" type="audio/mpeg" length="1234"/>
  </item>
  <item>
    <title>Short</title>
    <description><![CDATA[<img src="https://example.com/only.gif">]]></description>
  </item>
</channel>
</rss>"#;

    fn store() -> StubStore {
        StubStore {
            calls: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn rewrites_content_and_collects_media() {
        let parsed = parse_feed_bytes(FEED.as_bytes(), "https://example.com/feed").unwrap();
        let store = store();
        let entry = parsed.entries().next().unwrap();

        let record = extract_item(&entry, &store).await;

        assert_eq!(record.guid, "post-1");
        assert_eq!(record.content.as_deref(), Some(r#"<p>Body</p><img src="images/body.png">"#));
        assert_eq!(
            record.description.as_deref(),
            Some(r#"<p>Summary <img src="/teaser.png"></p>"#)
        );
        assert_eq!(record.extensions["dc:creator"].first(), Some("Ada"));

        let images = &record.media.images;
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].original_url, "https://cdn.example.com/broken.jpg");
        assert_eq!(images[0].local_path, None);
        assert_eq!(images[0].source, Some(MediaSource::Thumbnail));
        assert_eq!(images[1].local_path.as_deref(), Some("images/body.png"));
        assert_eq!(images[1].source, Some(MediaSource::Inline));

        let audio = &record.media.audio;
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].local_path.as_deref(), Some("audio/ep.mp3"));
        assert_eq!(audio[0].length, Some(1234));
        assert!(!store.calls.lock().unwrap().iter().any(|u| u.contains("teaser")));
    }

    #[tokio::test]
    async fn falls_back_to_description() {
        let parsed = parse_feed_bytes(FEED.as_bytes(), "https://example.com/feed").unwrap();
        let store = store();
        let entry = parsed.entries().nth(1).unwrap();

        let record = extract_item(&entry, &store).await;

        assert_eq!(record.description.as_deref(), Some(r#"<img src="images/only.gif">"#));
        assert_eq!(record.content, None);
        assert_eq!(record.guid, "item_2");
        assert_eq!(record.media.images.len(), 1);
    }
}
