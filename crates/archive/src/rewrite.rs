// ABOUTME: Rewrites <img src> references in entry HTML to point at locally stored copies.
// ABOUTME: Only the URL text inside each tag changes; failed images keep their original URL.

use std::borrow::Cow;

use rssdump_feed::{decode_entities, find_img_sources, resolve_url, MediaCategory, MediaEntry, MediaSource};

use crate::download::MediaStore;

/// Downloads every image referenced by `html` and points each `src` at its local path.
///
/// Returns the rewritten markup and the images that were stored, in document order.
/// Relative sources are resolved against `base_url`, which is also sent as the Referer.
pub async fn rewrite_images(
    html: &str,
    base_url: Option<&str>,
    store: &dyn MediaStore,
) -> (String, Vec<MediaEntry>) {
    let mut output = html.to_string();
    let mut downloaded = Vec::new();
    if html.trim().is_empty() {
        return (output, downloaded);
    }

    // Replacement lengths differ from the originals; shift later ranges accordingly.
    let mut offset: isize = 0;
    for range in find_img_sources(html) {
        let original = decode_entities(html[range.clone()].trim());
        let Some(absolute) = resolve_url(&original, base_url) else {
            continue;
        };
        let Some(local_path) = store
            .fetch_and_store(&absolute, MediaCategory::Image, base_url)
            .await
        else {
            continue;
        };

        let quoted = range.start > 0 && matches!(html.as_bytes()[range.start - 1], b'"' | b'\'');
        let replacement = escape_attribute(&local_path, quoted);
        let start = (range.start as isize + offset) as usize;
        let end = (range.end as isize + offset) as usize;
        output.replace_range(start..end, &replacement);
        offset += replacement.len() as isize - range.len() as isize;

        let mut entry = MediaEntry::new(absolute, MediaSource::Inline);
        entry.local_path = Some(local_path);
        downloaded.push(entry);
    }

    (output, downloaded)
}

/// Local names may carry quotes or `&` from the source URL; keep them inside the attribute value.
fn escape_attribute(value: &str, quoted: bool) -> Cow<'_, str> {
    if quoted {
        html_escape::encode_quoted_attribute(value)
    } else {
        html_escape::encode_unquoted_attribute(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Succeeds for every URL except those containing `fail`.
    struct StubStore {
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl StubStore {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaStore for StubStore {
        async fn fetch_and_store(
            &self,
            url: &str,
            _category: MediaCategory,
            referer: Option<&str>,
        ) -> Option<String> {
            self.seen
                .lock()
                .unwrap()
                .push((url.to_string(), referer.map(str::to_string)));
            if url.contains("fail") {
                return None;
            }
            let name = url.rsplit('/').next().unwrap_or("x");
            Some(format!("images/{}", name))
        }
    }

    #[tokio::test]
    async fn preserves_everything_but_the_urls() {
        let html = r#"<p>Intro &amp; more</p><img class="hero" src="http://cdn.example.com/very/long/path/one.png" alt="one"> middle <IMG SRC='http://x/two.jpg'/><p>end</p>"#;
        let store = StubStore::new();

        let (out, downloaded) = rewrite_images(html, Some("https://example.com/post"), &store).await;

        assert_eq!(
            out,
            r#"<p>Intro &amp; more</p><img class="hero" src="images/one.png" alt="one"> middle <IMG SRC='images/two.jpg'/><p>end</p>"#
        );
        assert_eq!(downloaded.len(), 2);
        assert_eq!(downloaded[0].original_url, "http://cdn.example.com/very/long/path/one.png");
        assert_eq!(downloaded[1].local_path.as_deref(), Some("images/two.jpg"));
        assert!(downloaded.iter().all(|e| e.source == Some(MediaSource::Inline)));
    }

    #[tokio::test]
    async fn failed_image_keeps_original_url() {
        let html = r#"<img src="http://x/a.png"> text <img src="http://x/fail.png">"#;
        let store = StubStore::new();

        let (out, downloaded) = rewrite_images(html, None, &store).await;

        assert_eq!(out, r#"<img src="images/a.png"> text <img src="http://x/fail.png">"#);
        assert_eq!(downloaded.len(), 1);
        assert_eq!(downloaded[0].original_url, "http://x/a.png");
    }

    #[tokio::test]
    async fn relative_sources_resolve_against_base() {
        let html = r#"<img src="/img/a&amp;b.png">"#;
        let store = StubStore::new();

        let (out, downloaded) = rewrite_images(html, Some("https://example.com/posts/1"), &store).await;

        assert_eq!(out, r#"<img src="images/a&amp;b.png">"#);
        assert_eq!(downloaded[0].original_url, "https://example.com/img/a&b.png");
        let seen = store.seen.lock().unwrap();
        assert_eq!(seen[0].1.as_deref(), Some("https://example.com/posts/1"));
    }

    #[tokio::test]
    async fn unresolvable_sources_and_empty_input_are_left_alone() {
        let store = StubStore::new();

        let (out, downloaded) = rewrite_images("", Some("https://example.com"), &store).await;
        assert_eq!(out, "");
        assert!(downloaded.is_empty());

        let html = r#"<img src="relative.png"><img src="data:image/gif;base64,R0lG">"#;
        let (out, downloaded) = rewrite_images(html, None, &store).await;
        assert_eq!(out, html);
        assert!(downloaded.is_empty());
        assert!(store.seen.lock().unwrap().is_empty());
    }

    /// Returns the same local path for every URL.
    struct FixedStore(&'static str);

    #[async_trait]
    impl MediaStore for FixedStore {
        async fn fetch_and_store(
            &self,
            _url: &str,
            _category: MediaCategory,
            _referer: Option<&str>,
        ) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn quotes_in_local_names_cannot_close_the_attribute() {
        let store = FixedStore(r#"images/a" onerror="alert(1).png"#);

        let html = r#"<img src="http://x/a%22%20onerror%3D%22alert(1).png" alt="k">"#;
        let (out, downloaded) = rewrite_images(html, None, &store).await;
        assert_eq!(
            out,
            r#"<img src="images/a&quot; onerror=&quot;alert(1).png" alt="k">"#
        );
        assert_eq!(
            downloaded[0].local_path.as_deref(),
            Some(r#"images/a" onerror="alert(1).png"#)
        );

        let html = r#"<img src='http://x/q.png' alt="k">"#;
        let (out, _) = rewrite_images(html, None, &FixedStore("images/it's.png")).await;
        assert_eq!(out, r#"<img src='images/it&#x27;s.png' alt="k">"#);
    }

    #[tokio::test]
    async fn quote_from_percent_encoded_url_is_escaped_after_download() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path_includes("/a");
            then.status(200).body("img");
        });
        let dir = tempfile::tempdir().unwrap();
        let fetcher: std::sync::Arc<dyn crate::fetcher::Fetcher> =
            std::sync::Arc::new(crate::fetcher::HttpFetcher::new(&crate::options::Options::default()));
        let store = crate::download::MediaDownloader::new(dir.path(), fetcher);

        let html = format!(
            r#"<img src="{}" alt="k">"#,
            server.url("/a%22%20onerror%3D%22alert(1).png")
        );
        let (out, downloaded) = rewrite_images(&html, None, &store).await;

        assert_eq!(downloaded.len(), 1);
        assert!(!out.contains(r#"" onerror=""#));
        assert!(out.ends_with(r#"" alt="k">"#));
        assert_eq!(out.matches('"').count(), 4);
    }
}
