// ABOUTME: Looks for a recent dump of the same feed in the Internet Archive catalog.
// ABOUTME: Queries the advanced-search endpoint and matches original URL variants or identifiers.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::ArchiveError;
use crate::fetcher::Fetcher;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://archive.org/advancedsearch.php";
/// Subject every uploaded dump carries.
pub const DUMP_SUBJECT: &str = "RSSDumper";
pub const RECENT_DAYS: i64 = 365;

/// Catalog item returned by the search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteItem {
    pub identifier: String,
    #[serde(default)]
    pub originalurl: Option<String>,
    #[serde(default)]
    pub addeddate: Option<String>,
}

impl RemoteItem {
    pub fn details_url(&self) -> String {
        format!("https://archive.org/details/{}", self.identifier)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchDocs,
}

#[derive(Debug, Deserialize)]
struct SearchDocs {
    #[serde(default)]
    docs: Vec<RemoteItem>,
}

/// Lower-cased URL with and without the trailing slash, plus the same for its parent path.
pub fn url_variants(feed_url: &str) -> Vec<String> {
    let lower = feed_url.trim().to_lowercase();
    let trimmed = lower.trim_end_matches('/').to_string();
    let mut variants = vec![lower.clone(), trimmed.clone(), format!("{}/", trimmed)];

    if let Ok(parsed) = Url::parse(&lower) {
        let path = parsed.path();
        if !path.is_empty() && path != "/" {
            let parent = path.trim_end_matches('/').rsplit_once('/').map(|(p, _)| p).unwrap_or("");
            let host = parsed.host_str().unwrap_or_default();
            let origin = match parsed.port() {
                Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
                None => format!("{}://{}", parsed.scheme(), host),
            };
            let parent_url = format!("{}{}", origin, parent);
            let parent_trimmed = parent_url.trim_end_matches('/').to_string();
            variants.extend([parent_url.clone(), parent_trimmed.clone(), format!("{}/", parent_trimmed)]);
        }
    }

    let mut unique = Vec::new();
    for v in variants {
        if !unique.contains(&v) {
            unique.push(v);
        }
    }
    unique
}

/// Search query for dumps of `feed_url` added between `since` and `until`.
pub fn build_query(feed_url: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> String {
    let domain = Url::parse(&feed_url.to_lowercase())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let urls = url_variants(feed_url)
        .iter()
        .map(|v| format!("originalurl:\"{}\"", v))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!(
        "(subject:\"{}\" AND ({} OR identifier:\"rss-*{}*\")) AND addeddate:[{} TO {}]",
        DUMP_SUBJECT,
        urls,
        domain,
        since.format("%Y-%m-%dT%H:%M:%SZ"),
        until.format("%Y-%m-%dT%H:%M:%SZ"),
    )
}

/// Whether a search hit really belongs to `feed_url`.
pub fn is_match(feed_url: &str, item: &RemoteItem) -> bool {
    let wanted = feed_url.trim().to_lowercase();
    let wanted = wanted.trim_end_matches('/');
    let stored = item.originalurl.as_deref().unwrap_or_default().to_lowercase();
    let stored = stored.trim_end_matches('/');
    let domain = Url::parse(wanted)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let exact = !stored.is_empty() && wanted == stored;
    let parent = !stored.is_empty()
        && (wanted.starts_with(&format!("{}/", stored))
            || wanted.rsplit_once('/').map(|(p, _)| p) == Some(stored));
    let by_identifier = !domain.is_empty() && item.identifier.to_lowercase().contains(&domain);
    exact || parent || by_identifier
}

/// First dump of `feed_url` added in the last `days` days, if any.
pub async fn find_recent_dump(
    fetcher: &dyn Fetcher,
    endpoint: &str,
    feed_url: &str,
    days: i64,
) -> Result<Option<RemoteItem>, ArchiveError> {
    let until = Utc::now();
    let since = until - ChronoDuration::days(days);
    let query = build_query(feed_url, since, until);
    let search_url = Url::parse_with_params(
        endpoint,
        &[
            ("q", query.as_str()),
            ("fl[]", "identifier"),
            ("fl[]", "originalurl"),
            ("fl[]", "addeddate"),
            ("sort[]", "addeddate desc"),
            ("rows", "50"),
            ("output", "json"),
        ],
    )
    .map_err(|e| ArchiveError::invalid_url(endpoint, "RemoteCheck", Some(anyhow::Error::new(e))))?;

    debug!(query = %query, "searching catalog");
    let response = fetcher.get(search_url.as_str(), &[]).await?;
    let parsed: SearchResponse = serde_json::from_slice(&response.body).map_err(|e| {
        ArchiveError::parse(search_url.as_str(), "RemoteCheck", Some(anyhow::Error::new(e)))
    })?;

    let found = parsed
        .response
        .docs
        .into_iter()
        .find(|item| is_match(feed_url, item));
    if let Some(item) = &found {
        info!(identifier = %item.identifier, "existing dump found");
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::HttpFetcher;
    use crate::options::Options;
    use httpmock::prelude::*;

    #[test]
    fn variants_cover_slashes_and_parent() {
        let variants = url_variants("https://Example.com/blog/feed/");
        assert!(variants.contains(&"https://example.com/blog/feed/".to_string()));
        assert!(variants.contains(&"https://example.com/blog/feed".to_string()));
        assert!(variants.contains(&"https://example.com/blog".to_string()));
        assert!(variants.contains(&"https://example.com/blog/".to_string()));
        let unique: std::collections::HashSet<_> = variants.iter().collect();
        assert_eq!(unique.len(), variants.len());
    }

    #[test]
    fn matching_rules() {
        let item = |id: &str, url: Option<&str>| RemoteItem {
            identifier: id.to_string(),
            originalurl: url.map(str::to_string),
            addeddate: None,
        };
        let feed = "https://example.com/blog/feed";
        assert!(is_match(feed, &item("x", Some("https://example.com/blog/feed/"))));
        assert!(is_match(feed, &item("x", Some("https://example.com/blog"))));
        assert!(is_match(feed, &item("rss-example.com_20240101_000000", None)));
        assert!(!is_match(feed, &item("rss-other.org_20240101_000000", Some("https://other.org/feed"))));
    }

    #[tokio::test]
    async fn finds_matching_item() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/advancedsearch.php")
                .query_param("output", "json")
                .query_param("rows", "50");
            then.status(200).header("content-type", "application/json").body(
                r#"{"responseHeader":{},"response":{"numFound":2,"docs":[
                    {"identifier":"rss-unrelated.org_20240101_000000","originalurl":"https://unrelated.org/rss"},
                    {"identifier":"rss-blog_20240301_101010","originalurl":"https://example.com/feed/"}
                ]}}"#,
            );
        });
        let fetcher = HttpFetcher::new(&Options {
            max_retries: 0,
            ..Options::default()
        });

        let found = find_recent_dump(
            &fetcher,
            &server.url("/advancedsearch.php"),
            "https://example.com/feed",
            RECENT_DAYS,
        )
        .await
        .unwrap();

        mock.assert();
        assert_eq!(found.unwrap().identifier, "rss-blog_20240301_101010");
    }
}
