// ABOUTME: Network-free feed layer for rssdump: parsing, archive records and classification.
// ABOUTME: Provides feed parsing, namespace field tables, media references, date/duration and URL helpers.

pub mod classify;
pub mod duration_parse;
pub mod error;
pub mod extensions;
pub mod fields;
pub mod html_utils;
pub mod media;
pub mod models;
pub mod parser;
pub mod time_parse;

pub use classify::{classify_media, url_extension};
pub use duration_parse::parse_duration_seconds;
pub use error::FeedError;
pub use extensions::{scan_raw_feed, RawElement, RawElements, RawFeed};
pub use fields::{collect_fields, NamespaceFields, CHANNEL_FIELDS, ITEM_FIELDS};
pub use html_utils::{decode_entities, find_icon_links, find_img_sources, strip_html};
pub use media::{collect_media_refs, MediaRef};
pub use models::{
    ChannelImage, DownloadedMedia, ExtensionFields, FeedMetadata, FieldValue, ItemRecord,
    MediaCategory, MediaEntry, MediaSource,
};
pub use parser::{parse_feed_bytes, DeclaredImage, EntryView, ParsedFeed};
pub use time_parse::{date_prefix, parse_flexible_time};

// ----------------------------------------------------------------------------
// URL utilities
// ----------------------------------------------------------------------------

use url::Url;

/// Extracts the base domain (scheme + host + optional port) from a URL.
pub fn base_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{}://{}:{}", parsed.scheme(), host, port)),
        None => Some(format!("{}://{}", parsed.scheme(), host)),
    }
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_http_url(url: &str) -> bool {
    Url::parse(url.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Normalizes a user-supplied feed URL.
///
/// Trims whitespace, assumes `https://` when no scheme is given, requires a host,
/// punycode-encodes internationalized hosts and drops default ports.
pub fn standardize_url(input: &str) -> Result<String, FeedError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FeedError::invalid("empty URL"));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let parsed = Url::parse(&candidate)
        .map_err(|e| FeedError::invalid(format!("{}: {}", trimmed, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FeedError::invalid(format!(
            "{}: unsupported scheme {}",
            trimmed,
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(FeedError::invalid(format!("{}: missing host", trimmed)));
    }
    Ok(parsed.to_string())
}

/// Resolves a possibly relative reference against `base_url`.
///
/// Absolute `http(s)` references are returned as-is; relative ones need a base.
/// Other schemes (`data:`, `mailto:`, `javascript:`) yield `None`.
pub fn resolve_url(src: &str, base_url: Option<&str>) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        return None;
    }
    if let Ok(absolute) = Url::parse(src) {
        return matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string());
    }
    let base = Url::parse(base_url?).ok()?;
    let resolved = base.join(src).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardize_adds_scheme_and_drops_default_port() {
        assert_eq!(
            standardize_url("  example.com/feed ").unwrap(),
            "https://example.com/feed"
        );
        assert_eq!(
            standardize_url("http://example.com:80/rss").unwrap(),
            "http://example.com/rss"
        );
        assert_eq!(
            standardize_url("https://bücher.de/feed").unwrap(),
            "https://xn--bcher-kva.de/feed"
        );
    }

    #[test]
    fn standardize_rejects_hostless_and_other_schemes() {
        assert!(standardize_url("").is_err());
        assert!(standardize_url("ftp://example.com/feed").is_err());
        assert!(standardize_url("https://").is_err());
    }

    #[test]
    fn resolve_relative_and_absolute() {
        assert_eq!(
            resolve_url("/img/a.png", Some("https://example.com/post/1")).as_deref(),
            Some("https://example.com/img/a.png")
        );
        assert_eq!(
            resolve_url("b.png", Some("https://example.com/post/")).as_deref(),
            Some("https://example.com/post/b.png")
        );
        assert_eq!(
            resolve_url("http://x/a.png", None).as_deref(),
            Some("http://x/a.png")
        );
        assert_eq!(resolve_url("/img/a.png", None), None);
        assert_eq!(resolve_url("data:image/png;base64,AAAA", None), None);
    }

    #[test]
    fn base_domain_keeps_port() {
        assert_eq!(
            base_domain("http://127.0.0.1:8080/feed.xml").as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert!(is_http_url("https://example.com/a"));
        assert!(!is_http_url("mailto:a@example.com"));
    }
}
