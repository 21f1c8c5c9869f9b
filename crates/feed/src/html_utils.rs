// ABOUTME: Tolerant, regex-based HTML helpers for untrusted feed markup.
// ABOUTME: Tag stripping, entity decoding, <img src> location and <link rel=icon> discovery.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("valid regex"));
static NAMED_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&([a-zA-Z][a-zA-Z0-9]{1,8});").expect("valid regex"));
static IMG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid regex"));
static LINK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<link\b[^>]*>").expect("valid regex"));
/// One attribute: name, then a double-quoted, single-quoted or bare value.
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid regex")
});

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", " "),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("ldquo", "\u{201C}"),
    ("rdquo", "\u{201D}"),
    ("hellip", "\u{2026}"),
    ("copy", "\u{00A9}"),
    ("reg", "\u{00AE}"),
    ("trade", "\u{2122}"),
    ("bull", "\u{2022}"),
    ("middot", "\u{00B7}"),
    ("euro", "\u{20AC}"),
    ("pound", "\u{00A3}"),
];

/// Removes tags, decodes entities and collapses whitespace.
pub fn strip_html(s: &str) -> String {
    let text = TAG.replace_all(s, " ");
    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes numeric entities and a small set of common named ones. Unknown entities are kept.
pub fn decode_entities(s: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(s, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    NAMED_ENTITY
        .replace_all(&numeric, |caps: &regex::Captures| {
            NAMED_ENTITIES
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Byte range of every non-empty `src` value inside an `<img>` tag, in document order.
///
/// The ranges cover the raw attribute text (without quotes) so callers can splice replacements
/// while leaving the rest of the markup byte-identical.
pub fn find_img_sources(html: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    for tag in IMG_TAG.find_iter(html) {
        let Some(value) = attribute_in(tag.as_str(), "src") else {
            continue;
        };
        if value.as_str().trim().is_empty() {
            continue;
        }
        ranges.push(tag.start() + value.start()..tag.start() + value.end());
    }
    ranges
}

/// Icon candidates advertised by `<link>` elements, best first:
/// `apple-touch-icon`, then `icon`, then `shortcut icon`. Attribute order does not matter.
pub fn find_icon_links(html: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for tag in LINK_TAG.find_iter(html) {
        let tag = tag.as_str();
        let (Some(rel), Some(href)) = (attribute_in(tag, "rel"), attribute_in(tag, "href")) else {
            continue;
        };
        let href = decode_entities(href.as_str().trim());
        if href.is_empty() {
            continue;
        }
        let rel = rel.as_str().to_ascii_lowercase();
        let tokens: Vec<&str> = rel.split_whitespace().collect();
        let rank = if tokens.contains(&"apple-touch-icon")
            || tokens.contains(&"apple-touch-icon-precomposed")
        {
            0
        } else if tokens == ["icon"] {
            1
        } else if tokens.contains(&"shortcut") && tokens.contains(&"icon") {
            2
        } else if tokens.contains(&"icon") {
            1
        } else {
            continue;
        };
        found.push((rank, href));
    }
    // Stable: document order is kept within one rank.
    found.sort_by_key(|(rank, _)| *rank);
    found.into_iter().map(|(_, href)| href).collect()
}

/// Locates the value of `name` within a single tag.
fn attribute_in<'t>(tag: &'t str, name: &str) -> Option<regex::Match<'t>> {
    ATTRIBUTE.captures_iter(tag).find_map(|caps| {
        let key = caps.get(1)?;
        if !key.as_str().eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_collapses() {
        assert_eq!(strip_html("<p>Hello</p>\n\n<p>World</p>"), "Hello World");
        assert_eq!(strip_html("<b>Tom</b> &amp; Jerry"), "Tom & Jerry");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(decode_entities("&#38;&#x26;&lt;"), "&&<");
        assert_eq!(decode_entities("&copy; 2024"), "\u{00A9} 2024");
        assert_eq!(decode_entities("&unknown;"), "&unknown;");
    }

    #[test]
    fn finds_img_sources_in_any_quoting() {
        let html = r#"<p>a</p><img alt="x" src="http://x/a.png"><IMG SRC='b.jpg' /><img src=c.gif><img src="">"#;
        let found: Vec<&str> = find_img_sources(html)
            .into_iter()
            .map(|r| &html[r])
            .collect();
        assert_eq!(found, vec!["http://x/a.png", "b.jpg", "c.gif"]);
    }

    #[test]
    fn data_src_is_not_src() {
        let html = r#"<img data-src="lazy.png" src="real.png">"#;
        let found: Vec<&str> = find_img_sources(html)
            .into_iter()
            .map(|r| &html[r])
            .collect();
        assert_eq!(found, vec!["real.png"]);
    }

    #[test]
    fn icon_links_ranked() {
        let html = r#"<head>
<link rel="shortcut icon" href="/favicon.ico">
<link href="/icon-32.png" rel="icon" sizes="32x32">
<link rel="stylesheet" href="/site.css">
<link rel="apple-touch-icon" href="/touch.png">
</head>"#;
        assert_eq!(
            find_icon_links(html),
            vec!["/touch.png", "/icon-32.png", "/favicon.ico"]
        );
    }
}
