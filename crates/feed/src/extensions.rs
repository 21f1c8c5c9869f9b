// ABOUTME: Raw XML pass collecting namespace extension elements that feed-rs does not expose.
// ABOUTME: Canonicalizes prefixes through declared namespace URIs and groups elements per channel and per entry.

use std::collections::{BTreeMap, HashMap};

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Well-known namespace URIs and the prefix used for them in archive keys.
/// URIs are compared lowercased and without a trailing slash.
const KNOWN_NAMESPACES: &[(&str, &str)] = &[
    ("http://www.itunes.com/dtds/podcast-1.0.dtd", "itunes"),
    ("http://search.yahoo.com/mrss", "media"),
    ("http://purl.org/dc/elements/1.1", "dc"),
    ("http://purl.org/dc/terms", "dcterms"),
    ("http://purl.org/rss/1.0/modules/content", "content"),
    ("https://podcastindex.org/namespace/1.0", "podcast"),
    (
        "https://github.com/podcastindex-org/podcast-namespace/blob/main/docs/1.0.md",
        "podcast",
    ),
    ("http://www.georss.org/georss", "georss"),
    ("http://www.w3.org/2003/01/geo/wgs84_pos#", "geo"),
    ("http://purl.org/rss/1.0/modules/syndication", "sy"),
    (
        "http://backend.userland.com/creativecommonsrssmodule",
        "creativeCommons",
    ),
    ("http://web.resource.org/cc", "cc"),
    ("http://purl.org/rss/1.0/modules/slash", "slash"),
    ("http://wellformedweb.org/commentapi", "wfw"),
    ("http://www.w3.org/2005/atom", "atom"),
    ("http://www.google.com/schemas/play-podcasts/1.0", "googleplay"),
    ("http://rss.jwpcdn.com", "jwplayer"),
    ("http://www.w3.org/1999/02/22-rdf-syntax-ns#", "rdf"),
];

/// One element seen inside a channel or entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawElement {
    /// Canonical qualified name, e.g. `media:content`, or the bare local name for core elements.
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    /// Concatenated text/CDATA content, trimmed. Empty when the element has none.
    pub text: String,
    /// Nesting depth relative to the enclosing channel or entry (direct children are 1).
    pub depth: usize,
}

impl RawElement {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn text(&self) -> Option<&str> {
        if self.text.is_empty() {
            None
        } else {
            Some(self.text.as_str())
        }
    }

    /// Splits the canonical name into `(prefix, local)`; core elements have no prefix.
    pub fn split_name(&self) -> (Option<&str>, &str) {
        match self.name.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, self.name.as_str()),
        }
    }
}

/// Elements belonging to one channel or entry, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawElements {
    pub elements: Vec<RawElement>,
}

impl RawElements {
    /// All elements with the given canonical name, at any depth.
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RawElement> + 'a {
        self.elements.iter().filter(move |e| e.name == name)
    }

    /// First element with the given name at any depth.
    pub fn first<'a>(&'a self, name: &'a str) -> Option<&'a RawElement> {
        self.all(name).next()
    }

    /// Non-empty text of the first direct child with the given name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.elements
            .iter()
            .filter(|e| e.depth == 1 && e.name == name)
            .find_map(|e| e.text())
    }
}

/// Result of the raw pass over a whole document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeed {
    /// Declared prefix -> namespace URI, as written in the document.
    pub namespaces: BTreeMap<String, String>,
    pub channel: RawElements,
    /// One entry per `<item>`/`<entry>`, in document order.
    pub entries: Vec<RawElements>,
}

struct OpenElement {
    /// Index into the current element list, when the element is recorded.
    index: Option<usize>,
    is_entry: bool,
}

/// Scans raw RSS/Atom/RDF bytes and collects channel and entry elements.
///
/// Malformed input stops the scan at the first error; everything read so far is kept.
pub fn scan_raw_feed(data: &[u8]) -> RawFeed {
    let mut result = RawFeed::default();
    let mut reader = Reader::from_reader(data);

    let mut buf = Vec::new();
    // Declared prefix -> canonical prefix.
    let mut prefixes: HashMap<String, String> = HashMap::new();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut entry_depth: Option<usize> = None;
    let mut channel_depth: Option<usize> = None;
    let mut current_entry = RawElements::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let open = open_element(
                    e,
                    &mut result,
                    &mut prefixes,
                    stack.len(),
                    &mut entry_depth,
                    &mut channel_depth,
                    &mut current_entry,
                );
                stack.push(open);
            }
            Ok(Event::Empty(ref e)) => {
                let open = open_element(
                    e,
                    &mut result,
                    &mut prefixes,
                    stack.len(),
                    &mut entry_depth,
                    &mut channel_depth,
                    &mut current_entry,
                );
                if open.is_entry {
                    result.entries.push(std::mem::take(&mut current_entry));
                    entry_depth = None;
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Ok(text) = e.decode() {
                    append_text(&stack, &mut result, &mut current_entry, entry_depth, &text);
                }
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e).into_owned();
                append_text(&stack, &mut result, &mut current_entry, entry_depth, &text);
            }
            Ok(Event::GeneralRef(ref e)) => {
                let resolved = match e.resolve_char_ref() {
                    Ok(Some(ch)) => Some(ch.to_string()),
                    _ => e
                        .decode()
                        .ok()
                        .and_then(|name| resolve_predefined_entity(&name).map(str::to_string)),
                };
                if let Some(text) = resolved {
                    append_text(&stack, &mut result, &mut current_entry, entry_depth, &text);
                }
            }
            Ok(Event::End(_)) => {
                if let Some(open) = stack.pop() {
                    if let Some(idx) = open.index {
                        let list = if entry_depth.is_some() {
                            &mut current_entry.elements
                        } else {
                            &mut result.channel.elements
                        };
                        if let Some(el) = list.get_mut(idx) {
                            el.text = el.text.trim().to_string();
                        }
                    }
                    if open.is_entry {
                        result.entries.push(std::mem::take(&mut current_entry));
                        entry_depth = None;
                    }
                    if channel_depth == Some(stack.len()) {
                        channel_depth = None;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    result
}

fn open_element(
    e: &BytesStart,
    result: &mut RawFeed,
    prefixes: &mut HashMap<String, String>,
    depth: usize,
    entry_depth: &mut Option<usize>,
    channel_depth: &mut Option<usize>,
    current_entry: &mut RawElements,
) -> OpenElement {
    let mut attrs = BTreeMap::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let raw = String::from_utf8_lossy(&attr.value).to_string();
        let value = unescape(&raw)
            .map(|v| v.into_owned())
            .unwrap_or(raw);
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            result
                .namespaces
                .insert(prefix.to_string(), value.clone());
            prefixes.insert(prefix.to_string(), canonical_prefix(prefix, &value));
        }
        attrs.insert(key, value);
    }

    let name = canonical_name(&String::from_utf8_lossy(e.name().as_ref()), prefixes);
    let local = name.rsplit(':').next().unwrap_or(&name).to_string();

    if entry_depth.is_none() && (local == "item" || local == "entry") {
        *entry_depth = Some(depth);
        *current_entry = RawElements::default();
        return OpenElement {
            index: None,
            is_entry: true,
        };
    }

    if let Some(start) = *entry_depth {
        current_entry.elements.push(RawElement {
            name,
            attrs,
            text: String::new(),
            depth: depth - start,
        });
        return OpenElement {
            index: Some(current_entry.elements.len() - 1),
            is_entry: false,
        };
    }

    // Channel container: RSS <channel> or the Atom <feed> root.
    if channel_depth.is_none() && (local == "channel" || (local == "feed" && depth == 0)) {
        *channel_depth = Some(depth);
        return OpenElement {
            index: None,
            is_entry: false,
        };
    }

    if let Some(start) = *channel_depth {
        result.channel.elements.push(RawElement {
            name,
            attrs,
            text: String::new(),
            depth: depth - start,
        });
        return OpenElement {
            index: Some(result.channel.elements.len() - 1),
            is_entry: false,
        };
    }

    OpenElement {
        index: None,
        is_entry: false,
    }
}

fn append_text(
    stack: &[OpenElement],
    result: &mut RawFeed,
    current_entry: &mut RawElements,
    entry_depth: Option<usize>,
    text: &str,
) {
    let Some(idx) = stack.last().and_then(|open| open.index) else {
        return;
    };
    let list = if entry_depth.is_some() {
        &mut current_entry.elements
    } else {
        &mut result.channel.elements
    };
    if let Some(el) = list.get_mut(idx) {
        el.text.push_str(text);
    }
}

/// Maps a declared prefix to the canonical one when the namespace URI is well known.
fn canonical_prefix(declared: &str, uri: &str) -> String {
    let normalized = uri.trim().trim_end_matches('/').to_lowercase();
    KNOWN_NAMESPACES
        .iter()
        .find(|(known, _)| *known == normalized)
        .map(|(_, prefix)| prefix.to_string())
        .unwrap_or_else(|| declared.to_string())
}

fn canonical_name(name: &str, prefixes: &HashMap<String, String>) -> String {
    match name.split_once(':') {
        Some(("xmlns", _)) => name.to_string(),
        Some((prefix, local)) => {
            let canonical = prefixes.get(prefix).map(String::as_str).unwrap_or(prefix);
            format!("{}:{}", canonical, local)
        }
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PODCAST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd" xmlns:m="http://search.yahoo.com/mrss/">
    <channel>
        <title>Test Podcast</title>
        <itunes:image href="https://podcast/feed-img.jpg"/>
        <itunes:author>Feed Author</itunes:author>
        <itunes:category text="Technology"><itunes:category text="Software"/></itunes:category>
        <item>
            <guid>ep-1</guid>
            <title>Episode 1</title>
            <itunes:duration>45:30</itunes:duration>
            <m:group>
                <m:content url="https://cdn/ep1.mp4" type="video/mp4" medium="video"/>
                <m:thumbnail url="https://cdn/ep1.jpg" width="640"/>
            </m:group>
        </item>
        <item>
            <guid>ep-2</guid>
            <title>Tom &amp; Jerry</title>
            <description><![CDATA[<p>Hello</p>]]></description>
            <enclosure url="https://cdn/ep2.mp3?a=1&amp;b=2" type="audio/mpeg" length="123"/>
        </item>
    </channel>
</rss>"#;

    #[test]
    fn collects_channel_extensions() {
        let raw = scan_raw_feed(PODCAST.as_bytes());
        assert_eq!(
            raw.channel.first("itunes:image").and_then(|e| e.attr("href")),
            Some("https://podcast/feed-img.jpg")
        );
        assert_eq!(raw.channel.child_text("itunes:author"), Some("Feed Author"));
        let categories: Vec<_> = raw
            .channel
            .all("itunes:category")
            .map(|e| (e.depth, e.attr("text").unwrap_or_default().to_string()))
            .collect();
        assert_eq!(
            categories,
            vec![(1, "Technology".to_string()), (2, "Software".to_string())]
        );
    }

    #[test]
    fn canonicalizes_declared_prefixes() {
        let raw = scan_raw_feed(PODCAST.as_bytes());
        assert_eq!(raw.entries.len(), 2);
        let first = &raw.entries[0];
        let content = first.first("media:content").expect("media:content");
        assert_eq!(content.attr("medium"), Some("video"));
        assert_eq!(content.depth, 2);
        assert!(first.first("media:thumbnail").is_some());
        assert_eq!(
            raw.namespaces.get("m").map(String::as_str),
            Some("http://search.yahoo.com/mrss/")
        );
    }

    #[test]
    fn resolves_entities_and_cdata() {
        let raw = scan_raw_feed(PODCAST.as_bytes());
        let second = &raw.entries[1];
        assert_eq!(second.child_text("title"), Some("Tom & Jerry"));
        assert_eq!(second.child_text("description"), Some("<p>Hello</p>"));
        assert_eq!(
            second.first("enclosure").and_then(|e| e.attr("url")),
            Some("https://cdn/ep2.mp3?a=1&b=2")
        );
    }

    #[test]
    fn atom_entries_are_collected() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom</title>
  <entry>
    <id>urn:1</id>
    <published>2024-01-02T03:04:05Z</published>
    <link rel="enclosure" href="https://x/a.mp3" type="audio/mpeg"/>
  </entry>
</feed>"#;
        let raw = scan_raw_feed(atom.as_bytes());
        assert_eq!(raw.channel.child_text("title"), Some("Atom"));
        assert_eq!(raw.entries.len(), 1);
        assert_eq!(raw.entries[0].child_text("id"), Some("urn:1"));
        assert_eq!(
            raw.entries[0].first("link").and_then(|l| l.attr("rel")),
            Some("enclosure")
        );
    }

    #[test]
    fn malformed_input_keeps_partial_result() {
        let broken = r#"<rss><channel><title>T</title><item><guid>a</guid></item><item><guid>b"#;
        let raw = scan_raw_feed(broken.as_bytes());
        assert_eq!(raw.entries.len(), 1);
        assert_eq!(raw.entries[0].child_text("guid"), Some("a"));
    }
}
