// ABOUTME: Feed parsing using feed-rs, merged with the raw namespace pass.
// ABOUTME: Exposes channel and entry views that yield the base archive records.

use std::collections::BTreeMap;

use feed_rs::model::{Entry, Feed as FeedRsFeed, Link, Person};
use once_cell::sync::Lazy;

use crate::error::FeedError;
use crate::extensions::{scan_raw_feed, RawElements, RawFeed};
use crate::fields::{collect_fields, CHANNEL_FIELDS, ITEM_FIELDS};
use crate::media::{collect_media_refs, MediaRef};
use crate::models::{DownloadedMedia, FeedMetadata, ItemRecord};
use crate::resolve_url;

static NO_ELEMENTS: Lazy<RawElements> = Lazy::new(RawElements::default);

/// A parsed feed document: the feed-rs model plus the raw namespace elements.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub feed: FeedRsFeed,
    pub raw: RawFeed,
    pub feed_url: String,
}

/// Image the channel declares for itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredImage {
    pub url: String,
    pub title: Option<String>,
    pub link: Option<String>,
}

/// Parses feed bytes (RSS, Atom, RDF or JSON Feed).
///
/// # Returns
/// * `Ok(ParsedFeed)` - at least one entry was found
/// * `Err(FeedError::Parse)` - the document is not a feed
/// * `Err(FeedError::Empty)` - the document is a feed without entries
pub fn parse_feed_bytes(data: &[u8], feed_url: &str) -> Result<ParsedFeed, FeedError> {
    let feed = feed_rs::parser::parse(data).map_err(FeedError::parse)?;
    if feed.entries.is_empty() {
        return Err(FeedError::Empty);
    }
    let raw = scan_raw_feed(data);

    Ok(ParsedFeed {
        feed,
        raw,
        feed_url: feed_url.to_string(),
    })
}

impl ParsedFeed {
    /// Prefix -> URI as declared in the document.
    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.raw.namespaces
    }

    pub fn title(&self) -> Option<String> {
        self.feed.title.as_ref().map(|t| t.content.trim().to_string()).filter(|t| !t.is_empty())
    }

    /// The site the feed belongs to.
    pub fn channel_link(&self) -> Option<String> {
        self.raw
            .channel
            .child_text("link")
            .filter(|l| l.starts_with("http"))
            .map(str::to_string)
            .or_else(|| extract_home_url(&self.feed.links))
    }

    pub fn entries(&self) -> impl Iterator<Item = EntryView<'_>> {
        self.feed.entries.iter().enumerate().map(move |(index, entry)| EntryView {
            index,
            entry,
            raw: self.raw.entries.get(index).unwrap_or(&NO_ELEMENTS),
            channel_link: self.channel_link(),
        })
    }

    /// Channel record without the image, which needs a download.
    pub fn base_metadata(&self, fetched_at: &str) -> FeedMetadata {
        let channel = &self.raw.channel;
        FeedMetadata {
            title: self.title(),
            link: self.channel_link(),
            description: self.feed.description.as_ref().map(|d| d.content.clone()).filter(non_blank),
            language: self.feed.language.clone().filter(non_blank),
            copyright: self.feed.rights.as_ref().map(|r| r.content.clone()).filter(non_blank),
            generator: self.feed.generator.as_ref().map(|g| g.content.clone()).filter(non_blank),
            pub_date: channel
                .child_text("pubDate")
                .or_else(|| channel.child_text("dc:date"))
                .map(str::to_string)
                .or_else(|| self.feed.published.map(|d| d.to_rfc3339())),
            last_build_date: channel
                .child_text("lastBuildDate")
                .or_else(|| channel.child_text("updated"))
                .map(str::to_string)
                .or_else(|| self.feed.updated.map(|d| d.to_rfc3339())),
            feed_url: Some(self.feed_url.clone()).filter(non_blank),
            extensions: collect_fields(&channel.elements, CHANNEL_FIELDS),
            image: None,
            items_count: self.feed.entries.len(),
            fetched_at: fetched_at.to_string(),
        }
    }

    /// Channel image in priority order: `itunes:image`, RSS `<image>`/Atom logo, Atom icon.
    pub fn declared_image(&self) -> Option<DeclaredImage> {
        let base = self.channel_link().unwrap_or_else(|| self.feed_url.clone());

        if let Some(href) = self
            .raw
            .channel
            .all("itunes:image")
            .find(|e| e.depth == 1)
            .and_then(|e| e.attr("href"))
        {
            return resolve_url(href, Some(&base)).map(|url| DeclaredImage {
                url,
                title: None,
                link: None,
            });
        }

        let image = self.feed.logo.as_ref().or(self.feed.icon.as_ref())?;
        resolve_url(&image.uri, Some(&base)).map(|url| DeclaredImage {
            url,
            title: image.title.clone(),
            link: image.link.as_ref().map(|l| l.href.clone()),
        })
    }
}

/// One entry with its raw namespace elements.
#[derive(Debug, Clone)]
pub struct EntryView<'a> {
    /// Zero-based position in the feed.
    pub index: usize,
    pub entry: &'a Entry,
    pub raw: &'a RawElements,
    channel_link: Option<String>,
}

impl<'a> EntryView<'a> {
    pub fn title(&self) -> Option<String> {
        self.entry
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn link(&self) -> Option<String> {
        extract_item_url(self.entry)
    }

    /// Summary/description HTML as published.
    pub fn description(&self) -> Option<String> {
        self.entry
            .summary
            .as_ref()
            .map(|t| t.content.clone())
            .filter(non_blank)
    }

    /// Full content (`content:encoded`, Atom `content`) when it differs from the summary.
    pub fn content(&self) -> Option<String> {
        self.entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .filter(non_blank)
    }

    pub fn author(&self) -> Option<String> {
        self.entry
            .authors
            .first()
            .and_then(person_to_author)
            .or_else(|| self.raw.child_text("dc:creator").map(str::to_string))
            .or_else(|| self.raw.child_text("itunes:author").map(str::to_string))
    }

    /// Entry GUID, falling back to the link, then to `item_<n>` (1-based).
    pub fn guid(&self) -> String {
        self.raw
            .child_text("guid")
            .or_else(|| self.raw.child_text("id"))
            .map(str::to_string)
            .or_else(|| self.link())
            .unwrap_or_else(|| format!("item_{}", self.index + 1))
    }

    /// Publication date exactly as written in the document.
    pub fn pub_date(&self) -> Option<String> {
        self.raw
            .child_text("pubDate")
            .or_else(|| self.raw.child_text("published"))
            .or_else(|| self.raw.child_text("updated"))
            .or_else(|| self.raw.child_text("dc:date"))
            .map(str::to_string)
            .or_else(|| {
                self.entry
                    .published
                    .or(self.entry.updated)
                    .map(|d| d.to_rfc3339())
            })
    }

    pub fn comments(&self) -> Option<String> {
        self.raw.child_text("comments").map(str::to_string)
    }

    pub fn source(&self) -> Option<String> {
        self.raw
            .elements
            .iter()
            .find(|e| e.depth == 1 && e.name == "source")
            .and_then(|e| e.text().or_else(|| e.attr("url")))
            .map(str::to_string)
    }

    pub fn categories(&self) -> Vec<String> {
        self.entry
            .categories
            .iter()
            .map(|c| c.term.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Base URL for relative references: the entry link, else the channel link.
    pub fn base_url(&self) -> Option<String> {
        self.link().or_else(|| self.channel_link.clone())
    }

    /// Declared media, classified and ordered by mechanism.
    pub fn media_refs(&self) -> Vec<MediaRef> {
        collect_media_refs(self.raw, self.base_url().as_deref())
    }

    /// Item record with every field except downloaded media and rewritten HTML.
    pub fn base_record(&self) -> ItemRecord {
        ItemRecord {
            title: self.title(),
            link: self.link(),
            description: self.description(),
            content: self.content(),
            author: self.author(),
            guid: self.guid(),
            pub_date: self.pub_date(),
            comments: self.comments(),
            source: self.source(),
            categories: self.categories(),
            extensions: collect_fields(&self.raw.elements, ITEM_FIELDS),
            media: DownloadedMedia::default(),
        }
    }
}

fn non_blank(s: &String) -> bool {
    !s.trim().is_empty()
}

/// Prefers rel="alternate", then any link that is not the feed itself.
fn extract_home_url(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| links.iter().find(|l| l.rel.as_deref() != Some("self")))
        .map(|l| l.href.clone())
}

/// Prefers rel="alternate", otherwise the first link that is not an enclosure.
fn extract_item_url(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| {
            entry
                .links
                .iter()
                .find(|l| !matches!(l.rel.as_deref(), Some("enclosure") | Some("self")))
        })
        .map(|l| l.href.clone())
}

fn person_to_author(person: &Person) -> Option<String> {
    let name = person.name.trim();
    if !name.is_empty() && name != "unknown" {
        return Some(name.to_string());
    }
    person.email.clone().filter(non_blank)
}
