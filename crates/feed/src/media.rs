// ABOUTME: Collects the declared media references of one entry from the raw namespace pass.
// ABOUTME: Thumbnails, media:content, enclosures, podcast elements and poster images, in that order.

use crate::classify::classify_media;
use crate::duration_parse::parse_duration_seconds;
use crate::extensions::{RawElement, RawElements};
use crate::models::{MediaCategory, MediaEntry, MediaSource};
use crate::resolve_url;

/// A media asset an entry points at, classified but not yet downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef {
    pub category: MediaCategory,
    /// Attributes copied from the declaring element; `local_path` is still `None`.
    pub entry: MediaEntry,
}

impl MediaRef {
    pub fn url(&self) -> &str {
        &self.entry.original_url
    }
}

/// Lists the media declared by an entry.
///
/// Every mechanism contributes its own references; the same URL referenced twice is listed
/// twice. Relative URLs are resolved against `base_url`; unresolvable ones are dropped.
pub fn collect_media_refs(raw: &RawElements, base_url: Option<&str>) -> Vec<MediaRef> {
    let mut refs = Vec::new();

    for thumb in raw.all("media:thumbnail") {
        let url = thumb.attr("url");
        push_ref(&mut refs, base_url, MediaCategory::Image, url, MediaSource::Thumbnail, Some(thumb));
    }

    for content in raw.all("media:content") {
        let Some(url) = content.attr("url") else {
            continue;
        };
        let category = classify_media(content.attr("medium"), content.attr("type"), url, false);
        push_ref(&mut refs, base_url, category, Some(url), MediaSource::MediaContent, Some(content));
    }

    let episode_duration = raw
        .child_text("itunes:duration")
        .and_then(parse_duration_seconds);
    let enclosures = raw.elements.iter().filter(|e| {
        e.depth == 1
            && (e.name == "enclosure" || (e.name == "link" && e.attr("rel") == Some("enclosure")))
    });
    for enclosure in enclosures {
        let Some(url) = enclosure.attr("url").or_else(|| enclosure.attr("href")) else {
            continue;
        };
        let category = classify_media(None, enclosure.attr("type"), url, true);
        let added = push_ref(&mut refs, base_url, category, Some(url), MediaSource::Enclosure, Some(enclosure));
        if let Some(entry) = added {
            if matches!(category, MediaCategory::Audio | MediaCategory::Video) && entry.duration.is_none() {
                entry.duration = episode_duration;
            }
        }
    }

    for image in raw.all("itunes:image") {
        let url = image.attr("href").or_else(|| image.text());
        push_ref(&mut refs, base_url, MediaCategory::Image, url, MediaSource::PodcastImage, None);
    }
    for images in raw.all("podcast:images") {
        let url = images.attr("srcset").and_then(first_srcset_candidate);
        push_ref(&mut refs, base_url, MediaCategory::Image, url, MediaSource::PodcastImage, None);
    }
    for image in raw.all("googleplay:image") {
        let url = image.attr("href");
        push_ref(&mut refs, base_url, MediaCategory::Image, url, MediaSource::PodcastImage, None);
    }
    for chapters in raw.all("podcast:chapters") {
        let url = chapters.attr("url");
        push_ref(&mut refs, base_url, MediaCategory::Document, url, MediaSource::PodcastChapters, Some(chapters));
    }
    for transcript in raw.all("podcast:transcript") {
        let url = transcript.attr("url");
        push_ref(&mut refs, base_url, MediaCategory::Document, url, MediaSource::PodcastTranscript, Some(transcript));
    }

    for poster in raw.all("jwplayer:image") {
        push_ref(&mut refs, base_url, MediaCategory::Image, poster.text(), MediaSource::Poster, None);
    }
    for poster in raw.all("media:poster") {
        let url = poster.attr("url");
        push_ref(&mut refs, base_url, MediaCategory::Image, url, MediaSource::Poster, None);
    }

    refs
}

fn push_ref<'r>(
    refs: &'r mut Vec<MediaRef>,
    base_url: Option<&str>,
    category: MediaCategory,
    url: Option<&str>,
    source: MediaSource,
    declared_by: Option<&RawElement>,
) -> Option<&'r mut MediaEntry> {
    let url = resolve_url(url?, base_url)?;
    let mut entry = MediaEntry::new(url, source);
    if let Some(el) = declared_by {
        copy_attributes(&mut entry, el);
    }
    refs.push(MediaRef { category, entry });
    refs.last_mut().map(|r| &mut r.entry)
}

fn copy_attributes(entry: &mut MediaEntry, el: &RawElement) {
    entry.mime_type = el.attr("type").map(str::to_string);
    entry.medium = el.attr("medium").map(str::to_string);
    entry.width = el.attr("width").and_then(|v| v.parse().ok());
    entry.height = el.attr("height").and_then(|v| v.parse().ok());
    entry.duration = el.attr("duration").and_then(parse_duration_seconds);
    entry.bitrate = el.attr("bitrate").and_then(|v| v.parse().ok());
    entry.length = el
        .attr("length")
        .or_else(|| el.attr("fileSize"))
        .and_then(|v| v.parse().ok())
        .filter(|len| *len > 0);
}

/// First URL of an HTML-style `srcset` (`a.jpg 1x, b.jpg 2x`).
fn first_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .next()
}
