// ABOUTME: Normalized archive records produced from a parsed feed.
// ABOUTME: FeedMetadata (channel), ItemRecord (entry) and the categorized DownloadedMedia buckets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a namespace extension field.
///
/// A field that occurs once is stored as a plain string; repeated occurrences
/// (several `dc:subject`, several `itunes:category`) keep every value in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FieldValue {
    /// Appends another occurrence, promoting a single value to a list.
    pub fn push(&mut self, value: String) {
        match self {
            FieldValue::Single(first) => {
                let first = std::mem::take(first);
                *self = FieldValue::Multiple(vec![first, value]);
            }
            FieldValue::Multiple(values) => values.push(value),
        }
    }

    /// First (or only) value.
    pub fn first(&self) -> Option<&str> {
        match self {
            FieldValue::Single(v) => Some(v.as_str()),
            FieldValue::Multiple(values) => values.first().map(String::as_str),
        }
    }

    /// All values in document order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Single(v) => vec![v.as_str()],
            FieldValue::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.values().join("; "))
    }
}

/// Namespace-qualified key (`itunes:duration`, `dc:creator`) to value.
pub type ExtensionFields = BTreeMap<String, FieldValue>;

/// Target bucket for a downloaded asset. Each bucket maps to one directory in the archive root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    Image,
    Audio,
    Video,
    Document,
    Other,
}

impl MediaCategory {
    pub const ALL: [MediaCategory; 5] = [
        MediaCategory::Image,
        MediaCategory::Audio,
        MediaCategory::Video,
        MediaCategory::Document,
        MediaCategory::Other,
    ];

    /// Directory name under the archive root.
    pub fn dir_name(self) -> &'static str {
        match self {
            MediaCategory::Image => "images",
            MediaCategory::Audio => "audio",
            MediaCategory::Video => "video",
            MediaCategory::Document => "documents",
            MediaCategory::Other => "media",
        }
    }

    /// Plural label used in summaries and the Markdown template.
    pub fn label(self) -> &'static str {
        match self {
            MediaCategory::Image => "images",
            MediaCategory::Audio => "audio",
            MediaCategory::Video => "video",
            MediaCategory::Document => "documents",
            MediaCategory::Other => "other",
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which feed mechanism referenced a media asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    Thumbnail,
    MediaContent,
    Enclosure,
    PodcastImage,
    PodcastChapters,
    PodcastTranscript,
    Poster,
    Inline,
}

/// One downloaded (or attempted) asset.
///
/// `local_path` is root-relative (`images/a.png`) and `None` when the download failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub original_url: String,
    pub local_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<MediaSource>,
}

impl MediaEntry {
    pub fn new(original_url: impl Into<String>, source: MediaSource) -> Self {
        Self {
            original_url: original_url.into(),
            source: Some(source),
            ..Default::default()
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Five ordered buckets of media for one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadedMedia {
    pub images: Vec<MediaEntry>,
    pub audio: Vec<MediaEntry>,
    pub video: Vec<MediaEntry>,
    pub documents: Vec<MediaEntry>,
    pub other: Vec<MediaEntry>,
}

impl DownloadedMedia {
    pub fn bucket(&self, category: MediaCategory) -> &[MediaEntry] {
        match category {
            MediaCategory::Image => &self.images,
            MediaCategory::Audio => &self.audio,
            MediaCategory::Video => &self.video,
            MediaCategory::Document => &self.documents,
            MediaCategory::Other => &self.other,
        }
    }

    pub fn bucket_mut(&mut self, category: MediaCategory) -> &mut Vec<MediaEntry> {
        match category {
            MediaCategory::Image => &mut self.images,
            MediaCategory::Audio => &mut self.audio,
            MediaCategory::Video => &mut self.video,
            MediaCategory::Document => &mut self.documents,
            MediaCategory::Other => &mut self.other,
        }
    }

    pub fn push(&mut self, category: MediaCategory, entry: MediaEntry) {
        self.bucket_mut(category).push(entry);
    }

    /// Number of entries in `category` that have a local file.
    pub fn downloaded(&self, category: MediaCategory) -> usize {
        self.bucket(category)
            .iter()
            .filter(|e| e.is_downloaded())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        MediaCategory::ALL
            .iter()
            .all(|c| self.bucket(*c).is_empty())
    }
}

/// Channel image as stored in `feed.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelImage {
    pub url: String,
    /// Root-relative path of the local copy, `None` if the download failed.
    pub local_path: Option<String>,
    /// True when the image was found through favicon discovery instead of being declared.
    pub is_favicon: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Channel-level record written once per run as `feed.json`.
///
/// Absent fields are omitted from the JSON rather than written as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(rename = "pubDate", skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(rename = "lastBuildDate", skip_serializing_if = "Option::is_none")]
    pub last_build_date: Option<String>,
    #[serde(rename = "feed_url", skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    #[serde(default, skip_serializing_if = "ExtensionFields::is_empty")]
    pub extensions: ExtensionFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ChannelImage>,
    pub items_count: usize,
    /// UTC fetch time, ISO-8601.
    pub fetched_at: String,
}

/// One archived feed entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub guid: String,
    #[serde(rename = "pubDate", skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "ExtensionFields::is_empty")]
    pub extensions: ExtensionFields,
    pub media: DownloadedMedia,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_promotes_to_list() {
        let mut v = FieldValue::Single("a".to_string());
        v.push("b".to_string());
        assert_eq!(
            v,
            FieldValue::Multiple(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(v.first(), Some("a"));
        assert_eq!(v.to_string(), "a; b");
    }

    #[test]
    fn field_value_serializes_untagged() {
        let single = serde_json::to_string(&FieldValue::Single("x".into())).unwrap();
        assert_eq!(single, "\"x\"");
        let multi =
            serde_json::to_string(&FieldValue::Multiple(vec!["x".into(), "y".into()])).unwrap();
        assert_eq!(multi, "[\"x\",\"y\"]");
    }

    #[test]
    fn downloaded_counts_only_local_files() {
        let mut media = DownloadedMedia::default();
        let mut ok = MediaEntry::new("http://x/a.png", MediaSource::Inline);
        ok.local_path = Some("images/a.png".to_string());
        media.push(MediaCategory::Image, ok);
        media.push(
            MediaCategory::Image,
            MediaEntry::new("http://x/b.png", MediaSource::Thumbnail),
        );
        assert_eq!(media.downloaded(MediaCategory::Image), 1);
        assert_eq!(media.bucket(MediaCategory::Image).len(), 2);
        assert!(!media.is_empty());
    }

    #[test]
    fn metadata_omits_absent_fields() {
        let meta = FeedMetadata {
            title: Some("T".to_string()),
            items_count: 1,
            fetched_at: "2024-01-01T00:00:00Z".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("description").is_none());
        assert!(json.get("image").is_none());
        assert_eq!(json["items_count"], 1);
    }

    #[test]
    fn other_bucket_lives_in_media_dir() {
        assert_eq!(MediaCategory::Other.dir_name(), "media");
        assert_eq!(MediaCategory::Document.dir_name(), "documents");
    }
}
