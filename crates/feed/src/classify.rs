// ABOUTME: Media classification into archive buckets.
// ABOUTME: Declared medium wins over MIME type, which wins over the URL extension.

use crate::models::MediaCategory;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico", "avif", "tif", "tiff",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "ogg", "oga", "opus", "wav", "flac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm", "mkv", "avi", "ogv"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "epub", "txt", "odt", "rtf"];

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/epub+zip",
    "application/rtf",
    "text/plain",
];

/// Classifies a media reference.
///
/// `medium` (Media RSS `medium` attribute) takes precedence over `mime_type`, which takes
/// precedence over the URL extension. The document bucket is only used when
/// `allow_documents` is set; otherwise documents fall into [`MediaCategory::Other`].
pub fn classify_media(
    medium: Option<&str>,
    mime_type: Option<&str>,
    url: &str,
    allow_documents: bool,
) -> MediaCategory {
    let category = medium
        .and_then(from_medium)
        .or_else(|| mime_type.and_then(from_mime))
        .or_else(|| url_extension(url).and_then(|ext| from_extension(&ext)))
        .unwrap_or(MediaCategory::Other);

    if category == MediaCategory::Document && !allow_documents {
        MediaCategory::Other
    } else {
        category
    }
}

fn from_medium(medium: &str) -> Option<MediaCategory> {
    match medium.trim().to_lowercase().as_str() {
        "image" => Some(MediaCategory::Image),
        "audio" => Some(MediaCategory::Audio),
        "video" => Some(MediaCategory::Video),
        "document" => Some(MediaCategory::Document),
        _ => None,
    }
}

fn from_mime(mime: &str) -> Option<MediaCategory> {
    let mime = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if mime.starts_with("image/") {
        Some(MediaCategory::Image)
    } else if mime.starts_with("audio/") {
        Some(MediaCategory::Audio)
    } else if mime.starts_with("video/") {
        Some(MediaCategory::Video)
    } else if DOCUMENT_MIME_TYPES.contains(&mime.as_str())
        || mime.starts_with("application/vnd.")
    {
        Some(MediaCategory::Document)
    } else {
        None
    }
}

fn from_extension(ext: &str) -> Option<MediaCategory> {
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(MediaCategory::Image)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        Some(MediaCategory::Audio)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaCategory::Video)
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        Some(MediaCategory::Document)
    } else {
        None
    }
}

/// Lowercased extension of the URL path's last segment, ignoring query and fragment.
pub fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_lowercase())
}
