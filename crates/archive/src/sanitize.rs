// ABOUTME: Derives filesystem-safe local names from media URLs and item titles.
// ABOUTME: Output never contains path separators or control characters and is never empty.

use sha2::{Digest, Sha256};

/// Cap for names derived from URLs; the extension is kept, the stem truncated.
pub const MAX_NAME_LEN: usize = 150;
/// Cap for title-derived item names, before the date prefix and extension.
pub const MAX_TITLE_LEN: usize = 100;

/// Look-alike for `/` that is not a path separator.
const SLASH_LOOKALIKE: char = '\u{2215}';

/// Local file name for a media URL.
///
/// Uses the last path segment (percent-decoded). When it is empty or has no extension,
/// synthesizes `file_<hash>.<default_ext>` from a stable hash of the whole URL.
pub fn filename_from_url(url: &str, default_ext: &str) -> String {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let path = path
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map(|(_, p)| p).unwrap_or(""))
        .unwrap_or(path);
    let segment = path.rsplit('/').next().unwrap_or_default();
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let cleaned = sanitize_component(&decoded);

    match split_extension(&cleaned) {
        Some((stem, ext)) if !stem.trim_matches('.').is_empty() => {
            truncate_keeping_extension(stem, ext, MAX_NAME_LEN)
        }
        _ => {
            let ext = sanitize_component(default_ext.trim_start_matches('.'));
            let ext = if ext.is_empty() { "bin".to_string() } else { ext };
            format!("file_{}.{}", stable_hash(url), ext)
        }
    }
}

/// Removes control characters and replaces path separators with a look-alike.
///
/// Leading dots are dropped so the result cannot be `.`/`..` or a hidden file.
pub fn sanitize_component(s: &str) -> String {
    let mapped: String = s
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' => SLASH_LOOKALIKE,
            c => c,
        })
        .collect();
    mapped.trim().trim_start_matches('.').to_string()
}

/// Item file name: `<date>-<title>.<ext>`.
///
/// The title is stripped of separators and control characters and cut to
/// [`MAX_TITLE_LEN`] characters; an empty title becomes `untitled`.
pub fn item_filename(date: &str, title: &str, ext: &str) -> String {
    let mut title: String = sanitize_component(title)
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .take(MAX_TITLE_LEN)
        .collect();
    // Reserved on Windows.
    title = title
        .chars()
        .map(|c| if matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect();
    let title = title.trim_matches(|c| c == '_' || c == '.');
    let title = if title.is_empty() { "untitled" } else { title };
    format!("{}-{}.{}", sanitize_component(date), title, ext)
}

/// `<stem>-<n>.<ext>` for resolving collisions.
pub fn with_suffix(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, n, ext),
        None => format!("{}-{}", name, n),
    }
}

/// First 8 bytes of SHA-256 as a big-endian integer, reduced to six digits.
fn stable_hash(url: &str) -> u64 {
    let digest = Sha256::digest(url.as_bytes());
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(first) % 1_000_000
}

fn split_extension(name: &str) -> Option<(&str, &str)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let valid = (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some((stem, ext))
}

fn truncate_keeping_extension(stem: &str, ext: &str, max: usize) -> String {
    let budget = max.saturating_sub(ext.chars().count() + 1);
    let stem: String = stem.chars().take(budget).collect();
    format!("{}.{}", stem, ext)
}
