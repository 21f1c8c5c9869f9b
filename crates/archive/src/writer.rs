// ABOUTME: Owns the on-disk archive layout: directories, feed.rss, feed.json and item files.
// ABOUTME: Every file goes through a .part sibling and a rename, so final paths are always complete.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use rssdump_feed::{date_prefix, FeedMetadata, ItemRecord, MediaCategory};
use serde::Serialize;
use tracing::debug;

use crate::error::ArchiveError;
use crate::options::ItemFormat;
use crate::sanitize::{item_filename, with_suffix};

pub const FEED_JSON: &str = "feed.json";
pub const FEED_RSS: &str = "feed.rss";
pub const ITEMS_DIR: &str = "items";

static BR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Writes `data` to `<path>.part` and renames it over `path`.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);
    tokio::fs::write(&part, data).await?;
    if let Err(e) = tokio::fs::rename(&part, path).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e);
    }
    Ok(())
}

/// Serializes records into an archive root.
#[derive(Debug)]
pub struct ArchiveWriter {
    root: PathBuf,
    format: ItemFormat,
    used_names: HashSet<String>,
}

impl ArchiveWriter {
    /// Creates the root, `items/` and every media category directory.
    pub async fn create(root: impl Into<PathBuf>, format: ItemFormat) -> Result<Self, ArchiveError> {
        let root = root.into();
        let dirs = std::iter::once(ITEMS_DIR).chain(MediaCategory::ALL.iter().map(|c| c.dir_name()));
        for dir in dirs {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| ArchiveError::io(path.display().to_string(), "CreateLayout", e))?;
        }
        Ok(Self {
            root,
            format,
            used_names: HashSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores the fetched document byte-for-byte.
    pub async fn write_raw_feed(&self, bytes: &[u8]) -> Result<(), ArchiveError> {
        self.write_file(FEED_RSS, bytes, "WriteFeed").await
    }

    pub async fn write_metadata(&self, metadata: &FeedMetadata) -> Result<(), ArchiveError> {
        let json = to_pretty_json(metadata, &self.root.join(FEED_JSON))?;
        self.write_file(FEED_JSON, json.as_bytes(), "WriteMetadata").await
    }

    /// Writes one item and returns its root-relative path.
    ///
    /// `position` is the 1-based feed position, used when the date cannot be parsed.
    pub async fn write_item(&mut self, record: &ItemRecord, position: usize) -> Result<String, ArchiveError> {
        let name = self.claim_name(record, position);
        let relative = format!("{}/{}", ITEMS_DIR, name);
        let body = match self.format {
            ItemFormat::Json => to_pretty_json(record, &self.root.join(&relative))?,
            ItemFormat::Markdown => render_markdown(record),
        };
        self.write_file(&relative, body.as_bytes(), "WriteItem").await?;
        debug!(path = %relative, "item written");
        Ok(relative)
    }

    fn claim_name(&mut self, record: &ItemRecord, position: usize) -> String {
        let date = record
            .pub_date
            .as_deref()
            .and_then(date_prefix)
            .unwrap_or_else(|| format!("item_{}", position));
        let title = record.title.as_deref().unwrap_or_default();
        let base = item_filename(&date, title, self.format.extension());

        let mut name = base.clone();
        let mut n = 1;
        while self.used_names.contains(&name) {
            n += 1;
            name = with_suffix(&base, n);
        }
        self.used_names.insert(name.clone());
        name
    }

    async fn write_file(&self, relative: &str, data: &[u8], op: &str) -> Result<(), ArchiveError> {
        let path = self.root.join(relative);
        write_atomic(&path, data)
            .await
            .map_err(|e| ArchiveError::io(path.display().to_string(), op, e))
    }
}

fn to_pretty_json<T: Serialize>(value: &T, path: &Path) -> Result<String, ArchiveError> {
    serde_json::to_string_pretty(value).map_err(|e| {
        ArchiveError::io(path.display().to_string(), "Serialize", std::io::Error::other(e))
    })
}

/// Converts HTML to Markdown, skipping scripts and styles. Falls back to the input on error.
pub fn html_to_markdown(html: &str) -> String {
    let preprocessed = BR_TAG.replace_all(html, "\n");
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript"])
        .build();
    let md = converter
        .convert(&preprocessed)
        .unwrap_or_else(|_| preprocessed.to_string());
    BLANK_RUNS.replace_all(md.trim(), "\n\n").into_owned()
}

/// Fixed Markdown layout for an item: header block, metadata list, body, media links.
pub fn render_markdown(record: &ItemRecord) -> String {
    let mut out = String::from("---\n");
    let header = [
        ("title", record.title.as_deref()),
        ("link", record.link.as_deref()),
        ("date", record.pub_date.as_deref()),
        ("guid", Some(record.guid.as_str())),
        ("author", record.author.as_deref()),
    ];
    for (key, value) in header {
        if let Some(value) = value {
            let _ = writeln!(out, "{}: {}", key, yaml_scalar(value));
        }
    }
    out.push_str("---\n\n");

    let _ = writeln!(out, "# {}\n", record.title.as_deref().unwrap_or("Untitled"));

    if !record.extensions.is_empty() || !record.categories.is_empty() {
        out.push_str("## Metadata\n\n");
        if !record.categories.is_empty() {
            let _ = writeln!(out, "- **categories**: {}", record.categories.join(", "));
        }
        for (key, value) in &record.extensions {
            let _ = writeln!(out, "- **{}**: {}", key, value);
        }
        out.push('\n');
    }

    let body = record
        .content
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .or(record.description.as_deref());
    if let Some(body) = body {
        let md = html_to_markdown(body);
        if !md.is_empty() {
            out.push_str(&md);
            out.push_str("\n\n");
        }
    }

    if !record.media.is_empty() {
        out.push_str("## Media\n\n");
        for category in MediaCategory::ALL {
            let bucket = record.media.bucket(category);
            if bucket.is_empty() {
                continue;
            }
            let _ = writeln!(out, "### {}\n", category.label());
            for entry in bucket {
                match &entry.local_path {
                    Some(path) => {
                        let _ = writeln!(
                            out,
                            "- [{}]({}) ({})",
                            link_label(file_label(path)),
                            link_destination(path),
                            entry.original_url
                        );
                    }
                    None => {
                        let _ = writeln!(out, "- {} (not downloaded)", entry.original_url);
                    }
                }
            }
            out.push('\n');
        }
    }

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

fn file_label(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn link_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if matches!(c, '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Plain paths stay bare; anything CommonMark would split goes inside `<...>`.
fn link_destination(path: &str) -> String {
    if !path.chars().any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>' | '\\')) {
        return path.to_string();
    }
    let mut out = String::with_capacity(path.len() + 2);
    out.push('<');
    for c in path.chars() {
        match c {
            '<' | '>' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.push('>');
    out
}

/// Quotes values that would otherwise confuse a YAML reader.
fn yaml_scalar(value: &str) -> String {
    let single_line = value.replace(['\r', '\n'], " ");
    let needs_quotes = single_line.contains(": ")
        || single_line.starts_with(['"', '\'', '#', '-', '[', '{', '&', '*', '!', '|', '>', '%', '@'])
        || single_line.trim() != single_line;
    if needs_quotes {
        format!("\"{}\"", single_line.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        single_line
    }
}
