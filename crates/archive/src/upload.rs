// ABOUTME: Uploads a finished archive directory to the Internet Archive through its S3-compatible API.
// ABOUTME: Skips files already present remotely and leaves a marker so a dump is uploaded once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rssdump_feed::{FeedMetadata, MediaCategory};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::capture::WARC_FILE;
use crate::config::{load_config, RunStatus, META_DIR};
use crate::lock::LOCK_FILE;
use crate::error::ArchiveError;
use crate::options::DUMPER_VERSION;
use crate::writer::{FEED_JSON, FEED_RSS, ITEMS_DIR};

pub const UPLOADED_MARK: &str = "uploaded_to_IA.mark";
pub const DEFAULT_COLLECTION: &str = "opensource";
pub const DEFAULT_KEYS_FILE: &str = ".rss_uploader_ia_keys";
pub const DEFAULT_S3_ENDPOINT: &str = "https://s3.us.archive.org";
pub const DEFAULT_METADATA_ENDPOINT: &str = "https://archive.org/metadata";

const MAX_IDENTIFIER_LEN: usize = 100;
const MAX_SUBJECT_BYTES: usize = 255;
const EARLIEST_DUMP_DATE: u32 = 20230101;
const BASE_KEYWORDS: &[&str] = &[
    "rss",
    "feed",
    "json",
    "markdown",
    "xml",
    "rss feed",
    "RSSDumper",
    "RDF Site Summary",
    "Really Simple Syndication",
];

/// Everything the uploader needs besides the dump itself.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dump_dir: PathBuf,
    pub collection: String,
    pub access_key: String,
    pub secret_key: String,
    pub s3_endpoint: String,
    pub metadata_endpoint: String,
    pub delete_after_upload: bool,
}

impl UploadConfig {
    pub fn new(dump_dir: impl Into<PathBuf>, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            dump_dir: dump_dir.into(),
            collection: DEFAULT_COLLECTION.to_string(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            s3_endpoint: DEFAULT_S3_ENDPOINT.to_string(),
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            delete_after_upload: false,
        }
    }

    /// `~/.rss_uploader_ia_keys`.
    pub fn default_keys_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_KEYS_FILE))
    }
}

/// Reads an access key and a secret key from the first two lines of `path`.
pub fn read_keys(path: &Path) -> Result<(String, String), ArchiveError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ArchiveError::io(path.display().to_string(), "ReadKeys", e))?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some(access), Some(secret)) => Ok((access.to_string(), secret.to_string())),
        _ => Err(ArchiveError::upload(
            path.display().to_string(),
            "ReadKeys",
            Some(anyhow::anyhow!("expected access key and secret key on two lines")),
        )),
    }
}

/// Catalog identifier from a dump directory named `<domain>_<YYYYMMDD>_<HHMMSS>`.
pub fn identifier_from_dir(dir: &Path) -> Result<String, ArchiveError> {
    let invalid = |reason: &str| {
        ArchiveError::upload(
            dir.display().to_string(),
            "Identifier",
            Some(anyhow::anyhow!("invalid dump directory name: {}", reason)),
        )
    };
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid("not UTF-8"))?;

    let parts: Vec<&str> = name.split('_').collect();
    let min_parts = if name.starts_with("rss_dump_") { 4 } else { 3 };
    if parts.len() < min_parts {
        return Err(invalid(name));
    }
    let date: u32 = parts[parts.len() - 2]
        .get(..8)
        .and_then(|d| d.parse().ok())
        .ok_or_else(|| invalid(name))?;
    if date < EARLIEST_DUMP_DATE {
        return Err(invalid("dated before the first dump"));
    }

    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .take(MAX_IDENTIFIER_LEN)
        .collect();
    Ok(safe)
}

/// Host of `url` with `:` and `.` replaced, for use as a keyword.
pub fn url_keyword(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let netloc = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Some(netloc.replace([':', '.'], "_"))
}

/// `; `-joined keywords within the catalog's 255-byte limit, dropping the title first.
pub fn subject_string(title: Option<&str>, link: Option<&str>) -> String {
    let keyword = link.and_then(url_keyword);
    let mut full: Vec<&str> = BASE_KEYWORDS.to_vec();
    if let Some(title) = title.filter(|t| !BASE_KEYWORDS.contains(t)) {
        full.push(title);
    }
    if let Some(k) = keyword.as_deref() {
        full.push(k);
    }
    let joined = full.join("; ");
    if joined.len() <= MAX_SUBJECT_BYTES {
        return joined;
    }

    let mut without_title: Vec<&str> = BASE_KEYWORDS.to_vec();
    if let Some(k) = keyword.as_deref() {
        without_title.push(k);
    }
    let joined = without_title.join("; ");
    if joined.len() <= MAX_SUBJECT_BYTES {
        return joined;
    }
    BASE_KEYWORDS.join("; ")
}

/// Catalog metadata for the item, as ordered key/value pairs.
pub fn item_metadata(meta: &FeedMetadata, collection: &str, dumper_version: &str) -> Vec<(String, String)> {
    let title = meta.title.as_deref().unwrap_or("Unknown RSS Feed");
    let mut description = vec![
        format!("<strong>RSS Feed Title:</strong> {}<br>", title),
        format!(
            "<strong>Description:</strong> {}<br>",
            meta.description.as_deref().unwrap_or_default()
        ),
    ];
    if let Some(link) = &meta.link {
        description.push(format!(
            "<strong>Website:</strong> <a href=\"{0}\" rel=\"nofollow\">{0}</a><br>",
            link
        ));
    }
    if let Some(copyright) = &meta.copyright {
        description.push(format!("<strong>Copyright:</strong> {}<br>", copyright));
    }
    if let Some(generator) = &meta.generator {
        description.push(format!("<strong>Generated by:</strong> {}<br>", generator));
    }
    if let Some(published) = &meta.pub_date {
        description.push(format!("<strong>Published:</strong> {}<br>", published));
    }
    description.push("<br>".to_string());
    description.push(format!(
        "Dumped with rssdump v{}, and uploaded with rssdump v{}.",
        dumper_version, DUMPER_VERSION
    ));

    let mut fields = vec![
        ("mediatype".to_string(), "web".to_string()),
        ("collection".to_string(), collection.to_string()),
        ("title".to_string(), format!("RSS Feed - {}", title)),
        ("description".to_string(), description.join("\n")),
        ("subject".to_string(), subject_string(meta.title.as_deref(), meta.link.as_deref())),
        (
            "last-updated-date".to_string(),
            chrono::Utc::now().format("%Y-%m-%d").to_string(),
        ),
    ];
    if let Some(language) = &meta.language {
        fields.push(("language".to_string(), language.clone()));
    }
    if let Some(copyright) = &meta.copyright {
        fields.push(("rights".to_string(), copyright.clone()));
    }
    if let Some(link) = meta.link.as_ref().or(meta.feed_url.as_ref()) {
        fields.push(("originalurl".to_string(), link.clone()));
    }
    fields
}

/// Remote name -> local file for every file of the dump, in a stable order.
pub fn files_to_upload(dump_dir: &Path, identifier: &str) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
    let mut files = Vec::new();
    for name in [FEED_JSON, FEED_RSS, WARC_FILE] {
        let path = dump_dir.join(name);
        if path.is_file() {
            files.push((format!("{}-{}", identifier, name), path));
        }
    }

    let dirs = std::iter::once(META_DIR)
        .chain(std::iter::once(ITEMS_DIR))
        .chain(MediaCategory::ALL.iter().map(|c| c.dir_name()));
    for dir in dirs {
        let path = dump_dir.join(dir);
        if !path.is_dir() {
            continue;
        }
        let mut names: Vec<String> = std::fs::read_dir(&path)
            .map_err(|e| ArchiveError::io(path.display().to_string(), "ListDump", e))?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.ends_with(".part"))
            .collect();
        names.sort();
        for name in names {
            files.push((format!("{}-{}/{}", identifier, dir, name), path.join(&name)));
        }
    }
    Ok(files)
}

/// Outcome of [`Uploader::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The marker file was present; nothing was sent.
    AlreadyUploaded,
    Uploaded {
        remote_identifier: String,
        uploaded: usize,
        skipped: usize,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RemoteMetadata {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    name: String,
}

/// Internet Archive uploader for one dump directory.
pub struct Uploader {
    config: UploadConfig,
    client: reqwest::Client,
}

impl Uploader {
    pub fn new(config: UploadConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!("rssdump-uploader/{}", DUMPER_VERSION))
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    /// Uploads the dump and returns the remote identifier.
    pub async fn upload(&self) -> Result<UploadOutcome, ArchiveError> {
        let dump_dir = &self.config.dump_dir;
        let mark = dump_dir.join(UPLOADED_MARK);
        if mark.exists() {
            info!(path = %mark.display(), "dump already uploaded");
            return Ok(UploadOutcome::AlreadyUploaded);
        }

        // Refuse archives that a run is still writing.
        let lock = dump_dir.join(LOCK_FILE);
        if lock.exists() {
            return Err(ArchiveError::already_running(lock.display().to_string(), None));
        }
        let run = load_config(dump_dir).await;
        if run.status == Some(RunStatus::Running) {
            return Err(ArchiveError::already_running(
                dump_dir.display().to_string(),
                Some(anyhow::anyhow!("run status is still running")),
            ));
        }

        let meta_path = dump_dir.join(FEED_JSON);
        let meta_bytes = tokio::fs::read(&meta_path)
            .await
            .map_err(|e| ArchiveError::io(meta_path.display().to_string(), "ReadMetadata", e))?;
        let meta: FeedMetadata = serde_json::from_slice(&meta_bytes).map_err(|e| {
            ArchiveError::parse(meta_path.display().to_string(), "ReadMetadata", Some(anyhow::Error::new(e)))
        })?;

        let identifier = identifier_from_dir(dump_dir)?;
        let remote = format!("rss-{}", identifier);
        let dumper_version = run.dumper_version.as_deref().unwrap_or(DUMPER_VERSION);
        let metadata = item_metadata(&meta, &self.config.collection, dumper_version);

        let mut files = files_to_upload(dump_dir, &identifier)?;
        if let Some(logo) = logo_file(dump_dir, &meta, &remote) {
            files.push(logo);
        }

        let existing = self.existing_files(&remote).await;
        let mut uploaded = 0;
        let mut skipped = 0;
        for (name, path) in &files {
            if existing.contains(name) {
                debug!(name = %name, "already in item");
                skipped += 1;
                continue;
            }
            self.put_file(&remote, name, path, &metadata).await?;
            uploaded += 1;
        }
        info!(remote = %remote, uploaded, skipped, "upload finished");

        let marker = format!(
            "Uploaded to Internet Archive with rssdump v{} on {}",
            DUMPER_VERSION,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        tokio::fs::write(&mark, marker)
            .await
            .map_err(|e| ArchiveError::io(mark.display().to_string(), "WriteMark", e))?;

        if self.config.delete_after_upload {
            tokio::fs::remove_dir_all(dump_dir)
                .await
                .map_err(|e| ArchiveError::io(dump_dir.display().to_string(), "DeleteDump", e))?;
            info!(path = %dump_dir.display(), "dump directory deleted");
        }

        Ok(UploadOutcome::Uploaded {
            remote_identifier: remote,
            uploaded,
            skipped,
        })
    }

    /// Names already stored in the remote item. Lookup failures count as "none".
    async fn existing_files(&self, remote: &str) -> HashSet<String> {
        let url = format!("{}/{}", self.config.metadata_endpoint.trim_end_matches('/'), remote);
        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(url = %url, status = r.status().as_u16(), "metadata lookup failed");
                return HashSet::new();
            }
            Err(e) => {
                warn!(url = %url, error = %e, "metadata lookup failed");
                return HashSet::new();
            }
        };
        match response.json::<RemoteMetadata>().await {
            Ok(meta) => meta.files.into_iter().map(|f| f.name).collect(),
            Err(e) => {
                warn!(url = %url, error = %e, "metadata response unreadable");
                HashSet::new()
            }
        }
    }

    async fn put_file(
        &self,
        remote: &str,
        name: &str,
        path: &Path,
        metadata: &[(String, String)],
    ) -> Result<(), ArchiveError> {
        let url = format!("{}/{}/{}", self.config.s3_endpoint.trim_end_matches('/'), remote, name);
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| ArchiveError::io(path.display().to_string(), "ReadUpload", e))?;

        let mut request = self
            .client
            .put(&url)
            .header(
                "authorization",
                format!("LOW {}:{}", self.config.access_key, self.config.secret_key),
            )
            .header("x-amz-auto-make-bucket", "1")
            .header("x-archive-queue-derive", "0")
            .header("x-archive-size-hint", body.len().to_string());
        for (key, value) in metadata {
            request = request.header(format!("x-archive-meta-{}", key), header_value(value));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| ArchiveError::upload(&url, "Upload", Some(anyhow::Error::new(e))))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ArchiveError::upload(
                &url,
                "Upload",
                Some(anyhow::anyhow!("server answered {}", status)),
            ));
        }
        debug!(name = %name, "uploaded");
        Ok(())
    }
}

/// Logo upload from the single root-relative `image.local_path` of `feed.json`.
fn logo_file(dump_dir: &Path, meta: &FeedMetadata, remote: &str) -> Option<(String, PathBuf)> {
    let local = meta.image.as_ref()?.local_path.as_deref()?;
    let path = dump_dir.join(local);
    if !path.is_file() {
        warn!(path = %path.display(), "channel logo missing from dump");
        return None;
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .filter(|e| (1..=5).contains(&e.len()) && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "png".to_string());
    Some((format!("{}_logo.{}", remote, ext), path))
}

/// Header-safe value; anything outside printable ASCII goes through `uri(...)` encoding.
fn header_value(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        value.to_string()
    } else {
        format!("uri({})", urlencoding::encode(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identifiers() {
        assert_eq!(
            identifier_from_dir(Path::new("/tmp/example.com_20240115_103000")).unwrap(),
            "example.com_20240115_103000"
        );
        assert_eq!(
            identifier_from_dir(Path::new("localhost_8080_20240115_103000")).unwrap(),
            "localhost_8080_20240115_103000"
        );
        assert!(identifier_from_dir(Path::new("example.com_20200101_000000")).is_err());
        assert!(identifier_from_dir(Path::new("just-a-dir")).is_err());
    }

    #[test]
    fn subject_drops_long_title() {
        let short = subject_string(Some("My Blog"), Some("https://blog.example.com:8443/feed"));
        assert!(short.ends_with("; My Blog; blog_example_com_8443"));

        let long_title = "t".repeat(300);
        let subject = subject_string(Some(&long_title), Some("https://example.com/feed"));
        assert!(!subject.contains(&long_title));
        assert!(subject.ends_with("example_com"));
        assert!(subject.len() <= 255);
    }

    #[test]
    fn header_values_are_encoded_when_needed() {
        assert_eq!(header_value("web"), "web");
        assert_eq!(header_value("a\nb"), "uri(a%0Ab)");
        assert_eq!(header_value("café"), "uri(caf%C3%A9)");
    }

    fn write_dump(root: &Path) -> PathBuf {
        let dump = root.join("example.com_20240115_103000");
        std::fs::create_dir_all(dump.join("items")).unwrap();
        std::fs::create_dir_all(dump.join("images")).unwrap();
        std::fs::write(
            dump.join("feed.json"),
            r#"{"title":"Blog","link":"https://example.com/","image":{"url":"https://example.com/logo.png","local_path":"images/logo.png","is_favicon":false},"items_count":1,"fetched_at":"2024-01-15T10:30:00Z"}"#,
        )
        .unwrap();
        std::fs::write(dump.join("feed.rss"), "<rss/>").unwrap();
        std::fs::write(dump.join("items/2024-01-15-Post.json"), "{}").unwrap();
        std::fs::write(dump.join("images/logo.png"), "png").unwrap();
        dump
    }

    #[tokio::test]
    async fn uploads_missing_files_once() {
        let server = MockServer::start();
        let id = "example.com_20240115_103000";
        let remote = format!("rss-{}", id);
        server.mock(|when, then| {
            when.method(GET).path(format!("/metadata/{}", remote));
            then.status(200).body(format!(r#"{{"files":[{{"name":"{}-feed.rss"}}]}}"#, id));
        });
        let puts: Vec<_> = [
            format!("/s3/{}/{}-feed.json", remote, id),
            format!("/s3/{}/{}-items/2024-01-15-Post.json", remote, id),
            format!("/s3/{}/{}-images/logo.png", remote, id),
            format!("/s3/{}/{}_logo.png", remote, remote),
        ]
        .into_iter()
        .map(|path| {
            server.mock(|when, then| {
                when.method(PUT)
                    .path(path)
                    .header("authorization", "LOW ak:sk")
                    .header("x-archive-meta-mediatype", "web")
                    .header("x-archive-meta-collection", "opensource");
                then.status(200);
            })
        })
        .collect();
        let skipped_put = server.mock(|when, then| {
            when.method(PUT).path(format!("/s3/{}/{}-feed.rss", remote, id));
            then.status(200);
        });

        let dir = tempfile::tempdir().unwrap();
        let dump = write_dump(dir.path());
        let mut config = UploadConfig::new(&dump, "ak", "sk");
        config.s3_endpoint = server.url("/s3");
        config.metadata_endpoint = server.url("/metadata");
        let uploader = Uploader::new(config);

        let outcome = uploader.upload().await.unwrap();

        assert_eq!(
            outcome,
            UploadOutcome::Uploaded {
                remote_identifier: remote.clone(),
                uploaded: 4,
                skipped: 1,
            }
        );
        for put in &puts {
            put.assert();
        }
        assert_eq!(skipped_put.hits(), 0);
        assert!(dump.join(UPLOADED_MARK).exists());

        assert_eq!(uploader.upload().await.unwrap(), UploadOutcome::AlreadyUploaded);
    }

    #[tokio::test]
    async fn refuses_dump_that_is_still_being_written() {
        let server = MockServer::start();
        let any_put = server.mock(|when, then| {
            when.method(PUT);
            then.status(200);
        });
        let dir = tempfile::tempdir().unwrap();
        let dump = write_dump(dir.path());
        let mut config = UploadConfig::new(&dump, "ak", "sk");
        config.s3_endpoint = server.url("/s3");
        config.metadata_endpoint = server.url("/metadata");
        let uploader = Uploader::new(config);

        std::fs::write(dump.join(LOCK_FILE), "PID: 1: Running").unwrap();
        assert!(uploader.upload().await.unwrap_err().is_already_running());
        std::fs::remove_file(dump.join(LOCK_FILE)).unwrap();

        std::fs::create_dir_all(dump.join(META_DIR)).unwrap();
        std::fs::write(dump.join(META_DIR).join("config.json"), r#"{"status":"running"}"#).unwrap();
        assert!(uploader.upload().await.unwrap_err().is_already_running());

        assert_eq!(any_put.hits(), 0);
        assert!(!dump.join(UPLOADED_MARK).exists());
    }

    #[test]
    fn reads_two_line_keys_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys");
        std::fs::write(&path, "access\nsecret\n").unwrap();
        assert_eq!(read_keys(&path).unwrap(), ("access".to_string(), "secret".to_string()));

        std::fs::write(&path, "only-one\n").unwrap();
        assert!(read_keys(&path).unwrap_err().is_upload());
    }
}
