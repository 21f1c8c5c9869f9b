// ABOUTME: Media downloader that stores assets under category directories of the archive root.
// ABOUTME: Skips files that already exist, converts icons to PNG and never fails the pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rssdump_feed::{is_http_url, MediaCategory};
use tracing::{debug, warn};

use crate::capture::CaptureSink;
use crate::fetcher::Fetcher;
use crate::sanitize::filename_from_url;
use crate::writer::write_atomic;

/// Stores a remote asset locally and returns its root-relative path.
///
/// `None` means the asset was skipped or failed; the reason has already been logged.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn fetch_and_store(
        &self,
        url: &str,
        category: MediaCategory,
        referer: Option<&str>,
    ) -> Option<String>;
}

/// Extension used when the URL does not reveal one.
pub fn default_extension(category: MediaCategory) -> &'static str {
    match category {
        MediaCategory::Image => "jpg",
        MediaCategory::Audio => "mp3",
        MediaCategory::Video => "mp4",
        MediaCategory::Document => "pdf",
        MediaCategory::Other => "bin",
    }
}

/// Whether `.ico` files can be rasterized in this build.
pub const fn icon_conversion_available() -> bool {
    cfg!(feature = "icon-raster")
}

/// [`MediaStore`] writing into `<root>/<category dir>/<sanitized name>`.
pub struct MediaDownloader {
    root: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    capture: Option<Arc<dyn CaptureSink>>,
    convert_icons: bool,
    path_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl MediaDownloader {
    pub fn new(root: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            root: root.into(),
            fetcher,
            capture: None,
            convert_icons: true,
            path_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Record every exchange through `sink`.
    pub fn with_capture(mut self, sink: Option<Arc<dyn CaptureSink>>) -> Self {
        self.capture = sink;
        self
    }

    pub fn with_icon_conversion(mut self, convert: bool) -> Self {
        self.convert_icons = convert;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.path_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    async fn store(
        &self,
        url: &str,
        category: MediaCategory,
        referer: Option<&str>,
    ) -> Result<String, anyhow::Error> {
        let dir = category.dir_name();
        tokio::fs::create_dir_all(self.root.join(dir)).await?;

        let name = filename_from_url(url, default_extension(category));
        let converted = self.converted_name(&name);
        let candidates: Vec<&str> = converted.iter().map(String::as_str).chain([name.as_str()]).collect();

        let target = self.root.join(dir).join(&name);
        let lock = self.lock_for(&target);
        let _guard = lock.lock().await;

        for candidate in &candidates {
            if tokio::fs::try_exists(self.root.join(dir).join(candidate)).await? {
                debug!(url, path = %candidate, "already downloaded");
                return Ok(format!("{}/{}", dir, candidate));
            }
        }

        let headers: Vec<(String, String)> = referer
            .map(|r| vec![("Referer".to_string(), r.to_string())])
            .unwrap_or_default();
        let response = self.fetcher.get(url, &headers).await?;

        if let Some(sink) = &self.capture {
            if let Err(e) = sink.record(&response) {
                warn!(url, error = %e, "capture failed");
            }
        }

        let (file_name, bytes) = match converted {
            Some(png_name) => match convert_icon(&response.body) {
                Ok(png) => (png_name, png),
                Err(e) => {
                    warn!(url, error = %e, "icon conversion failed, keeping original");
                    (name, response.body.to_vec())
                }
            },
            None => (name, response.body.to_vec()),
        };

        write_atomic(&self.root.join(dir).join(&file_name), &bytes).await?;
        debug!(url, category = %category, path = %file_name, bytes = bytes.len(), "stored");
        Ok(format!("{}/{}", dir, file_name))
    }

    /// `<stem>.png` when `name` is an icon that will be converted.
    fn converted_name(&self, name: &str) -> Option<String> {
        if !self.convert_icons || !icon_conversion_available() {
            return None;
        }
        let (stem, ext) = name.rsplit_once('.')?;
        ext.eq_ignore_ascii_case("ico")
            .then(|| format!("{}.png", stem))
    }
}

#[async_trait]
impl MediaStore for MediaDownloader {
    async fn fetch_and_store(
        &self,
        url: &str,
        category: MediaCategory,
        referer: Option<&str>,
    ) -> Option<String> {
        if !is_http_url(url) {
            debug!(url, "skipping non-http media");
            return None;
        }
        match self.store(url, category, referer).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(url, category = %category, error = %e, "media download failed");
                None
            }
        }
    }
}

#[cfg(feature = "icon-raster")]
fn convert_icon(bytes: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
    let icon = image::load_from_memory_with_format(bytes, image::ImageFormat::Ico)?;
    let mut out = std::io::Cursor::new(Vec::new());
    icon.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(not(feature = "icon-raster"))]
fn convert_icon(_bytes: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
    Err(anyhow::anyhow!("built without icon-raster"))
}
