// ABOUTME: Run configuration persisted at <root>/dumpMeta/config.json.
// ABOUTME: Updates merge into whatever is already on disk so earlier keys survive.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ArchiveError;
use crate::options::ItemFormat;
use crate::writer::write_atomic;

pub const META_DIR: &str = "dumpMeta";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

/// Facts about one archive run. Absent fields are left untouched on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dumper_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_format: Option<ItemFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_downloaded: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_downloaded: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(META_DIR).join(CONFIG_FILE)
}

/// Reads the stored config; a missing or unreadable file yields the default.
pub async fn load_config(root: &Path) -> RunConfig {
    match tokio::fs::read(config_path(root)).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => RunConfig::default(),
    }
}

/// Merges `update` into the stored config and writes it back.
pub async fn update_config(root: &Path, update: &RunConfig) -> Result<(), ArchiveError> {
    let path = config_path(root);
    let io_err = |e| ArchiveError::io(path.display().to_string(), "WriteConfig", e);

    tokio::fs::create_dir_all(root.join(META_DIR)).await.map_err(io_err)?;

    let mut stored: Map<String, Value> = match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => Map::new(),
    };
    if let Ok(Value::Object(fields)) = serde_json::to_value(update) {
        stored.extend(fields);
    }

    let json = serde_json::to_string_pretty(&Value::Object(stored))
        .map_err(|e| io_err(std::io::Error::other(e)))?;
    write_atomic(&path, json.as_bytes()).await.map_err(io_err)
}
