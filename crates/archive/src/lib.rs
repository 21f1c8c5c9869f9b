// ABOUTME: Feed-to-archive pipeline: fetching, media download, HTML rewriting and the on-disk layout.
// ABOUTME: Also hosts the archive lock, WARC capture, run config, catalog uploader and remote check.

pub mod archiver;
pub mod capture;
pub mod config;
pub mod download;
pub mod error;
pub mod favicon;
pub mod fetcher;
pub mod item;
pub mod lock;
pub mod metadata;
pub mod options;
pub mod remote_check;
pub mod rewrite;
pub mod sanitize;
pub mod summary;
pub mod upload;
pub mod writer;

pub use archiver::{default_output_dir, default_output_dir_now, Archiver};
pub use capture::{CaptureSink, WarcWriter, WARC_FILE};
pub use config::{load_config, update_config, RunConfig, RunStatus};
pub use download::{MediaDownloader, MediaStore};
pub use error::{ArchiveError, ErrorCode};
pub use favicon::discover_favicon;
pub use fetcher::{FetchResponse, Fetcher, HttpFetcher};
pub use item::extract_item;
pub use lock::{ArchiveLock, LOCK_FILE};
pub use metadata::extract_metadata;
pub use options::{ArchiverBuilder, ItemFormat, Options, UnknownItemFormat, DUMPER_VERSION};
pub use remote_check::{find_recent_dump, RemoteItem, DEFAULT_SEARCH_ENDPOINT, RECENT_DAYS};
pub use rewrite::rewrite_images;
pub use sanitize::{filename_from_url, item_filename};
pub use summary::Summary;
pub use upload::{read_keys, UploadConfig, UploadOutcome, Uploader};
pub use writer::{ArchiveWriter, FEED_JSON, FEED_RSS};

/// Re-exported so callers can use the feed layer without a separate dependency.
pub use rssdump_feed as feed;
