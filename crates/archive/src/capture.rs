// ABOUTME: Capture sink recording every HTTP exchange, with a WARC/1.0 file implementation.
// ABOUTME: One response record plus one request record per exchange, each its own gzip member.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ArchiveError;
use crate::fetcher::{reason_phrase, FetchResponse};

/// File name of the capture inside the archive root.
pub const WARC_FILE: &str = "feed.warc.gz";

/// Receives raw exchanges before the pipeline uses their bytes.
pub trait CaptureSink: Send + Sync {
    fn record(&self, exchange: &FetchResponse) -> Result<(), ArchiveError>;
}

/// Appends gzip-compressed WARC/1.0 records to `<root>/feed.warc.gz`.
pub struct WarcWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl WarcWriter {
    /// Opens (or continues) the capture file and writes a `warcinfo` record.
    pub fn open(root: &Path, software: &str) -> Result<Self, ArchiveError> {
        let path = root.join(WARC_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ArchiveError::io(path.display().to_string(), "OpenCapture", e))?;
        let writer = Self {
            path,
            file: Mutex::new(file),
        };

        let info = format!(
            "software: {}\r\nformat: WARC File Format 1.0\r\nconformsTo: http://iipc.github.io/warc-specifications/specifications/warc-format/warc-1.0/\r\n",
            software
        );
        writer.append(&[
            ("WARC-Type", "warcinfo".to_string()),
            ("WARC-Record-ID", record_id()),
            ("WARC-Date", warc_date()),
            ("WARC-Filename", WARC_FILE.to_string()),
            ("Content-Type", "application/warc-fields".to_string()),
        ], info.as_bytes())?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, headers: &[(&str, String)], block: &[u8]) -> Result<(), ArchiveError> {
        let mut record = Vec::with_capacity(block.len() + 512);
        record.extend_from_slice(b"WARC/1.0\r\n");
        for (name, value) in headers {
            record.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        record.extend_from_slice(format!("Content-Length: {}\r\n\r\n", block.len()).as_bytes());
        record.extend_from_slice(block);
        record.extend_from_slice(b"\r\n\r\n");

        let io_err = |e: std::io::Error| ArchiveError::io(self.path.display().to_string(), "WriteCapture", e);
        let mut encoder = GzEncoder::new(Vec::with_capacity(record.len() / 2), Compression::default());
        encoder.write_all(&record).map_err(io_err)?;
        let member = encoder.finish().map_err(io_err)?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| ArchiveError::io(self.path.display().to_string(), "WriteCapture", std::io::Error::other("capture lock poisoned")))?;
        file.write_all(&member)
            .map_err(|e| ArchiveError::io(self.path.display().to_string(), "WriteCapture", e))
    }
}

impl CaptureSink for WarcWriter {
    fn record(&self, exchange: &FetchResponse) -> Result<(), ArchiveError> {
        let response_id = record_id();
        let date = warc_date();

        let mut response_block = format!(
            "HTTP/1.1 {} {}\r\n",
            exchange.status,
            reason_phrase(exchange.status)
        )
        .into_bytes();
        for (name, value) in &exchange.headers {
            response_block.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        response_block.extend_from_slice(b"\r\n");
        response_block.extend_from_slice(&exchange.body);

        self.append(
            &[
                ("WARC-Type", "response".to_string()),
                ("WARC-Record-ID", response_id.clone()),
                ("WARC-Date", date.clone()),
                ("WARC-Target-URI", exchange.final_url.clone()),
                ("WARC-Payload-Digest", format!("sha256:{}", hex_digest(&exchange.body))),
                ("Content-Type", "application/http; msgtype=response".to_string()),
            ],
            &response_block,
        )?;

        let target = url::Url::parse(&exchange.final_url).ok();
        let path = target
            .as_ref()
            .map(|u| match u.query() {
                Some(q) => format!("{}?{}", u.path(), q),
                None => u.path().to_string(),
            })
            .unwrap_or_else(|| "/".to_string());
        let host = target
            .as_ref()
            .and_then(|u| u.host_str().map(|h| match u.port() {
                Some(p) => format!("{}:{}", h, p),
                None => h.to_string(),
            }))
            .unwrap_or_default();

        let mut request_block = format!("GET {} HTTP/1.1\r\nHost: {}\r\n", path, host).into_bytes();
        for (name, value) in &exchange.request_headers {
            request_block.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        request_block.extend_from_slice(b"\r\n");

        self.append(
            &[
                ("WARC-Type", "request".to_string()),
                ("WARC-Record-ID", record_id()),
                ("WARC-Date", date),
                ("WARC-Target-URI", exchange.final_url.clone()),
                ("WARC-Concurrent-To", response_id),
                ("Content-Type", "application/http; msgtype=request".to_string()),
            ],
            &request_block,
        )
    }
}

fn record_id() -> String {
    format!("<urn:uuid:{}>", Uuid::new_v4())
}

fn warc_date() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn hex_digest(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;

    #[test]
    fn writes_info_response_and_request_records() {
        let dir = tempfile::tempdir().unwrap();
        let warc = WarcWriter::open(dir.path(), "rssdump/test").unwrap();
        let exchange = FetchResponse {
            status: 200,
            url: "https://example.com/feed?x=1".to_string(),
            final_url: "https://example.com/feed?x=1".to_string(),
            content_type: Some("application/rss+xml".to_string()),
            headers: vec![("content-type".to_string(), "application/rss+xml".to_string())],
            request_headers: vec![("user-agent".to_string(), "rssdump/test".to_string())],
            body: Bytes::from_static(b"<rss/>"),
        };
        warc.record(&exchange).unwrap();

        let raw = std::fs::read(warc.path()).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        let mut text = String::new();
        MultiGzDecoder::new(raw.as_slice()).read_to_string(&mut text).unwrap();
        assert_eq!(text.matches("WARC/1.0\r\n").count(), 3);
        assert!(text.contains("WARC-Type: warcinfo"));
        assert!(text.contains("WARC-Type: response"));
        assert!(text.contains("WARC-Type: request"));
        assert!(text.contains("HTTP/1.1 200 OK\r\ncontent-type: application/rss+xml\r\n\r\n<rss/>"));
        assert!(text.contains("GET /feed?x=1 HTTP/1.1\r\nHost: example.com\r\n"));
        assert!(text.contains("WARC-Record-ID: <urn:uuid:"));
    }
}
