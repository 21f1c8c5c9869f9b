// ABOUTME: Error types for the archive pipeline including ErrorCode enum and ArchiveError struct.
// ABOUTME: Provides categorized errors with convenience constructors and boolean helpers.

use std::fmt;

/// Categories of terminal pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    Fetch,
    Timeout,
    Status,
    Parse,
    EmptyFeed,
    AlreadyRunning,
    SourceMismatch,
    Io,
    Upload,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Fetch => "fetch error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Status => "unexpected HTTP status",
            ErrorCode::Parse => "feed parse error",
            ErrorCode::EmptyFeed => "feed has no entries",
            ErrorCode::AlreadyRunning => "another dump is already running",
            ErrorCode::SourceMismatch => "archive belongs to a different feed",
            ErrorCode::Io => "I/O error",
            ErrorCode::Upload => "upload error",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for archive operations.
///
/// `url` is the resource involved (feed URL, media URL or a local path for I/O errors).
#[derive(Debug, thiserror::Error)]
pub struct ArchiveError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    /// HTTP status for [`ErrorCode::Status`].
    pub status: Option<u16>,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rssdump: {} {}: {}", self.op, self.url, self.code)?;
        if let Some(status) = self.status {
            write!(f, " {}", status)?;
        }
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl ArchiveError {
    fn with_code(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            status: None,
            source,
        }
    }

    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::InvalidUrl, url, op, source)
    }

    pub fn fetch(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Fetch, url, op, source)
    }

    pub fn timeout(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Timeout, url, op, source)
    }

    /// Non-2xx response after retries were exhausted.
    pub fn status(url: impl Into<String>, op: impl Into<String>, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::with_code(ErrorCode::Status, url, op, None)
        }
    }

    pub fn parse(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Parse, url, op, source)
    }

    pub fn empty_feed(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::EmptyFeed, url, op, None)
    }

    /// The archive root is locked by another run.
    pub fn already_running(path: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self::with_code(ErrorCode::AlreadyRunning, path, "Lock", source)
    }

    /// The archive root was created for `existing`, not for `url`.
    pub fn source_mismatch(url: impl Into<String>, existing: &str) -> Self {
        Self::with_code(
            ErrorCode::SourceMismatch,
            url,
            "CheckSource",
            Some(anyhow::anyhow!("existing archive source is {}", existing)),
        )
    }

    pub fn io(path: impl Into<String>, op: impl Into<String>, err: std::io::Error) -> Self {
        Self::with_code(ErrorCode::Io, path, op, Some(anyhow::Error::new(err)))
    }

    pub fn upload(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Upload, url, op, source)
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    pub fn is_fetch(&self) -> bool {
        self.code == ErrorCode::Fetch
    }

    pub fn is_status(&self) -> bool {
        self.code == ErrorCode::Status
    }

    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    pub fn is_parse(&self) -> bool {
        self.code == ErrorCode::Parse
    }

    pub fn is_empty_feed(&self) -> bool {
        self.code == ErrorCode::EmptyFeed
    }

    pub fn is_already_running(&self) -> bool {
        self.code == ErrorCode::AlreadyRunning
    }

    pub fn is_source_mismatch(&self) -> bool {
        self.code == ErrorCode::SourceMismatch
    }

    pub fn is_io(&self) -> bool {
        self.code == ErrorCode::Io
    }

    pub fn is_upload(&self) -> bool {
        self.code == ErrorCode::Upload
    }
}
