// ABOUTME: Error type for turning fetched feed bytes into a ParsedFeed.
// ABOUTME: Distinguishes unparsable documents from structurally valid feeds with no entries.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// The document is not RSS, Atom, RDF or JSON Feed.
    #[error("failed to parse feed: {0}")]
    Parse(String),

    /// A value the caller supplied (for instance the feed URL) is unusable.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Parsed fine, but there is nothing to archive.
    #[error("feed contains no entries")]
    Empty,
}

impl FeedError {
    pub fn parse(err: impl fmt::Display) -> Self {
        FeedError::Parse(err.to_string())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        FeedError::Invalid(msg.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FeedError::Empty)
    }
}
