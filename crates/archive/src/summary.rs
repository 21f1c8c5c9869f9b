// ABOUTME: End-of-run counters: items written and downloaded media per category.
// ABOUTME: Renders the human-readable report, flagging empty outcomes without failing.

use std::fmt;
use std::path::PathBuf;

use rssdump_feed::{DownloadedMedia, MediaCategory};

/// Result of a completed archive run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub root: PathBuf,
    pub feed_title: Option<String>,
    pub items: usize,
    pub images: usize,
    pub audio: usize,
    pub video: usize,
    pub documents: usize,
    pub other: usize,
}

impl Summary {
    /// Adds the downloaded (locally stored) entries of one item.
    pub fn add_media(&mut self, media: &DownloadedMedia) {
        for category in MediaCategory::ALL {
            *self.count_mut(category) += media.downloaded(category);
        }
    }

    pub fn count(&self, category: MediaCategory) -> usize {
        match category {
            MediaCategory::Image => self.images,
            MediaCategory::Audio => self.audio,
            MediaCategory::Video => self.video,
            MediaCategory::Document => self.documents,
            MediaCategory::Other => self.other,
        }
    }

    fn count_mut(&mut self, category: MediaCategory) -> &mut usize {
        match category {
            MediaCategory::Image => &mut self.images,
            MediaCategory::Audio => &mut self.audio,
            MediaCategory::Video => &mut self.video,
            MediaCategory::Document => &mut self.documents,
            MediaCategory::Other => &mut self.other,
        }
    }

    pub fn total_media(&self) -> usize {
        MediaCategory::ALL.iter().map(|c| self.count(*c)).sum()
    }

    /// Notices for outcomes worth pointing out.
    pub fn notices(&self) -> Vec<&'static str> {
        let mut notices = Vec::new();
        if self.items == 0 {
            notices.push("no items were written");
        }
        if self.total_media() == 0 {
            notices.push("no media was downloaded");
        }
        notices
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.feed_title {
            Some(title) => writeln!(f, "Archived \"{}\" to {}", title, self.root.display())?,
            None => writeln!(f, "Archived feed to {}", self.root.display())?,
        }
        writeln!(f, "  items: {}", self.items)?;
        for category in MediaCategory::ALL {
            writeln!(f, "  {}: {}", category.label(), self.count(category))?;
        }
        for notice in self.notices() {
            writeln!(f, "  note: {}", notice)?;
        }
        Ok(())
    }
}
