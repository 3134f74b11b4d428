//! Reading-progress tracking and activity normalization.
//!
//! The current word offset is recomputed from the rendition after every
//! page turn rather than accumulated, so it never drifts from the text.
//! Each forward turn yields at most one [`ActivityRecord`], normalized
//! against plausible reading speeds:
//!
//! - at or above `max_wpm` the sample is discarded
//! - below `min_wpm` the duration is cut to what `min_wpm` would take
//! - a page count that rounds to zero is discarded

use chrono::{DateTime, Utc};
use pagemark_core::{percentage, sync_fraction, ActivityLimits, ActivityRecord, BookStats};
use tracing::{debug, warn};

use crate::rendition::SectionLayout;

/// Chapter name shown when the TOC has no entry for the current section.
pub const UNKNOWN_CHAPTER: &str = "N/A";

/// One page view, measured when the reader leaves the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    pub visible_words: u64,
    pub elapsed_ms: i64,
    pub started_at: DateTime<Utc>,
    /// Absolute word offset of the first visible word.
    pub starting_word: u64,
}

impl PageView {
    /// Implied reading speed. Infinite when no time elapsed.
    pub fn words_per_minute(&self) -> f64 {
        if self.elapsed_ms <= 0 {
            return f64::INFINITY;
        }
        self.visible_words as f64 / (self.elapsed_ms as f64 / 60_000.0)
    }
}

/// Turn a page view into an activity record, or discard it.
pub fn normalize_activity(
    document: &str,
    view: &PageView,
    total_words: u64,
    limits: &ActivityLimits,
) -> Option<ActivityRecord> {
    if view.visible_words == 0 || total_words == 0 {
        debug!(document, "No words on page, skipping activity");
        return None;
    }

    let words = view.visible_words as f64;
    let wpm = view.words_per_minute();
    if wpm >= limits.max_wpm {
        warn!(document, wpm, words = view.visible_words, "Discarding implausibly fast page view");
        return None;
    }

    let mut elapsed_ms = view.elapsed_ms as f64;
    if wpm < limits.min_wpm {
        elapsed_ms = (words / limits.min_wpm) * 60_000.0;
        debug!(document, wpm, elapsed_ms, "Capping idle page view");
    }

    let pages = (1.0 / (words / total_words as f64)).round();
    if pages == 0.0 {
        warn!(document, words = view.visible_words, total_words, "Page count rounds to zero");
        return None;
    }
    let page = (view.starting_word as f64 * pages / total_words as f64).round();

    Some(ActivityRecord {
        document: document.to_string(),
        duration: (elapsed_ms / 1000.0).round() as i64,
        start_time: (view.started_at.timestamp_millis() as f64 / 1000.0).round() as i64,
        page: page as i64,
        pages: pages as i64,
    })
}

/// Word-based progress through one book.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    limits: ActivityLimits,
    total_words: u64,
    current_word: u64,
    page_started: DateTime<Utc>,
}

impl ProgressTracker {
    pub fn new(total_words: u64, limits: ActivityLimits, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            total_words,
            current_word: 0,
            page_started: now,
        }
    }

    pub fn total_words(&self) -> u64 {
        self.total_words
    }

    pub fn current_word(&self) -> u64 {
        self.current_word
    }

    pub fn page_started(&self) -> DateTime<Utc> {
        self.page_started
    }

    pub fn set_current_word(&mut self, word: u64) {
        self.current_word = word.min(self.total_words);
    }

    pub fn restart_timer(&mut self, now: DateTime<Utc>) {
        self.page_started = now;
    }

    /// 0-100, two decimals.
    pub fn percentage(&self) -> f64 {
        percentage(self.current_word, self.total_words)
    }

    /// 0-1, five decimals.
    pub fn sync_fraction(&self) -> f64 {
        sync_fraction(self.current_word, self.total_words)
    }

    /// Measure leaving the current page forward after `visible_words` words.
    pub fn page_turn(
        &self,
        document: &str,
        visible_words: u64,
        now: DateTime<Utc>,
    ) -> Option<ActivityRecord> {
        let view = PageView {
            visible_words,
            elapsed_ms: (now - self.page_started).num_milliseconds(),
            started_at: self.page_started,
            starting_word: self.current_word,
        };
        normalize_activity(document, &view, self.total_words, &self.limits)
    }

    pub fn stats(&self, chapter_name: Option<&str>, layout: Option<SectionLayout>) -> BookStats {
        BookStats {
            section_page: layout.map(|l| l.current_page()).unwrap_or(1),
            section_total_pages: layout.map(|l| l.total_pages()).unwrap_or(1),
            chapter_name: chapter_name.unwrap_or(UNKNOWN_CHAPTER).to_string(),
            percentage: self.percentage(),
        }
    }
}
