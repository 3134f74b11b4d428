//! The book's linear spine and table of contents.

use pagemark_core::PositionError;
use tracing::debug;

use crate::dom::Document;
use crate::location::InternalLocation;

/// One content document of the spine.
#[derive(Debug, Clone)]
pub struct SpineItem {
    pub href: String,
    pub document: Document,
}

/// A table-of-contents entry. `href` may carry a `#fragment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub label: String,
    pub href: String,
}

impl TocEntry {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Spine {
    items: Vec<SpineItem>,
    toc: Vec<TocEntry>,
}

impl Spine {
    pub fn new(items: Vec<SpineItem>, toc: Vec<TocEntry>) -> Self {
        Self { items, toc }
    }

    /// Parse raw spine documents, given in reading order as `(href, bytes)`.
    pub fn parse<'a, I>(documents: I, toc: Vec<TocEntry>) -> Result<Self, PositionError>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut items = Vec::new();
        for (href, content) in documents {
            let document = Document::parse(content).map_err(|reason| PositionError::Parse {
                href: href.to_string(),
                reason,
            })?;
            debug!(href, words = document.word_count(), "Parsed spine document");
            items.push(SpineItem {
                href: href.to_string(),
                document,
            });
        }
        Ok(Self::new(items, toc))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, spine_index: usize) -> Option<&SpineItem> {
        self.items.get(spine_index)
    }

    pub fn items(&self) -> &[SpineItem] {
        &self.items
    }

    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    /// Sum of every document's word count.
    pub fn total_words(&self) -> u64 {
        self.items.iter().map(|item| item.document.word_count()).sum()
    }

    /// Absolute word offset of `location`: every word of the documents
    /// before it, plus the words preceding it in its own document.
    pub fn word_offset(&self, location: &InternalLocation) -> Result<u64, PositionError> {
        let item = self
            .get(location.spine_index)
            .ok_or(PositionError::FragmentOutOfRange {
                index: location.spine_index + 1,
                len: self.len(),
            })?;
        let node = item
            .document
            .node_at(&location.steps)
            .ok_or_else(|| PositionError::MalformedLocation {
                location: location.to_string(),
            })?;
        let prior: u64 = self.items[..location.spine_index]
            .iter()
            .map(|item| item.document.word_count())
            .sum();
        Ok(prior + item.document.words_before(node, location.offset))
    }

    /// Trimmed label of the TOC entry pointing at this spine document,
    /// ignoring any `#fragment` on the entry.
    pub fn chapter_label(&self, spine_index: usize) -> Option<&str> {
        let href = self.get(spine_index)?.href.as_str();
        self.toc
            .iter()
            .find(|entry| strip_fragment(&entry.href) == href)
            .map(|entry| entry.label.trim())
    }
}

fn strip_fragment(href: &str) -> &str {
    href.split_once('#').map(|(path, _)| path).unwrap_or(href)
}
