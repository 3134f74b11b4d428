//! Pagemark Test Utilities
//!
//! Centralized test infrastructure for the Pagemark workspace:
//! - Mock network fetcher and sync transport with scripted failures
//! - A paginating mock rendition over a parsed spine
//! - Test fixtures for books, spines and settings
//! - Proptest generators for XHTML documents

pub use pagemark_core::{
    ActivityEvent, ActivityLimits, BookState, BookType, Device, PagemarkError, PagemarkResult,
    ProgressEvent, ReaderSettings, SyncError, WorkerError,
};
pub use pagemark_storage::MemoryStore;

use async_trait::async_trait;
use pagemark_position::{InternalLocation, NodeId, Spine};
use pagemark_reader::{Rendition, SectionLayout, SyncTransport, VisibleRange};
use pagemark_worker::{Fetcher, Request, Response};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// MOCK FETCHER
// ============================================================================

/// Scripted [`Fetcher`]. Unknown paths answer 404; failing paths and the
/// whole fetcher while offline return network errors.
#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    log: Mutex<Vec<Request>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, path: impl Into<String>, response: Response) -> Self {
        self.set_response(path, response);
        self
    }

    pub fn set_response(&self, path: impl Into<String>, response: Response) {
        self.responses
            .lock()
            .expect("mock fetcher lock poisoned")
            .insert(path.into(), response);
    }

    pub fn fail_path(&self, path: impl Into<String>) {
        self.failing
            .lock()
            .expect("mock fetcher lock poisoned")
            .insert(path.into());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().expect("mock fetcher lock poisoned").clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, WorkerError> {
        self.log
            .lock()
            .expect("mock fetcher lock poisoned")
            .push(request.clone());
        let failing = self
            .failing
            .lock()
            .expect("mock fetcher lock poisoned")
            .contains(&request.path);
        if failing || self.offline.load(Ordering::SeqCst) {
            return Err(WorkerError::Fetch {
                path: request.path.clone(),
                reason: "network unreachable".to_string(),
            });
        }
        Ok(self
            .responses
            .lock()
            .expect("mock fetcher lock poisoned")
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

// ============================================================================
// MOCK SYNC TRANSPORT
// ============================================================================

/// Recording [`SyncTransport`]. While offline every call fails with a
/// transport error; `reject_with` makes every push fail with a status.
#[derive(Debug, Default)]
pub struct MockSyncTransport {
    offline: AtomicBool,
    reject_status: Mutex<Option<u16>>,
    progress: Mutex<Vec<ProgressEvent>>,
    activity: Mutex<Vec<ActivityEvent>>,
    books: Mutex<HashMap<String, BookState>>,
    devices: Mutex<Vec<Device>>,
}

impl MockSyncTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        let transport = Self::default();
        transport.set_offline(true);
        transport
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn reject_with(&self, status: Option<u16>) {
        *self.reject_status.lock().expect("mock transport lock poisoned") = status;
    }

    pub fn add_book(&self, book: BookState) {
        self.books
            .lock()
            .expect("mock transport lock poisoned")
            .insert(book.id.clone(), book);
    }

    pub fn add_device(&self, device: Device) {
        self.devices
            .lock()
            .expect("mock transport lock poisoned")
            .push(device);
    }

    /// Progress events the server accepted.
    pub fn progress(&self) -> Vec<ProgressEvent> {
        self.progress.lock().expect("mock transport lock poisoned").clone()
    }

    /// Activity batches the server accepted.
    pub fn activity(&self) -> Vec<ActivityEvent> {
        self.activity.lock().expect("mock transport lock poisoned").clone()
    }

    fn check(&self, endpoint: &str) -> Result<(), SyncError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Transport {
                endpoint: endpoint.to_string(),
                reason: "network unreachable".to_string(),
            });
        }
        if let Some(status) = *self.reject_status.lock().expect("mock transport lock poisoned") {
            return Err(SyncError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SyncTransport for MockSyncTransport {
    async fn put_progress(&self, event: &ProgressEvent) -> Result<(), SyncError> {
        self.check("/api/ko/syncs/progress")?;
        self.progress
            .lock()
            .expect("mock transport lock poisoned")
            .push(event.clone());
        Ok(())
    }

    async fn post_activity(&self, event: &ActivityEvent) -> Result<(), SyncError> {
        self.check("/api/ko/activity")?;
        self.activity
            .lock()
            .expect("mock transport lock poisoned")
            .push(event.clone());
        Ok(())
    }

    async fn document_progress(&self, id: &str) -> Result<BookState, SyncError> {
        let endpoint = format!("/reader/progress/{}", id);
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Transport {
                endpoint,
                reason: "network unreachable".to_string(),
            });
        }
        self.books
            .lock()
            .expect("mock transport lock poisoned")
            .get(id)
            .cloned()
            .ok_or(SyncError::Status {
                endpoint,
                status: 404,
            })
    }

    async fn devices(&self) -> Result<Vec<Device>, SyncError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Transport {
                endpoint: "/reader/devices".to_string(),
                reason: "network unreachable".to_string(),
            });
        }
        Ok(self.devices.lock().expect("mock transport lock poisoned").clone())
    }
}

// ============================================================================
// MOCK RENDITION
// ============================================================================

/// Page width reported by [`MockRendition::section_layout`].
pub const MOCK_PAGE_WIDTH: f64 = 1000.0;

#[derive(Debug, Clone)]
struct MockPage {
    spine_index: usize,
    range: VisibleRange,
    text: String,
    start_word: u64,
    section_page: usize,
    section_pages: usize,
}

/// Paginates a spine into pages of a fixed number of text blocks.
///
/// A block is a non-anchor element with text of its own (directly or in
/// anchor children). Pages never span spine documents.
#[derive(Debug)]
pub struct MockRendition {
    spine: Spine,
    pages: Vec<MockPage>,
    current: AtomicUsize,
    turn_delay: Option<Duration>,
    displays: AtomicUsize,
}

impl MockRendition {
    pub fn new(spine: Spine, blocks_per_page: usize) -> Self {
        let blocks_per_page = blocks_per_page.max(1);
        let mut pages = Vec::new();
        for (spine_index, item) in spine.items().iter().enumerate() {
            let doc = &item.document;
            let Some(body) = doc.body() else {
                continue;
            };
            let blocks: Vec<NodeId> = doc
                .descendants(body)
                .into_iter()
                .filter(|n| doc.is_element(*n) && !doc.is_anchor(*n) && !own_text(doc, *n).trim().is_empty())
                .collect();
            let chunks: Vec<&[NodeId]> = blocks.chunks(blocks_per_page).collect();
            let section_pages = chunks.len();
            for (section_page, chunk) in chunks.into_iter().enumerate() {
                let first = chunk[0];
                let last = chunk[chunk.len() - 1];
                let location = |n: NodeId| {
                    InternalLocation::new(spine_index, doc.steps_to(n).unwrap_or_default())
                };
                let start = location(first);
                let prior: u64 = spine.items()[..spine_index]
                    .iter()
                    .map(|i| i.document.word_count())
                    .sum();
                pages.push(MockPage {
                    spine_index,
                    range: VisibleRange {
                        start,
                        end: location(last),
                    },
                    text: chunk
                        .iter()
                        .map(|n| own_text(doc, *n))
                        .collect::<Vec<_>>()
                        .join(" "),
                    start_word: prior + doc.words_before(first, None),
                    section_page,
                    section_pages,
                });
            }
        }
        Self {
            spine,
            pages,
            current: AtomicUsize::new(0),
            turn_delay: None,
            displays: AtomicUsize::new(0),
        }
    }

    /// Make every page turn take `delay`.
    pub fn with_turn_delay(mut self, delay: Duration) -> Self {
        self.turn_delay = Some(delay);
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_page(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn display_count(&self) -> usize {
        self.displays.load(Ordering::SeqCst)
    }

    async fn turn_delay(&self) {
        if let Some(delay) = self.turn_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn own_text(doc: &pagemark_position::Document, id: NodeId) -> String {
    doc.children(id)
        .iter()
        .filter_map(|c| {
            if doc.is_anchor(*c) {
                Some(doc.text_content(*c))
            } else {
                doc.text(*c).map(str::to_string)
            }
        })
        .collect()
}

#[async_trait]
impl Rendition for MockRendition {
    fn spine(&self) -> &Spine {
        &self.spine
    }

    async fn display(&self, target: Option<&InternalLocation>) -> PagemarkResult<()> {
        self.displays.fetch_add(1, Ordering::SeqCst);
        let index = match target {
            None => 0,
            Some(location) => {
                let word = self.spine.word_offset(location)?;
                self.pages
                    .iter()
                    .rposition(|p| {
                        p.spine_index < location.spine_index
                            || (p.spine_index == location.spine_index && p.start_word <= word)
                    })
                    .unwrap_or(0)
            }
        };
        self.current.store(index, Ordering::SeqCst);
        Ok(())
    }

    async fn next(&self) -> PagemarkResult<bool> {
        self.turn_delay().await;
        let current = self.current.load(Ordering::SeqCst);
        if current + 1 >= self.pages.len() {
            return Ok(false);
        }
        self.current.store(current + 1, Ordering::SeqCst);
        Ok(true)
    }

    async fn prev(&self) -> PagemarkResult<bool> {
        self.turn_delay().await;
        let current = self.current.load(Ordering::SeqCst);
        if current == 0 {
            return Ok(false);
        }
        self.current.store(current - 1, Ordering::SeqCst);
        Ok(true)
    }

    fn current_location(&self) -> Option<VisibleRange> {
        self.pages
            .get(self.current.load(Ordering::SeqCst))
            .map(|p| p.range.clone())
    }

    async fn visible_text(&self) -> PagemarkResult<String> {
        Ok(self
            .pages
            .get(self.current.load(Ordering::SeqCst))
            .map(|p| p.text.clone())
            .unwrap_or_default())
    }

    fn section_layout(&self) -> Option<SectionLayout> {
        self.pages
            .get(self.current.load(Ordering::SeqCst))
            .map(|p| SectionLayout {
                scroll_offset: p.section_page as f64 * MOCK_PAGE_WIDTH,
                page_width: MOCK_PAGE_WIDTH,
                total_width: p.section_pages as f64 * MOCK_PAGE_WIDTH,
            })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating spine documents.

    use proptest::prelude::*;

    /// Element names used in generated bodies.
    pub const BLOCK_TAGS: [&str; 6] = ["p", "div", "span", "em", "section", "blockquote"];

    /// XHTML namespace.
    pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

    /// A generated body node.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum XhtmlNode {
        Element {
            tag: &'static str,
            children: Vec<XhtmlNode>,
        },
        Text(String),
    }

    impl XhtmlNode {
        pub fn render(&self, out: &mut String) {
            match self {
                XhtmlNode::Text(text) => out.push_str(text),
                XhtmlNode::Element { tag, children } => {
                    out.push('<');
                    out.push_str(tag);
                    out.push('>');
                    for child in children {
                        child.render(out);
                    }
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
    }

    /// Generate a run of lowercase words.
    pub fn arb_words() -> impl Strategy<Value = String> {
        "[a-z]{1,8}( [a-z]{1,8}){0,4}"
    }

    /// Element names of anchor-bearing bodies. Few distinct names, so
    /// anchors often hide same-name siblings.
    pub const ANCHORED_TAGS: [&str; 4] = ["p", "span", "em", "a"];

    fn arb_node_of(tags: &'static [&'static str]) -> impl Strategy<Value = XhtmlNode> {
        let leaf = arb_words().prop_map(XhtmlNode::Text);
        leaf.prop_recursive(4, 32, 5, move |inner| {
            (
                prop::sample::select(tags.to_vec()),
                prop::collection::vec(inner, 0..5),
            )
                .prop_map(|(tag, children)| XhtmlNode::Element { tag, children })
        })
    }

    fn arb_document_of(node: impl Strategy<Value = XhtmlNode>) -> impl Strategy<Value = String> {
        (any::<bool>(), prop::collection::vec(node, 1..6)).prop_map(|(namespaced, body)| {
            let mut out = String::new();
            if namespaced {
                out.push_str(&format!("<html xmlns=\"{}\">", XHTML_NS));
            } else {
                out.push_str("<html>");
            }
            out.push_str("<head><title>Generated</title></head><body>");
            for node in &body {
                node.render(&mut out);
            }
            out.push_str("</body></html>");
            out
        })
    }

    /// Generate an anchor-free body node, nested a few levels deep.
    pub fn arb_xhtml_node() -> impl Strategy<Value = XhtmlNode> {
        arb_node_of(&BLOCK_TAGS)
    }

    /// Generate a body node that may contain `<a>` wrappers at any depth.
    pub fn arb_anchored_node() -> impl Strategy<Value = XhtmlNode> {
        arb_node_of(&ANCHORED_TAGS)
    }

    /// Generate a complete anchor-free spine document, with or without the
    /// XHTML namespace declared.
    pub fn arb_xhtml_document() -> impl Strategy<Value = String> {
        arb_document_of(arb_xhtml_node())
    }

    /// Generate a complete spine document containing anchor wrappers.
    pub fn arb_anchored_document() -> impl Strategy<Value = String> {
        arb_document_of(arb_anchored_node())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use pagemark_position::TocEntry;

    /// A 32-character document id, as issued by the server.
    pub const DOCUMENT_ID: &str = "0123456789abcdef0123456789abcdef";

    pub const CHAPTER_ONE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter One</title></head>
<body>
<h1>Chapter One</h1>
<p>It was a dreary night of November.</p>
<p>With an anxiety that almost amounted to agony, I collected the instruments of life around me.</p>
<p>It was already one in the morning; the rain pattered dismally against the panes.</p>
<p>By the glimmer of the <a href="notes.xhtml#n1">half-extinguished light</a>, I saw the dull yellow eye of the creature open.</p>
</body>
</html>"#;

    pub const CHAPTER_TWO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter Two</title></head>
<body>
<h1>Chapter Two</h1>
<div>
<p>I passed the night wretchedly.</p>
<p>Sometimes my pulse beat so quickly and hardly that I felt the palpitation of every artery.</p>
</div>
<p>Morning, dismal and wet, at length dawned.</p>
</body>
</html>"#;

    /// Two-chapter spine with a table of contents.
    pub fn sample_spine() -> Spine {
        let docs: Vec<(&str, &[u8])> = vec![
            ("text/chapter1.xhtml", CHAPTER_ONE.as_bytes()),
            ("text/chapter2.xhtml", CHAPTER_TWO.as_bytes()),
        ];
        Spine::parse(
            docs,
            vec![
                TocEntry::new(" Chapter One ", "text/chapter1.xhtml"),
                TocEntry::new("Chapter Two", "text/chapter2.xhtml#start"),
            ],
        )
        .expect("fixture spine parses")
    }

    /// A remote book with no saved position.
    pub fn remote_book() -> BookState {
        BookState {
            id: DOCUMENT_ID.to_string(),
            title: "Frankenstein".to_string(),
            author: "Mary Shelley".to_string(),
            book_type: BookType::Remote,
            ..Default::default()
        }
    }

    /// A local-only book with no saved position.
    pub fn local_book() -> BookState {
        BookState {
            book_type: BookType::Local,
            ..remote_book()
        }
    }

    pub fn settings() -> ReaderSettings {
        ReaderSettings {
            device_id: "0123456789ABCDEF0123456789ABCDEF".to_string(),
            device_name: "Test Device".to_string(),
            ..Default::default()
        }
    }

    /// Cached progress resource body for a document.
    pub fn progress_response(id: &str, percentage: f64) -> Response {
        let book = BookState {
            id: id.to_string(),
            percentage,
            ..Default::default()
        };
        Response::ok(serde_json::to_vec(&book).unwrap_or_default())
            .with_header("Content-Type", "application/json")
    }
}
