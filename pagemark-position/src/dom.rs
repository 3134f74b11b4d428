//! Arena DOM for spine documents.
//!
//! Spine documents are XHTML. They are parsed once with quick-xml into a
//! flat arena where node ids follow document order, so "before" in the
//! document is simply a smaller id. Element names are stored lowercased
//! without prefix; comments, processing instructions and the doctype are
//! dropped. Adjacent character data (text, CDATA, entity references) is
//! merged into a single text node.

use pagemark_core::count_words;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Index of a node in its [`Document`].
pub type NodeId = usize;

/// The document node. Always present, always id 0.
pub const DOCUMENT: NodeId = 0;

const ANCHOR: &str = "a";
const BODY: &str = "body";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element {
        name: String,
        namespace: Option<String>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// A parsed spine document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    body: Option<NodeId>,
    /// Words in body text nodes with a smaller id than the index.
    words_before: Vec<u64>,
    word_count: u64,
}

impl Document {
    /// Parse an XHTML document.
    ///
    /// Mismatched end tags are tolerated: an end tag closes the nearest open
    /// element of the same name, and stray end tags are ignored.
    pub fn parse(content: &[u8]) -> Result<Self, String> {
        let mut reader = Reader::from_reader(content);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;

        let mut doc = Document {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            body: None,
            words_before: Vec::new(),
            word_count: 0,
        };
        let mut stack: Vec<NodeId> = vec![DOCUMENT];
        let mut buf = Vec::with_capacity(64);

        loop {
            let parent = stack.last().copied().unwrap_or(DOCUMENT);
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let id = doc.push_element(&reader, &e, parent)?;
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    doc.push_element(&reader, &e, parent)?;
                }
                Ok(Event::End(e)) => {
                    let name = decode_name(&reader, e.local_name().as_ref())?;
                    if let Some(pos) = stack
                        .iter()
                        .rposition(|id| doc.tag_name(*id) == Some(name.as_str()))
                    {
                        stack.truncate(pos);
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .decode()
                        .map_err(|err| format!("text decode: {:?}", err))?;
                    doc.push_text(parent, &text);
                }
                Ok(Event::CData(e)) => {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| format!("cdata decode: {:?}", err))?;
                    doc.push_text(parent, &text);
                }
                Ok(Event::GeneralRef(e)) => {
                    let name = e
                        .decode()
                        .map_err(|err| format!("entity decode: {:?}", err))?;
                    let raw = format!("&{};", name);
                    let resolved = quick_xml::escape::unescape_with(&raw, resolve_entity)
                        .map(|text| text.into_owned())
                        .unwrap_or_else(|_| raw.clone());
                    doc.push_text(parent, &resolved);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(format!(
                        "XML error at byte {}: {}",
                        reader.buffer_position(),
                        e
                    ))
                }
            }
            buf.clear();
        }

        doc.index_words();
        Ok(doc)
    }

    fn push_element(
        &mut self,
        reader: &Reader<&[u8]>,
        e: &BytesStart<'_>,
        parent: NodeId,
    ) -> Result<NodeId, String> {
        let name = decode_name(reader, e.local_name().as_ref())?;
        let mut namespace = self.namespace_of(parent).map(str::to_string);
        for attr in e.attributes().flatten() {
            if attr.key.as_ref() == b"xmlns" {
                let value = reader
                    .decoder()
                    .decode(attr.value.as_ref())
                    .map_err(|err| format!("attribute decode: {:?}", err))?;
                namespace = if value.is_empty() {
                    None
                } else {
                    Some(value.into_owned())
                };
            }
        }
        Ok(self.push(parent, NodeKind::Element { name, namespace }))
    }

    fn push_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.nodes[parent].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last].kind {
                existing.push_str(text);
                return;
            }
        }
        self.push(parent, NodeKind::Text(text.to_string()));
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    fn index_words(&mut self) {
        self.body = self
            .descendants(DOCUMENT)
            .into_iter()
            .find(|id| self.tag_name(*id) == Some(BODY));

        let mut running = 0u64;
        let mut words_before = Vec::with_capacity(self.nodes.len());
        for id in 0..self.nodes.len() {
            words_before.push(running);
            if let NodeKind::Text(text) = &self.nodes[id].kind {
                if self.body.is_some_and(|body| self.is_descendant_of(id, body)) {
                    running += count_words(text);
                }
            }
        }
        self.words_before = words_before;
        self.word_count = running;
    }

    // ========================================================================
    // NODE ACCESS
    // ========================================================================

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Lowercased local name of an element node.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Namespace of an element node.
    pub fn namespace_of(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element { namespace, .. } => namespace.as_deref(),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag_name(id).is_some()
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.text(id).is_some()
    }

    /// Hyperlink wrappers are transparent to reading positions.
    pub fn is_anchor(&self, id: NodeId) -> bool {
        self.tag_name(id) == Some(ANCHOR)
    }

    /// The document element (`<html>`).
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(DOCUMENT)
            .iter()
            .copied()
            .find(|id| self.is_element(*id))
    }

    /// Namespace declared by the document element, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.root_element().and_then(|root| self.namespace_of(root))
    }

    pub fn body(&self) -> Option<NodeId> {
        self.body
    }

    /// All nodes below `id` in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            out.push(next);
            pending.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cur = self.parent(id);
        while let Some(node) = cur {
            if node == ancestor {
                return true;
            }
            cur = self.parent(node);
        }
        false
    }

    /// Element children of `id`, with anchor wrappers replaced by their own
    /// children, recursively.
    pub fn effective_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_effective(id, &mut out);
        out
    }

    fn collect_effective(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in self.children(id) {
            if self.is_anchor(child) {
                self.collect_effective(child, out);
            } else if self.is_element(child) {
                out.push(child);
            }
        }
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    // ========================================================================
    // WORDS
    // ========================================================================

    /// Words in the body of this document.
    pub fn word_count(&self) -> u64 {
        self.word_count
    }

    /// Words in the body that precede `id`, plus the words of the first
    /// `char_offset` characters of `id` when it is a text node.
    pub fn words_before(&self, id: NodeId, char_offset: Option<usize>) -> u64 {
        let before = self.words_before.get(id).copied().unwrap_or(self.word_count);
        let partial = match (self.text(id), char_offset, self.body) {
            (Some(text), Some(offset), Some(body)) if self.is_descendant_of(id, body) => {
                let prefix: String = text.chars().take(offset).collect();
                count_words(&prefix)
            }
            _ => 0,
        };
        before + partial
    }

    // ========================================================================
    // LOCATION STEPS
    // ========================================================================

    /// Step of `id` within its parent: `2k` for the k-th element child
    /// (1-based), `2j + 1` for a text node following `j` element siblings.
    fn step_of(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        let elements_before = self
            .children(parent)
            .iter()
            .take_while(|c| **c != id)
            .filter(|c| self.is_element(**c))
            .count();
        if self.is_element(id) {
            Some(2 * (elements_before + 1))
        } else {
            Some(2 * elements_before + 1)
        }
    }

    /// Steps from the document element down to `id`.
    ///
    /// `None` when `id` is not below the document element.
    pub fn steps_to(&self, id: NodeId) -> Option<Vec<usize>> {
        let root = self.root_element()?;
        let mut steps = Vec::new();
        let mut cur = id;
        while cur != root {
            steps.push(self.step_of(cur)?);
            cur = self.parent(cur)?;
        }
        steps.reverse();
        Some(steps)
    }

    /// Node addressed by `steps` from the document element.
    pub fn node_at(&self, steps: &[usize]) -> Option<NodeId> {
        let mut cur = self.root_element()?;
        for &step in steps {
            let children = self.children(cur);
            cur = if step == 0 {
                return None;
            } else if step % 2 == 0 {
                let k = step / 2;
                children
                    .iter()
                    .copied()
                    .filter(|c| self.is_element(*c))
                    .nth(k - 1)?
            } else {
                let j = (step - 1) / 2;
                let mut elements = 0;
                let mut found = None;
                for &child in children {
                    if self.is_element(child) {
                        elements += 1;
                    } else if elements == j && self.is_text(child) {
                        found = Some(child);
                        break;
                    }
                }
                found?
            };
        }
        Some(cur)
    }
}

fn decode_name(reader: &Reader<&[u8]>, raw: &[u8]) -> Result<String, String> {
    reader
        .decoder()
        .decode(raw)
        .map(|name| name.to_ascii_lowercase())
        .map_err(|err| format!("name decode: {:?}", err))
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        _ => quick_xml::escape::resolve_predefined_entity(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter One</title></head>
<body>
  <h1>Chapter One</h1>
  <!-- opening -->
  <p>It was a <em>dark</em> and stormy night.</p>
  <p>Tom &amp; Jerry&nbsp;ran <a href="n.xhtml">away</a>.</p>
</body>
</html>"#;

    fn chapter() -> Document {
        Document::parse(CHAPTER.as_bytes()).unwrap()
    }

    fn first(doc: &Document, tag: &str) -> NodeId {
        doc.descendants(DOCUMENT)
            .into_iter()
            .find(|id| doc.tag_name(*id) == Some(tag))
            .unwrap()
    }

    #[test]
    fn test_parse_structure() {
        let doc = chapter();
        let root = doc.root_element().unwrap();
        assert_eq!(doc.tag_name(root), Some("html"));
        assert_eq!(doc.namespace(), Some("http://www.w3.org/1999/xhtml"));
        let body = doc.body().unwrap();
        let elements: Vec<&str> = doc
            .children(body)
            .iter()
            .filter_map(|id| doc.tag_name(*id))
            .collect();
        assert_eq!(elements, vec!["h1", "p", "p"]);
        // Namespace is inherited.
        assert_eq!(doc.namespace_of(body), Some("http://www.w3.org/1999/xhtml"));
    }

    #[test]
    fn test_entities_merge_into_text() {
        let doc = chapter();
        let p = doc
            .children(doc.body().unwrap())
            .iter()
            .copied()
            .filter(|id| doc.tag_name(*id) == Some("p"))
            .nth(1)
            .unwrap();
        let first_text = doc.children(p)[0];
        assert_eq!(doc.text(first_text), Some("Tom & Jerry\u{a0}ran "));
    }

    #[test]
    fn test_word_count_excludes_head() {
        let doc = chapter();
        // "Chapter One" + "It was a" "dark" "and stormy night." + "Tom & Jerry ran" "away" "."
        assert_eq!(doc.word_count(), 2 + 3 + 1 + 3 + 4 + 1 + 1);
    }

    #[test]
    fn test_words_before_text_offset() {
        let doc = chapter();
        let p = first(&doc, "p");
        let text = doc.children(p)[0];
        assert_eq!(doc.words_before(p, None), 2);
        assert_eq!(doc.words_before(text, Some(0)), 2);
        assert_eq!(doc.words_before(text, Some(6)), 4);
        let em = first(&doc, "em");
        assert_eq!(doc.words_before(em, None), 5);
    }

    #[test]
    fn test_effective_children_flatten_anchors() {
        let doc =
            Document::parse(b"<html><body><p><span>a</span><a><span>b</span></a></p></body></html>")
                .unwrap();
        let p = first(&doc, "p");
        let effective: Vec<&str> = doc
            .effective_children(p)
            .iter()
            .filter_map(|id| doc.tag_name(*id))
            .collect();
        assert_eq!(effective, vec!["span", "span"]);
    }

    #[test]
    fn test_steps_round_trip() {
        let doc = chapter();
        for id in doc.descendants(doc.root_element().unwrap()) {
            let steps = doc.steps_to(id).unwrap();
            assert_eq!(doc.node_at(&steps), Some(id), "steps {:?}", steps);
        }
    }

    #[test]
    fn test_step_numbering() {
        let doc = Document::parse(b"<html><body>lead<p>x</p>tail</body></html>").unwrap();
        let body = doc.body().unwrap();
        assert_eq!(doc.steps_to(body), Some(vec![2]));
        let p = first(&doc, "p");
        assert_eq!(doc.steps_to(p), Some(vec![2, 2]));
        let lead = doc.children(body)[0];
        let tail = doc.children(body)[2];
        assert_eq!(doc.steps_to(lead), Some(vec![2, 1]));
        assert_eq!(doc.steps_to(tail), Some(vec![2, 3]));
        assert_eq!(doc.node_at(&[2, 0]), None);
        assert_eq!(doc.node_at(&[2, 4]), None);
    }

    #[test]
    fn test_mismatched_end_tags_tolerated() {
        let doc = Document::parse(b"<html><body><p>one<br></p><p>two</p></body></html>").unwrap();
        assert!(doc.body().is_some());
        assert_eq!(doc.word_count(), 2);
    }

    #[test]
    fn test_uppercase_names_lowercased() {
        let doc = Document::parse(b"<HTML><BODY><P>x</P></BODY></HTML>").unwrap();
        assert_eq!(doc.tag_name(doc.body().unwrap()), Some("body"));
        assert_eq!(doc.namespace(), None);
    }
}
