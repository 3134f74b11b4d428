//! Bidirectional mapping between internal locations and reading positions.
//!
//! Encoding walks up from the located node to the document body, naming
//! each element by tag and 1-based index among same-name siblings. Anchor
//! wrappers are skipped: an element's index is computed among the
//! anchor-flattened children of its nearest non-anchor ancestor, so
//! renderers that do and don't wrap text in links produce the same path.
//!
//! Decoding tries two resolutions in order:
//!
//! 1. Strict: every step selects a direct element child with a matching
//!    name and namespace.
//! 2. Lenient: every step descends through anchor-flattened children by
//!    tag name alone.
//!
//! The strict pass runs first because it is what other producers of these
//! paths mean. It can pick the wrong element when anchors shift sibling
//! indices, and the lenient pass only runs when the strict pass finds
//! nothing, so neither ordering removes every mismatch.

use pagemark_core::PositionError;
use tracing::{debug, warn};

use crate::dom::{Document, NodeId, DOCUMENT};
use crate::location::InternalLocation;
use crate::path::{PathStep, ReadingPosition, Selector, TextTarget};
use crate::spine::Spine;

/// Result of encoding a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPosition {
    pub position: ReadingPosition,
    /// Location of the element the position addresses, for highlighting.
    pub element: InternalLocation,
}

/// Which resolution strategy matched a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Copy)]
pub struct PositionCodec<'a> {
    spine: &'a Spine,
}

impl<'a> PositionCodec<'a> {
    pub fn new(spine: &'a Spine) -> Self {
        Self { spine }
    }

    fn document(&self, spine_index: usize) -> Result<&'a Document, PositionError> {
        self.spine
            .get(spine_index)
            .map(|item| &item.document)
            .ok_or(PositionError::FragmentOutOfRange {
                index: spine_index + 1,
                len: self.spine.len(),
            })
    }

    // ========================================================================
    // ENCODE
    // ========================================================================

    /// Encode an internal location as a reading position.
    pub fn to_position(&self, location: &InternalLocation) -> Result<EncodedPosition, PositionError> {
        let doc = self.document(location.spine_index)?;
        let node = doc
            .node_at(&location.steps)
            .ok_or_else(|| PositionError::MalformedLocation {
                location: location.to_string(),
            })?;
        let body = doc.body().ok_or(PositionError::OutsideBody)?;

        let is_text = doc.is_text(node);
        let mut element: Option<NodeId> = None;
        let mut reversed: Vec<PathStep> = Vec::new();
        let mut cur = node;
        while cur != body {
            if cur == DOCUMENT {
                return Err(PositionError::OutsideBody);
            }
            if doc.is_element(cur) && !doc.is_anchor(cur) {
                element.get_or_insert(cur);
                reversed.push(self.step_for(doc, cur)?);
            }
            cur = doc.parent(cur).ok_or(PositionError::OutsideBody)?;
        }

        let mut steps = vec![PathStep::unindexed("body")];
        steps.extend(reversed.into_iter().rev());

        let position = ReadingPosition {
            fragment: location.spine_index + 1,
            steps,
            text: is_text.then_some(TextTarget { index: None }),
            offset: if is_text { location.offset } else { None },
        };

        let element = element.unwrap_or(body);
        let element_steps = doc.steps_to(element).ok_or(PositionError::OutsideBody)?;
        Ok(EncodedPosition {
            position,
            element: InternalLocation::new(location.spine_index, element_steps),
        })
    }

    fn step_for(&self, doc: &Document, node: NodeId) -> Result<PathStep, PositionError> {
        let tag = doc.tag_name(node).ok_or(PositionError::OutsideBody)?;
        let mut owner = doc.parent(node).ok_or(PositionError::OutsideBody)?;
        while doc.is_anchor(owner) {
            owner = doc.parent(owner).ok_or(PositionError::OutsideBody)?;
        }
        let index = doc
            .effective_children(owner)
            .into_iter()
            .filter(|sibling| doc.tag_name(*sibling) == Some(tag))
            .position(|sibling| sibling == node)
            .map(|i| i + 1)
            .ok_or(PositionError::OutsideBody)?;
        Ok(PathStep::new(tag, index))
    }

    // ========================================================================
    // DECODE
    // ========================================================================

    /// Decode a reading position. Empty input means "no position".
    pub fn to_internal_location(
        &self,
        position: &str,
    ) -> Result<Option<InternalLocation>, PositionError> {
        if position.trim().is_empty() {
            return Ok(None);
        }
        let parsed: ReadingPosition = position.parse()?;
        self.resolve(&parsed).map(|(location, _)| Some(location))
    }

    /// Resolve a parsed position, reporting which strategy matched.
    pub fn resolve(
        &self,
        position: &ReadingPosition,
    ) -> Result<(InternalLocation, Resolution), PositionError> {
        let spine_index = position
            .spine_index()
            .ok_or(PositionError::FragmentOutOfRange {
                index: position.fragment,
                len: self.spine.len(),
            })?;
        let doc = self.document(spine_index)?;
        let selector = Selector::new(position, doc.namespace());

        let (element, resolution) = match resolve_strict(doc, &selector) {
            Some(element) => (element, Resolution::Strict),
            None => match resolve_lenient(doc, &selector) {
                Some(element) => {
                    debug!(selector = %selector, "Position resolved by anchor-transparent descent");
                    (element, Resolution::Lenient)
                }
                None => {
                    warn!(selector = %selector, spine_index, "Position matches no element");
                    return Err(PositionError::Unresolved {
                        selector: selector.to_string(),
                        spine_index,
                    });
                }
            },
        };

        let steps = doc.steps_to(element).ok_or(PositionError::OutsideBody)?;
        Ok((InternalLocation::new(spine_index, steps), resolution))
    }
}

fn resolve_strict(doc: &Document, selector: &Selector) -> Option<NodeId> {
    let namespace = selector.namespace.as_deref();
    descend(doc, DOCUMENT, &selector.steps, &|doc: &Document, parent: NodeId, tag: &str| {
        doc.children(parent)
            .iter()
            .copied()
            .filter(|c| doc.tag_name(*c) == Some(tag) && doc.namespace_of(*c) == namespace)
            .collect()
    })
}

fn resolve_lenient(doc: &Document, selector: &Selector) -> Option<NodeId> {
    descend(doc, DOCUMENT, &selector.steps, &|doc: &Document, parent: NodeId, tag: &str| {
        doc.effective_children(parent)
            .into_iter()
            .filter(|c| doc.tag_name(*c) == Some(tag))
            .collect()
    })
}

/// First node, in document order, reached by following `steps` from `from`.
fn descend<F>(doc: &Document, from: NodeId, steps: &[PathStep], candidates: &F) -> Option<NodeId>
where
    F: Fn(&Document, NodeId, &str) -> Vec<NodeId>,
{
    let Some((step, rest)) = steps.split_first() else {
        return Some(from);
    };
    let matches = candidates(doc, from, &step.tag);
    match step.index {
        Some(index) => {
            let next = *matches.get(index.checked_sub(1)?)?;
            descend(doc, next, rest, candidates)
        }
        None => matches
            .into_iter()
            .find_map(|next| descend(doc, next, rest, candidates)),
    }
}
