//! The rendering engine, seen from the reader.
//!
//! Layout and painting belong to the engine. The reader only needs to
//! display a location, turn pages, ask what is visible, and receive typed
//! events.

use async_trait::async_trait;
use pagemark_core::PagemarkResult;
use pagemark_position::{InternalLocation, Spine};
use serde::{Deserialize, Serialize};

/// Locations of the first and last content visible on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: InternalLocation,
    pub end: InternalLocation,
}

/// Horizontal geometry of the section being displayed, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionLayout {
    pub scroll_offset: f64,
    pub page_width: f64,
    pub total_width: f64,
}

impl SectionLayout {
    /// 1-based page within the section.
    pub fn current_page(&self) -> u32 {
        if self.page_width <= 0.0 {
            return 1;
        }
        (self.scroll_offset / self.page_width).round().max(0.0) as u32 + 1
    }

    pub fn total_pages(&self) -> u32 {
        if self.page_width <= 0.0 {
            return 1;
        }
        (self.total_width / self.page_width).round().max(1.0) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Left,
    Right,
    Up,
    Down,
}

/// Where a tap landed on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TapZone {
    Top,
    Bottom,
    Left,
    Right,
    Center,
}

/// Events emitted by the rendering engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RenditionEvent {
    /// A section finished rendering and is on screen.
    SectionRendered { spine_index: usize },
    /// The visible range moved without a reader-initiated turn.
    LocationChanged(VisibleRange),
    Swipe(SwipeDirection),
    Tap(TapZone),
    /// A key released, named as in `KeyboardEvent.key`.
    Key(String),
}

#[async_trait]
pub trait Rendition: Send + Sync {
    /// The spine being rendered.
    fn spine(&self) -> &Spine;

    /// Display `target`, or the start of the book when `None`.
    async fn display(&self, target: Option<&InternalLocation>) -> PagemarkResult<()>;

    /// Advance one page. Returns false at the end of the book.
    async fn next(&self) -> PagemarkResult<bool>;

    /// Go back one page. Returns false at the start of the book.
    async fn prev(&self) -> PagemarkResult<bool>;

    fn current_location(&self) -> Option<VisibleRange>;

    /// Plain text of the current page.
    async fn visible_text(&self) -> PagemarkResult<String>;

    /// Geometry of the visible section, if one is displayed.
    fn section_layout(&self) -> Option<SectionLayout>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_layout_pages() {
        let layout = SectionLayout {
            scroll_offset: 2000.0,
            page_width: 1000.0,
            total_width: 5000.0,
        };
        assert_eq!(layout.current_page(), 3);
        assert_eq!(layout.total_pages(), 5);
    }

    #[test]
    fn test_section_layout_degenerate_width() {
        let layout = SectionLayout {
            scroll_offset: 0.0,
            page_width: 0.0,
            total_width: 0.0,
        };
        assert_eq!(layout.current_page(), 1);
        assert_eq!(layout.total_pages(), 1);
    }
}
