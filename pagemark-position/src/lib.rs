//! Pagemark Position - Reading Position Codec
//!
//! Translates between locations inside the rendered book and the portable
//! reading positions exchanged with sync servers and e-reader devices.
//!
//! - [`dom`]: arena DOM of a spine document, with word indexing
//! - [`spine`]: ordered spine documents and table of contents
//! - [`location`]: rendition-internal locations
//! - [`path`]: reading position syntax
//! - [`codec`]: the two conversions between them

pub mod codec;
pub mod dom;
pub mod location;
pub mod path;
pub mod spine;

pub use codec::{EncodedPosition, PositionCodec, Resolution};
pub use dom::{Document, Node, NodeId, NodeKind, DOCUMENT};
pub use location::InternalLocation;
pub use path::{PathStep, ReadingPosition, Selector, TextTarget};
pub use spine::{Spine, SpineItem, TocEntry};
