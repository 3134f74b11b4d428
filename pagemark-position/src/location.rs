//! Rendition-internal locations.
//!
//! An [`InternalLocation`] points at a node of one spine document. Its
//! textual form follows EPUB CFI conventions,
//! `epubcfi(/6/{2(i+1)}!/4/2/1:10)`, but it is never persisted or synced;
//! only the rendition and the position codec understand it.

use pagemark_core::PositionError;
use std::fmt;
use std::str::FromStr;

/// Step of the package spine element in the CFI base path.
const SPINE_STEP: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternalLocation {
    /// 0-based index into the spine.
    pub spine_index: usize,
    /// Steps from the document element to the node.
    pub steps: Vec<usize>,
    /// Character offset within a text node.
    pub offset: Option<usize>,
}

impl InternalLocation {
    pub fn new(spine_index: usize, steps: Vec<usize>) -> Self {
        Self {
            spine_index,
            steps,
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Start of a spine document.
    pub fn document_start(spine_index: usize) -> Self {
        Self::new(spine_index, Vec::new())
    }
}

impl fmt::Display for InternalLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epubcfi(/{}/{}!", SPINE_STEP, 2 * (self.spine_index + 1))?;
        for step in &self.steps {
            write!(f, "/{}", step)?;
        }
        if let Some(offset) = self.offset {
            write!(f, ":{}", offset)?;
        }
        write!(f, ")")
    }
}

impl FromStr for InternalLocation {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PositionError::MalformedLocation {
            location: s.to_string(),
        };

        let inner = s
            .trim()
            .strip_prefix("epubcfi(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(malformed)?;
        let (base, path) = inner.split_once('!').ok_or_else(malformed)?;

        let base_steps = parse_steps(base).ok_or_else(malformed)?;
        let spine_step = match base_steps.as_slice() {
            [SPINE_STEP, item] if *item >= 2 && item % 2 == 0 => *item,
            _ => return Err(malformed()),
        };

        let (path, offset) = match path.split_once(':') {
            Some((path, offset)) => (path, Some(offset.parse().map_err(|_| malformed())?)),
            None => (path, None),
        };
        let steps = if path.is_empty() {
            Vec::new()
        } else {
            parse_steps(path).ok_or_else(malformed)?
        };
        if steps.contains(&0) {
            return Err(malformed());
        }

        Ok(Self {
            spine_index: spine_step / 2 - 1,
            steps,
            offset,
        })
    }
}

fn parse_steps(path: &str) -> Option<Vec<usize>> {
    let rest = path.strip_prefix('/')?;
    rest.split('/').map(|step| step.parse().ok()).collect()
}
