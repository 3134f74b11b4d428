//! Portable reading positions.
//!
//! A reading position is the path syntax KOReader syncs:
//!
//! ```text
//! /body/DocFragment[15]/body/div[10]/p[2]/text().184
//! ```
//!
//! `DocFragment[F]` is the 1-based spine index. Each following segment is
//! a lowercased tag name with an optional 1-based index among same-name
//! siblings. A trailing `text()` (optionally indexed) addresses the text of
//! the last element, and `.O` is a character offset into it.

use once_cell::sync::Lazy;
use pagemark_core::PositionError;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

static FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/body/(?:Doc)?Fragment\[(\d+)\]").expect("Invalid fragment regex"));

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_\-]*)(?:\[(\d+)\])?$").expect("Invalid segment regex")
});

static TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^text\(\)(?:\[(\d+)\])?$").expect("Invalid text regex"));

/// One element step of a reading position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub tag: String,
    /// 1-based index among same-name siblings; `None` selects the first
    /// match in document order.
    pub index: Option<usize>,
}

impl PathStep {
    pub fn new(tag: impl Into<String>, index: usize) -> Self {
        Self {
            tag: tag.into(),
            index: Some(index),
        }
    }

    pub fn unindexed(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            index: None,
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.tag, index),
            None => write!(f, "{}", self.tag),
        }
    }
}

/// Text node suffix of a reading position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextTarget {
    /// Index from `text()[n]`.
    pub index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadingPosition {
    /// 1-based spine index.
    pub fragment: usize,
    /// Element steps starting at the fragment body.
    pub steps: Vec<PathStep>,
    pub text: Option<TextTarget>,
    pub offset: Option<usize>,
}

impl ReadingPosition {
    /// 0-based spine index, `None` for the invalid fragment 0.
    pub fn spine_index(&self) -> Option<usize> {
        self.fragment.checked_sub(1)
    }
}

impl fmt::Display for ReadingPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/body/DocFragment[{}]", self.fragment)?;
        for step in &self.steps {
            write!(f, "/{}", step)?;
        }
        if let Some(text) = self.text {
            write!(f, "/text()")?;
            if let Some(index) = text.index {
                write!(f, "[{}]", index)?;
            }
        }
        if let Some(offset) = self.offset {
            write!(f, ".{}", offset)?;
        }
        Ok(())
    }
}

impl FromStr for ReadingPosition {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PositionError::Malformed {
            position: s.to_string(),
        };
        let input = s.trim();

        let captures = FRAGMENT_RE.captures(input).ok_or_else(malformed)?;
        let fragment: usize = captures[1].parse().map_err(|_| malformed())?;
        if fragment == 0 {
            return Err(malformed());
        }
        let mut rest = &input[captures[0].len()..];

        let mut offset = None;
        if let Some((path, digits)) = rest.rsplit_once('.') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                offset = Some(digits.parse().map_err(|_| malformed())?);
                rest = path;
            }
        }

        let mut steps = Vec::new();
        let mut text = None;
        if !rest.is_empty() {
            let body = rest.strip_prefix('/').ok_or_else(malformed)?;
            let segments: Vec<&str> = body.split('/').collect();
            let last = segments.len() - 1;
            for (i, segment) in segments.into_iter().enumerate() {
                if let Some(caps) = TEXT_RE.captures(segment) {
                    if i != last {
                        return Err(malformed());
                    }
                    let index = match caps.get(1) {
                        Some(m) => Some(m.as_str().parse().map_err(|_| malformed())?),
                        None => None,
                    };
                    text = Some(TextTarget { index });
                    continue;
                }
                let caps = SEGMENT_RE.captures(segment).ok_or_else(malformed)?;
                let index = match caps.get(2) {
                    Some(m) => {
                        let index: usize = m.as_str().parse().map_err(|_| malformed())?;
                        if index == 0 {
                            return Err(malformed());
                        }
                        Some(index)
                    }
                    None => None,
                };
                steps.push(PathStep {
                    tag: caps[1].to_ascii_lowercase(),
                    index,
                });
            }
        }

        Ok(Self {
            fragment,
            steps,
            text,
            offset,
        })
    }
}

/// A reading position rewritten as a traversal from the document root:
/// the fragment prefix becomes the `html` root step, and each step is
/// qualified with the document namespace when it declares one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub namespace: Option<String>,
    pub steps: Vec<PathStep>,
}

impl Selector {
    pub fn new(position: &ReadingPosition, namespace: Option<&str>) -> Self {
        let mut steps = Vec::with_capacity(position.steps.len() + 1);
        steps.push(PathStep::unindexed("html"));
        steps.extend(position.steps.iter().cloned());
        Self {
            namespace: namespace.map(str::to_string),
            steps,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            match self.namespace {
                Some(_) => write!(f, "/ns:{}", step)?,
                None => write!(f, "/{}", step)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_position() {
        let pos: ReadingPosition = "/body/DocFragment[15]/body/div[10]/text().184".parse().unwrap();
        assert_eq!(pos.fragment, 15);
        assert_eq!(pos.spine_index(), Some(14));
        assert_eq!(
            pos.steps,
            vec![PathStep::unindexed("body"), PathStep::new("div", 10)]
        );
        assert_eq!(pos.text, Some(TextTarget { index: None }));
        assert_eq!(pos.offset, Some(184));
    }

    #[test]
    fn test_parse_short_fragment_spelling() {
        let pos: ReadingPosition = "/body/Fragment[2]/body/p[3]".parse().unwrap();
        assert_eq!(pos.fragment, 2);
        assert_eq!(pos.text, None);
        assert_eq!(pos.offset, None);
        assert_eq!(pos.to_string(), "/body/DocFragment[2]/body/p[3]");
    }

    #[test]
    fn test_parse_indexed_text() {
        let pos: ReadingPosition = "/body/DocFragment[1]/body/p/text()[2].0".parse().unwrap();
        assert_eq!(pos.steps[1], PathStep::unindexed("p"));
        assert_eq!(pos.text, Some(TextTarget { index: Some(2) }));
        assert_eq!(pos.offset, Some(0));
    }

    #[test]
    fn test_display_round_trip() {
        for input in [
            "/body/DocFragment[3]/body/div[1]/p[4]/text().12",
            "/body/DocFragment[1]/body",
            "/body/DocFragment[7]/body/section[2]/h2[1]",
        ] {
            let pos: ReadingPosition = input.parse().unwrap();
            assert_eq!(pos.to_string(), input);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "/html/body/p[1]",
            "/body/DocFragment[0]/body",
            "/body/DocFragment[x]/body",
            "/body/DocFragment[1]/body//p[1]",
            "/body/DocFragment[1]/body/text()/p[1]",
            "/body/DocFragment[1]/body/p[0]",
            "/body/DocFragment[1]/body/@class",
        ] {
            assert!(
                matches!(bad.parse::<ReadingPosition>(), Err(PositionError::Malformed { .. })),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_selector_display() {
        let pos: ReadingPosition = "/body/DocFragment[15]/body/div[10]/text().184".parse().unwrap();
        let plain = Selector::new(&pos, None);
        assert_eq!(plain.to_string(), "/html/body/div[10]");
        let namespaced = Selector::new(&pos, Some("http://www.w3.org/1999/xhtml"));
        assert_eq!(namespaced.to_string(), "/ns:html/ns:body/ns:div[10]");
    }
}
