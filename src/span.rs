//! Source ranges (DSR) into the original wikitext.
//!
//! # Design
//!
//! A `SourceRange` records where a node's markup lived in the original
//! source: `[start, end)` plus the width of the opening and closing tag
//! syntax. Every component is optional because the forward pipeline cannot
//! always compute it. On the wire it is a JSON array
//! `[start, end, openWidth, closeWidth]` where any slot may be `null`;
//! negative numbers are treated as unknown.

use std::ops::Range;

use serde::de::{Deserializer, Error as _};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Byte offsets of a node's markup in the original source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub open_width: Option<usize>,
    pub close_width: Option<usize>,
}

impl SourceRange {
    /// Create a fully specified range.
    pub const fn new(start: usize, end: usize, open_width: usize, close_width: usize) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            open_width: Some(open_width),
            close_width: Some(close_width),
        }
    }

    /// Create a range with unknown tag widths.
    pub const fn bare(start: usize, end: usize) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            open_width: None,
            close_width: None,
        }
    }

    /// Both ends are present and ordered.
    pub fn is_valid(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s <= e)
    }

    /// Both tag widths are present.
    pub fn has_valid_tag_widths(&self) -> bool {
        self.open_width.is_some() && self.close_width.is_some()
    }

    /// Valid range with known tag widths.
    pub fn is_fully_valid(&self) -> bool {
        self.is_valid() && self.has_valid_tag_widths()
    }

    /// Offset just past the opening tag syntax.
    pub fn inner_start(&self) -> Option<usize> {
        Some(self.start? + self.open_width.unwrap_or(0))
    }

    /// Offset of the closing tag syntax.
    pub fn inner_end(&self) -> Option<usize> {
        Some(self.end?.saturating_sub(self.close_width.unwrap_or(0)))
    }

    /// `[start, end)` when valid.
    pub fn range(&self) -> Option<Range<usize>> {
        self.is_valid().then(|| self.start.unwrap_or(0)..self.end.unwrap_or(0))
    }

    /// `[inner_start, inner_end)` when valid.
    pub fn inner_range(&self) -> Option<Range<usize>> {
        if !self.is_valid() {
            return None;
        }
        Some(self.inner_start()?..self.inner_end()?)
    }

    /// Source length covered by the range.
    pub fn len(&self) -> usize {
        self.range().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for SourceRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(4))?;
        for slot in [self.start, self.end, self.open_width, self.close_width] {
            seq.serialize_element(&slot)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SourceRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<Option<i64>> = Vec::deserialize(deserializer)?;
        if raw.len() > 4 {
            return Err(D::Error::invalid_length(raw.len(), &"at most 4 offsets"));
        }
        let slot = |i: usize| {
            raw.get(i)
                .copied()
                .flatten()
                .and_then(|v| usize::try_from(v).ok())
        };
        Ok(Self {
            start: slot(0),
            end: slot(1),
            open_width: slot(2),
            close_width: slot(3),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(SourceRange::new(0, 5, 1, 1).is_valid());
        assert!(SourceRange::bare(3, 3).is_valid());
        assert!(!SourceRange::bare(5, 3).is_valid());
        assert!(!SourceRange::default().is_valid());
        assert!(!SourceRange::bare(0, 4).has_valid_tag_widths());
        assert!(SourceRange::new(0, 4, 0, 0).is_fully_valid());
    }

    #[test]
    fn test_inner_bounds() {
        let dsr = SourceRange::new(10, 20, 2, 3);
        assert_eq!(dsr.inner_start(), Some(12));
        assert_eq!(dsr.inner_end(), Some(17));
        assert_eq!(dsr.inner_range(), Some(12..17));
        assert_eq!(dsr.len(), 10);

        let open_only = SourceRange::bare(4, 9);
        assert_eq!(open_only.inner_range(), Some(4..9));
    }

    #[test]
    fn test_json_with_nulls_and_negatives() {
        let dsr: SourceRange = serde_json::from_str("[0,11,2,null]").unwrap();
        assert_eq!(dsr.close_width, None);
        assert_eq!(dsr.open_width, Some(2));

        let dsr: SourceRange = serde_json::from_str("[-1,4]").unwrap();
        assert_eq!(dsr.start, None);
        assert!(!dsr.is_valid());

        let json = serde_json::to_string(&SourceRange::new(1, 2, 0, 0)).unwrap();
        assert_eq!(json, "[1,2,0,0]");
        assert!(serde_json::from_str::<SourceRange>("[1,2,3,4,5]").is_err());
    }
}
