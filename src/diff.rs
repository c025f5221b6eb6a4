//! Diff marker model
//!
//! A closed set of change tags recorded against the edited document,
//! stamped with the revision they were computed for.
//!
//! # Design
//!
//! Elements carry their marks in the `Document::diff_marks` side table
//! (serialized as `data-parsoid-diff = {"id":N,"diff":[...]}`). Text and
//! comment nodes cannot carry side data in the HTML form, so their marks
//! are sentinel elements inserted immediately before them:
//!
//! ```text
//! <meta typeof="mw:DiffMarker/deleted" data-is-block="true">
//! ```
//!
//! A record stamped with a different revision is stale and reads as
//! absent; writing to it resets it.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::hash;
use crate::node::{Document, Element, NodeId};

/// Prefix of sentinel `typeof` values.
pub const DIFF_MARKER_TYPE_PREFIX: &str = "mw:DiffMarker/";

// =============================================================================
// RevisionId
// =============================================================================

/// Identifier of the revision a set of marks belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(u64);

impl RevisionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Revision derived from the original source text
    pub fn of_source(source: &str) -> Self {
        Self(hash::source_hash(source))
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

// =============================================================================
// DiffMark
// =============================================================================

/// Change tag attached to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffMark {
    Deleted,
    Inserted,
    Moved,
    ChildrenChanged,
    SubtreeChanged,
    ModifiedWrapper,
}

impl DiffMark {
    pub const ALL: [DiffMark; 6] = [
        Self::Deleted,
        Self::Inserted,
        Self::Moved,
        Self::ChildrenChanged,
        Self::SubtreeChanged,
        Self::ModifiedWrapper,
    ];

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Inserted => "inserted",
            Self::Moved => "moved",
            Self::ChildrenChanged => "children-changed",
            Self::SubtreeChanged => "subtree-changed",
            Self::ModifiedWrapper => "modified-wrapper",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }

    /// Sentinel `typeof` value for this mark
    pub fn marker_type(self) -> String {
        format!("{DIFF_MARKER_TYPE_PREFIX}{}", self.as_str())
    }
}

impl fmt::Display for DiffMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DiffRecord
// =============================================================================

/// Marks recorded on an element for one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub id: RevisionId,
    #[serde(rename = "diff")]
    pub marks: SmallVec<[DiffMark; 4]>,
}

impl DiffRecord {
    pub fn new(id: RevisionId, mark: DiffMark) -> Self {
        let mut marks = SmallVec::new();
        marks.push(mark);
        Self { id, marks }
    }

    #[inline]
    pub fn has(&self, mark: DiffMark) -> bool {
        self.marks.contains(&mark)
    }
}

// =============================================================================
// Document API
// =============================================================================

impl Document {
    /// Current-revision record of an element
    pub fn diff_mark(&self, id: NodeId) -> Option<&DiffRecord> {
        if !self.is_element(id) {
            return None;
        }
        self.diff_marks.get(&id).filter(|r| r.id == self.revision)
    }

    /// Sentinel element, optionally of a specific mark
    pub fn is_diff_marker(&self, id: NodeId, mark: Option<DiffMark>) -> bool {
        let Some(elem) = self.element(id) else {
            return false;
        };
        if !elem.is("meta") {
            return false;
        }
        match mark {
            Some(m) => elem.has_type_of(&m.marker_type()),
            None => elem.type_of_with_prefix(DIFF_MARKER_TYPE_PREFIX).is_some(),
        }
    }

    /// Any current mark on the element, or the node is itself a sentinel
    pub fn has_diff_markers(&self, id: NodeId) -> bool {
        self.diff_mark(id).is_some() || self.is_diff_marker(id, None)
    }

    /// Deletions (and insertions of non-elements) live on the preceding sentinel
    pub fn has_diff_mark(&self, id: NodeId, mark: DiffMark) -> bool {
        if mark == DiffMark::Deleted || (mark == DiffMark::Inserted && !self.is_element(id)) {
            self.prev_sibling(id)
                .is_some_and(|prev| self.is_diff_marker(prev, Some(mark)))
        } else {
            self.diff_mark(id).is_some_and(|r| r.has(mark))
        }
    }

    pub fn has_inserted_diff_mark(&self, id: NodeId) -> bool {
        self.has_diff_mark(id, DiffMark::Inserted)
    }

    /// `id` is a deletion sentinel
    pub fn maybe_deleted_node(&self, id: Option<NodeId>) -> bool {
        id.is_some_and(|n| self.is_diff_marker(n, Some(DiffMark::Deleted)))
    }

    /// `id` is a sentinel for deleted block content
    pub fn is_deleted_block_node(&self, id: Option<NodeId>) -> bool {
        self.maybe_deleted_node(id) && id.is_some_and(|n| self.has_attr(n, "data-is-block"))
    }

    pub fn direct_children_changed(&self, id: NodeId) -> bool {
        self.has_diff_mark(id, DiffMark::ChildrenChanged)
    }

    /// The element itself is unchanged; only content below it differs
    pub fn only_subtree_changed(&self, id: NodeId) -> bool {
        self.diff_mark(id).is_some_and(|r| {
            r.marks
                .iter()
                .all(|m| matches!(m, DiffMark::SubtreeChanged | DiffMark::ChildrenChanged))
        })
    }

    /// Record `mark` on an element, resetting a stale record
    pub fn set_diff_mark(&mut self, id: NodeId, mark: DiffMark) {
        if !self.is_element(id) {
            return;
        }
        let revision = self.revision;
        match self.diff_marks.get_mut(&id) {
            Some(rec) if rec.id == revision => {
                if !rec.has(mark) {
                    rec.marks.push(mark);
                }
            }
            _ => {
                self.diff_marks.insert(id, DiffRecord::new(revision, mark));
            }
        }
    }

    /// Record `mark`, using a sentinel where the node cannot hold it
    pub fn add_diff_mark(&mut self, id: NodeId, mark: DiffMark) -> Option<NodeId> {
        if matches!(mark, DiffMark::Deleted | DiffMark::Moved) {
            return self.prepend_typed_meta(id, &mark.marker_type());
        }
        if !self.is_element(id) {
            if mark != DiffMark::Inserted {
                log::error!(
                    target: "selser::domdiff",
                    "BUG! CHANGE-marker for {} node is: {mark}",
                    self.name(id)
                );
            }
            return self.prepend_typed_meta(id, &mark.marker_type());
        }
        self.set_diff_mark(id, mark);
        None
    }

    /// Insert `<meta typeof=type_of>` before `id`
    pub fn prepend_typed_meta(&mut self, id: NodeId, type_of: &str) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let meta = self.create_element_with(Element::new("meta").attr("typeof", type_of));
        self.insert_before(parent, meta, Some(id));
        Some(meta)
    }

    /// Append a sentinel as the last child of `parent`
    pub(crate) fn append_typed_meta(&mut self, parent: NodeId, type_of: &str) -> NodeId {
        let meta = self.create_element_with(Element::new("meta").attr("typeof", type_of));
        self.append_child(parent, meta);
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_p() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        doc.set_revision(RevisionId::new(1));
        let p = doc.create_element("p");
        let t = doc.create_text("x");
        doc.append_child(doc.body(), p);
        doc.append_child(p, t);
        (doc, p, t)
    }

    #[test]
    fn test_wire_names() {
        for mark in DiffMark::ALL {
            assert_eq!(DiffMark::from_wire(mark.as_str()), Some(mark));
        }
        let rec = DiffRecord::new(RevisionId::new(5), DiffMark::ChildrenChanged);
        assert_eq!(
            serde_json::to_string(&rec).unwrap(),
            r#"{"id":5,"diff":["children-changed"]}"#
        );
    }

    #[test]
    fn test_set_diff_mark_and_staleness() {
        let (mut doc, p, _) = doc_with_p();
        doc.set_diff_mark(p, DiffMark::SubtreeChanged);
        doc.set_diff_mark(p, DiffMark::SubtreeChanged);
        assert_eq!(doc.diff_mark(p).map(|r| r.marks.len()), Some(1));
        assert!(doc.only_subtree_changed(p));

        doc.set_revision(RevisionId::new(2));
        assert!(doc.diff_mark(p).is_none());
        assert!(!doc.has_diff_markers(p));

        doc.set_diff_mark(p, DiffMark::ModifiedWrapper);
        assert_eq!(doc.diff_mark(p).map(|r| r.id), Some(RevisionId::new(2)));
        assert!(!doc.only_subtree_changed(p));
    }

    #[test]
    fn test_text_marks_use_sentinels() {
        let (mut doc, p, t) = doc_with_p();
        let meta = doc.add_diff_mark(t, DiffMark::Inserted);
        assert!(meta.is_some());
        assert_eq!(doc.first_child(p), meta);
        assert!(doc.has_inserted_diff_mark(t));
        assert!(doc.has_diff_markers(meta.unwrap()));

        let del = doc.add_diff_mark(p, DiffMark::Deleted).unwrap();
        assert!(doc.maybe_deleted_node(Some(del)));
        assert!(!doc.is_deleted_block_node(Some(del)));
        doc.set_attr(del, "data-is-block", "true");
        assert!(doc.is_deleted_block_node(Some(del)));
        assert!(doc.has_diff_mark(p, DiffMark::Deleted));
    }

    #[test]
    fn test_element_marks_use_side_table() {
        let (mut doc, p, _) = doc_with_p();
        assert_eq!(doc.add_diff_mark(p, DiffMark::ChildrenChanged), None);
        assert!(doc.direct_children_changed(p));
        assert!(doc.has_diff_markers(p));
    }
}
