//! Arena document model.
//!
//! Nodes live in a flat arena owned by `Document` and are addressed by
//! `NodeId`. Parent/child/sibling structure is a set of links on each slot,
//! so the differ and normalizer can splice subtrees without fighting the
//! borrow checker. Per-node metadata (source ranges, parse hints, template
//! metadata, diff marks) is kept in side tables keyed by `NodeId`.
//!
//! # Key Features
//!
//! - O(1) sibling navigation in both directions
//! - Detached nodes stay addressable (removal never invalidates ids)
//! - Side tables instead of fields hung off the node payload

mod data;
mod document;
mod element;
pub mod predicates;

pub use data::{DataParsoid, ParamInfo, Stx};
pub use document::{Children, Document};
pub use element::Element;

use std::fmt;

// =============================================================================
// NodeId
// =============================================================================

/// Index of a node in its document's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// NodeKind
// =============================================================================

/// Payload of an arena node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(Element),
    Text(String),
    /// DOM-escaped comment data (see `decode_comment`)
    Comment(String),
}

impl NodeKind {
    crate::impl_enum_accessors!(element: Element, text: String, comment: String);
}

/// Arena slot: payload plus structural links
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
}

impl Slot {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev: None,
            next: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_accessors() {
        let kind = NodeKind::Text("hi".into());
        assert!(kind.is_text());
        assert!(!kind.is_element());
        assert_eq!(kind.as_text().map(String::as_str), Some("hi"));

        let kind = NodeKind::Element(Element::new("p"));
        assert_eq!(kind.as_element().map(|e| e.tag.as_str()), Some("p"));
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::from_index(12).to_string(), "#12");
        assert_eq!(NodeId::from_index(3).index(), 3);
    }
}
