//! Document type: arena, tree edits and side tables
//!
//! The root container for a parsed page, with structural edit and query
//! APIs used by the differ, normalizer and serializer.

use std::sync::LazyLock;

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use smallvec::SmallVec;

use crate::attr::AttrsExt;
use crate::diff::{DiffRecord, RevisionId};

use super::{DataParsoid, Element, NodeId, NodeKind, Slot};

static EMPTY_DATA_PARSOID: LazyLock<DataParsoid> = LazyLock::new(DataParsoid::default);

// =============================================================================
// Document
// =============================================================================

/// Arena-backed document rooted at a `body` element
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) slots: Vec<Slot>,
    body: NodeId,
    pub(crate) data_parsoid: FxHashMap<NodeId, DataParsoid>,
    pub(crate) data_mw: FxHashMap<NodeId, Value>,
    pub(crate) diff_marks: FxHashMap<NodeId, DiffRecord>,
    pub(crate) new_nodes: FxHashSet<NodeId>,
    pub(crate) revision: RevisionId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a `body` root
    pub fn new() -> Self {
        let body = Slot::new(NodeKind::Element(Element::new("body")));
        Self {
            slots: vec![body],
            body: NodeId::from_index(0),
            data_parsoid: FxHashMap::default(),
            data_mw: FxHashMap::default(),
            diff_marks: FxHashMap::default(),
            new_nodes: FxHashSet::default(),
            revision: RevisionId::default(),
        }
    }

    #[inline]
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Revision diff marks are currently stamped with
    #[inline]
    pub fn revision(&self) -> RevisionId {
        self.revision
    }

    pub fn set_revision(&mut self, revision: RevisionId) {
        self.revision = revision;
    }

    /// Number of arena slots (attached and detached)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[self.body.index()].first_child.is_none()
    }

    #[inline]
    fn slot(&self, id: NodeId) -> &Slot {
        &self.slots[id.index()]
    }

    #[inline]
    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        &mut self.slots[id.index()]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Node creation
    // ─────────────────────────────────────────────────────────────────────────

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_index(self.slots.len());
        self.slots.push(Slot::new(kind));
        id
    }

    /// Create a detached element, marked as newly authored
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = self.push(NodeKind::Element(Element::new(tag)));
        self.new_nodes.insert(id);
        id
    }

    /// Create a detached element with attributes, marked as newly authored
    pub fn create_element_with(&mut self, elem: Element) -> NodeId {
        let id = self.push(NodeKind::Element(elem));
        self.new_nodes.insert(id);
        id
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    /// Create a detached comment node (DOM-escaped data)
    pub fn create_comment(&mut self, data: impl Into<String>) -> NodeId {
        self.push(NodeKind::Comment(data.into()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payload access
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.slot(id).kind
    }

    #[inline]
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.slot(id).kind.as_element()
    }

    #[inline]
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        self.slot_mut(id).kind.as_element_mut()
    }

    #[inline]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.slot(id).kind.is_element()
    }

    #[inline]
    pub fn is_text(&self, id: NodeId) -> bool {
        self.slot(id).kind.is_text()
    }

    #[inline]
    pub fn is_comment(&self, id: NodeId) -> bool {
        self.slot(id).kind.is_comment()
    }

    /// Tag name for elements
    #[inline]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    /// DOM node name: tag, `#text` or `#comment`
    pub fn name(&self, id: NodeId) -> &str {
        match &self.slot(id).kind {
            NodeKind::Element(e) => e.tag.as_str(),
            NodeKind::Text(_) => "#text",
            NodeKind::Comment(_) => "#comment",
        }
    }

    #[inline]
    pub fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id) == Some(tag)
    }

    /// Text or comment data
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.slot(id).kind {
            NodeKind::Text(s) | NodeKind::Comment(s) => Some(s),
            NodeKind::Element(_) => None,
        }
    }

    /// Replace text or comment data; no-op on elements
    pub fn set_text(&mut self, id: NodeId, value: impl Into<String>) {
        if let NodeKind::Text(s) | NodeKind::Comment(s) = &mut self.slot_mut(id).kind {
            *s = value.into();
        }
    }

    /// Attributes of an element (empty for other nodes)
    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        self.element(id).map_or(&[], |e| e.attrs.as_slice())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attrs.get_attr(name)
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(e) = self.element_mut(id) {
            e.attrs.set_attr(name, value);
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id)?.attrs.remove_attr(name)
    }

    /// Whether the element's `typeof` contains `word`
    pub fn has_type_of(&self, id: NodeId, word: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_type_of(word))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Side tables
    // ─────────────────────────────────────────────────────────────────────────

    /// Parse metadata, or an empty record
    pub fn dp(&self, id: NodeId) -> &DataParsoid {
        self.data_parsoid.get(&id).unwrap_or(&EMPTY_DATA_PARSOID)
    }

    pub fn dp_mut(&mut self, id: NodeId) -> &mut DataParsoid {
        self.data_parsoid.entry(id).or_default()
    }

    pub fn set_dp(&mut self, id: NodeId, dp: DataParsoid) {
        self.data_parsoid.insert(id, dp);
    }

    pub fn data_mw(&self, id: NodeId) -> Option<&Value> {
        self.data_mw.get(&id)
    }

    pub fn set_data_mw(&mut self, id: NodeId, value: Value) {
        self.data_mw.insert(id, value);
    }

    /// Element had no usable parse metadata (or was created here)
    #[inline]
    pub fn is_new(&self, id: NodeId) -> bool {
        self.new_nodes.contains(&id)
    }

    pub fn mark_new(&mut self, id: NodeId, new: bool) {
        if new {
            self.new_nodes.insert(id);
        } else {
            self.new_nodes.remove(&id);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    #[inline]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).first_child
    }

    #[inline]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).last_child
    }

    #[inline]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).next
    }

    #[inline]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).prev
    }

    /// Iterate over direct children
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.first_child(id),
        }
    }

    /// Snapshot of child ids, safe to hold across edits
    pub fn child_ids(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        self.children(id).collect()
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.first_child(id).is_some()
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Pre-order walk of `root`'s descendants (excluding `root`)
    pub fn descendants(&self, root: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = self.first_child(root);
        std::iter::from_fn(move || {
            let cur = next?;
            next = self.first_child(cur).or_else(|| {
                let mut n = cur;
                loop {
                    if n == root {
                        return None;
                    }
                    if let Some(sib) = self.next_sibling(n) {
                        return Some(sib);
                    }
                    n = self.parent(n)?;
                    if n == root {
                        return None;
                    }
                }
            });
            Some(cur)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tree edits
    // ─────────────────────────────────────────────────────────────────────────

    /// Detach `id` from its parent. The node and its subtree stay in the arena.
    pub fn remove(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let s = self.slot(id);
            (s.parent, s.prev, s.next)
        };
        if let Some(p) = prev {
            self.slot_mut(p).next = next;
        } else if let Some(par) = parent {
            self.slot_mut(par).first_child = next;
        }
        if let Some(n) = next {
            self.slot_mut(n).prev = prev;
        } else if let Some(par) = parent {
            self.slot_mut(par).last_child = prev;
        }
        let s = self.slot_mut(id);
        s.parent = None;
        s.prev = None;
        s.next = None;
    }

    /// Insert `child` into `parent` before `reference` (append when `None`)
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if reference == Some(child) {
            return;
        }
        self.remove(child);
        let prev = match reference {
            Some(r) => self.slot(r).prev,
            None => self.slot(parent).last_child,
        };
        {
            let s = self.slot_mut(child);
            s.parent = Some(parent);
            s.prev = prev;
            s.next = reference;
        }
        match prev {
            Some(p) => self.slot_mut(p).next = Some(child),
            None => self.slot_mut(parent).first_child = Some(child),
        }
        match reference {
            Some(r) => self.slot_mut(r).prev = Some(child),
            None => self.slot_mut(parent).last_child = Some(child),
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Put `new` where `old` is and detach `old`
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) {
        if let Some(parent) = self.parent(old) {
            self.insert_before(parent, new, Some(old));
            self.remove(old);
        }
    }

    /// Move all children of `from` into `to`, before `reference`
    pub fn migrate_children(&mut self, from: NodeId, to: NodeId, reference: Option<NodeId>) {
        for child in self.child_ids(from) {
            self.insert_before(to, child, reference);
        }
    }

    /// Replace `id` with its children
    pub fn unwrap(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            self.migrate_children(id, parent, Some(id));
            self.remove(id);
        }
    }

    /// Merge adjacent text nodes and drop empty ones, recursively
    pub fn normalize_text(&mut self, id: NodeId) {
        let mut child = self.first_child(id);
        while let Some(c) = child {
            let next = self.next_sibling(c);
            if self.is_text(c) {
                if self.text(c).is_some_and(str::is_empty) {
                    self.remove(c);
                    child = next;
                    continue;
                }
                if let Some(n) = next
                    && self.is_text(n)
                {
                    let tail = self.text(n).unwrap_or_default().to_string();
                    if let NodeKind::Text(s) = &mut self.slot_mut(c).kind {
                        s.push_str(&tail);
                    }
                    self.remove(n);
                    // Re-examine `c` against its new next sibling
                    continue;
                }
            } else if self.is_element(c) {
                self.normalize_text(c);
            }
            child = next;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Content queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        match &self.slot(id).kind {
            NodeKind::Text(s) | NodeKind::Comment(s) => s.clone(),
            NodeKind::Element(_) => self
                .descendants(id)
                .filter_map(|n| self.slot(n).kind.as_text().map(String::as_str))
                .collect(),
        }
    }

    /// First attached element whose `id` attribute equals `value`
    pub fn get_element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.body)
            .find(|&n| self.attr(n, "id") == Some(value))
    }
}

// =============================================================================
// Children - sibling-link iterator
// =============================================================================

/// Iterator over the direct children of a node
pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        self.next = self.doc.next_sibling(cur);
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let a = doc.create_text("a");
        let b = doc.create_element("b");
        doc.append_child(doc.body(), p);
        doc.append_child(p, a);
        doc.append_child(p, b);
        (doc, p, a, b)
    }

    #[test]
    fn test_append_and_navigate() {
        let (doc, p, a, b) = sample();
        assert_eq!(doc.parent(p), Some(doc.body()));
        assert_eq!(doc.first_child(p), Some(a));
        assert_eq!(doc.last_child(p), Some(b));
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.prev_sibling(b), Some(a));
        assert_eq!(doc.children(p).count(), 2);
        assert_eq!(doc.name(a), "#text");
        assert_eq!(doc.name(b), "b");
        assert!(doc.is_new(p));
        assert!(!doc.is_new(doc.body()));
    }

    #[test]
    fn test_insert_before_and_remove() {
        let (mut doc, p, a, b) = sample();
        let c = doc.create_comment("x");
        doc.insert_before(p, c, Some(b));
        assert_eq!(doc.child_ids(p).as_slice(), &[a, c, b]);

        doc.remove(a);
        assert_eq!(doc.first_child(p), Some(c));
        assert_eq!(doc.parent(a), None);

        // Moving an attached node detaches it first
        doc.insert_before(p, b, Some(c));
        assert_eq!(doc.child_ids(p).as_slice(), &[b, c]);
    }

    #[test]
    fn test_unwrap_and_migrate() {
        let (mut doc, p, a, b) = sample();
        let inner = doc.create_text("in");
        doc.append_child(b, inner);
        doc.unwrap(b);
        assert_eq!(doc.child_ids(p).as_slice(), &[a, inner]);

        let div = doc.create_element("div");
        doc.append_child(doc.body(), div);
        doc.migrate_children(p, div, None);
        assert!(!doc.has_children(p));
        assert_eq!(doc.child_ids(div).as_slice(), &[a, inner]);
    }

    #[test]
    fn test_normalize_text_merges() {
        let (mut doc, p, a, b) = sample();
        doc.remove(b);
        let t2 = doc.create_text("b");
        let empty = doc.create_text("");
        let t3 = doc.create_text("c");
        doc.append_child(p, t2);
        doc.append_child(p, empty);
        doc.append_child(p, t3);
        doc.normalize_text(p);
        assert_eq!(doc.child_ids(p).as_slice(), &[a]);
        assert_eq!(doc.text(a), Some("abc"));
    }

    #[test]
    fn test_text_content_and_lookup() {
        let (mut doc, p, _a, b) = sample();
        let t = doc.create_text("bold");
        doc.append_child(b, t);
        doc.set_attr(b, "id", "x1");
        assert_eq!(doc.text_content(p), "abold");
        assert_eq!(doc.get_element_by_id("x1"), Some(b));
        assert_eq!(doc.get_element_by_id("nope"), None);
        assert!(doc.contains(p, t));
        assert!(!doc.contains(b, p));
    }

    #[test]
    fn test_descendants_preorder() {
        let (mut doc, p, a, b) = sample();
        let t = doc.create_text("t");
        doc.append_child(b, t);
        let all: Vec<_> = doc.descendants(doc.body()).collect();
        assert_eq!(all, vec![p, a, b, t]);
        let under_b: Vec<_> = doc.descendants(b).collect();
        assert_eq!(under_b, vec![t]);
    }
}
