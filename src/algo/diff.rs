//! Tree differ
//!
//! Compares the original document against the edited one and annotates
//! the edited document in place with diff marks.
//!
//! # Algorithm
//!
//! A lock-step walk over the children of two parents:
//!
//! 1. Shallow-compare the current pair (tag, attributes, side data).
//! 2. On mismatch, look ahead in the edited siblings for a deep match of
//!    the base node (the skipped edited nodes were inserted), then look
//!    ahead in the base siblings for a deep match of the edited node (the
//!    skipped base nodes were deleted).
//! 3. Without a match, an element of the same name and syntax is a
//!    modified wrapper and is recursed into; anything else is recorded as
//!    a deletion in front of the edited node.
//! 4. Shallow-equal pairs are recursed into unless either side is
//!    encapsulated (template or extension output is opaque).
//!
//! Encapsulated about-sibling runs are stepped over as one node.
//!
//! # Complexity
//!
//! - Time: O(n * k) where k is the look-ahead bound (`max_lookahead`)
//! - Space: O(depth)

use crate::diff::{DiffMark, RevisionId};
use crate::node::{Document, NodeId};

use super::equal::TreeComparator;

/// Default look-ahead bound for [`DiffConfig::small`].
const SMALL_MAX_LOOKAHEAD: usize = 32;

// =============================================================================
// Public Types
// =============================================================================

/// Configuration for the tree differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffConfig {
    /// Maximum siblings scanned by each look-ahead.
    /// Default: unbounded
    pub max_lookahead: usize,
    /// Revision to stamp marks with; keeps the edited document's when `None`.
    pub revision: Option<RevisionId>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_lookahead: usize::MAX,
            revision: None,
        }
    }
}

impl DiffConfig {
    /// Create config with a custom look-ahead bound.
    pub fn new(max_lookahead: usize) -> Self {
        Self {
            max_lookahead,
            revision: None,
        }
    }

    /// Bounded look-ahead, for large flat documents.
    pub fn small() -> Self {
        Self::new(SMALL_MAX_LOOKAHEAD)
    }

    pub fn with_revision(mut self, revision: RevisionId) -> Self {
        self.revision = Some(revision);
        self
    }
}

/// Statistics from a diff run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct DiffStats {
    /// Number of node pairs compared
    pub nodes_compared: usize,
    /// Look-ahead scans that found a match
    pub lookahead_hits: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub modified_wrappers: usize,
    pub subtree_changed: usize,
    pub children_changed: usize,
}

impl DiffStats {
    fn record(&mut self, mark: DiffMark) {
        match mark {
            DiffMark::Inserted => self.inserted += 1,
            DiffMark::Deleted => self.deleted += 1,
            DiffMark::ModifiedWrapper => self.modified_wrappers += 1,
            DiffMark::SubtreeChanged => self.subtree_changed += 1,
            DiffMark::ChildrenChanged => self.children_changed += 1,
            DiffMark::Moved => {}
        }
    }
}

/// Result of a diff run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct DiffResult {
    /// No difference was found anywhere
    pub is_empty: bool,
    pub stats: DiffStats,
}

impl DiffResult {
    /// Check if any changes were detected
    pub fn has_changes(&self) -> bool {
        !self.is_empty
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Diff `base` against `edited`, marking `edited` in place.
///
/// When anything changed, the edited body is left carrying
/// `children-changed` or `subtree-changed`.
pub fn diff(base: &Document, edited: &mut Document, config: &DiffConfig) -> DiffResult {
    if let Some(revision) = config.revision {
        edited.set_revision(revision);
    }
    log::trace!(
        target: "selser::domdiff",
        "ORIG:\n{}\nNEW :\n{}",
        base.inner_html(base.body()),
        edited.inner_html(edited.body())
    );

    let mut ctx = DiffContext::new(base, *config);
    let body = edited.body();
    let found = ctx.diff_children(edited, base.body(), body);
    if found && !edited.direct_children_changed(body) {
        ctx.mark_node(edited, body, DiffMark::SubtreeChanged, false);
    }
    log::debug!(target: "selser::domdiff", "diff done: changed={found} {:?}", ctx.stats);
    ctx.into_result(found)
}

// =============================================================================
// Internal: DiffContext
// =============================================================================

struct DiffContext<'a> {
    base: &'a Document,
    config: DiffConfig,
    stats: DiffStats,
}

impl<'a> DiffContext<'a> {
    fn new(base: &'a Document, config: DiffConfig) -> Self {
        Self {
            base,
            config,
            stats: DiffStats::default(),
        }
    }

    fn into_result(self, found: bool) -> DiffResult {
        DiffResult {
            is_empty: !found,
            stats: self.stats,
        }
    }

    fn equals(&mut self, edited: &Document, base_node: NodeId, new_node: NodeId, deep: bool) -> bool {
        self.stats.nodes_compared += 1;
        TreeComparator::new(self.base, edited).tree_equals(base_node, new_node, deep)
    }

    fn mark_node(&mut self, doc: &mut Document, node: NodeId, mark: DiffMark, block_deleted: bool) {
        let meta = doc.add_diff_mark(node, mark);
        if let Some(meta) = meta
            && block_deleted
        {
            doc.set_attr(meta, "data-is-block", "true");
        }
        self.stats.record(mark);
        if matches!(mark, DiffMark::Deleted | DiffMark::Inserted)
            && let Some(parent) = doc.parent(node)
        {
            self.mark_node(doc, parent, DiffMark::ChildrenChanged, false);
        }
    }

    /// Edited sibling after `base_node`'s position that deep-matches it.
    fn lookahead_new(&mut self, doc: &Document, base_node: NodeId, new_node: NodeId) -> Option<NodeId> {
        let mut cur = doc.next_sibling(new_node);
        let mut steps = 0;
        while let Some(la) = cur {
            if steps == self.config.max_lookahead {
                break;
            }
            steps += 1;
            log::trace!(target: "selser::domdiff", "--> B(new): {}", describe(doc, la));
            if doc.is_content_node(la) && self.equals(doc, base_node, la, true) {
                return Some(la);
            }
            cur = doc.next_non_template_sibling(la);
        }
        None
    }

    /// Base sibling that deep-matches `new_node`, with the deleted-block flag.
    fn lookahead_base(&mut self, doc: &Document, base_node: NodeId, new_node: NodeId) -> (Option<NodeId>, bool) {
        let base = self.base;
        let mut is_block = base.is_block_node_with_visible_wt(base_node);
        let mut cur = base.next_sibling(base_node);
        let mut steps = 0;
        while let Some(la) = cur {
            if steps == self.config.max_lookahead {
                break;
            }
            steps += 1;
            log::trace!(target: "selser::domdiff", "--> A(old): {}", describe(base, la));
            if base.is_content_node(la) && self.equals(doc, la, new_node, true) {
                return (Some(la), is_block);
            } else if !base.emits_sol_transparent_single_line_wt(la) {
                // Only the deleted node right before the match matters
                is_block = base.is_block_node_with_visible_wt(la);
            }
            cur = base.next_non_template_sibling(la);
        }
        (None, is_block)
    }

    /// Diff the children of two parents. Returns whether anything differs.
    fn diff_children(&mut self, doc: &mut Document, base_parent: NodeId, new_parent: NodeId) -> bool {
        let base = self.base;
        let mut base_node = base.first_child(base_parent);
        let mut new_node = doc.first_child(new_parent);
        let mut found_overall = false;

        while let (Some(mut b), Some(mut n)) = (base_node, new_node) {
            let mut dont_advance_new = false;
            log::trace!(
                target: "selser::domdiff",
                "--> A: {}\n--> B: {}",
                describe(base, b),
                describe(doc, n)
            );

            if !self.equals(doc, b, n, false) {
                log::trace!(target: "selser::domdiff", "-- not equal --");
                let saved_new = n;
                let mut found = false;

                if base.is_content_node(b)
                    && let Some(matched) = self.lookahead_new(doc, b, n)
                {
                    let mut mark = n;
                    while mark != matched {
                        log::trace!(target: "selser::domdiff", "--found diff: inserted--");
                        self.mark_node(doc, mark, DiffMark::Inserted, false);
                        match doc.next_sibling(mark) {
                            Some(next) => mark = next,
                            None => break,
                        }
                    }
                    self.stats.lookahead_hits += 1;
                    found = true;
                    n = matched;
                }

                if !found && doc.is_content_node(n) {
                    let (matched, is_block) = self.lookahead_base(doc, b, n);
                    if let Some(matched) = matched {
                        log::trace!(target: "selser::domdiff", "--found diff: deleted--");
                        self.mark_node(doc, n, DiffMark::Deleted, is_block);
                        self.stats.lookahead_hits += 1;
                        b = matched;
                        found = true;
                    }
                }

                if !found {
                    let block = base.is_block_node_with_visible_wt(b);
                    if !doc.is_element(saved_new) {
                        log::trace!(target: "selser::domdiff", "--found diff: modified text/comment--");
                        self.mark_node(doc, saved_new, DiffMark::Deleted, block);
                    } else if doc.name(saved_new) == base.name(b) && doc.dp(saved_new).stx == base.dp(b).stx {
                        log::trace!(target: "selser::domdiff", "--found diff: modified-wrapper--");
                        self.mark_node(doc, saved_new, DiffMark::ModifiedWrapper, false);
                        if !base.is_encapsulation_wrapper(b)
                            && !doc.is_encapsulation_wrapper(saved_new)
                            && self.diff_children(doc, b, saved_new)
                        {
                            self.mark_node(doc, saved_new, DiffMark::SubtreeChanged, false);
                        }
                    } else {
                        // Compare this edited node against the next base node
                        dont_advance_new = true;
                        self.mark_node(doc, saved_new, DiffMark::Deleted, block);
                    }
                }

                self.mark_node(doc, new_parent, DiffMark::ChildrenChanged, false);
                found_overall = true;
            } else if !base.is_encapsulation_wrapper(b) && !doc.is_encapsulation_wrapper(n) {
                let differs = self.diff_children(doc, b, n);
                if differs {
                    log::trace!(target: "selser::domdiff", "--found diff: subtree-changed--");
                    self.mark_node(doc, n, DiffMark::SubtreeChanged, false);
                }
                found_overall |= differs;
            }

            base_node = base.next_non_template_sibling(b);
            new_node = if dont_advance_new {
                Some(n)
            } else {
                doc.next_non_template_sibling(n)
            };
        }

        // Extra edited nodes were inserted
        while let Some(n) = new_node {
            log::trace!(target: "selser::domdiff", "--found trailing new node: inserted--");
            self.mark_node(doc, n, DiffMark::Inserted, false);
            found_overall = true;
            new_node = doc.next_non_template_sibling(n);
        }

        // Extra base nodes were deleted
        if let Some(b) = base_node {
            log::trace!(target: "selser::domdiff", "--found trailing base nodes: deleted--");
            self.mark_node(doc, new_parent, DiffMark::ChildrenChanged, false);
            // An emptied parent gets no marker; handlers check for zero children
            if doc.has_children(new_parent) {
                let meta = doc.append_typed_meta(new_parent, &DiffMark::Deleted.marker_type());
                if base.is_block_node_with_visible_wt(b) {
                    doc.set_attr(meta, "data-is-block", "true");
                }
            }
            found_overall = true;
        }

        found_overall
    }
}

fn describe(doc: &Document, id: NodeId) -> String {
    match doc.text(id) {
        Some(t) => format!("{t:?}"),
        None => doc.outer_html(id),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(base: &str, edited: &str) -> (Document, DiffResult) {
        run_with(base, edited, DiffConfig::default())
    }

    fn run_with(base: &str, edited: &str, config: DiffConfig) -> (Document, DiffResult) {
        let base = Document::parse_html(base).unwrap();
        let mut edited = Document::parse_html(edited).unwrap();
        let result = diff(&base, &mut edited, &config);
        (edited, result)
    }

    fn kids(doc: &Document, id: NodeId) -> Vec<NodeId> {
        doc.child_ids(id).to_vec()
    }

    const P_A: &str = r#"<p data-parsoid='{"dsr":[0,1,0,0]}'>A</p>"#;
    const P_B: &str = r#"<p data-parsoid='{"dsr":[3,4,0,0]}'>B</p>"#;
    const P_C: &str = r#"<p data-parsoid='{"dsr":[6,7,0,0]}'>C</p>"#;

    #[test]
    fn test_identical_is_empty() {
        let html = format!("{P_A}\n\n{P_B}");
        let (doc, result) = run(&html, &html);
        assert!(result.is_empty);
        assert!(!result.has_changes());
        assert!(doc.diff_mark(doc.body()).is_none());
        assert!(result.stats.nodes_compared > 0);
    }

    #[test]
    fn test_text_edit_marks_sentinel_and_ancestors() {
        let (doc, result) = run(P_A, r#"<p data-parsoid='{"dsr":[0,1,0,0]}'>Z</p>"#);
        assert!(result.has_changes());
        let p = doc.first_child(doc.body()).unwrap();
        let ps = kids(&doc, p);
        assert_eq!(ps.len(), 2);
        assert!(doc.is_diff_marker(ps[0], Some(DiffMark::Deleted)));
        assert!(!doc.is_deleted_block_node(Some(ps[0])));
        assert_eq!(doc.text(ps[1]), Some("Z"));
        assert!(doc.direct_children_changed(p));
        assert!(doc.has_diff_mark(p, DiffMark::SubtreeChanged));
        assert!(doc.only_subtree_changed(p));
        assert!(doc.has_diff_mark(doc.body(), DiffMark::SubtreeChanged));
    }

    #[test]
    fn test_insertion_found_by_lookahead() {
        let (doc, result) = run(&format!("{P_A}{P_B}"), &format!("{P_A}<p>new</p>{P_B}"));
        let ps = kids(&doc, doc.body());
        assert!(doc.has_inserted_diff_mark(ps[1]));
        assert!(doc.diff_mark(ps[2]).is_none());
        assert!(doc.direct_children_changed(doc.body()));
        assert_eq!(result.stats.inserted, 1);
        assert_eq!(result.stats.lookahead_hits, 1);
    }

    #[test]
    fn test_deletion_found_by_lookahead() {
        let (doc, result) = run(&format!("{P_A}{P_B}{P_C}"), &format!("{P_A}{P_C}"));
        let ps = kids(&doc, doc.body());
        assert_eq!(ps.len(), 3);
        assert!(doc.maybe_deleted_node(Some(ps[1])));
        // A wikitext paragraph has no visible wikitext of its own
        assert!(!doc.is_deleted_block_node(Some(ps[1])));
        assert!(doc.has_diff_mark(ps[2], DiffMark::Deleted));
        assert_eq!(result.stats.deleted, 1);
    }

    #[test]
    fn test_deleted_block_flag() {
        let div = |t: &str, s: usize| {
            format!(r#"<div data-parsoid='{{"stx":"html","dsr":[{s},{},5,6]}}'>{t}</div>"#, s + 12)
        };
        let base = format!("{}{}{}", div("a", 0), div("b", 20), div("c", 40));
        let edited = format!("{}{}", div("a", 0), div("c", 40));
        let (doc, _) = run(&base, &edited);
        let ps = kids(&doc, doc.body());
        assert!(doc.is_deleted_block_node(Some(ps[1])));
    }

    #[test]
    fn test_trailing_base_nodes_get_marker() {
        let li = |t: &str, s: usize| format!(r#"<li data-parsoid='{{"dsr":[{s},{},1,0]}}'>{t}</li>"#, s + 3);
        let ul_dp = r#"data-parsoid='{"dsr":[0,7,0,0]}'"#;
        let base = format!("<ul {ul_dp}>{}{}</ul>", li("a", 0), li("b", 4));
        let edited = format!("<ul {ul_dp}>{}</ul>", li("a", 0));
        let (doc, _) = run(&base, &edited);
        let ul = doc.first_child(doc.body()).unwrap();
        let last = doc.last_child(ul).unwrap();
        assert!(doc.is_deleted_block_node(Some(last)));
        assert!(doc.direct_children_changed(ul));
        assert!(doc.has_diff_mark(doc.body(), DiffMark::SubtreeChanged));
    }

    #[test]
    fn test_modified_wrapper() {
        let (doc, result) = run(r#"<p class="x">a</p>"#, r#"<p class="y">a</p>"#);
        let p = doc.first_child(doc.body()).unwrap();
        assert!(doc.has_diff_mark(p, DiffMark::ModifiedWrapper));
        assert!(!doc.has_diff_mark(p, DiffMark::SubtreeChanged));
        assert!(doc.direct_children_changed(doc.body()));
        assert_eq!(result.stats.modified_wrappers, 1);
    }

    #[test]
    fn test_different_wrapper_not_advanced() {
        let (doc, _) = run(
            r#"<p data-parsoid='{"dsr":[0,1,0,0]}'>x</p>"#,
            r#"<div data-parsoid='{"stx":"html"}'>x</div>"#,
        );
        let ps = kids(&doc, doc.body());
        assert!(doc.maybe_deleted_node(Some(ps[0])));
        // The edited div is re-compared against nothing and so counts as inserted
        assert!(doc.has_inserted_diff_mark(ps[1]));
    }

    #[test]
    fn test_encapsulated_content_is_opaque() {
        let tpl = |inner: &str| {
            format!(
                r#"<span about="{}" typeof="mw:Transclusion" data-mw='{{"parts":["x"]}}' data-parsoid='{{"dsr":[0,5,null,null]}}'>{inner}</span>"#,
                "#mwt1"
            )
        };
        let (_, result) = run(&tpl("old"), &tpl("expanded differently"));
        assert!(result.is_empty);
    }

    #[test]
    fn test_lookahead_bound() {
        let (doc, _) = run_with(
            &format!("{P_A}{P_B}"),
            &format!("{P_A}<p>new</p>{P_B}"),
            DiffConfig::new(0),
        );
        let ps = kids(&doc, doc.body());
        assert!(doc.has_diff_mark(ps[1], DiffMark::ModifiedWrapper));
        assert!(doc.has_inserted_diff_mark(ps[2]));
    }

    #[test]
    fn test_revision_stamped() {
        let base = Document::parse_html(P_A).unwrap();
        let mut edited = Document::parse_html("<p>Q</p>").unwrap();
        let config = DiffConfig::small().with_revision(RevisionId::new(9));
        let _ = diff(&base, &mut edited, &config);
        assert_eq!(edited.revision(), RevisionId::new(9));
        assert_eq!(edited.diff_mark(edited.body()).map(|r| r.id), Some(RevisionId::new(9)));
    }
}
