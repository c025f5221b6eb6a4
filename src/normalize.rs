//! DOM normalization ahead of serialization.
//!
//! Rewrites an edited tree into the shape a wikitext author would have
//! produced, so the serializer emits clean markup instead of escaping its
//! way around editor artifacts: empty headings and quotes go away, links
//! hoist out of headings, adjacent `<b>`/`<i>` runs merge, and so on.
//!
//! # Design
//!
//! The walk is post-order: a node's subtree is normalized before the node
//! itself, and every rewrite returns the node the walk resumes at (the same
//! node when nothing changed, the replacement or next sibling otherwise),
//! so a rewritten node is normalized again until it is stable.
//!
//! In selser mode each structural change is recorded as diff marks. The
//! serializer relies on them to decide which original source is still
//! reusable, so marks are added with the same propagation rules the
//! differ uses. Nodes the differ left untouched are skipped entirely.
//!
//! Rewrites only run when `scrub_wikitext` is on.

use log::{debug, error, trace};

use crate::attr::AttrsExt;
use crate::config::SelserConfig;
use crate::diff::DiffMark;
use crate::node::{Document, NodeId, Stx};
use crate::wts::utils::{orig_src_valid_in_edited_context, trace_node_name};

/// Attributes that don't distinguish two wikitext elements.
const WT_IGNORABLE_ATTRS: &[&str] = &["id", "title"];

/// Attributes on an anchor's child that block format-tag hoisting.
const BLOCKING_ATTRS: &[&str] = &["color", "style", "class"];

// =============================================================================
// Normalizer
// =============================================================================

/// Counts of applied rewrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct NormalizeStats {
    /// Empty nodes removed
    pub stripped: usize,
    /// Sibling pairs merged
    pub merged: usize,
    /// Node/child swaps
    pub swapped: usize,
    /// Nodes hoisted out of headings
    pub hoisted: usize,
    /// Wrappers replaced by their children
    pub unwrapped: usize,
    /// Trailing whitespace runs moved out of links
    pub spaces_moved: usize,
}

impl NormalizeStats {
    #[inline]
    pub fn total(&self) -> usize {
        self.stripped + self.merged + self.swapped + self.hoisted + self.unwrapped + self.spaces_moved
    }
}

/// Tree normalizer for one serialization run.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    selser_mode: bool,
    scrub_wikitext: bool,
    rt_test_mode: bool,
}

impl Normalizer {
    pub fn new(config: &SelserConfig, selser_mode: bool) -> Self {
        Self {
            selser_mode,
            scrub_wikitext: config.scrub_wikitext,
            rt_test_mode: config.rt_test_mode,
        }
    }

    /// Normalize the whole document in place.
    ///
    /// # Panics
    ///
    /// When inserted diff marks are nested; the differ never produces them.
    pub fn normalize(&self, doc: &mut Document) -> NormalizeStats {
        let body = doc.body();
        let mut ctx = NormalizeContext {
            doc,
            opts: *self,
            in_inserted_content: false,
            stats: NormalizeStats::default(),
        };
        ctx.process_node(Some(body), true);
        debug!(target: "selser::normalize", "normalized: {:?}", ctx.stats);
        ctx.stats
    }
}

// =============================================================================
// Pair predicates
// =============================================================================

fn sorted_attrs<'d>(doc: &'d Document, id: NodeId, ignore: &[&str]) -> Vec<(&'d str, &'d str)> {
    let mut attrs: Vec<_> = doc
        .attrs(id)
        .iter()
        .filter(|(k, _)| !ignore.contains(&k.as_str()))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    attrs.sort_unstable();
    attrs
}

fn attribs_equal(doc: &Document, a: NodeId, b: NodeId, ignore: &[&str]) -> bool {
    sorted_attrs(doc, a, ignore) == sorted_attrs(doc, b, ignore) && doc.data_mw(a) == doc.data_mw(b)
}

/// Same presentation, ignoring bookkeeping attributes.
fn similar(doc: &Document, a: NodeId, b: NodeId) -> bool {
    if doc.is_tag(a, "a") {
        return doc.is_element(b) && attribs_equal(doc, a, b, WT_IGNORABLE_ATTRS);
    }
    // Wikitext quotes drop their attributes on output anyway
    let a_html = doc.is_literal_html(a);
    let b_html = doc.is_literal_html(b);
    (!a_html && !b_html) || (a_html && b_html && attribs_equal(doc, a, b, &[]))
}

fn mergeable(doc: &Document, a: NodeId, b: NodeId) -> bool {
    doc.name(a) == doc.name(b) && similar(doc, a, b)
}

/// `a` can merge with `b` after swapping with its sole child.
///
/// `<b><i>x</i></b>` + `<i>y</i>` becomes `<i><b>x</b>y</i>`.
fn swappable(doc: &Document, a: NodeId, b: NodeId) -> bool {
    doc.has_n_children(a, 1, false)
        && doc
            .first_non_deleted_child(a)
            .is_some_and(|child| similar(doc, a, child) && mergeable(doc, child, b))
}

fn is_inserted_content(doc: &Document, id: NodeId) -> bool {
    let mut cur = Some(id);
    while let Some(n) = cur {
        if doc.has_inserted_diff_mark(n) {
            return true;
        }
        if doc.is_body(n) {
            return false;
        }
        cur = doc.parent(n);
    }
    false
}

/// Node shapes with a rewrite.
enum Rewrite {
    Heading,
    Quote,
    Anchor,
    TableCell,
    Font,
    Paragraph,
    None,
}

// =============================================================================
// NormalizeContext
// =============================================================================

struct NormalizeContext<'d> {
    doc: &'d mut Document,
    opts: Normalizer,
    in_inserted_content: bool,
    stats: NormalizeStats,
}

impl NormalizeContext<'_> {
    fn first_child(&self, id: NodeId, rtl: bool) -> Option<NodeId> {
        if rtl {
            self.doc.last_non_deleted_child(id)
        } else {
            self.doc.first_non_deleted_child(id)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Diff mark bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    fn add_diff_marks(&mut self, id: NodeId, mark: DiffMark, dont_recurse: bool) {
        if !self.opts.selser_mode || self.doc.has_diff_mark(id, mark) {
            return;
        }
        if self.in_inserted_content && mark == DiffMark::Inserted {
            return;
        }

        // New elements need no marks
        if !self.doc.is_new_elt(id) {
            let parent = self.doc.parent(id);
            self.doc.add_diff_mark(id, mark);
            if matches!(mark, DiffMark::Inserted | DiffMark::Deleted)
                && let Some(p) = parent
            {
                self.doc.add_diff_mark(p, DiffMark::ChildrenChanged);
            }
        }

        if dont_recurse {
            return;
        }

        let mut cur = self.doc.parent(id);
        while let Some(n) = cur {
            if !self.doc.is_element(n) || self.doc.is_body(n) {
                break;
            }
            if self.doc.has_diff_mark(n, DiffMark::SubtreeChanged) {
                return;
            }
            if !self.doc.is_new_elt(n) {
                self.doc.set_diff_mark(n, DiffMark::SubtreeChanged);
            }
            cur = self.doc.parent(n);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tag minimization
    // ─────────────────────────────────────────────────────────────────────────

    fn rewriteable_pair(&self, a: NodeId, b: NodeId) -> bool {
        if self.doc.is_quote_elt(a) {
            // A mergeable quote pair can't come from parsed wikitext
            // (four quotes never parse as `</i><i>`), so always rewrite.
            return self.doc.is_quote_elt(b);
        }
        self.opts.scrub_wikitext
            && self.doc.is_tag(a, "a")
            && self.doc.is_tag(b, "a")
            && (self.doc.is_new_elt(a) || self.doc.is_new_elt(b))
    }

    /// Move all of `b`'s children into `a` and drop `b`.
    fn merge(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let sentinel = self.doc.first_child(b);

        // Intermediate diff markers go with `a`
        if let Some(next) = self.doc.next_sibling(a)
            && next != b
        {
            self.doc.append_child(a, next);
        }

        self.doc.migrate_children(b, a, None);
        self.doc.remove(b);
        self.doc.normalize_text(a);
        self.stats.merged += 1;

        if let Some(s) = sentinel {
            // normalize_text may have absorbed it
            if self.doc.parent(s).is_some() {
                self.add_diff_marks(s, DiffMark::Moved, true);
            }
            self.add_diff_marks(a, DiffMark::ChildrenChanged, true);
        }
        if let Some(next) = self.doc.next_sibling(a) {
            self.add_diff_marks(next, DiffMark::Moved, true);
        }
        if let Some(parent) = self.doc.parent(a) {
            self.add_diff_marks(parent, DiffMark::ChildrenChanged, false);
        }
        a
    }

    /// `b` is `a`'s sole non-deleted child; make `a` its child instead.
    fn swap(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let Some(parent) = self.doc.parent(a) else {
            return a;
        };
        self.doc.migrate_children(b, a, None);
        self.doc.insert_before(parent, b, Some(a));
        self.doc.append_child(b, a);
        self.stats.swapped += 1;

        if let Some(first) = self.doc.first_child(a) {
            self.add_diff_marks(first, DiffMark::Moved, true);
        }
        self.add_diff_marks(a, DiffMark::Moved, true);
        self.add_diff_marks(b, DiffMark::Moved, true);
        self.add_diff_marks(a, DiffMark::ChildrenChanged, true);
        self.add_diff_marks(b, DiffMark::ChildrenChanged, true);
        if let Some(parent) = self.doc.parent(b) {
            self.add_diff_marks(parent, DiffMark::ChildrenChanged, false);
        }
        b
    }

    fn normalize_sibling_pair(&mut self, a: NodeId, b: NodeId) -> NodeId {
        if !self.rewriteable_pair(a, b) {
            return b;
        }

        // Merged children have new neighbours, grandchildren are already minimal
        if mergeable(self.doc, a, b) {
            let a = self.merge(a, b);
            self.process_subtree(a, false);
            return a;
        }

        if swappable(self.doc, a, b)
            && let Some(child) = self.doc.first_non_deleted_child(a)
        {
            let swapped = self.swap(a, child);
            let a = self.merge(swapped, b);
            self.process_subtree(a, false);
            return a;
        }

        if swappable(self.doc, b, a)
            && let Some(child) = self.doc.first_non_deleted_child(b)
        {
            let swapped = self.swap(b, child);
            let a = self.merge(a, swapped);
            self.process_subtree(a, false);
            return a;
        }

        b
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rewrites
    // ─────────────────────────────────────────────────────────────────────────

    /// Move rendering-transparent nodes (category links) at the start, or
    /// end when `rtl`, out of a heading.
    fn hoist_links(&mut self, node: NodeId, rtl: bool) {
        let mut sibling = self.first_child(node, rtl);
        let mut hoistable = false;

        while let Some(s) = sibling {
            let next = if rtl {
                self.doc.previous_non_deleted_sibling(s)
            } else {
                self.doc.next_non_deleted_sibling(s)
            };
            if self.doc.is_content_node(s) {
                // Templated content stays put
                if !self.doc.is_rendering_transparent(s) || self.doc.is_encapsulation_wrapper(s) {
                    break;
                }
                hoistable = true;
            }
            sibling = next;
        }

        if !hoistable {
            return;
        }
        let Some(parent) = self.doc.parent(node) else {
            return;
        };

        let first_node = self.first_child(node, rtl);
        let mut moving = first_node;
        while let Some(m) = moving
            && moving != sibling
        {
            let reference = if rtl {
                self.doc.next_non_deleted_sibling(node)
            } else {
                Some(node)
            };
            self.doc.insert_before(parent, m, reference);
            self.stats.hoisted += 1;
            moving = self.first_child(node, rtl);
        }

        if let Some(s) = sibling
            && let Some(text) = self.doc.kind(s).as_text()
        {
            let trimmed = if rtl { text.trim_end() } else { text.trim_start() };
            let trimmed = trimmed.to_string();
            self.doc.set_text(s, trimmed);
        }

        if let Some(first) = first_node {
            self.add_diff_marks(first, DiffMark::Moved, true);
        }
        if let Some(s) = sibling {
            self.add_diff_marks(s, DiffMark::Moved, true);
        }
        self.add_diff_marks(node, DiffMark::ChildrenChanged, true);
        self.add_diff_marks(parent, DiffMark::ChildrenChanged, false);
    }

    /// Remove `node` if it has no content; returns where the walk resumes.
    fn strip_if_empty(&mut self, node: NodeId) -> Option<NodeId> {
        let next = self.doc.next_non_deleted_sibling(node);
        let rt = self.opts.rt_test_mode;
        let dp = self.doc.dp(node);
        let auto_inserted = dp.auto_inserted_start || dp.auto_inserted_end;
        let is_html = dp.is_html();

        // rt-test mode wants fully empty, non-auto-inserted, non-HTML nodes
        let strippable = !(rt && auto_inserted)
            && self.doc.node_essentially_empty(node, rt)
            && !(rt && is_html);
        if !strippable {
            return Some(node);
        }

        trace!(target: "selser::normalize", "stripping empty {}", self.doc.name(node));
        self.add_diff_marks(node, DiffMark::Deleted, true);
        self.doc.remove(node);
        self.stats.stripped += 1;
        next
    }

    fn move_trailing_spaces_out(&mut self, node: NodeId) {
        if self.opts.rt_test_mode {
            return;
        }
        let Some(last) = self.doc.last_non_deleted_child(node) else {
            return;
        };
        let Some(text) = self.doc.kind(last).as_text() else {
            return;
        };
        let keep = text.trim_end().len();
        if keep == text.len() {
            return;
        }
        let trailing = text[keep..].to_string();
        let kept = text[..keep].to_string();
        self.doc.set_text(last, kept);

        // Prefer dropping the spaces when the next node already starts with some
        if let Some(next) = self.doc.next_non_deleted_sibling(node)
            && !self
                .doc
                .kind(next)
                .as_text()
                .is_some_and(|t| t.starts_with(char::is_whitespace))
        {
            let target = if self.doc.is_text(next) {
                next
            } else {
                let txt = self.doc.create_text("");
                if let Some(parent) = self.doc.parent(node) {
                    self.doc.insert_before(parent, txt, Some(next));
                }
                txt
            };
            let combined = format!("{trailing}{}", self.doc.text(target).unwrap_or_default());
            self.doc.set_text(target, combined);
            self.add_diff_marks(target, DiffMark::Inserted, true);
        }

        self.add_diff_marks(last, DiffMark::Inserted, true);
        if let Some(parent) = self.doc.parent(node) {
            self.add_diff_marks(parent, DiffMark::ChildrenChanged, false);
        }
        self.stats.spaces_moved += 1;
    }

    /// Replace every `br` below `node` with a space.
    fn strip_brs(&mut self, node: NodeId) {
        let mut stripped = false;
        let mut child = self.doc.first_child(node);
        while let Some(c) = child {
            let next = self.doc.next_sibling(c);
            if self.doc.is_tag(c, "br") {
                let space = self.doc.create_text(" ");
                self.doc.replace_with(c, space);
                stripped = true;
            } else if self.doc.is_element(c) {
                self.strip_brs(c);
            }
            child = next;
        }
        if stripped {
            self.add_diff_marks(node, DiffMark::ChildrenChanged, false);
        }
    }

    /// Turn `<a><b>Foo</b></a>` into `<b><a>Foo</a></b>` for a link whose
    /// text is its target, and minimize it against its next sibling.
    fn move_format_tag_outside_a_tag(&mut self, node: NodeId) -> Option<NodeId> {
        if self.opts.rt_test_mode || !self.doc.is_tag(node, "a") {
            return Some(node);
        }

        if let Some(sibling) = self.doc.next_non_deleted_sibling(node) {
            self.normalize_sibling_pair(node, sibling);
        }

        let Some(href) = self.doc.attr(node, "href").map(str::to_string) else {
            error!(
                target: "selser::normalize",
                "href is missing from a tag: {}",
                self.doc.outer_html(node)
            );
            return Some(node);
        };

        let first = self.doc.first_non_deleted_child(node);
        let Some(first) = first.filter(|&f| self.doc.is_element(f)) else {
            return Some(node);
        };
        let single = self.doc.next_non_deleted_sibling(first).is_none();
        let blocked = BLOCKING_ATTRS.iter().any(|a| self.doc.has_attr(first, a));
        if single && !blocked && self.doc.text_content(node) == href.replacen("./", "", 1) {
            while let Some(child) = self.doc.first_non_deleted_child(node)
                && self.doc.is_formatting_elt(child)
            {
                self.swap(node, child);
            }
            return Some(first);
        }
        Some(node)
    }

    fn classify(&self, node: NodeId) -> Rewrite {
        let Some(elem) = self.doc.element(node) else {
            return Rewrite::None;
        };
        match elem.tag.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Rewrite::Heading,
            "i" | "b" => Rewrite::Quote,
            "a" => Rewrite::Anchor,
            "td" => Rewrite::TableCell,
            "font" if elem.attrs.is_empty() => Rewrite::Font,
            "p" if !self.doc.is_literal_html(node)
                // Empty paragraphs that came from source stay
                && !elem.attrs.has_word("class", "mw-empty-elt")
                && self.doc.has_n_children(node, 0, true)
                && self.doc.parent(node).is_some_and(|p| !self.doc.has_n_children(p, 1, false)) =>
            {
                Rewrite::Paragraph
            }
            _ => Rewrite::None,
        }
    }

    /// Apply the rewrite for `node`; returns the node the walk resumes at.
    fn normalize_node(&mut self, node: NodeId) -> Option<NodeId> {
        if !self.opts.scrub_wikitext {
            return Some(node);
        }

        // Untouched content keeps its source; invalid source makes it edited
        if self.opts.selser_mode
            && !self.doc.is_body(node)
            && !self.in_inserted_content
            && !self.doc.has_diff_markers(node)
            && orig_src_valid_in_edited_context(self.doc, node)
        {
            return Some(node);
        }

        match self.classify(node) {
            Rewrite::Heading => {
                self.hoist_links(node, false);
                self.hoist_links(node, true);
                self.strip_brs(node);
                self.strip_if_empty(node)
            }
            Rewrite::Quote => self.strip_if_empty(node),
            Rewrite::Anchor => {
                let next = self.doc.next_non_deleted_sibling(node);
                if self.doc.attr(node, "rel") == Some("mw:WikiLink")
                    && self.strip_if_empty(node) != Some(node)
                {
                    return next;
                }
                self.move_trailing_spaces_out(node);
                self.move_format_tag_outside_a_tag(node)
            }
            Rewrite::TableCell => {
                let dp = self.doc.dp(node);
                // Later cells of a `||` row can't start with an escapable prefix
                let later_row_cell = dp.stx_is(&Stx::Row)
                    && self.doc.parent(node).and_then(|p| self.doc.first_non_sep_child(p)) != Some(node);
                if dp.is_html() || later_row_cell {
                    return Some(node);
                }
                if let Some(first) = self.doc.first_non_deleted_child(node)
                    && let Some(text) = self.doc.kind(first).as_text()
                    && text.starts_with(['-', '+', '}'])
                {
                    let spaced = format!(" {text}");
                    self.doc.set_text(first, spaced);
                    self.add_diff_marks(first, DiffMark::Inserted, true);
                }
                Some(node)
            }
            Rewrite::Font => {
                let next = self.doc.next_non_deleted_sibling(node);
                if let Some(parent) = self.doc.parent(node) {
                    self.add_diff_marks(parent, DiffMark::ChildrenChanged, false);
                }
                self.doc.unwrap(node);
                self.stats.unwrapped += 1;
                next
            }
            Rewrite::Paragraph => self.collapse_empty_paragraph(node),
            Rewrite::None => Some(node),
        }
    }

    /// `<p></p><p>x</p>` becomes `<p><br>x</p>` so the blank line survives.
    fn collapse_empty_paragraph(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.doc.parent(node)?;
        let br = self.doc.create_element("br");
        let next = self.doc.next_non_sep_sibling(node);

        let (br_parent, br_sibling) = match next {
            Some(n) if self.doc.is_tag(n, "p") && !self.doc.is_literal_html(n) => (n, self.doc.first_child(n)),
            _ => (parent, Some(node)),
        };
        self.doc.insert_before(br_parent, br, br_sibling);
        // No nested insertion marks
        if Some(br_parent) == next && !is_inserted_content(self.doc, br_parent) {
            self.add_diff_marks(br, DiffMark::Inserted, false);
        }

        self.add_diff_marks(node, DiffMark::Deleted, false);
        self.doc.remove(node);
        self.stats.stripped += 1;
        next
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Traversal
    // ─────────────────────────────────────────────────────────────────────────

    fn process_subtree(&mut self, node: NodeId, recurse: bool) {
        let first = self.doc.first_non_deleted_child(node);
        let mut a = self.process_node(first, recurse);
        while let Some(cur) = a {
            // Minimization needs a pair of adjacent siblings
            let Some(b) = self.doc.next_non_deleted_sibling(cur) else {
                return;
            };
            a = match self.process_node(Some(b), recurse) {
                Some(b) if self.doc.previous_non_deleted_sibling(b) == Some(cur) => {
                    Some(self.normalize_sibling_pair(cur, b))
                }
                other => other,
            };
        }
    }

    /// Normalize `node` (and its subtree when `recurse`) until stable.
    fn process_node(&mut self, node: Option<NodeId>, recurse: bool) -> Option<NodeId> {
        let mut node = node;
        loop {
            while let Some(n) = node
                && self.doc.is_first_encapsulation_wrapper(n)
            {
                node = self.doc.skip_over_encapsulated(n);
            }
            let n = node?;
            trace!(target: "selser::normalize", "{}", trace_node_name(self.doc, n));

            let inserted = self.doc.has_inserted_diff_mark(n);
            if inserted {
                assert!(
                    !self.in_inserted_content,
                    "nested inserted dom-diff flags at {}",
                    trace_node_name(self.doc, n)
                );
                self.in_inserted_content = true;
            }

            if recurse && self.doc.is_element(n) {
                self.process_subtree(n, true);
            }
            let next = self.normalize_node(n);

            if inserted {
                self.in_inserted_content = false;
            }
            if next == Some(n) {
                return Some(n);
            }
            node = next;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::RevisionId;

    fn scrub(html: &str) -> (Document, NormalizeStats) {
        let mut doc = Document::parse_html(html).unwrap();
        let stats = Normalizer::new(&SelserConfig::EDIT, false).normalize(&mut doc);
        (doc, stats)
    }

    fn body_html(doc: &Document) -> String {
        doc.inner_html(doc.body())
    }

    #[test]
    fn test_scrub_off_is_a_no_op() {
        let mut doc = Document::parse_html("<h2></h2><b></b>").unwrap();
        let stats = Normalizer::new(&SelserConfig::default(), false).normalize(&mut doc);
        assert_eq!(stats.total(), 0);
        assert_eq!(body_html(&doc), "<h2></h2><b></b>");
    }

    #[test]
    fn test_empty_heading_and_quotes_stripped() {
        let (doc, stats) = scrub("<h2></h2><p>x<b> </b></p><h3> </h3>");
        assert_eq!(body_html(&doc), "<p>x</p>");
        assert_eq!(stats.stripped, 3);
    }

    #[test]
    fn test_rt_test_mode_keeps_whitespace_heading() {
        let mut doc = Document::parse_html("<h2> </h2>").unwrap();
        let config = SelserConfig::RT_TEST.with_scrub_wikitext(true);
        let _ = Normalizer::new(&config, false).normalize(&mut doc);
        assert_eq!(body_html(&doc), "<h2> </h2>");
    }

    #[test]
    fn test_adjacent_quotes_merge() {
        let (doc, stats) = scrub("<p><b>a</b><b>b</b></p>");
        assert_eq!(body_html(&doc), "<p><b>ab</b></p>");
        assert_eq!(stats.merged, 1);
    }

    #[test]
    fn test_quote_swap_then_merge() {
        let (doc, stats) = scrub("<i>A</i><b><i>X</i></b><b><i>Y</i></b><i>Z</i>");
        assert_eq!(body_html(&doc), "<i>A<b>XY</b>Z</i>");
        assert_eq!(stats.swapped, 2);
    }

    #[test]
    fn test_literal_html_quotes_need_equal_attrs() {
        let html = r#"<b data-parsoid='{"stx":"html"}' class="x">a</b><b data-parsoid='{"stx":"html"}'>b</b>"#;
        let (doc, stats) = scrub(html);
        assert_eq!(stats.merged, 0);
        assert_eq!(doc.child_ids(doc.body()).len(), 2);
    }

    #[test]
    fn test_link_trailing_space_moves_out() {
        let (doc, _) = scrub(r#"<p><a rel="mw:WikiLink" href="./Foo">Foo </a>bar</p>"#);
        assert_eq!(body_html(&doc), r#"<p><a rel="mw:WikiLink" href="./Foo">Foo</a> bar</p>"#);
    }

    #[test]
    fn test_empty_wikilink_stripped() {
        let (doc, _) = scrub(r#"<p>x<a rel="mw:WikiLink" href="./Foo"></a></p>"#);
        assert_eq!(body_html(&doc), "<p>x</p>");
    }

    #[test]
    fn test_format_tag_moves_outside_link() {
        let (doc, _) = scrub(r#"<p><a rel="mw:WikiLink" href="./Foo"><b>Foo</b></a></p>"#);
        assert_eq!(body_html(&doc), r#"<p><b><a rel="mw:WikiLink" href="./Foo">Foo</a></b></p>"#);
    }

    #[test]
    fn test_new_links_merge() {
        let (doc, stats) = scrub(r#"<p><a href="./Football">Foot</a><a href="./Football">ball</a></p>"#);
        assert_eq!(body_html(&doc), r#"<p><a href="./Football">Football</a></p>"#);
        assert_eq!(stats.merged, 1);
    }

    #[test]
    fn test_heading_hoists_category_link() {
        let (doc, stats) = scrub(r#"<h2><link rel="mw:PageProp/Category" href="./Category:X"> Title<br>x</h2>"#);
        assert_eq!(
            body_html(&doc),
            r#"<link rel="mw:PageProp/Category" href="./Category:X"><h2>Title x</h2>"#
        );
        assert_eq!(stats.hoisted, 1);
    }

    #[test]
    fn test_table_cell_escapable_prefix() {
        let (doc, _) = scrub("<table><tbody><tr><td>-x</td><td>}y</td></tr></tbody></table>");
        let cells: Vec<_> = doc.descendants(doc.body()).filter(|&n| doc.is_tag(n, "td")).collect();
        assert_eq!(doc.text_content(cells[0]), " -x");
        assert_eq!(doc.text_content(cells[1]), " }y");
    }

    #[test]
    fn test_row_cell_left_alone() {
        let (doc, _) = scrub(
            r#"<table><tbody><tr><td>a</td><td data-parsoid='{"stx":"row"}'>-x</td></tr></tbody></table>"#,
        );
        let cells: Vec<_> = doc.descendants(doc.body()).filter(|&n| doc.is_tag(n, "td")).collect();
        assert_eq!(doc.text_content(cells[1]), "-x");
    }

    #[test]
    fn test_font_without_attrs_unwrapped() {
        let (doc, stats) = scrub(r#"<p><font>x</font>y<font color="red">z</font></p>"#);
        assert_eq!(body_html(&doc), r#"<p>xy<font color="red">z</font></p>"#);
        assert_eq!(stats.unwrapped, 1);
    }

    #[test]
    fn test_empty_paragraph_becomes_br() {
        let (doc, _) = scrub("<p></p><p>x</p>");
        assert_eq!(body_html(&doc), "<p><br>x</p>");

        let (doc, _) = scrub("<p></p><div>x</div>");
        assert_eq!(body_html(&doc), "<br><div>x</div>");

        // A lone paragraph is left alone
        let (doc, _) = scrub("<p></p>");
        assert_eq!(body_html(&doc), "<p></p>");
    }

    #[test]
    fn test_selser_marks_structural_changes() {
        let mut doc = Document::parse_html(
            r#"<p data-parsoid='{"dsr":[0,5,0,0]}'>x<b data-parsoid='{"dsr":[1,5,2,2]}'></b></p>"#,
        )
        .unwrap();
        doc.set_revision(RevisionId::new(7));
        let p = doc.first_child(doc.body()).unwrap();
        let b = doc.last_child(p).unwrap();
        doc.set_diff_mark(b, DiffMark::ModifiedWrapper);

        let stats = Normalizer::new(&SelserConfig::EDIT, true).normalize(&mut doc);
        assert_eq!(stats.stripped, 1);
        assert!(doc.direct_children_changed(p));
        assert!(doc.maybe_deleted_node(doc.last_child(p)));
    }

    #[test]
    fn test_selser_skips_unmodified_nodes() {
        let mut doc =
            Document::parse_html(r#"<p data-parsoid='{}'>x<b data-parsoid='{}'></b></p>"#).unwrap();
        let stats = Normalizer::new(&SelserConfig::EDIT, true).normalize(&mut doc);
        assert_eq!(stats.total(), 0);
        assert_eq!(body_html(&doc), "<p>x<b></b></p>");
    }

    #[test]
    fn test_skips_encapsulated_content() {
        let html = r##"<span typeof="mw:Transclusion" about="#mwt1"><b></b></span>"##;
        let (doc, stats) = scrub(html);
        assert_eq!(stats.total(), 0);
        assert_eq!(body_html(&doc), html);
    }

    #[test]
    #[should_panic(expected = "nested inserted")]
    fn test_nested_inserted_marks_panic() {
        let mut doc = Document::parse_html(
            r#"<div data-parsoid='{}'><p data-parsoid='{}'><b data-parsoid='{}'>x</b></p></div>"#,
        )
        .unwrap();
        let div = doc.first_child(doc.body()).unwrap();
        let p = doc.first_child(div).unwrap();
        let b = doc.first_child(p).unwrap();
        doc.set_diff_mark(p, DiffMark::Inserted);
        doc.set_diff_mark(b, DiffMark::Inserted);
        let _ = Normalizer::new(&SelserConfig::EDIT, true).normalize(&mut doc);
    }
}
