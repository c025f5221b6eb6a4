//! Separator constraints and separator synthesis.
//!
//! # Design
//!
//! Every adjacency the traversal crosses (parent to first child, last
//! child to parent, sibling to sibling) asks the two handlers how many
//! newlines they need between them. The answers are merged into the
//! pending constraint on the state and only resolved into text when the
//! next real content is emitted. Resolution tries, in order:
//!
//! 1. the original source between the two nodes, when still trustworthy
//! 2. a donor separator for a node inserted between unedited siblings
//! 3. whitespace the wikitext grammar trimmed from a parent's content
//! 4. the buffered separator text, padded or trimmed to the constraints
//!
//! and then makes the result safe against accidental indent-pres.
//!
//! # Conflicts
//!
//! Conflicts are not resolved symmetrically. Between the two handlers of
//! one adjacency, B's requirement wins. Between the pending constraint and
//! a newly collected one, the larger minimum wins, except that an unforced
//! pending constraint yields to a smaller nonzero minimum from the new one.

use std::collections::VecDeque;
use std::sync::LazyLock;

use log::{debug, info, trace};
use regex::Regex;

use crate::handlers::TagHandler;
use crate::node::predicates::{
    CHILD_TABLE_TAGS, SOL_SPACE_SENSITIVE_TAGS, STRONG_INDENT_PRE_SUPPRESSING_TAGS,
    WEAK_INDENT_PRE_SUPPRESSING_TAGS, WIKITEXT_TAGS_WITH_TRIMMABLE_WS, in_set,
};
use crate::node::{Document, NodeId, NodeKind};
use crate::span::SourceRange;

use super::state::SerializerState;
use super::utils::{
    COMMENT_PATTERN, comment_wt, decoded_comment_len, indent_pre_dsr_correction, is_unedited,
    is_valid_sep, next_to_deleted_block_node_in_wt, orig_src_valid_in_edited_context,
    preceding_space_suppresses_indent_pre,
};

/// Newlines allowed when no handler says otherwise; a third one would
/// start a new paragraph.
pub const DEFAULT_MAX_NLS: usize = 2;

static COMMENT_AT_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{COMMENT_PATTERN}")).expect("valid regex"));

/// Spaces, then optionally a comment and the rest of the line, at the end.
static WS_COMMENTS_SEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"( +)({COMMENT_PATTERN}[^\n]*)?$")).expect("valid regex")
});

static NL_WS_COMMENTS_SEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\n+( +)({COMMENT_PATTERN}[^\n]*)?$")).expect("valid regex")
});

static LEADING_NEWLINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*\n+").expect("valid regex"));

// =============================================================================
// Constraint types
// =============================================================================

/// How the two nodes of an adjacency relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SepType {
    Sibling,
    /// A is the parent of B
    ParentChild,
    /// B is the parent of A
    ChildParent,
}

/// Where a pending constraint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintInfo {
    /// SOL state when the constraint was collected
    pub on_sol: bool,
    /// B's handler wants to start on a fresh line
    pub force_sol: bool,
    pub sep_type: SepType,
    pub node_a: NodeId,
    pub node_b: NodeId,
}

/// Newline requirements between two nodes. `None` means "no opinion".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SepConstraints {
    pub min: Option<usize>,
    pub max: Option<usize>,
    pub force: bool,
    pub info: Option<ConstraintInfo>,
}

impl SepConstraints {
    /// No requirement either way.
    pub const NONE: Self = Self {
        min: None,
        max: None,
        force: false,
        info: None,
    };

    pub const fn new(min: usize, max: usize) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            force: false,
            info: None,
        }
    }

    pub const fn at_least(min: usize) -> Self {
        Self {
            min: Some(min),
            max: None,
            force: false,
            info: None,
        }
    }

    pub const fn at_most(max: usize) -> Self {
        Self {
            min: None,
            max: Some(max),
            force: false,
            info: None,
        }
    }

    /// Make this constraint win later merge conflicts.
    pub const fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

// =============================================================================
// Combining constraints
// =============================================================================

/// Combine the constraints two handlers report for one adjacency.
///
/// On conflict B wins.
pub fn get_sep_nl_constraints(
    doc: &Document,
    node_a: NodeId,
    a: &SepConstraints,
    node_b: NodeId,
    b: &SepConstraints,
) -> SepConstraints {
    let mut nl = SepConstraints {
        min: a.min,
        max: a.max,
        force: a.force || b.force,
        info: None,
    };

    if let Some(b_min) = b.min {
        if nl.max.is_some_and(|max| max < b_min) {
            info!(
                target: "selser::sep",
                "incompatible constraints 1: {} {} {:?}",
                doc.name(node_a),
                doc.name(node_b),
                (nl.min, nl.max)
            );
            nl.min = Some(b_min);
            nl.max = Some(b_min);
        } else {
            nl.min = Some(nl.min.unwrap_or(0).max(b_min));
        }
    }

    if let Some(b_max) = b.max {
        if nl.min.is_some_and(|min| min > b_max) {
            info!(
                target: "selser::sep",
                "incompatible constraints 2: {} {} {:?}",
                doc.name(node_a),
                doc.name(node_b),
                (nl.min, nl.max)
            );
            nl.min = Some(b_max);
            nl.max = Some(b_max);
        } else {
            nl.max = Some(nl.max.map_or(b_max, |max| max.min(b_max)));
        }
    }

    if nl.max.is_none() {
        nl.max = Some(DEFAULT_MAX_NLS);
    }
    nl
}

/// Merge a newly collected constraint into the pending one.
///
/// Conflicts collapse to a single count. Argument order matters.
pub fn merge_constraints(old: &SepConstraints, new: &SepConstraints) -> SepConstraints {
    let mut res = SepConstraints {
        min: Some(old.min.unwrap_or(0).max(new.min.unwrap_or(0))),
        max: Some(
            old.max
                .unwrap_or(DEFAULT_MAX_NLS)
                .min(new.max.unwrap_or(DEFAULT_MAX_NLS)),
        ),
        force: old.force || new.force,
        info: None,
    };

    let (min, max) = (res.min.unwrap_or(0), res.max.unwrap_or(DEFAULT_MAX_NLS));
    if min > max {
        if !old.force {
            if new.max.is_some_and(|m| m > min) {
                res.max = new.max;
            } else if new.min.is_some_and(|m| m > 0 && m < min) {
                res.min = new.min;
            }
        }
        res.max = res.min;
        debug!(
            target: "selser::sep",
            "incompatible constraints (merge): {:?} {:?} {:?}",
            (res.min, res.max),
            (old.min, old.max, old.force),
            (new.min, new.max, new.force)
        );
    }
    res
}

/// Collect the constraints for the adjacency `node_a` / `node_b` and fold
/// them into the state's pending constraint.
pub fn update_separator_constraints(
    state: &mut SerializerState<'_>,
    node_a: NodeId,
    handler_a: &TagHandler,
    node_b: NodeId,
    handler_b: &TagHandler,
) {
    let doc = state.doc;
    let (sep_type, a_cons, b_cons) = if doc.parent(node_b) == Some(node_a) {
        (
            SepType::ParentChild,
            (handler_a.first_child)(doc, node_a, node_b, state),
            (handler_b.before)(doc, node_b, node_a, state),
        )
    } else if doc.parent(node_a) == Some(node_b) {
        (
            SepType::ChildParent,
            (handler_a.after)(doc, node_a, node_b, state),
            (handler_b.last_child)(doc, node_b, node_a, state),
        )
    } else {
        (
            SepType::Sibling,
            (handler_a.after)(doc, node_a, node_b, state),
            (handler_b.before)(doc, node_b, node_a, state),
        )
    };

    let nl = get_sep_nl_constraints(doc, node_a, &a_cons, node_b, &b_cons);
    let mut merged = match &state.sep.constraints {
        Some(old) => merge_constraints(old, &nl),
        None => nl,
    };

    trace!(
        target: "selser::sep",
        "constraint | {sep_type:?} | <{},{}> | {:?}",
        doc.name(node_a),
        doc.name(node_b),
        (merged.min, merged.max, merged.force)
    );

    merged.info = Some(ConstraintInfo {
        on_sol: state.on_sol,
        force_sol: handler_b.force_sol,
        sep_type,
        node_a,
        node_b,
    });
    state.sep.constraints = Some(merged);
}

// =============================================================================
// Separator text
// =============================================================================

/// A piece of separator text: plain whitespace, or a comment (or a run
/// of comment-only lines) whose newlines don't count.
#[derive(Debug, Clone)]
struct SepBit {
    text: String,
    comment: bool,
}

/// Length of a run of `\n`-prefixed lines holding only comments and
/// blanks, when the run is followed by a newline.
fn comment_line_run_len(s: &str) -> Option<usize> {
    let mut pos = 0;
    let mut run = None;
    while s[pos..].starts_with('\n') {
        let mut p = pos + 1;
        let mut saw_comment = false;
        loop {
            let rest = &s[p..];
            let trimmed = rest.trim_start_matches([' ', '\t']);
            p += rest.len() - trimmed.len();
            match COMMENT_AT_START_RE.find(trimmed) {
                Some(m) => {
                    p += m.end();
                    saw_comment = true;
                }
                None => break,
            }
        }
        if !saw_comment || !s[p..].starts_with('\n') {
            break;
        }
        pos = p;
        run = Some(p);
    }
    run
}

fn split_sep_bits(sep: &str) -> Vec<SepBit> {
    let mut bits = Vec::new();
    let mut text_start = 0;
    let mut i = 0;
    while i < sep.len() {
        let rest = &sep[i..];
        let matched = comment_line_run_len(rest)
            .or_else(|| COMMENT_AT_START_RE.find(rest).map(|m| m.end()));
        match matched {
            Some(len) if len > 0 => {
                if text_start < i {
                    bits.push(SepBit {
                        text: sep[text_start..i].to_string(),
                        comment: false,
                    });
                }
                bits.push(SepBit {
                    text: rest[..len].to_string(),
                    comment: true,
                });
                i += len;
                text_start = i;
            }
            _ => i += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    if text_start < sep.len() {
        bits.push(SepBit {
            text: sep[text_start..].to_string(),
            comment: false,
        });
    }
    bits
}

/// Newlines outside comments and comment-only lines
fn count_sep_newlines(bits: &[SepBit]) -> usize {
    bits.iter()
        .filter(|b| !b.comment)
        .map(|b| b.text.matches('\n').count())
        .sum()
}

/// Drop newlines outside comments until only `max` remain, working
/// inwards from one end.
fn trim_sep_newlines(bits: Vec<SepBit>, mut n: usize, max: usize, from_start: bool) -> String {
    let mut rest: VecDeque<SepBit> = bits.into();
    let mut done: Vec<SepBit> = Vec::new();
    let take = |rest: &mut VecDeque<SepBit>| {
        if from_start {
            rest.pop_front()
        } else {
            rest.pop_back()
        }
    };

    'outer: while n > max {
        let Some(mut bit) = take(&mut rest) else {
            break;
        };
        while bit.comment {
            done.push(bit);
            match take(&mut rest) {
                Some(next) => bit = next,
                None => break 'outer,
            }
        }
        while n > max && bit.text.contains('\n') {
            bit.text = bit.text.replacen('\n', "", 1);
            n -= 1;
        }
        done.push(bit);
    }

    let mut out = String::new();
    if from_start {
        done.iter().chain(rest.iter()).for_each(|b| out.push_str(&b.text));
    } else {
        rest.iter().chain(done.iter().rev()).for_each(|b| out.push_str(&b.text));
    }
    out
}

/// Pad or trim the buffered separator text to satisfy `nl`.
pub fn make_separator(state: &SerializerState<'_>, sep: &str, nl: &SepConstraints) -> String {
    let doc = state.doc;
    let bits = split_sep_bits(sep);
    let sep_nl_count = count_sep_newlines(&bits);
    let mut min_nls = nl.min.unwrap_or(0);

    if state.at_start_of_output && min_nls > 0 {
        // Start of output is already a line start
        min_nls -= 1;
    }

    let out = if min_nls > 0 && sep_nl_count < min_nls {
        let pad = "\n".repeat(min_nls - sep_nl_count);
        let prepend = match nl.info {
            Some(ci) if ci.sep_type == SepType::ParentChild => {
                // Newlines belong to the parent when its first child contributed to the separator
                !doc
                    .first_non_deleted_child(ci.node_a)
                    .is_some_and(|c| doc.is_content_node(c))
                    && !(doc.tag(ci.node_b).is_some_and(|t| in_set(CHILD_TABLE_TAGS, t))
                        && !doc.is_literal_html(ci.node_b))
            }
            Some(ci) if ci.sep_type == SepType::Sibling => doc.is_literal_html(ci.node_b),
            _ => false,
        };
        if prepend {
            format!("{pad}{sep}")
        } else {
            format!("{sep}{pad}")
        }
    } else if let Some(max) = nl.max
        && sep_nl_count > max
    {
        let from_start = state.selser_mode
            && nl.info.is_some_and(|ci| {
                is_unedited(doc, ci.node_b) && !is_unedited(doc, ci.node_a)
            });
        trim_sep_newlines(bits, sep_nl_count, max, from_start)
    } else {
        sep.to_string()
    };

    debug!(
        target: "selser::sep",
        "make-new   | {out:?}, {sep:?}, {min_nls}, {sep_nl_count}, {:?}",
        (nl.min, nl.max, nl.force)
    );
    out
}

/// Keep the separator's trailing spaces from starting an indent-pre.
pub fn make_sep_indent_pre_safe(
    state: &mut SerializerState<'_>,
    sep: String,
    nl: &SepConstraints,
) -> String {
    let doc = state.doc;
    let info = nl.info;
    let sep_type = info.map(|ci| ci.sep_type);
    let node_a = info.map(|ci| ci.node_a);
    let orig_b = info.map(|ci| ci.node_b);
    let on_sol = info.is_some_and(|ci| ci.on_sol);
    let force_sol = info.is_some_and(|ci| ci.force_sol && ci.sep_type != SepType::ChildParent);

    if state.in_php_block
        || state.in_indent_pre
        || !(NL_WS_COMMENTS_SEP_RE.is_match(&sep)
            || (WS_COMMENTS_SEP_RE.is_match(&sep) && (on_sol || force_sol)))
    {
        return sep;
    }

    let mut node_b = orig_b;
    let mut safe = false;
    if let (Some(b), Some(ob)) = (node_b, orig_b)
        && preceding_space_suppresses_indent_pre(doc, b, ob)
    {
        safe = true;
    } else if sep_type == Some(SepType::Sibling) || node_a.is_some_and(|a| doc.at_the_top(a)) {
        // Walk past sol-transparent siblings until safety is established
        while let Some(b) = node_b
            && (doc.is_diff_marker(b, None) || doc.emits_sol_transparent_single_line_wt(b))
        {
            node_b = doc.next_sibling(b);
        }
        safe = match (node_b, orig_b) {
            (Some(b), Some(ob)) => preceding_space_suppresses_indent_pre(doc, b, ob),
            _ => true,
        };
    }

    if let Some(b) = node_b
        && !doc.at_the_top(b)
    {
        let mut parent_b = doc.parent(b);
        while let Some(p) = parent_b
            && doc.is_zero_width_wikitext_elt(p)
        {
            parent_b = doc.parent(p);
        }
        if parent_b
            .and_then(|p| doc.tag(p))
            .is_some_and(|t| in_set(WEAK_INDENT_PRE_SUPPRESSING_TAGS, t))
        {
            safe = true;
        } else {
            while let Some(p) = parent_b
                && !doc.at_the_top(p)
            {
                if doc.tag(p).is_some_and(|t| in_set(STRONG_INDENT_PRE_SUPPRESSING_TAGS, t))
                    && (!doc.is_tag(p, "p") || doc.is_literal_html(p))
                {
                    safe = true;
                }
                parent_b = doc.parent(p);
            }
        }
    }

    let strip = (on_sol || force_sol)
        && node_b
            .and_then(|b| doc.tag(b))
            .is_some_and(|t| in_set(SOL_SPACE_SENSITIVE_TAGS, t));

    let mut out = sep;
    if !safe || strip {
        let replaced = WS_COMMENTS_SEP_RE
            .replace(&out, |caps: &regex::Captures<'_>| {
                let rest = caps.get(2).map_or("", |m| m.as_str());
                if strip {
                    rest.to_string()
                } else {
                    format!("<nowiki>{}</nowiki>{rest}", &caps[1])
                }
            })
            .into_owned();
        if !strip && replaced != out {
            // Nowiki-ed spaces are content, no longer SOL
            state.on_sol = false;
            state.has_indent_pre_nowikis = true;
        }
        out = replaced;
    }

    debug!(target: "selser::sep", "ipre-safe  | {out:?}, {:?}", (nl.min, nl.max));
    out
}

// =============================================================================
// Source-derived separators
// =============================================================================

/// Source range with auto-inserted tag widths unknown
fn handle_auto_inserted(doc: &Document, id: NodeId) -> Option<SourceRange> {
    doc.dp(id).dsr_without_auto_inserted()
}

/// Whitespace and comments before `node` among its siblings; `None` when
/// other content precedes it.
fn preceding_separator_txt(doc: &Document, node: NodeId) -> Option<String> {
    let mut buf = String::new();
    let mut cur = Some(node);
    while let Some(n) = cur {
        match doc.kind(n) {
            NodeKind::Text(t) if doc.is_iew(n) => buf.push_str(t),
            NodeKind::Comment(c) => buf.push_str(&comment_wt(c)),
            _ if n != node => return None,
            _ => {}
        }
        cur = doc.prev_sibling(n);
    }
    Some(buf)
}

/// Original source between `prev` and `node`, from their source ranges.
fn orig_sep_between(state: &SerializerState<'_>, prev: NodeId, node: NodeId) -> Option<String> {
    let doc = state.doc;

    let dsr_a = if doc.is_element(prev) {
        handle_auto_inserted(doc, prev)
    } else {
        let parent = doc.parent(prev);
        let prev_prev = doc.prev_sibling(prev);
        if doc.next_sibling(prev).is_none()
            && let Some(p) = parent
            && p != node
            && doc.dp(p).dsr.is_some_and(|d| d.close_width == Some(0))
        {
            // Last child of a zero-width element: use the parent
            handle_auto_inserted(doc, p)
        } else if let Some(pp) = prev_prev
            && doc.is_element(pp)
            && let Some(end) = doc.dp(pp).dsr.and_then(|d| d.end)
            && !doc.parent(node).is_some_and(|p| doc.direct_children_changed(p))
        {
            // Extrapolate from the preceding element
            let width = match doc.kind(prev) {
                NodeKind::Comment(c) => decoded_comment_len(c),
                NodeKind::Text(t) => t.len(),
                NodeKind::Element(_) => 0,
            };
            let width = width + indent_pre_dsr_correction(doc, prev);
            Some(SourceRange::new(end, end + width, 0, 0))
        } else {
            None
        }
    }?;

    let dsr_b = if doc.is_element(node) {
        let mut n = node;
        if doc.parent(prev) == Some(node) {
            // Closing a parent without a usable range: climb to one that has it
            while doc.next_sibling(n).is_none()
                && !doc.at_the_top(n)
                && doc
                    .dp(n)
                    .dsr
                    .is_none_or(|d| d.start.is_none() || d.end.is_none())
            {
                n = doc.parent(n)?;
            }
        }
        handle_auto_inserted(doc, n)
    } else {
        let parent = doc.parent(node)?;
        let parent_dsr = doc.dp(parent).dsr?;
        if parent != prev && parent_dsr.open_width == Some(0) {
            // Child of a zero-width element preceded only by separators
            let sep_txt = preceding_separator_txt(doc, node)?;
            let mut dsr = parent_dsr;
            if let Some(start) = dsr.start
                && !sep_txt.is_empty()
            {
                dsr.start = Some(start + sep_txt.len());
            }
            Some(dsr)
        } else {
            None
        }
    }?;

    if !dsr_a.is_valid() || !dsr_b.is_valid() {
        return None;
    }
    let (a0, a1) = (dsr_a.start?, dsr_a.end?);
    let (b0, b1) = (dsr_b.start?, dsr_b.end?);

    let range = if a0 <= b0 {
        if b1 <= a1 {
            if a0 == b0 && a1 == b1 {
                // Same range: nothing between them
                return Some(String::new());
            }
            // B inside A
            dsr_a.open_width.map(|w| (a0 + w, b0))
        } else if a1 <= b0 {
            Some((a1, b0))
        } else {
            // A inside B
            dsr_b.close_width.and_then(|w| b1.checked_sub(w)).map(|e| (a1, e))
        }
    } else if a1 <= b1 {
        dsr_b.close_width.and_then(|w| b1.checked_sub(w)).map(|e| (a1, e))
    } else {
        info!(target: "selser::sep", "dsr backwards: should not happen!");
        None
    }?;

    state.get_orig_src(range.0, range.1).map(str::to_string)
}

/// Separator between two unedited siblings that now enclose the inserted `node`.
fn donor_sep(state: &SerializerState<'_>, prev: NodeId, node: NodeId) -> Option<String> {
    let doc = state.doc;
    let inserted = doc.is_new_elt(node) || doc.has_inserted_diff_mark(node);
    if !inserted
        || doc.parent(prev) != doc.parent(node)
        || !doc.is_element(prev)
        || !is_unedited(doc, prev)
    {
        return None;
    }
    let next = doc.next_non_sep_sibling(node)?;
    if !doc.is_element(next) || !is_unedited(doc, next) {
        return None;
    }
    let start = doc.dp(prev).dsr?.end?;
    let end = doc.dp(next).dsr?.start?;
    if start > end {
        return None;
    }
    let sep = state.get_orig_src(start, end)?;
    is_valid_sep(sep).then(|| sep.to_string())
}

/// Source range of `node`'s parent when the grammar trims whitespace
/// inside it and `node` sits at the trimmed edge.
fn trimmable_parent_dsr(state: &SerializerState<'_>, node: NodeId, leading: bool) -> Option<SourceRange> {
    let doc = state.doc;
    let at_edge = if leading {
        doc.previous_non_sep_sibling(node).is_none()
    } else {
        doc.next_non_sep_sibling(node).is_none()
    };
    if !at_edge {
        return None;
    }
    let parent = doc.parent(node)?;
    if !doc.tag(parent).is_some_and(|t| in_set(WIKITEXT_TAGS_WITH_TRIMMABLE_WS, t)) {
        return None;
    }
    // Text that keeps its own edge space needs nothing recovered
    if let Some(text) = doc.text(node) {
        let keeps_space = if leading {
            text.starts_with([' ', '\t'])
        } else {
            text.ends_with([' ', '\t'])
        };
        if keeps_space {
            return None;
        }
    }
    doc.dp(parent).dsr.filter(SourceRange::is_fully_valid)
}

/// Whitespace trimmed between the parent's opening syntax and its first
/// child `node`.
pub fn leading_trimmed_space(state: &SerializerState<'_>, node: NodeId) -> Option<String> {
    let doc = state.doc;
    let dsr = trimmable_parent_dsr(state, node, true)?;
    if doc.is_element(node)
        && doc.dp(node).auto_inserted_start
        && doc
            .first_child(node)
            .is_some_and(|c| doc.text_content(c).starts_with([' ', '\t']))
    {
        return None;
    }
    let (inner_start, inner_end) = (dsr.inner_start()?, dsr.inner_end()?);
    if inner_start >= inner_end {
        return None;
    }
    let ch = state.get_orig_src(inner_start, inner_start + 1)?;
    matches!(ch, " " | "\t").then(|| ch.to_string())
}

/// Whitespace trimmed between the last child `node` and its parent's
/// closing syntax.
pub fn trailing_trimmed_space(state: &SerializerState<'_>, node: NodeId) -> Option<String> {
    let dsr = trimmable_parent_dsr(state, node, false)?;
    let offset = dsr.inner_end()?.checked_sub(1)?;
    // `= =`: that single space was already claimed as leading space
    if offset <= dsr.inner_start()? {
        return None;
    }
    let ch = state.get_orig_src(offset, offset + 1)?;
    matches!(ch, " " | "\t").then(|| ch.to_string())
}

/// Recover trimmed whitespace for the adjacency the pending constraint
/// describes, splicing it into the buffered separator text.
fn recover_trimmed_ws(state: &mut SerializerState<'_>, node: NodeId) -> Option<String> {
    if !state.selser_mode || !state.config.use_whitespace_heuristics {
        return None;
    }
    let sep_type = state.sep.constraints.and_then(|c| c.info).map(|ci| ci.sep_type);
    match sep_type {
        Some(SepType::ParentChild) => {
            let ws = leading_trimmed_space(state, node)?;
            state.sep.src.insert_str(0, &ws);
            Some(ws)
        }
        Some(SepType::ChildParent) => {
            let last = state.doc.last_non_deleted_child(node)?;
            let ws = trailing_trimmed_space(state, last)?;
            state.sep.src.push_str(&ws);
            Some(ws)
        }
        _ => None,
    }
}

/// Resolve the separator to emit before `node`.
pub fn build_sep(state: &mut SerializerState<'_>, node: NodeId) -> Option<String> {
    let doc = state.doc;
    let prev = state.sep.last_source_node;
    let mut sep = None;

    if let Some(prev) = prev
        && prev != node
        && state.selser_mode
    {
        let orig_usable = !state.in_modified_content
            && !next_to_deleted_block_node_in_wt(doc, Some(prev), true)
            && !next_to_deleted_block_node_in_wt(doc, Some(node), false)
            && orig_src_valid_in_edited_context(doc, prev)
            && orig_src_valid_in_edited_context(doc, node);
        if orig_usable {
            sep = orig_sep_between(state, prev, node);
        }
        if sep.is_none() {
            sep = donor_sep(state, prev, node);
        }
    }
    if sep.is_none() {
        sep = recover_trimmed_ws(state, node);
    }

    debug!(
        target: "selser::sep",
        "maybe-sep  | prev:{}, node:{}, sep: {sep:?}, state.sep.src: {:?}",
        prev.map_or_else(|| "--none--".to_string(), |p| doc.name(p).to_string()),
        doc.name(node),
        state.sep.src
    );

    let constraints = state.sep.constraints.unwrap_or(SepConstraints::at_most(0));
    let needs_synthesis = match &sep {
        None => true,
        Some(s) => !is_valid_sep(s) || (!state.sep.src.is_empty() && state.sep.src != *s),
    };
    if needs_synthesis {
        sep = if state.sep.constraints.is_some() || !state.sep.src.is_empty() {
            let src = state.sep.src.clone();
            Some(make_separator(state, &src, &constraints))
        } else {
            None
        };
    }

    sep.map(|s| make_sep_indent_pre_safe(state, s, &constraints))
}

/// Buffer whitespace-only text as separator source.
///
/// Returns `true` when the node was consumed. Leading newlines of other
/// text are buffered too, but the node still needs serializing.
pub fn handle_separator_text(state: &mut SerializerState<'_>, node: NodeId) -> bool {
    if state.in_indent_pre {
        return false;
    }
    let Some(text) = state.doc.text(node) else {
        return false;
    };
    if text.chars().all(char::is_whitespace) {
        state.sep.src.push_str(text);
        // Still at SOL: the whitespace is waiting to be emitted
        if state.sep.src.contains('\n') {
            state.on_sol = true;
        }
        true
    } else {
        if let Some(m) = LEADING_NEWLINES_RE.find(text) {
            state.sep.src.push_str(m.as_str());
        }
        false
    }
}
