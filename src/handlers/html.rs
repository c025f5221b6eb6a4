//! Literal HTML fallback.
//!
//! Anything without a wikitext handler (or marked as literal HTML in
//! source) is written back as HTML tags around serialized children.
//! Attributes are taken from source when the shadow info says they are
//! unchanged, and parser-generated attributes are dropped.

use std::sync::LazyLock;

use regex::Regex;

use super::TagHandler;
use crate::error::SelserResult;
use crate::node::predicates::{BLOCK_SCOPE_OPEN_TAGS, VOID_TAGS, heading_level, in_set};
use crate::node::{Document, NodeId};
use crate::render::escape_attr;
use crate::wts::WikitextSerializer;
use crate::wts::escape::escape_nowiki_tags;
use crate::wts::separators::SepConstraints;
use crate::wts::state::SerializerState;

/// The literal-HTML handler.
pub static HTML: TagHandler = TagHandler::new("html", handle_html)
    .with_before(html_before)
    .with_after(html_after);

/// Attributes that only carry parser data.
const IGNORED_ATTRIBUTES: &[&str] = &[
    "data-parsoid",
    "data-ve-changed",
    "data-parsoid-changed",
    "data-parsoid-diff",
    "data-parsoid-serialize",
    "data-mw",
];

static GENERATED_ABOUT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#mwt\d+$").expect("valid regex"));
static GENERATED_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^mw[\w-]{2,}$").expect("valid regex"));
static EMPTY_ELT_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bmw-empty-elt\b").expect("valid regex"));

fn handle_html(wts: &mut WikitextSerializer<'_>, node: NodeId, wrapper_unmodified: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let tag_name = doc.tag(node).unwrap_or_default();

    let start = serialize_html_tag(wts, node, wrapper_unmodified);
    if tag_name == "pre" {
        wts.state.in_html_pre = true;
    }
    emit_start_tag(&mut wts.state, &start, node);

    if doc.has_children(node) {
        let in_php_block = wts.state.in_php_block;
        if in_set(BLOCK_SCOPE_OPEN_TAGS, tag_name) {
            wts.state.in_php_block = true;
        }

        if tag_name == "pre" {
            // HTML parsing eats the first newline of a pre
            let lost_line = doc
                .first_child(node)
                .and_then(|c| doc.text(c))
                .is_some_and(|t| t.starts_with('\n'))
                || doc.dp(node).extra.contains_key("strippedNL");
            if lost_line {
                wts.state.emit_chunk("\n", node);
            }
        }

        let res = wts.serialize_children(node, None);
        wts.state.in_php_block = in_php_block;
        res?;
    }

    let end = serialize_html_end_tag(wts, node, wrapper_unmodified);
    if tag_name == "pre" {
        wts.state.in_html_pre = false;
    }
    emit_end_tag(&mut wts.state, &end, node);
    Ok(doc.next_sibling(node))
}

/// A new block-level tag goes on its own line.
fn html_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.is_new_elt(node) && doc.is_block_node(node) && doc.parent(node) != Some(other) {
        SepConstraints::at_least(1)
    } else {
        SepConstraints::NONE
    }
}

fn html_after(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.is_new_elt(node) && doc.is_block_node(node) && doc.parent(node) != Some(other) {
        SepConstraints::at_least(1)
    } else {
        SepConstraints::NONE
    }
}

// =============================================================================
// Tags
// =============================================================================

/// Emit start-tag text unless round-trip testing drops auto-inserted tags.
pub fn emit_start_tag(state: &mut SerializerState<'_>, src: &str, node: NodeId) {
    if !state.rt_test_mode || !state.doc.dp(node).auto_inserted_start {
        state.emit_chunk(src, node);
    }
}

pub fn emit_end_tag(state: &mut SerializerState<'_>, src: &str, node: NodeId) {
    if !state.rt_test_mode || !state.doc.dp(node).auto_inserted_end {
        state.emit_chunk(src, node);
    }
}

fn src_tag_name<'d>(doc: &'d Document, node: NodeId) -> &'d str {
    doc.dp(node)
        .extra
        .get("srcTagName")
        .and_then(|v| v.as_str())
        .or_else(|| doc.tag(node))
        .unwrap_or_default()
}

fn serialize_html_tag(wts: &WikitextSerializer<'_>, node: NodeId, wrapper_unmodified: bool) -> String {
    let doc = wts.state.doc;
    let dp = doc.dp(node);
    if wrapper_unmodified
        && let Some(dsr) = dp.dsr
        && let (Some(start), Some(width)) = (dsr.start, dsr.open_width)
    {
        return wts.state.get_orig_src(start, start + width).unwrap_or_default().to_string();
    }
    if dp.auto_inserted_start {
        return String::new();
    }

    let tag = doc.tag(node).unwrap_or_default();
    let no_close = dp.extra.get("noClose").is_some_and(|v| v.as_bool() == Some(true));
    let close = if (in_set(VOID_TAGS, tag) && !no_close) || dp.self_close {
        " /"
    } else {
        ""
    };
    let attrs = serialize_attributes(wts, node);
    let attrs = if attrs.is_empty() { attrs } else { format!(" {attrs}") };

    let name = src_tag_name(doc, node);
    let res = format!("<{name}{attrs}{close}>");
    if name.eq_ignore_ascii_case("nowiki") {
        escape_nowiki_tags(&res)
    } else {
        res
    }
}

fn serialize_html_end_tag(wts: &WikitextSerializer<'_>, node: NodeId, wrapper_unmodified: bool) -> String {
    let doc = wts.state.doc;
    let dp = doc.dp(node);
    if wrapper_unmodified
        && let Some(dsr) = dp.dsr
        && let (Some(end), Some(width)) = (dsr.end, dsr.close_width)
    {
        return wts.state.get_orig_src(end.saturating_sub(width), end).unwrap_or_default().to_string();
    }

    let tag = doc.tag(node).unwrap_or_default();
    if dp.auto_inserted_end || in_set(VOID_TAGS, tag) || dp.self_close {
        return String::new();
    }
    let name = src_tag_name(doc, node);
    let res = format!("</{name}>");
    if name.eq_ignore_ascii_case("nowiki") {
        escape_nowiki_tags(&res)
    } else {
        res
    }
}

// =============================================================================
// Attributes
// =============================================================================

/// Attribute text of `node` as it should appear in wikitext (`k="v" ...`).
pub fn serialize_attributes(wts: &WikitextSerializer<'_>, node: NodeId) -> String {
    let doc = wts.state.doc;
    let dp = doc.dp(node);
    let tag = doc.tag(node).unwrap_or_default();
    let mut out = Vec::new();

    for (k, v) in doc.attrs(node) {
        let k = k.as_str();
        if in_set(IGNORED_ATTRIBUTES, k) {
            continue;
        }

        let mut value = v.clone();
        if k == "class" {
            value = EMPTY_ELT_CLASS_RE.replace_all(&value, "").trim().to_string();
            if value.is_empty() {
                continue;
            }
        }
        if k == "about" && GENERATED_ABOUT_RE.is_match(&value) {
            continue;
        }
        if k == "typeof" {
            // Parser-assigned types go; author types stay
            let kept: Vec<_> = value.split_whitespace().filter(|w| !w.starts_with("mw:")).collect();
            if kept.is_empty() {
                continue;
            }
            value = kept.join(" ");
        }
        if k == "id" {
            let generated = GENERATED_ID_RE.is_match(&value)
                || (heading_level(tag).is_some() && !dp.extra.contains_key("reusedId"));
            if generated {
                continue;
            }
        }

        // Unchanged shadowed values come back as they were written
        match dp.shadow(k) {
            Some((Some(norm), Some(src))) if norm == value => out.push(format!("{k}=\"{src}\"")),
            _ => out.push(format!("{k}=\"{}\"", escape_attr(&value))),
        }
    }

    // Attributes the sanitizer removed
    for k in dp.a.keys() {
        if doc.attr(node, k).is_some() {
            continue;
        }
        match dp.sa.get(k).and_then(|v| v.as_str()).filter(|v| !v.is_empty()) {
            Some(src) => out.push(format!("{k}=\"{}\"", src.replace('"', "&quot;"))),
            None => out.push(k.clone()),
        }
    }

    out.join(" ")
}
