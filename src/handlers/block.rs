//! Block-level handlers: `body`, `p`, `br`, `hr`, `pre`, `meta`.

use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;

use super::{TagHandler, emit_placeholder_src, html};
use crate::error::SelserResult;
use crate::node::predicates::{HTML_TAGS_REQUIRING_SOL_CONTEXT, in_set};
use crate::node::{Document, NodeId};
use crate::wts::WikitextSerializer;
use crate::wts::separators::SepConstraints;
use crate::wts::state::SerializerState;
use crate::wts::utils::COMMENT_PATTERN;

pub const HANDLERS: &[TagHandler] = &[
    TagHandler::new("body", handle_body),
    TagHandler::new("p", handle_p).with_before(p_before).with_after(p_after),
    TagHandler::new("br", handle_br).with_before(br_before).with_after(br_after),
    TagHandler::new("hr", handle_hr)
        .with_before(hr_before)
        .with_after(hr_after)
        .forcing_sol(),
    TagHandler::new("pre", handle_pre)
        .with_before(pre_sep)
        .with_after(pre_sep)
        .forcing_sol(),
    TagHandler::new("meta", handle_meta).with_before(meta_before).with_after(meta_after),
];

static NEWLINE_NON_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\S").expect("valid regex"));

fn handle_body(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    wts.serialize_children(node, None)?;
    Ok(wts.state.doc.next_sibling(node))
}

// =============================================================================
// Paragraphs
// =============================================================================

fn handle_p(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    wts.serialize_children(node, None)?;
    Ok(wts.state.doc.next_sibling(node))
}

/// Newlines between two paragraphs, or a paragraph and a block; one less
/// inside a figure caption.
fn pp_constraints(doc: &Document, node: NodeId) -> SepConstraints {
    if doc.has_ancestor_of_name(node, "figcaption") {
        SepConstraints::new(0, 2)
    } else {
        SepConstraints::new(1, 2)
    }
}

fn p_before(doc: &Document, node: NodeId, other: NodeId, state: &SerializerState<'_>) -> SepConstraints {
    if doc.parent(node) == Some(other) {
        if doc.is_list_item(other) {
            return SepConstraints::new(0, 0);
        }
        if matches!(doc.tag(other), Some("td" | "th" | "body")) {
            return SepConstraints::new(0, 1);
        }
    }

    let prev_p = doc.previous_non_deleted_sibling(node) == Some(other)
        && doc.is_tag(other, "p")
        && !doc.is_literal_html(other);
    let inline_run_before = treat_as_pp_transition(doc, other)
        && doc.previous_non_sep_sibling(node) == Some(other)
        && !curr_wikitext_line_has_block_node(doc, state, other, false);

    if prev_p || inline_run_before {
        SepConstraints::new(2, 2)
    } else if treat_as_pp_transition(doc, other)
        || (doc.is_block_node(other) && !doc.is_tag(other, "blockquote") && doc.parent(node) == Some(other))
        || (doc.emits_sol_transparent_single_line_wt(other) && doc.is_new_elt(node))
    {
        pp_constraints(doc, node)
    } else {
        SepConstraints::new(0, 2)
    }
}

fn p_after(doc: &Document, node: NodeId, other: NodeId, state: &SerializerState<'_>) -> SepConstraints {
    let ends_in_br = doc.last_child(node).is_some_and(|c| doc.is_tag(c, "br"));
    if !ends_in_br
        && is_pp_transition(doc, other)
        && !curr_wikitext_line_has_block_node(doc, state, node, true)
        && !new_wikitext_line_might_have_block_node(doc, other)
    {
        SepConstraints::new(2, 2)
    } else if doc.is_body(other) {
        SepConstraints::new(0, 2)
    } else if treat_as_pp_transition(doc, other)
        || (doc.is_block_node(other) && !doc.is_tag(other, "blockquote") && doc.parent(node) == Some(other))
    {
        pp_constraints(doc, node)
    } else {
        SepConstraints::new(0, 2)
    }
}

/// Inline content that the wikitext parser would fold into a paragraph.
fn treat_as_pp_transition(doc: &Document, node: NodeId) -> bool {
    if doc.is_text(node) || doc.is_comment(node) {
        return true;
    }
    !doc.is_body(node)
        && !doc.is_block_node(node)
        && !doc.is_literal_html(node)
        && !doc.is_encapsulation_wrapper(node)
        && !doc.is_sol_transparent_link(node)
        && !doc
            .attr(node, "typeof")
            .is_some_and(|t| t.starts_with("mw:Includes/"))
}

fn is_pp_transition(doc: &Document, node: NodeId) -> bool {
    (doc.is_tag(node, "p") && !doc.is_literal_html(node)) || treat_as_pp_transition(doc, node)
}

/// Does the wikitext line `node` sits on already contain a block?
fn curr_wikitext_line_has_block_node(
    doc: &Document,
    state: &SerializerState<'_>,
    node: NodeId,
    skip_node: bool,
) -> bool {
    if !skip_node && NEWLINE_NON_SPACE_RE.is_match(&doc.text_content(node)) {
        return false;
    }

    let first_on_line = state.curr_line.first_node;
    let mut cur = doc.previous_non_deleted_sibling(node);
    let mut parent = doc.parent(node);
    loop {
        while let Some(c) = cur {
            if doc.is_block_node_with_visible_wt(c) {
                return true;
            }
            if doc.text_content(c).contains('\n') {
                return false;
            }
            cur = doc.previous_non_deleted_sibling(c);
            if let (Some(c), Some(first)) = (cur, first_on_line)
                && doc.contains(c, first)
            {
                return false;
            }
        }

        match parent {
            Some(p) if !doc.at_the_top(p) => {
                cur = Some(p);
                parent = doc.parent(p);
            }
            _ => return false,
        }
    }
}

/// Could the line started after `node` contain a block?
fn new_wikitext_line_might_have_block_node(doc: &Document, node: NodeId) -> bool {
    let mut cur = doc.next_non_deleted_sibling(node);
    while let Some(c) = cur {
        if doc.is_text(c) {
            if doc.text(c).is_some_and(|t| t.contains('\n')) {
                return false;
            }
        } else if doc.is_element(c) {
            let sol_tag = doc.tag(c).is_some_and(|t| in_set(HTML_TAGS_REQUIRING_SOL_CONTEXT, t));
            if sol_tag && !doc.is_literal_html(c) {
                return false;
            }
            return doc.is_block_node_with_visible_wt(c);
        }
        cur = doc.next_non_deleted_sibling(c);
    }
    false
}

// =============================================================================
// Line breaks and rules
// =============================================================================

fn handle_br(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let in_p = doc.parent(node).is_some_and(|p| doc.is_tag(p, "p"));
    if in_p && !wts.state.single_line_context.enforced() {
        // Paragraph-internal break: the separator carries it
        wts.state.emit_chunk("", node);
    } else {
        wts.state.emit_chunk("<br />", node);
    }
    Ok(doc.next_sibling(node))
}

fn br_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.parent(node) == Some(other) && doc.is_tag(other, "p") {
        SepConstraints::new(1, 2)
    } else {
        SepConstraints::NONE
    }
}

fn br_after(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    // List items can't hold line breaks
    if doc.parent(node).is_some_and(|p| doc.is_list_item(p)) {
        return SepConstraints::NONE;
    }
    let other_is_html = doc.is_element(other) && (doc.dp(other).is_html() || doc.dp(other).src.is_some());
    if other_is_html {
        SepConstraints::new(0, 2)
    } else {
        SepConstraints::new(1, 2)
    }
}

fn handle_hr(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let extra = doc
        .dp(node)
        .extra
        .get("extra_dashes")
        .and_then(|v| v.as_u64())
        .map_or(0, |n| usize::try_from(n).unwrap_or(0));
    wts.state.emit_chunk(&"-".repeat(4 + extra), node);
    Ok(doc.next_sibling(node))
}

fn hr_before(_: &Document, _: NodeId, _: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    SepConstraints::new(1, 2)
}

fn hr_after(doc: &Document, node: NodeId, _: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    // `----foo` keeps its text on the rule's line
    if doc.dp(node).extra.contains_key("lineContent") {
        SepConstraints::new(0, 2)
    } else {
        SepConstraints::new(1, 2)
    }
}

// =============================================================================
// Indent-pre
// =============================================================================

static PRE_SOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(\n(?:{COMMENT_PATTERN})*)")).expect("valid regex"));
static PRE_COMMENT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?m)^ ((?:[ \t]*{COMMENT_PATTERN}[ \t]*)+)$")).expect("valid regex")
});

fn handle_pre(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    let content = wts.serialize_indent_pre_children_to_string(node, None)?;
    let (content, trailing_nl) = match content.strip_suffix('\n') {
        Some(c) => (c.to_string(), "\n"),
        None => (content, ""),
    };

    let indented = format!(" {}", PRE_SOL_RE.replace_all(&content, "${1} "));
    // Comment-only lines pass through the parser untouched
    let indented = PRE_COMMENT_LINE_RE.replace(&indented, "$1");

    wts.state.emit_chunk(&indented, node);
    wts.state.append_sep(trailing_nl);
    Ok(wts.state.doc.next_sibling(node))
}

fn pre_sep(doc: &Document, _: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.is_tag(other, "pre") && !doc.is_literal_html(other) {
        SepConstraints::at_least(2)
    } else {
        SepConstraints::at_least(1)
    }
}

// =============================================================================
// Metas
// =============================================================================

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)mw:Placeholder(?:/\w*)?$").expect("valid regex"));

fn handle_meta(wts: &mut WikitextSerializer<'_>, node: NodeId, unmodified: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let dp = doc.dp(node);
    let type_of = doc.attr(node, "typeof").unwrap_or_default();
    let next = doc.next_sibling(node);

    if dp.src.is_some() && PLACEHOLDER_RE.is_match(type_of) {
        emit_placeholder_src(wts, node);
        return Ok(next);
    }

    if let Some(property) = doc.attr(node, "property") {
        let Some(switch) = property.strip_prefix("mw:PageProp/") else {
            return (html::HTML.handle)(wts, node, unmodified);
        };
        let out = page_prop_wt(doc, node, switch);
        wts.state.emit_chunk(&out, node);
        return Ok(next);
    }

    let include_src = |default: &str| dp.src.clone().unwrap_or_else(|| default.to_string());
    let out = match type_of {
        "" => return (html::HTML.handle)(wts, node, unmodified),
        "mw:Includes/IncludeOnly" => doc
            .data_mw(node)
            .and_then(|v| v.get("src"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        "mw:Includes/IncludeOnly/End" | "mw:Separator" => return Ok(next),
        "mw:Includes/NoInclude" => include_src("<noinclude>"),
        "mw:Includes/NoInclude/End" => include_src("</noinclude>"),
        "mw:Includes/OnlyInclude" => include_src("<onlyinclude>"),
        "mw:Includes/OnlyInclude/End" => include_src("</onlyinclude>"),
        _ => return (html::HTML.handle)(wts, node, unmodified),
    };
    wts.state.emit_chunk(&out, node);
    Ok(next)
}

/// Wikitext of a page property: a behavior switch, or a sort-key magic word.
fn page_prop_wt(doc: &Document, node: NodeId, switch: &str) -> String {
    let dp = doc.dp(node);
    let key = switch.strip_prefix("category").unwrap_or(switch);
    if key == "defaultsort" || key == "displaytitle" {
        let content = doc.attr(node, "content").unwrap_or_default();
        return match dp.src.as_deref().and_then(|src| src.split_once(':')) {
            Some((name, _)) => format!("{name}:{content}}}}}"),
            None => {
                let magic = key.to_ascii_uppercase();
                warn!(target: "selser::wts", "{key} is missing source; rendering as {magic} magic word");
                format!("{{{{{magic}:{content}}}}}")
            }
        };
    }

    match dp.extra.get("magicSrc").and_then(|v| v.as_str()) {
        Some(src) => src.to_string(),
        None => {
            debug!(target: "selser::wts", "behavior switch {switch} without source");
            format!("__{}__", switch.to_ascii_uppercase())
        }
    }
}

fn is_new_non_placeholder(doc: &Document, node: NodeId) -> bool {
    doc.is_new_elt(node)
        && !(doc.is_tag(node, "meta")
            && doc
                .attr(node, "typeof")
                .is_some_and(|t| t.split_whitespace().any(|w| w == "mw:Placeholder" || w.starts_with("mw:Placeholder/"))))
}

fn meta_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    let ty = doc.attr(node, "typeof").or_else(|| doc.attr(node, "property"));
    if ty.is_some_and(|t| t.contains("mw:PageProp/categorydefaultsort")) {
        // A sort key after a paragraph would be pulled into it
        if doc.is_tag(other, "p") && !doc.is_literal_html(other) {
            SepConstraints::at_least(2)
        } else {
            SepConstraints::at_least(1)
        }
    } else if is_new_non_placeholder(doc, node) {
        SepConstraints::at_least(1)
    } else {
        SepConstraints::NONE
    }
}

fn meta_after(doc: &Document, node: NodeId, _: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if is_new_non_placeholder(doc, node) {
        SepConstraints::at_least(1)
    } else {
        SepConstraints::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelserConfig;
    use crate::template::TemplateHintMap;

    fn serialize(html: &str) -> String {
        let mut doc = Document::parse_html(html).unwrap();
        let templates = TemplateHintMap::default();
        WikitextSerializer::serialize_dom(&mut doc, None, SelserConfig::default(), &templates, false).unwrap()
    }

    #[test]
    fn test_paragraph_separators() {
        let doc = Document::parse_html("<p>a</p><p>b</p>").unwrap();
        let state = SerializerState::new(&doc, None, SelserConfig::default());
        let body = doc.body();
        let p1 = doc.first_child(body).unwrap();
        let p2 = doc.next_sibling(p1).unwrap();
        assert_eq!(p_before(&doc, p1, body, &state), SepConstraints::new(0, 1));
        assert_eq!(p_before(&doc, p2, p1, &state), SepConstraints::new(2, 2));
        assert_eq!(p_after(&doc, p1, p2, &state), SepConstraints::new(2, 2));
        assert_eq!(p_after(&doc, p2, body, &state), SepConstraints::new(0, 2));
    }

    #[test]
    fn test_pp_transitions() {
        let doc = Document::parse_html("<p>a</p>text<div>d</div><!--c-->").unwrap();
        let body = doc.body();
        let ids = doc.child_ids(body);
        assert!(is_pp_transition(&doc, ids[0]));
        assert!(treat_as_pp_transition(&doc, ids[1]));
        assert!(!treat_as_pp_transition(&doc, ids[2]));
        assert!(treat_as_pp_transition(&doc, ids[3]));
        assert!(!treat_as_pp_transition(&doc, body));
    }

    #[test]
    fn test_hr_and_paragraph() {
        assert_eq!(serialize("<hr><p>a</p>"), "----\na");
    }

    #[test]
    fn test_indent_pre() {
        assert_eq!(serialize("<pre>a\nb</pre>").trim_end(), " a\n b");
    }

    #[test]
    fn test_behavior_switch() {
        let doc = Document::parse_html(r#"<meta property="mw:PageProp/notoc">"#).unwrap();
        let meta = doc.first_child(doc.body()).unwrap();
        assert_eq!(page_prop_wt(&doc, meta, "notoc"), "__NOTOC__");
    }

    #[test]
    fn test_default_sort_uses_source_name() {
        let doc = Document::parse_html(
            r#"<meta property="mw:PageProp/categorydefaultsort" content="Bar" data-parsoid='{"src":"{{DEFAULTSORT:Foo}}"}'>"#,
        )
        .unwrap();
        let meta = doc.first_child(doc.body()).unwrap();
        assert_eq!(page_prop_wt(&doc, meta, "categorydefaultsort"), "{{DEFAULTSORT:Bar}}");
    }

    #[test]
    fn test_new_meta_wants_own_line() {
        let doc = Document::parse_html(r#"<p>a</p><meta typeof="mw:Includes/NoInclude">"#).unwrap();
        let state = SerializerState::new(&doc, None, SelserConfig::default());
        let p = doc.first_child(doc.body()).unwrap();
        let meta = doc.next_sibling(p).unwrap();
        assert_eq!(meta_before(&doc, meta, p, &state), SepConstraints::at_least(1));
    }
}
