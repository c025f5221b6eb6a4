//! Lists and list items: `ul`, `ol`, `dl`, `li`, `dt`, `dd`.
//!
//! Bullets are emitted by the innermost item that starts a line: a list
//! whose first item is a list item leaves its bullets to that item, and an
//! item whose first child is a nested list leaves them to the nested list.
//! The `dd_row` variant is the `;term:definition` form, which continues
//! the `dt` line.

use super::{TagHandler, is_builder_inserted_elt, leading_space, list_bullets, wt_list_eol};
use crate::error::SelserResult;
use crate::node::{Document, NodeId};
use crate::wts::WikitextSerializer;
use crate::wts::escape::EscapeHandler;
use crate::wts::separators::SepConstraints;
use crate::wts::state::SerializerState;

pub const HANDLERS: &[TagHandler] = &[
    TagHandler::new("ul", handle_list)
        .with_before(list_before)
        .with_after(list_after)
        .forcing_sol(),
    TagHandler::new("ol", handle_list)
        .with_before(list_before)
        .with_after(list_after)
        .forcing_sol(),
    TagHandler::new("dl", handle_list)
        .with_before(list_before)
        .with_after(list_after)
        .forcing_sol(),
    TagHandler::new("li", handle_item)
        .with_before(li_before)
        .with_after(list_after)
        .with_first_child(item_first_child)
        .with_last_child(li_last_child)
        .forcing_sol(),
    TagHandler::new("dt", handle_item)
        .with_before(item_before)
        .with_after(dt_after)
        .with_first_child(item_first_child)
        .forcing_sol(),
    TagHandler::new("dd", handle_item)
        .with_before(item_before)
        .with_after(list_after)
        .with_first_child(item_first_child)
        .forcing_sol(),
    TagHandler::new("dd_row", handle_dd_row)
        .with_before(dd_row_before)
        .with_after(list_after)
        .with_first_child(item_first_child),
];

// =============================================================================
// Lists
// =============================================================================

fn handle_list(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;

    // Nested lists need their newlines
    wts.state.single_line_context.disable();

    let mut first = doc.first_non_sep_child(node);
    while let Some(f) = first
        && is_builder_inserted_elt(doc, f)
    {
        first = doc.first_non_sep_child(f);
    }
    let items_emit_bullets = first.is_some_and(|f| match doc.tag(node) {
        Some("dl") => doc.is_tag(f, "dt") || doc.is_tag(f, "dd"),
        _ => doc.is_tag(f, "li"),
    });
    if !items_emit_bullets {
        let bullets = list_bullets(&wts.state, node);
        wts.state.emit_chunk(&bullets, node);
    }

    let res = wts.serialize_children(node, Some(EscapeHandler::Li(node)));
    wts.state.single_line_context.pop();
    res?;
    Ok(doc.next_sibling(node))
}

fn list_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.is_body(other) {
        return SepConstraints::new(0, 0);
    }

    let parent = doc.parent(node);
    if parent.is_some_and(|p| doc.is_list_item(p)) && doc.parent(other) == parent {
        // Sibling content inside one item
        SepConstraints::new(1, 1)
    } else if parent.is_some_and(|p| doc.is_block_node(p) && doc.first_non_sep_child(p) == Some(node)) {
        SepConstraints::new(1, 2)
    } else if doc.is_formatting_elt(other) {
        SepConstraints::new(1, 1)
    } else {
        SepConstraints::new(2, 2)
    }
}

fn list_after(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    wt_list_eol(doc, node, other)
}

// =============================================================================
// Items
// =============================================================================

fn handle_item(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let first = doc.first_non_sep_child(node);
    let nested_list_first = first.is_some_and(|f| doc.is_list(f) && !doc.is_literal_html(f));
    if !nested_list_first {
        let bullets = list_bullets(&wts.state, node);
        wts.state.emit_chunk(&bullets, node);
    }
    serialize_item_content(wts, node)
}

fn handle_dd_row(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let first = doc.first_non_sep_child(node);
    if !first.is_some_and(|f| doc.is_list(f) && !doc.is_literal_html(f)) {
        let marker = format!(":{}", leading_space(doc, node, " "));
        wts.state.emit_chunk(&marker, node);
    }
    serialize_item_content(wts, node)
}

fn serialize_item_content(wts: &mut WikitextSerializer<'_>, node: NodeId) -> SelserResult<Option<NodeId>> {
    wts.state.single_line_context.enforce();
    let res = wts.serialize_children(node, Some(EscapeHandler::Li(node)));
    wts.state.single_line_context.pop();
    res?;
    Ok(wts.state.doc.next_sibling(node))
}

fn li_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    let list_parent = doc.parent(node) == Some(other) && matches!(doc.tag(other), Some("ul" | "ol"));
    if list_parent || doc.is_literal_html(other) {
        SepConstraints::NONE
    } else {
        SepConstraints::new(1, 2)
    }
}

fn item_before(_: &Document, _: NodeId, _: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    SepConstraints::new(1, 2)
}

fn dd_row_before(_: &Document, _: NodeId, _: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    SepConstraints::new(0, 0)
}

fn dt_after(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.is_tag(other, "dd") && doc.dp(other).stx_is(&crate::node::Stx::Row) {
        SepConstraints::new(0, 0)
    } else {
        wt_list_eol(doc, node, other)
    }
}

fn item_first_child(doc: &Document, _: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.is_list(other) {
        SepConstraints::NONE
    } else {
        SepConstraints::new(0, 0)
    }
}

fn li_last_child(doc: &Document, _: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.is_element(other) {
        SepConstraints::NONE
    } else {
        SepConstraints::new(0, 0)
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
    fn test_new_list() {
        assert_eq!(serialize("<ul><li>a</li><li>b</li></ul>"), "* a\n* b");
    }

    #[test]
    fn test_nested_list_bullets() {
        // The nested list closes its item with a newline, and that
        // separator survives to the end of the document
        assert_eq!(serialize("<ol><li>a<ol><li>b</li></ol></li></ol>"), "# a\n## b\n");

        let doc = Document::parse_html("<ol><li>a<ol><li>b</li></ol></li></ol>").unwrap();
        let state = SerializerState::new(&doc, None, SelserConfig::default());
        let li = doc.first_child(doc.first_child(doc.body()).unwrap()).unwrap();
        let nested = doc.last_child(li).unwrap();
        assert_eq!(list_after(&doc, nested, li, &state), SepConstraints::new(1, 2));
        let outer = doc.parent(li).unwrap();
        assert_eq!(list_after(&doc, li, outer, &state), SepConstraints::NONE);
    }

    #[test]
    fn test_definition_row() {
        let html = r#"<dl><dt>term</dt><dd data-parsoid='{"stx":"row"}'>def</dd></dl>"#;
        assert_eq!(serialize(html), "; term:def");
    }

    #[test]
    fn test_list_before() {
        let doc = Document::parse_html("<p>a</p><ul><li>b</li></ul>").unwrap();
        let state = SerializerState::new(&doc, None, SelserConfig::default());
        let body = doc.body();
        let p = doc.first_child(body).unwrap();
        let ul = doc.next_sibling(p).unwrap();
        assert_eq!(list_before(&doc, ul, body, &state), SepConstraints::new(0, 0));
        assert_eq!(list_before(&doc, ul, p, &state), SepConstraints::new(2, 2));
    }

    #[test]
    fn test_item_children_stay_on_line() {
        let doc = Document::parse_html("<ul><li>a<ul><li>b</li></ul></li></ul>").unwrap();
        let state = SerializerState::new(&doc, None, SelserConfig::default());
        let ul = doc.first_child(doc.body()).unwrap();
        let li = doc.first_child(ul).unwrap();
        let text = doc.first_child(li).unwrap();
        let nested = doc.last_child(li).unwrap();
        assert_eq!(item_first_child(&doc, li, text, &state), SepConstraints::new(0, 0));
        assert_eq!(li_last_child(&doc, li, nested, &state), SepConstraints::NONE);
        assert_eq!(li_last_child(&doc, li, text, &state), SepConstraints::new(0, 0));
    }
}
