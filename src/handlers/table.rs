//! Wikitext tables: `table`, `tbody`/`thead`/`tfoot`, `tr`, `td`, `th`,
//! `caption`.
//!
//! # Design
//!
//! Row and cell markup is copied from source when only the content
//! changed. Otherwise it is rebuilt from the attributes; `||`/`!!` is
//! only used where the cell really shares a line with an identical
//! predecessor. New content inside a table is kept compact: at most one
//! newline between parts that are new or border new parts.

use super::html::{emit_end_tag, emit_start_tag, serialize_attributes};
use super::{TagHandler, leading_space, trailing_space};
use crate::error::SelserResult;
use crate::node::{Document, NodeId, Stx};
use crate::wts::WikitextSerializer;
use crate::wts::escape::EscapeHandler;
use crate::wts::separators::SepConstraints;
use crate::wts::state::SerializerState;

pub const HANDLERS: &[TagHandler] = &[
    TagHandler::new("table", handle_table)
        .with_before(table_before)
        .with_after(table_after)
        .with_first_child(table_inner)
        .with_last_child(table_inner)
        .forcing_sol(),
    TagHandler::new("tbody", handle_section),
    TagHandler::new("thead", handle_section),
    TagHandler::new("tfoot", handle_section),
    TagHandler::new("tr", handle_tr)
        .with_before(tr_before)
        .with_after(cell_after)
        .forcing_sol(),
    TagHandler::new("td", handle_cell)
        .with_before(cell_before)
        .with_after(cell_after),
    TagHandler::new("th", handle_cell)
        .with_before(cell_before)
        .with_after(cell_after),
    TagHandler::new("caption", handle_caption)
        .with_before(caption_before)
        .with_after(caption_after)
        .forcing_sol(),
];

/// Newlines allowed between table parts.
fn max_nls_in_table(doc: &Document, node: NodeId, other: NodeId) -> usize {
    if doc.is_new_elt(node) || doc.is_new_elt(other) { 1 } else { 2 }
}

/// `symbol` followed by the cell's attributes, or the original opening
/// markup when the wrapper is unmodified.
fn serialize_table_tag(
    wts: &WikitextSerializer<'_>,
    symbol: &str,
    end_symbol: Option<&str>,
    node: NodeId,
    wrapper_unmodified: bool,
) -> String {
    if wrapper_unmodified
        && let Some(dsr) = wts.state.doc.dp(node).dsr
        && let (Some(start), Some(width)) = (dsr.start, dsr.open_width)
        && let Some(src) = wts.state.get_orig_src(start, start + width)
    {
        return src.to_string();
    }
    serialize_table_element(wts, symbol, end_symbol, node)
}

fn serialize_table_element(wts: &WikitextSerializer<'_>, symbol: &str, end_symbol: Option<&str>, node: NodeId) -> String {
    let attrs = serialize_attributes(wts, node);
    if attrs.is_empty() {
        format!("{symbol}{}", end_symbol.unwrap_or_default())
    } else {
        // An explicit (even empty) end symbol replaces the attribute separator
        format!("{symbol} {attrs}{}", end_symbol.unwrap_or(" |"))
    }
}

/// Row syntax is only trustworthy next to a cell of the same kind.
fn stx_info_valid_for_table_cell(doc: &Document, node: NodeId) -> bool {
    if !doc.dp(node).stx_is(&Stx::Row) {
        return true;
    }
    doc.previous_non_deleted_sibling(node)
        .is_some_and(|prev| doc.tag(prev) == doc.tag(node))
}

// =============================================================================
// Table
// =============================================================================

fn handle_table(wts: &mut WikitextSerializer<'_>, node: NodeId, wrapper_unmodified: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let dp = doc.dp(node);

    let indent_table = doc.parent(node).is_some_and(|p| doc.is_tag(p, "dd"))
        && doc.previous_non_sep_sibling(node).is_none();
    if indent_table {
        wts.state.single_line_context.disable();
    }

    let start = dp.start_tag_src.as_deref().unwrap_or("{|");
    let tag = serialize_table_tag(wts, start, Some(""), node, wrapper_unmodified);
    wts.state.emit_chunk(&tag, node);

    let literal = doc.is_literal_html(node);
    if !literal {
        wts.state.wikitable_nesting += 1;
    }
    let res = wts.serialize_children(node, None);
    if !literal {
        wts.state.wikitable_nesting -= 1;
    }

    if res.is_ok() {
        // A table without rows never collected a last-child constraint
        if wts.state.sep.constraints.is_none() {
            wts.state.sep.constraints = Some(SepConstraints::new(1, 2));
        }
        let end = dp.end_tag_src.as_deref().unwrap_or("|}");
        emit_end_tag(&mut wts.state, end, node);
    }

    if indent_table {
        wts.state.single_line_context.pop();
    }
    res?;
    Ok(doc.next_sibling(node))
}

fn table_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    // `:{|` indented table
    if doc.parent(node) == Some(other) && doc.is_tag(other, "dd") {
        SepConstraints::new(0, 2)
    } else {
        SepConstraints::new(1, 2)
    }
}

fn table_after(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if (doc.is_new_elt(node) || doc.is_new_elt(other)) && !doc.is_body(other) {
        SepConstraints::new(1, 2)
    } else {
        SepConstraints::new(0, 2)
    }
}

fn table_inner(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    SepConstraints::new(1, max_nls_in_table(doc, node, other))
}

fn handle_section(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    wts.serialize_children(node, None)?;
    Ok(wts.state.doc.next_sibling(node))
}

// =============================================================================
// Rows
// =============================================================================

/// The first row of a table has no `|-` unless the source had one.
fn tr_wikitext_needed(doc: &Document, node: NodeId) -> bool {
    let dp = doc.dp(node);
    if dp.start_tag_src.is_some() {
        return true;
    }
    if dp.auto_inserted_start {
        return false;
    }
    if doc.previous_non_deleted_sibling(node).is_some() {
        return true;
    }
    // A preceding section needs separating; a caption doesn't
    doc.parent(node)
        .and_then(|p| doc.previous_non_sep_sibling(p))
        .is_some_and(|ps| !doc.is_tag(ps, "caption"))
}

fn handle_tr(wts: &mut WikitextSerializer<'_>, node: NodeId, wrapper_unmodified: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    if tr_wikitext_needed(doc, node) {
        let start = doc.dp(node).start_tag_src.as_deref().unwrap_or("|-");
        let tag = serialize_table_tag(wts, start, Some(""), node, wrapper_unmodified);
        emit_start_tag(&mut wts.state, &tag, node);
    }
    wts.serialize_children(node, None)?;
    Ok(doc.next_sibling(node))
}

fn tr_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    let max = max_nls_in_table(doc, node, other);
    if tr_wikitext_needed(doc, node) {
        SepConstraints::new(1, max)
    } else {
        SepConstraints::new(0, max)
    }
}

// =============================================================================
// Cells
// =============================================================================

fn handle_cell(wts: &mut WikitextSerializer<'_>, node: NodeId, wrapper_unmodified: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let dp = doc.dp(node);
    let is_th = doc.is_tag(node, "th");
    let (single, double) = if is_th { ("!", "!!") } else { ("|", "||") };

    let usable_dp = stx_info_valid_for_table_cell(doc, node);
    let attr_sep = if usable_dp { dp.attr_sep_src.as_deref() } else { None };
    let mut symbol = match dp.start_tag_src.as_deref().filter(|_| usable_dp) {
        Some(src) if !src.is_empty() => src.to_string(),
        _ if usable_dp && dp.stx_is(&Stx::Row) => double.to_string(),
        _ => single.to_string(),
    };
    // Only a single symbol can start a line
    let pending_min = wts.state.sep.constraints.and_then(|c| c.min).unwrap_or(0);
    if wts.state.on_sol || pending_min > 0 {
        symbol = symbol.replacen(double, single, 1);
    }

    let tag = serialize_table_tag(wts, &symbol, attr_sep, node, wrapper_unmodified);
    let in_wide_cell = tag.contains(double) || tag.starts_with("{{!}}{{!}}");
    let space = leading_space(doc, node, "");
    emit_start_tag(&mut wts.state, &format!("{tag}{space}"), node);

    let next_uses_row_syntax = doc
        .next_non_sep_sibling(node)
        .is_some_and(|n| doc.is_element(n) && doc.dp(n).stx_is(&Stx::Row));

    // Keep empty cells readable
    if next_uses_row_syntax && doc.first_non_deleted_child(node).is_none() {
        wts.emit_wikitext(" ", node);
        return Ok(doc.next_sibling(node));
    }

    let escaper = if is_th {
        EscapeHandler::Th(node)
    } else {
        EscapeHandler::Td {
            node,
            wide: in_wide_cell,
        }
    };
    wts.serialize_children(node, Some(escaper))?;

    if next_uses_row_syntax && !wts.state.curr_line.text.ends_with(char::is_whitespace) {
        let space = trailing_space(doc, node, "");
        if !space.is_empty() {
            wts.state.append_sep(space);
        }
    }
    Ok(doc.next_sibling(node))
}

fn cell_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    let max = max_nls_in_table(doc, node, other);
    if doc.tag(other) == doc.tag(node) && doc.dp(node).stx_is(&Stx::Row) {
        // Same line as the previous cell
        SepConstraints::new(0, max)
    } else {
        SepConstraints::new(1, max)
    }
}

fn cell_after(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    SepConstraints::new(0, max_nls_in_table(doc, node, other))
}

// =============================================================================
// Caption
// =============================================================================

fn handle_caption(wts: &mut WikitextSerializer<'_>, node: NodeId, wrapper_unmodified: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let start = doc.dp(node).start_tag_src.as_deref().unwrap_or("|+");
    let tag = serialize_table_tag(wts, start, None, node, wrapper_unmodified);
    emit_start_tag(&mut wts.state, &tag, node);
    wts.serialize_children(node, None)?;
    Ok(doc.next_sibling(node))
}

fn caption_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    let max = max_nls_in_table(doc, node, other);
    if doc.is_tag(other, "table") {
        SepConstraints::new(0, max)
    } else {
        SepConstraints::new(1, max)
    }
}

fn caption_after(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    SepConstraints::new(1, max_nls_in_table(doc, node, other))
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
    fn test_new_table() {
        let html = "<table><tbody><tr><td>a</td></tr><tr><td>b</td><td>c</td></tr></tbody></table>";
        assert_eq!(serialize(html), "{|\n|a\n|-\n|b\n|c\n|}");
    }

    #[test]
    fn test_row_syntax_cells() {
        let html = r#"<table><tbody><tr><td>a</td><td data-parsoid='{"stx":"row"}'>b</td></tr></tbody></table>"#;
        assert_eq!(serialize(html), "{|\n|a||b\n|}");
    }

    #[test]
    fn test_header_and_caption() {
        let html = "<table><caption>cap</caption><tbody><tr><th>h</th></tr></tbody></table>";
        assert_eq!(serialize(html), "{|\n|+cap\n!h\n|}");
    }

    #[test]
    fn test_cell_attributes() {
        let html = r#"<table><tbody><tr><td class="x">a</td></tr></tbody></table>"#;
        assert_eq!(serialize(html), "{|\n| class=\"x\" |a\n|}");
    }

    #[test]
    fn test_row_stx_needs_identical_predecessor() {
        let doc = Document::parse_html(concat!(
            r#"<table><tbody><tr><th>h</th><td data-parsoid='{"stx":"row"}'>a</td>"#,
            r#"<td data-parsoid='{"stx":"row"}'>b</td></tr></tbody></table>"#,
        ))
        .unwrap();
        let tr = doc.descendants(doc.body()).find(|&n| doc.is_tag(n, "tr")).unwrap();
        let cells = doc.child_ids(tr);
        assert!(stx_info_valid_for_table_cell(&doc, cells[0]));
        assert!(!stx_info_valid_for_table_cell(&doc, cells[1]));
        assert!(stx_info_valid_for_table_cell(&doc, cells[2]));
    }

    #[test]
    fn test_first_row_marker() {
        let doc = Document::parse_html(concat!(
            "<table><tbody><tr><td>a</td></tr><tr><td>b</td></tr></tbody></table>",
            r#"<table><tbody><tr data-parsoid='{"startTagSrc":"|-"}'><td>c</td></tr></tbody></table>"#,
        ))
        .unwrap();
        let rows: Vec<_> = doc.descendants(doc.body()).filter(|&n| doc.is_tag(n, "tr")).collect();
        assert!(!tr_wikitext_needed(&doc, rows[0]));
        assert!(tr_wikitext_needed(&doc, rows[1]));
        assert!(tr_wikitext_needed(&doc, rows[2]));
    }
}
