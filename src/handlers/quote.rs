//! Bold and italic: `b` as `'''`, `i` as `''`.
//!
//! Apostrophes right next to quote markup change how the markup parses,
//! so a `<nowiki/>` goes between them. The ones that turn out to be
//! unnecessary are removed by the line pass after serialization.

use super::TagHandler;
use super::html::{emit_end_tag, emit_start_tag};
use crate::error::SelserResult;
use crate::node::{Document, NodeId};
use crate::wts::WikitextSerializer;
use crate::wts::state::SerializerState;

pub const HANDLERS: &[TagHandler] = &[TagHandler::new("b", handle_quote), TagHandler::new("i", handle_quote)];

fn quote_markup(doc: &Document, node: NodeId) -> &'static str {
    if doc.is_tag(node, "b") { "'''" } else { "''" }
}

fn handle_quote(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let quotes = quote_markup(doc, node);

    let q1 = preceding_quote(&wts.state, node);
    let q2 = doc
        .next_non_deleted_sibling(node)
        .and_then(|n| doc.text(n))
        .is_some_and(|t| t.starts_with('\''));

    if let Some(q1) = q1
        && (q2 || doc.is_element(q1))
    {
        emit_nowiki(&mut wts.state, node);
    }
    emit_start_tag(&mut wts.state, quotes, node);

    if !doc.has_children(node) {
        // `''''` would parse as a literal apostrophe plus quotes
        if !wts.state.rt_test_mode || !doc.dp(node).auto_inserted_end {
            emit_nowiki(&mut wts.state, node);
        }
    } else {
        wts.serialize_children(node, None)?;
    }
    emit_end_tag(&mut wts.state, quotes, node);

    if q2 {
        emit_nowiki(&mut wts.state, node);
    }
    Ok(doc.next_sibling(node))
}

fn emit_nowiki(state: &mut SerializerState<'_>, node: NodeId) {
    state.emit_chunk("<nowiki/>", node);
    state.has_quote_nowikis = true;
}

/// The node whose wikitext ends right before `node` with an apostrophe:
/// a text node ending in `'`, or quote markup that was emitted from source.
fn preceding_quote(state: &SerializerState<'_>, node: NodeId) -> Option<NodeId> {
    let doc = state.doc;
    let last_source = state.sep.last_source_node?;

    let mut prev = doc.prev_sibling(node);
    if prev.is_none() {
        // Climb to the first ancestor with a previous sibling
        let mut cur = doc.parent(node);
        while let Some(c) = cur
            && !doc.is_body(c)
        {
            if let Some(p) = doc.prev_sibling(c) {
                prev = Some(p);
                break;
            }
            if !doc.is_quote_elt(c) {
                return None;
            }
            cur = doc.parent(c);
        }
    }
    let mut prev = prev?;

    if let Some(text) = doc.text(prev) {
        return text.ends_with('\'').then_some(prev);
    }
    // Descend through trailing quote markup
    while doc.is_quote_elt(prev) {
        match doc.last_child(prev) {
            Some(lc) if doc.is_quote_elt(lc) => prev = lc,
            Some(lc) if doc.text(lc).is_some_and(|t| t.ends_with('\'')) => return Some(lc),
            _ => break,
        }
    }
    (doc.is_quote_elt(prev) && prev == last_source).then_some(prev)
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
    fn test_bold_and_italic() {
        assert_eq!(serialize("<p><b>a</b></p>"), "'''a'''");
        assert_eq!(serialize("<p><i>a</i></p>"), "''a''");
        assert_eq!(serialize("<p><i><b>a</b></i></p>"), "'''''a'''''");
    }

    #[test]
    fn test_empty_quote() {
        assert_eq!(serialize("<p>x<i></i>y</p>"), "x''<nowiki/>''y");
    }

    #[test]
    fn test_preceding_text_quote() {
        let doc = Document::parse_html("<p>l'<b>a</b></p>").unwrap();
        let mut state = SerializerState::new(&doc, None, SelserConfig::default());
        let p = doc.first_child(doc.body()).unwrap();
        let text = doc.first_child(p).unwrap();
        let b = doc.next_sibling(text).unwrap();
        // Nothing emitted from source yet
        assert_eq!(preceding_quote(&state, b), None);
        state.sep.last_source_node = Some(text);
        assert_eq!(preceding_quote(&state, b), Some(text));
    }

    #[test]
    fn test_quote_markup() {
        let doc = Document::parse_html("<b>a</b><i>b</i>").unwrap();
        let b = doc.first_child(doc.body()).unwrap();
        let i = doc.next_sibling(b).unwrap();
        assert_eq!(quote_markup(&doc, b), "'''");
        assert_eq!(quote_markup(&doc, i), "''");
    }
}
