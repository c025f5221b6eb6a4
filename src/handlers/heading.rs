//! Section headings, `h1` through `h6`.

use super::{TagHandler, leading_space, trailing_space};
use crate::error::SelserResult;
use crate::node::predicates::heading_level;
use crate::node::{Document, NodeId};
use crate::wts::WikitextSerializer;
use crate::wts::separators::SepConstraints;
use crate::wts::state::SerializerState;

macro_rules! heading_handlers {
    ($($level:literal),*) => {
        pub const HANDLERS: &[TagHandler] = &[
            $(
                TagHandler::new(concat!("h", $level), handle_heading)
                    .with_before(heading_before)
                    .with_after(heading_after)
                    .forcing_sol(),
            )*
        ];
    };
}

heading_handlers!(1, 2, 3, 4, 5, 6);

fn handle_heading(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let level = doc.tag(node).and_then(heading_level).unwrap_or(1);
    let marker = "=".repeat(level);

    let space = leading_space(doc, node, " ");
    wts.state.emit_chunk(&format!("{marker}{space}"), node);

    wts.state.single_line_context.enforce();
    let res = if doc.has_children(node) {
        wts.serialize_children(node, None)
    } else {
        // An empty heading still needs something between the markers
        wts.state.has_self_closing_nowikis = true;
        wts.state.emit_chunk("<nowiki/>", node);
        Ok(())
    };
    if res.is_ok() {
        let space = trailing_space(doc, node, " ");
        wts.state.emit_chunk(&format!("{space}{marker}"), node);
    }
    wts.state.single_line_context.pop();
    res?;

    Ok(doc.next_sibling(node))
}

fn heading_before(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    let prev = doc.previous_non_sep_sibling(node);
    if doc.is_new_elt(node) && prev.is_some() {
        // New headings get a blank line before them
        SepConstraints::new(2, 2)
    } else if doc.is_new_elt(other) && prev == Some(other) {
        SepConstraints::new(2, 2)
    } else {
        SepConstraints::new(1, 2)
    }
}

fn heading_after(_: &Document, _: NodeId, _: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    SepConstraints::new(1, 2)
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
    fn test_registered_levels() {
        let names: Vec<_> = HANDLERS.iter().map(|h| h.name).collect();
        assert_eq!(names, ["h1", "h2", "h3", "h4", "h5", "h6"]);
        assert!(HANDLERS.iter().all(|h| h.force_sol));
    }

    #[test]
    fn test_new_heading_gets_spaces() {
        assert_eq!(serialize("<h2>Foo</h2>").trim_end(), "== Foo ==");
        assert_eq!(serialize("<h3> Foo </h3>").trim_end(), "=== Foo ===");
    }

    #[test]
    fn test_empty_heading() {
        assert_eq!(serialize("<h2></h2>").trim_end(), "==<nowiki/>==");
    }

    #[test]
    fn test_new_heading_after_content() {
        let doc = Document::parse_html("<p>a</p><h2>b</h2>").unwrap();
        let state = SerializerState::new(&doc, None, SelserConfig::default());
        let p = doc.first_child(doc.body()).unwrap();
        let h2 = doc.next_sibling(p).unwrap();
        assert_eq!(heading_before(&doc, h2, p, &state), SepConstraints::new(2, 2));
        assert_eq!(heading_before(&doc, p, doc.body(), &state), SepConstraints::new(1, 2));
    }
}
