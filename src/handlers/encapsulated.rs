//! Template, parameter and extension output.
//!
//! Unedited encapsulated content never reaches this handler in selser
//! mode: its source range is reused. What does reach it is rebuilt from
//! `data-mw` (template parts, or the extension's name, attributes and
//! body source), or from the source string the parser recorded.
//! The whole about-sibling run is consumed.

use log::error;
use serde_json::Value;

use super::{TagHandler, list_bullets};
use crate::error::{SelserError, SelserResult};
use crate::node::{Document, NodeId};
use crate::render::escape_attr;
use crate::template::serialize_from_parts;
use crate::wts::WikitextSerializer;
use crate::wts::separators::SepConstraints;
use crate::wts::state::SerializerState;

/// Handler of every first encapsulation wrapper.
pub static ENCAPSULATED: TagHandler =
    TagHandler::new("encapsulated", handle_encapsulated).with_before(encapsulated_before);

fn handle_encapsulated(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let src = encapsulated_src(wts, node)?;

    let dp = doc.dp(node);
    let prefix = dp.extra.get("extPrefix").and_then(Value::as_str).unwrap_or_default();
    let suffix = dp.extra.get("extSuffix").and_then(Value::as_str).unwrap_or_default();
    let bullets = list_prefix(&wts.state, node);

    wts.state.single_line_context.disable();
    wts.emit_wikitext(&format!("{bullets}{prefix}{src}{suffix}"), node);
    wts.state.single_line_context.pop();

    Ok(doc.skip_over_encapsulated(node))
}

fn encapsulated_before(_: &Document, _: NodeId, _: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    SepConstraints::new(0, 2)
}

/// Wikitext of the encapsulated run starting at `node`.
fn encapsulated_src(wts: &WikitextSerializer<'_>, node: NodeId) -> SelserResult<String> {
    let doc = wts.state.doc;
    let data_mw = doc.data_mw(node);

    let extension = doc
        .element(node)
        .and_then(|e| e.type_of_with_prefix("mw:Extension/"))
        .and_then(|w| w.strip_prefix("mw:Extension/"));

    let parts = data_mw.and_then(|mw| mw.get("parts")).and_then(Value::as_array);
    if let Some(parts) = parts.filter(|_| extension.is_none()) {
        return serialize_from_parts(wts, node, parts);
    }

    if let Some(mw) = data_mw
        && let Some(name) = mw.get("name").and_then(Value::as_str).or(extension)
    {
        return Ok(extension_src(name, mw));
    }

    match doc.dp(node).src.as_deref() {
        Some(src) => {
            if extension.is_none() {
                error!(
                    target: "selser::wts",
                    "no data-mw for encapsulated content, using recorded source: {}",
                    doc.outer_html(node)
                );
            }
            Ok(src.to_string())
        }
        None => Err(SelserError::EncapsulatedWithoutSource {
            tag: doc.tag(node).unwrap_or_default().to_string(),
            about: doc.attr(node, "about").map(str::to_string),
        }),
    }
}

/// `<name attrs>body</name>`, or `<name attrs />` without a body.
fn extension_src(name: &str, mw: &Value) -> String {
    let mut buf = format!("<{name}");
    if let Some(attrs) = mw.get("attrs").and_then(Value::as_object) {
        for (k, v) in attrs {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            buf.push_str(&format!(" {k}=\"{}\"", escape_attr(&v)));
        }
    }
    match mw.get("body").and_then(|b| b.get("extsrc")).and_then(Value::as_str) {
        Some(body) => format!("{buf}>{body}</{name}>"),
        None => buf + " />",
    }
}

/// Bullets of the enclosing list item when an encapsulated list opens it
/// (the item handler leaves them to its nested list).
fn list_prefix(state: &SerializerState<'_>, node: NodeId) -> String {
    let doc = state.doc;
    if state.in_indent_pre || !doc.is_list(node) || doc.previous_non_sep_sibling(node).is_some() {
        return String::new();
    }
    match doc.parent(node) {
        Some(p) if doc.is_list_item(p) => list_bullets(state, p).trim_end().to_string(),
        _ => String::new(),
    }
}
