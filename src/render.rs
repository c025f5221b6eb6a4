//! HTML rendering for arena documents.
//!
//! Re-emits nodes as HTML strings. Side tables are dropped by default; the
//! debug options put them back as `data-*` attributes so a marked-up tree
//! can be inspected (or reloaded with [`Document::parse_html`]).

use crate::node::predicates::{VOID_TAGS, in_set};
use crate::node::{Document, NodeId, NodeKind};

// =============================================================================
// RenderOptions
// =============================================================================

/// Configuration for HTML rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Emit `data-parsoid` and `data-mw` from the side tables.
    pub store_data_attribs: bool,
    /// Emit `data-parsoid-diff` for current-revision marks.
    pub store_diff_marks: bool,
}

impl RenderOptions {
    /// Plain HTML, no side data.
    pub const PLAIN: Self = Self {
        store_data_attribs: false,
        store_diff_marks: false,
    };

    /// Everything, for debugging and round trips through the loader.
    pub const DEBUG: Self = Self {
        store_data_attribs: true,
        store_diff_marks: true,
    };
}

// =============================================================================
// Document rendering
// =============================================================================

/// Render a node including its own tags.
pub fn outer_html(doc: &Document, id: NodeId, opts: &RenderOptions) -> String {
    let mut output = String::new();
    render_node(doc, id, opts, &mut output);
    output
}

/// Render a node's children.
pub fn inner_html(doc: &Document, id: NodeId, opts: &RenderOptions) -> String {
    let mut output = String::new();
    render_children(doc, id, opts, &mut output);
    output
}

impl Document {
    /// Plain outer HTML of `id`
    pub fn outer_html(&self, id: NodeId) -> String {
        outer_html(self, id, &RenderOptions::PLAIN)
    }

    /// Plain inner HTML of `id`
    pub fn inner_html(&self, id: NodeId) -> String {
        inner_html(self, id, &RenderOptions::PLAIN)
    }
}

fn render_node(doc: &Document, id: NodeId, opts: &RenderOptions, output: &mut String) {
    match doc.kind(id) {
        NodeKind::Text(text) => output.push_str(&escape_html(text)),
        NodeKind::Comment(data) => {
            output.push_str("<!--");
            output.push_str(data);
            output.push_str("-->");
        }
        NodeKind::Element(elem) => {
            output.push('<');
            output.push_str(&elem.tag);
            render_attrs(&elem.attrs, output);
            if opts.store_data_attribs {
                if let Some(dp) = doc.data_parsoid.get(&id)
                    && let Ok(json) = serde_json::to_string(dp)
                {
                    render_attr("data-parsoid", &json, output);
                }
                if let Some(dmw) = doc.data_mw(id) {
                    render_attr("data-mw", &dmw.to_string(), output);
                }
            }
            if opts.store_diff_marks
                && let Some(rec) = doc.diff_mark(id)
                && let Ok(json) = serde_json::to_string(rec)
            {
                render_attr("data-parsoid-diff", &json, output);
            }

            if in_set(VOID_TAGS, &elem.tag) {
                output.push('>');
                return;
            }
            output.push('>');

            // The loader drops one leading newline inside these
            if elem.tag == "pre"
                && doc
                    .first_child(id)
                    .and_then(|c| doc.kind(c).as_text())
                    .is_some_and(|t| t.starts_with('\n'))
            {
                output.push('\n');
            }

            render_children(doc, id, opts, output);
            output.push_str(&serialize_end_tag(&elem.tag));
        }
    }
}

fn render_children(doc: &Document, id: NodeId, opts: &RenderOptions, output: &mut String) {
    for child in doc.children(id) {
        render_node(doc, child, opts, output);
    }
}

fn render_attr(name: &str, value: &str, output: &mut String) {
    output.push(' ');
    output.push_str(name);
    output.push_str("=\"");
    output.push_str(&escape_attr(value));
    output.push('"');
}

/// Render attributes to HTML.
fn render_attrs(attrs: &[(String, String)], output: &mut String) {
    for (name, value) in attrs {
        render_attr(name, value, output);
    }
}

// =============================================================================
// Literal tag text
// =============================================================================

/// `<tag a="v">` (or `<tag a="v" />`) for literal HTML in wikitext output.
pub fn serialize_start_tag(tag: &str, attrs: &[(String, String)], self_close: bool) -> String {
    let mut output = String::with_capacity(tag.len() + 2);
    output.push('<');
    output.push_str(tag);
    render_attrs(attrs, &mut output);
    if self_close {
        output.push_str(" /");
    }
    output.push('>');
    output
}

/// `</tag>`
pub fn serialize_end_tag(tag: &str) -> String {
    format!("</{tag}>")
}

/// Escape HTML special characters in text.
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape attribute value special characters.
pub fn escape_attr(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffMark, RevisionId};

    #[test]
    fn test_outer_and_inner_html() {
        let doc = Document::parse_html(r#"<p class="x">a &amp; <b>b</b><br/></p><!--c-->"#).unwrap();
        let p = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.outer_html(p), r#"<p class="x">a &amp; <b>b</b><br></p>"#);
        assert_eq!(doc.inner_html(p), "a &amp; <b>b</b><br>");
        assert_eq!(doc.inner_html(doc.body()), r#"<p class="x">a &amp; <b>b</b><br></p><!--c-->"#);
    }

    #[test]
    fn test_debug_options_round_trip() {
        let html = r#"<p data-parsoid='{"dsr":[0,1,0,0]}'>x</p>"#;
        let mut doc = Document::parse_html(html).unwrap();
        doc.set_revision(RevisionId::new(3));
        let p = doc.first_child(doc.body()).unwrap();
        doc.set_diff_mark(p, DiffMark::SubtreeChanged);

        let out = outer_html(&doc, p, &RenderOptions::DEBUG);
        assert!(out.contains(r#"data-parsoid="{&quot;dsr&quot;:[0,1,0,0]}""#));
        assert!(out.contains("data-parsoid-diff="));

        let reloaded = Document::parse_html(&out).unwrap();
        let p2 = reloaded.first_child(reloaded.body()).unwrap();
        assert_eq!(reloaded.dp(p2), doc.dp(p));
        assert!(!reloaded.is_new(p2));
    }

    #[test]
    fn test_pre_leading_newline_preserved() {
        let doc = Document::parse_html("<pre>\n\nx</pre>").unwrap();
        let pre = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.outer_html(pre), "<pre>\n\nx</pre>");
    }

    #[test]
    fn test_literal_tags() {
        let attrs = vec![("style".to_string(), "a\"b".to_string())];
        assert_eq!(serialize_start_tag("span", &attrs, false), r#"<span style="a&quot;b">"#);
        assert_eq!(serialize_start_tag("br", &[], true), "<br />");
        assert_eq!(serialize_end_tag("span"), "</span>");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<script>"), "&lt;script&gt;");
        assert_eq!(escape_html("a & b"), "a &amp; b");
    }
}
