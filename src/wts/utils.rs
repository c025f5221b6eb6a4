//! Tree queries shared by the normalizer, separators and serializer.

use std::sync::LazyLock;

use regex::Regex;

use crate::diff::DiffMark;
use crate::html::decode_comment;
use crate::node::{Document, NodeId, NodeKind, Stx};

/// A wikitext comment. The body may not contain `-->`.
pub const COMMENT_PATTERN: &str = r"<!--(?:[^-]|-[^-]|--+[^->])*-*-->";

static LEADING_BLANK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*\n").expect("valid regex"));

static VALID_SEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^(?:\s|{COMMENT_PATTERN})*$")).expect("valid regex"));

/// Wikitext form of DOM comment data
pub fn comment_wt(data: &str) -> String {
    format!("<!--{}-->", decode_comment(data))
}

/// Source length of a comment, delimiters included
pub fn decoded_comment_len(data: &str) -> usize {
    decode_comment(data).len() + 7
}

/// Whitespace and comments only
pub fn is_valid_sep(sep: &str) -> bool {
    VALID_SEP_RE.is_match(sep)
}

/// Leading spaces an indent-pre added to the source of a text child.
pub fn indent_pre_dsr_correction(doc: &Document, text_node: NodeId) -> usize {
    let (Some(parent), Some(text)) = (doc.parent(text_node), doc.text(text_node)) else {
        return 0;
    };
    if !doc.is_indent_pre(parent) {
        return 0;
    }
    if doc.last_child(parent) == Some(text_node) {
        // The final newline of the pre adds no content line
        text.match_indices('\n').filter(|&(i, _)| i + 1 < text.len()).count()
    } else {
        text.matches('\n').count()
    }
}

/// Short description of a node for trace output
pub fn trace_node_name(doc: &Document, id: NodeId) -> String {
    match doc.kind(id) {
        NodeKind::Element(_) if doc.is_diff_marker(id, None) => "DIFF_MARK".to_string(),
        NodeKind::Element(e) => format!("NODE: {}", e.tag),
        NodeKind::Text(t) => format!("TEXT: {t:?}"),
        NodeKind::Comment(c) => format!("CMT : {:?}", comment_wt(c)),
    }
}

/// Whether an unedited node's original wikitext can be reused where it now sits.
///
/// Table cells, first table rows and nested list items encode their
/// position in their own syntax, so an edit to a neighbour can invalidate
/// otherwise untouched source.
pub fn orig_src_valid_in_edited_context(doc: &Document, id: NodeId) -> bool {
    if doc.is_redirect_link(id) {
        return doc.parent(id).is_some_and(|p| doc.is_body(p)) && doc.prev_sibling(id).is_none();
    }

    if doc.is_tag(id, "td") || doc.is_tag(id, "th") {
        let Some(prev) = doc.prev_sibling(id) else {
            return true;
        };
        if !doc.is_diff_marker(prev, None)
            && !doc.has_inserted_diff_mark(prev)
            && !doc.direct_children_changed(prev)
        {
            return true;
        }
        // `||` / `!!` cells depend on their predecessor's line
        return !doc.dp(id).stx_is(&Stx::Row);
    }

    if doc.is_tag(id, "tr") && doc.dp(id).start_tag_src.as_deref().is_none_or(str::is_empty) {
        // A row without `|-` was the first row; it stays valid only while it still is
        return doc.previous_non_sep_sibling(id).is_none();
    }

    if doc.is_nested_list_or_list_item(id) {
        // Bullets of the nested item were emitted by its ancestors
        let mut prev = doc.prev_sibling(id);
        if prev.is_none() {
            return false;
        }
        while let Some(p) = prev {
            if doc.is_diff_marker(p, None) || doc.has_inserted_diff_mark(p) {
                return false;
            }
            prev = doc.prev_sibling(p);
        }
        return true;
    }

    true
}

/// Did `node` sit next to a deleted block node in the wikitext?
///
/// Looks past sol-transparent siblings, and past zero-width parents when
/// the sibling chain runs out.
pub fn next_to_deleted_block_node_in_wt(doc: &Document, node: Option<NodeId>, before: bool) -> bool {
    let Some(mut orig) = node else {
        return false;
    };
    if doc.is_body(orig) {
        return false;
    }
    loop {
        let mut cur = Some(orig);
        loop {
            cur = cur.and_then(|n| if before { doc.prev_sibling(n) } else { doc.next_sibling(n) });
            if doc.maybe_deleted_node(cur) {
                return doc.is_deleted_block_node(cur);
            }
            match cur {
                Some(n) if doc.emits_sol_transparent_single_line_wt(n) => continue,
                _ => break,
            }
        }
        if cur.is_some() {
            return false;
        }
        match doc.parent(orig) {
            Some(p) if doc.is_zero_width_wikitext_elt(p) => orig = p,
            _ => return false,
        }
    }
}

/// Whitespace before `node` cannot start an indent-pre.
pub fn preceding_space_suppresses_indent_pre(doc: &Document, node: NodeId, sep_node: NodeId) -> bool {
    if node != sep_node
        && let Some(text) = doc.kind(node).as_text()
    {
        // When node is the separator's own source, its leading text is already gone
        return LEADING_BLANK_LINE_RE.is_match(text);
    }
    if doc.is_tag(node, "br") {
        return true;
    }
    if doc.is_first_encapsulation_wrapper(node) {
        return !doc.has_children(node) || doc.inner_html(node).starts_with('\n');
    }
    doc.is_block_node_with_visible_wt(node)
}

/// Inserted, or changed directly below
pub fn is_modified(doc: &Document, id: NodeId) -> bool {
    doc.has_diff_mark(id, DiffMark::Inserted) || doc.direct_children_changed(id)
}

/// Present in the original tree and carrying no diff marks
pub fn is_unedited(doc: &Document, id: NodeId) -> bool {
    !doc.is_new_elt(id) && !doc.has_diff_markers(id) && !doc.has_inserted_diff_mark(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(html: &str) -> Document {
        Document::parse_html(html).unwrap()
    }

    #[test]
    fn test_comment_wt() {
        assert_eq!(comment_wt("x --&gt; y"), "<!--x --&gt; y-->");
        assert_eq!(comment_wt(" plain "), "<!-- plain -->");
    }

    #[test]
    fn test_valid_sep() {
        assert!(is_valid_sep(""));
        assert!(is_valid_sep(" \n<!-- a -> b -->\n"));
        assert!(is_valid_sep("<!--x--->"));
        assert!(!is_valid_sep("<!--x-->junk-->"));
        assert!(!is_valid_sep("\nfoo\n"));
        assert!(!is_valid_sep("<!-- open"));
    }

    #[test]
    fn test_indent_pre_correction() {
        let doc = load("<pre>a\nb\n</pre><p>x\ny</p>");
        let body = doc.body();
        let pre = doc.first_child(body).unwrap();
        let p = doc.next_sibling(pre).unwrap();
        assert_eq!(indent_pre_dsr_correction(&doc, doc.first_child(pre).unwrap()), 1);
        assert_eq!(indent_pre_dsr_correction(&doc, doc.first_child(p).unwrap()), 0);
    }

    #[test]
    fn test_row_cell_needs_unmodified_predecessor() {
        let mut doc = load(
            r#"<table><tbody><tr><td data-parsoid='{}'>a</td><td data-parsoid='{"stx":"row"}'>b</td></tr></tbody></table>"#,
        );
        let tr = doc.descendants(doc.body()).find(|&n| doc.is_tag(n, "tr")).unwrap();
        let first = doc.first_child(tr).unwrap();
        let second = doc.next_sibling(first).unwrap();
        assert!(orig_src_valid_in_edited_context(&doc, first));
        assert!(orig_src_valid_in_edited_context(&doc, second));

        doc.set_diff_mark(first, DiffMark::ChildrenChanged);
        assert!(!orig_src_valid_in_edited_context(&doc, second));
    }

    #[test]
    fn test_first_row_without_start_tag() {
        let doc = load(
            r#"<table><tbody><tr data-parsoid='{}'><td>a</td></tr><tr data-parsoid='{}'><td>b</td></tr></tbody></table>"#,
        );
        let rows: Vec<_> = doc.descendants(doc.body()).filter(|&n| doc.is_tag(n, "tr")).collect();
        assert!(orig_src_valid_in_edited_context(&doc, rows[0]));
        assert!(!orig_src_valid_in_edited_context(&doc, rows[1]));
    }

    #[test]
    fn test_nested_list_item() {
        let doc = load("<ul><li><ul><li>a</li><li>b</li></ul></li></ul>");
        let items: Vec<_> = doc.descendants(doc.body()).filter(|&n| doc.is_tag(n, "li")).collect();
        assert!(orig_src_valid_in_edited_context(&doc, items[0]));
        assert!(!orig_src_valid_in_edited_context(&doc, items[1]));
        assert!(orig_src_valid_in_edited_context(&doc, items[2]));
    }

    #[test]
    fn test_next_to_deleted_block() {
        let mut doc = load("<p>a</p><p>b</p>");
        let body = doc.body();
        let first = doc.first_child(body).unwrap();
        let second = doc.next_sibling(first).unwrap();
        assert!(!next_to_deleted_block_node_in_wt(&doc, Some(second), true));

        let meta = doc.add_diff_mark(first, DiffMark::Deleted).unwrap();
        doc.set_attr(meta, "data-is-block", "true");
        doc.remove(first);
        assert!(next_to_deleted_block_node_in_wt(&doc, Some(second), true));
        assert!(!next_to_deleted_block_node_in_wt(&doc, Some(second), false));

        // Through the zero-width paragraph wrapper
        let text = doc.first_child(second).unwrap();
        assert!(next_to_deleted_block_node_in_wt(&doc, Some(text), true));
    }

    #[test]
    fn test_preceding_space_suppression() {
        let doc = load("<p>x</p>\n  y<br>");
        let body = doc.body();
        let p = doc.first_child(body).unwrap();
        let text = doc.next_sibling(p).unwrap();
        let br = doc.next_sibling(text).unwrap();
        assert!(preceding_space_suppresses_indent_pre(&doc, text, p));
        assert!(!preceding_space_suppresses_indent_pre(&doc, text, text));
        assert!(preceding_space_suppresses_indent_pre(&doc, br, p));
        // A wikitext paragraph has no visible markup
        assert!(!preceding_space_suppresses_indent_pre(&doc, p, text));
    }
}
