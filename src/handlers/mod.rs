//! Per-tag serialization handlers.
//!
//! # Design
//!
//! A handler is a plain record of function pointers: `handle` writes the
//! node's wikitext, and `before`/`after`/`first_child`/`last_child`
//! report the newline constraints of the adjacencies the traversal
//! crosses (see [`wts::separators`](crate::wts::separators)). Handlers
//! sit in one static table keyed by tag name, or by tag name and syntax
//! variant (`dd_row`).
//!
//! `handle` returns the node the traversal continues with, which lets
//! encapsulated content skip its about-siblings and lets a handler
//! consume following siblings.
//!
//! # Available handlers
//!
//! - `block` - `body`, `p`, `br`, `hr`, `pre`, `meta`
//! - `heading` - `h1` through `h6`
//! - `list` - `ul`, `ol`, `dl`, `li`, `dt`, `dd`
//! - `table` - `table`, `tbody`, `thead`, `tfoot`, `tr`, `td`, `th`, `caption`
//! - `link` - `a`, `link`
//! - `quote` - `b`, `i`
//! - `encapsulated` - template, extension and parameter output
//! - `html` - literal HTML fallback

pub mod block;
pub mod encapsulated;
pub mod heading;
pub mod html;
pub mod link;
pub mod list;
pub mod quote;
pub mod table;

use std::fmt;
use std::sync::LazyLock;

use log::error;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::SelserResult;
use crate::node::predicates::{CHILD_TABLE_TAGS, in_set};
use crate::node::{Document, NodeId};
use crate::wts::WikitextSerializer;
use crate::wts::separators::SepConstraints;
use crate::wts::state::SerializerState;

static SELF_CLOSING_NOWIKI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<nowiki\s*/>").expect("valid regex"));

// =============================================================================
// TagHandler
// =============================================================================

/// Newline constraints between `node` and `other`.
pub type SepFn = fn(&Document, NodeId, NodeId, &SerializerState<'_>) -> SepConstraints;

/// Serialize a node. The flag says the node's own tags are unmodified
/// and may be copied from source. Returns the next node to visit.
pub type HandleFn = fn(&mut WikitextSerializer<'_>, NodeId, bool) -> SelserResult<Option<NodeId>>;

/// Serialization behaviour of one kind of element.
#[derive(Clone, Copy)]
pub struct TagHandler {
    pub name: &'static str,
    pub handle: HandleFn,
    pub before: SepFn,
    pub after: SepFn,
    pub first_child: SepFn,
    pub last_child: SepFn,
    /// The node's wikitext must start a line
    pub force_sol: bool,
}

impl TagHandler {
    pub const fn new(name: &'static str, handle: HandleFn) -> Self {
        Self {
            name,
            handle,
            before: no_constraints,
            after: no_constraints,
            first_child: no_constraints,
            last_child: no_constraints,
            force_sol: false,
        }
    }

    pub const fn with_before(self, before: SepFn) -> Self {
        Self { before, ..self }
    }

    pub const fn with_after(self, after: SepFn) -> Self {
        Self { after, ..self }
    }

    pub const fn with_first_child(self, first_child: SepFn) -> Self {
        Self { first_child, ..self }
    }

    pub const fn with_last_child(self, last_child: SepFn) -> Self {
        Self { last_child, ..self }
    }

    pub const fn forcing_sol(self) -> Self {
        Self {
            force_sol: true,
            ..self
        }
    }
}

impl fmt::Debug for TagHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagHandler")
            .field("name", &self.name)
            .field("force_sol", &self.force_sol)
            .finish_non_exhaustive()
    }
}

pub fn no_constraints(_: &Document, _: NodeId, _: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    SepConstraints::NONE
}

fn handle_nothing(wts: &mut WikitextSerializer<'_>, node: NodeId, _: bool) -> SelserResult<Option<NodeId>> {
    Ok(wts.state.doc.next_sibling(node))
}

/// Handler of text, comments and other non-elements: no constraints.
pub static EMPTY: TagHandler = TagHandler::new("", handle_nothing);

// =============================================================================
// HandlerTable
// =============================================================================

static HANDLERS: LazyLock<HandlerTable> = LazyLock::new(HandlerTable::build);

/// Handler registry.
#[derive(Debug)]
pub struct HandlerTable {
    by_key: FxHashMap<&'static str, TagHandler>,
}

impl HandlerTable {
    /// The shared table.
    pub fn global() -> &'static Self {
        &HANDLERS
    }

    fn build() -> Self {
        let groups: [&[TagHandler]; 6] = [
            block::HANDLERS,
            heading::HANDLERS,
            list::HANDLERS,
            table::HANDLERS,
            link::HANDLERS,
            quote::HANDLERS,
        ];
        let by_key = groups
            .into_iter()
            .flatten()
            .map(|h| (h.name, *h))
            .collect();
        Self { by_key }
    }

    pub fn get(&self, key: &str) -> Option<&TagHandler> {
        self.by_key.get(key)
    }

    fn html(&self) -> &TagHandler {
        &html::HTML
    }

    /// Handler for `node`.
    ///
    /// Encapsulated content wins, then a syntax-specific handler
    /// (`tag_stx`). Literal-HTML syntax, table parts inside an HTML table
    /// and items of an HTML list fall back to the literal-HTML handler, as
    /// does any tag without a handler.
    pub fn lookup(&self, doc: &Document, node: NodeId) -> &TagHandler {
        let Some(tag) = doc.tag(node) else {
            return &EMPTY;
        };
        if doc.is_first_encapsulation_wrapper(node) {
            return &encapsulated::ENCAPSULATED;
        }

        let dp = doc.dp(node);
        let specialized = dp
            .stx
            .as_ref()
            .and_then(|stx| self.get(&format!("{tag}_{}", stx.as_str())));
        if let Some(h) = specialized {
            return h;
        }
        if dp.is_html() && tag != "a" {
            return self.html();
        }
        if in_set(CHILD_TABLE_TAGS, tag) && !doc.is_zero_width_wikitext_elt(node) && doc.in_html_table_tag(node) {
            return self.html();
        }
        if doc.is_list_item(node)
            && doc
                .parent(node)
                .is_some_and(|p| doc.is_list(p) && doc.is_literal_html(p))
        {
            return self.html();
        }
        self.get(tag).unwrap_or_else(|| self.html())
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Space to put after the opening markup of a new element, unless its
/// content already starts with whitespace.
///
/// Edited elements get nothing here; whitespace trimmed by the wikitext
/// grammar is recovered from source by the separator logic.
pub fn leading_space(doc: &Document, node: NodeId, new_elt_default: &'static str) -> &'static str {
    if !doc.is_new_elt(node) {
        return "";
    }
    match doc.first_non_deleted_child(node) {
        Some(fc) if doc.text(fc).is_none_or(|t| !t.starts_with(char::is_whitespace)) => new_elt_default,
        _ => "",
    }
}

/// Counterpart of [`leading_space`] before the closing markup.
pub fn trailing_space(doc: &Document, node: NodeId, new_elt_default: &'static str) -> &'static str {
    if !doc.is_new_elt(node) {
        return "";
    }
    match doc.last_non_deleted_child(node) {
        Some(lc) if doc.text(lc).is_none_or(|t| !t.ends_with(char::is_whitespace)) => new_elt_default,
        _ => "",
    }
}

/// Both start and end tag were inserted by the tree builder.
pub fn is_builder_inserted_elt(doc: &Document, node: NodeId) -> bool {
    doc.is_element(node) && {
        let dp = doc.dp(node);
        dp.auto_inserted_start && dp.auto_inserted_end
    }
}

/// Bullet prefix (`*#:;`) of a list item, built from its list ancestors.
pub fn list_bullets(state: &SerializerState<'_>, node: NodeId) -> String {
    let doc = state.doc;
    let space = leading_space(doc, node, " ");

    let mut res = String::new();
    let mut cur = Some(node);
    while let Some(n) = cur {
        let dp = doc.dp(n);
        let tag = doc.tag(n).unwrap_or_default();
        let listy = matches!(tag, "ul" | "ol" | "dl" | "li" | "dt" | "dd");
        if listy && !dp.is_html() {
            match tag {
                "li" => {
                    let mut parent = doc.parent(n);
                    while let Some(p) = parent
                        && !(doc.is_tag(p, "ul") || doc.is_tag(p, "ol"))
                    {
                        parent = doc.parent(p);
                    }
                    match parent {
                        Some(p) if doc.is_tag(p, "ul") => res.insert(0, '*'),
                        Some(_) => res.insert(0, '#'),
                        None => error!(
                            target: "selser::wts",
                            "top-level <li> not nested in <ol>/<ul>: {}",
                            doc.outer_html(n)
                        ),
                    }
                }
                "dt" => res.insert(0, ';'),
                "dd" => res.insert(0, ':'),
                _ => {}
            }
        } else if !is_builder_inserted_elt(doc, n) || !dp.is_html() {
            break;
        }
        cur = doc.parent(n);
    }

    if res.is_empty() {
        res
    } else {
        res + space
    }
}

/// Newline constraints at the end of a list or list item.
pub fn wt_list_eol(doc: &Document, node: NodeId, other: NodeId) -> SepConstraints {
    if !doc.is_element(other) || doc.is_body(other) {
        return SepConstraints::new(0, 2);
    }
    if doc.is_first_encapsulation_wrapper(other) {
        return SepConstraints::new(usize::from(doc.is_list(node)), 2);
    }

    let next_is_other = doc.next_non_sep_sibling(node) == Some(other);
    let dp = doc.dp(other);
    if (next_is_other && dp.is_html()) || dp.src.is_some() {
        SepConstraints::new(0, 2)
    } else if next_is_other && (doc.is_list(other) || doc.is_list_item(other)) {
        if doc.is_list(node) && doc.tag(other) == doc.tag(node) {
            // Adjacent lists of the same type need an extra newline
            SepConstraints::new(2, 2)
        } else if doc.is_list_item(node)
            || doc.parent(node).is_some_and(|p| doc.is_tag(p, "li") || doc.is_tag(p, "dd"))
        {
            SepConstraints::new(1, 1)
        } else {
            SepConstraints::new(1, 2)
        }
    } else if doc.is_list(other) || dp.is_html() {
        // Last child of the list: the list decides
        SepConstraints::NONE
    } else if doc
        .parent(node)
        .is_some_and(|p| doc.is_block_node(p) && doc.last_non_sep_child(p) == Some(node))
    {
        SepConstraints::new(1, 2)
    } else if doc.is_formatting_elt(other) {
        SepConstraints::new(1, 1)
    } else {
        SepConstraints::new(2, 2)
    }
}

/// Re-emit the source of a placeholder (an unedited uneditable form).
pub fn emit_placeholder_src(wts: &mut WikitextSerializer<'_>, node: NodeId) {
    let doc = wts.state.doc;
    let Some(src) = doc.dp(node).src.as_deref() else {
        return;
    };
    if SELF_CLOSING_NOWIKI_RE.is_match(src) {
        wts.state.has_self_closing_nowikis = true;
    }
    if !src.is_empty() && src.chars().all(|c| c == '\n') {
        wts.state.append_sep(src);
    } else {
        wts.emit_wikitext(src, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelserConfig;

    fn load(html: &str) -> Document {
        Document::parse_html(html).unwrap()
    }

    #[test]
    fn test_lookup_by_tag() {
        let doc = load(r#"<p data-parsoid='{}'>a</p><span data-parsoid='{}'>b</span>"#);
        let table = HandlerTable::global();
        let p = doc.first_child(doc.body()).unwrap();
        assert_eq!(table.lookup(&doc, p).name, "p");
        let span = doc.next_sibling(p).unwrap();
        assert_eq!(table.lookup(&doc, span).name, "html");
        let text = doc.first_child(p).unwrap();
        assert_eq!(table.lookup(&doc, text).name, "");
    }

    #[test]
    fn test_lookup_literal_html() {
        let doc = load(
            r#"<p data-parsoid='{"stx":"html"}'>a</p><a data-parsoid='{"stx":"html"}' href="x">b</a>"#,
        );
        let table = HandlerTable::global();
        let p = doc.first_child(doc.body()).unwrap();
        assert_eq!(table.lookup(&doc, p).name, "html");
        // Links never serialize as HTML
        let a = doc.next_sibling(p).unwrap();
        assert_eq!(table.lookup(&doc, a).name, "a");
    }

    #[test]
    fn test_lookup_specialized_and_contextual() {
        let doc = load(concat!(
            r#"<dl data-parsoid='{}'><dt data-parsoid='{}'>a</dt><dd data-parsoid='{"stx":"row"}'>b</dd></dl>"#,
            r#"<table data-parsoid='{"stx":"html"}'><tbody data-parsoid='{}'><tr data-parsoid='{}'><td data-parsoid='{}'>c</td></tr></tbody></table>"#,
            r#"<ul data-parsoid='{"stx":"html"}'><li data-parsoid='{}'>d</li></ul>"#,
            r##"<span typeof="mw:Transclusion" about="#mwt1" data-parsoid='{}'>e</span>"##,
        ));
        let table = HandlerTable::global();
        let body = doc.body();
        let dl = doc.first_child(body).unwrap();
        let dd = doc.last_child(dl).unwrap();
        assert_eq!(table.lookup(&doc, dd).name, "dd_row");

        let html_table = doc.next_sibling(dl).unwrap();
        let td = doc.descendants(html_table).find(|&n| doc.is_tag(n, "td")).unwrap();
        assert_eq!(table.lookup(&doc, td).name, "html");
        // Zero-width table parts keep their handler
        let tbody = doc.first_child(html_table).unwrap();
        assert_eq!(table.lookup(&doc, tbody).name, "tbody");

        let ul = doc.next_sibling(html_table).unwrap();
        let li = doc.first_child(ul).unwrap();
        assert_eq!(table.lookup(&doc, li).name, "html");

        let span = doc.next_sibling(ul).unwrap();
        assert_eq!(table.lookup(&doc, span).name, "encapsulated");
    }

    #[test]
    fn test_list_bullets() {
        let doc = load(concat!(
            r#"<ul data-parsoid='{}'><li data-parsoid='{}'>a<ol data-parsoid='{}'><li data-parsoid='{}'>b</li></ol></li></ul>"#,
            r#"<dl data-parsoid='{}'><dd data-parsoid='{}'>c</dd></dl>"#,
        ));
        let state = SerializerState::new(&doc, None, SelserConfig::default());
        let body = doc.body();
        let ul = doc.first_child(body).unwrap();
        let li = doc.first_child(ul).unwrap();
        assert_eq!(list_bullets(&state, li), "*");
        let inner = doc.descendants(li).find(|&n| doc.is_tag(n, "li")).unwrap();
        assert_eq!(list_bullets(&state, inner), "*#");
        let dd = doc.first_child(doc.next_sibling(ul).unwrap()).unwrap();
        assert_eq!(list_bullets(&state, dd), ":");
    }

    #[test]
    fn test_new_element_spacing() {
        let doc = load(r#"<ul><li>x</li><li> y </li><li></li></ul>"#);
        let ul = doc.first_child(doc.body()).unwrap();
        let items = doc.child_ids(ul);
        assert!(doc.is_new_elt(items[0]));
        assert_eq!(leading_space(&doc, items[0], " "), " ");
        assert_eq!(trailing_space(&doc, items[0], " "), " ");
        assert_eq!(leading_space(&doc, items[1], " "), "");
        assert_eq!(trailing_space(&doc, items[1], " "), "");
        assert_eq!(leading_space(&doc, items[2], " "), "");

        let state = SerializerState::new(&doc, None, SelserConfig::default());
        assert_eq!(list_bullets(&state, items[0]), "* ");
    }

    #[test]
    fn test_edited_element_gets_no_default_space() {
        let doc = load(r#"<ul data-parsoid='{}'><li data-parsoid='{"dsr":[0,6,1,0]}'>item</li></ul>"#);
        let ul = doc.first_child(doc.body()).unwrap();
        let li = doc.first_child(ul).unwrap();
        assert_eq!(leading_space(&doc, li, " "), "");
    }

    #[test]
    fn test_list_eol() {
        let doc = load(concat!(
            r#"<ul data-parsoid='{}'><li data-parsoid='{}'>a</li></ul>"#,
            r#"<ul data-parsoid='{}'><li data-parsoid='{}'>b</li><li data-parsoid='{}'>c</li></ul>"#,
            r#"<p data-parsoid='{}'>d</p>"#,
        ));
        let body = doc.body();
        let ul1 = doc.first_child(body).unwrap();
        let ul2 = doc.next_sibling(ul1).unwrap();
        let p = doc.next_sibling(ul2).unwrap();
        let b = doc.first_child(ul2).unwrap();
        let c = doc.next_sibling(b).unwrap();

        let cons = |n, o| {
            let c = wt_list_eol(&doc, n, o);
            (c.min, c.max)
        };
        assert_eq!(cons(ul1, ul2), (Some(2), Some(2)));
        assert_eq!(cons(b, c), (Some(1), Some(1)));
        assert_eq!(cons(c, ul2), (None, None));
        assert_eq!(cons(ul2, p), (Some(2), Some(2)));
        assert_eq!(cons(ul2, body), (Some(0), Some(2)));
    }
}
