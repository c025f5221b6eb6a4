//! Tag classes and structural predicates.
//!
//! Tag sets mirror how wikitext maps onto HTML: which tags are blocks,
//! which open or close block scope for indent-pre purposes, which have
//! zero-width wikitext, and so on. The `Document` predicates built on
//! them answer the questions the differ, normalizer and serializer keep
//! asking ("is this literal HTML?", "what is the next content sibling?").

use crate::attr::AttrsExt;

use super::{Document, NodeId, NodeKind};

// =============================================================================
// Tag sets
// =============================================================================

/// Block-level tags (`video` deliberately excluded).
pub const BLOCK_TAGS: &[&str] = &[
    "div", "p", "table", "tbody", "thead", "tfoot", "caption", "th", "tr", "td", "ul", "ol",
    "li", "dl", "dt", "dd", "h1", "h2", "h3", "h4", "h5", "h6", "hgroup", "article", "aside",
    "nav", "section", "footer", "header", "figure", "figcaption", "fieldset", "details",
    "blockquote", "hr", "button", "canvas", "center", "col", "colgroup", "embed", "map",
    "object", "pre", "progress",
];

/// Tags that open block scope for indent-pre suppression.
pub const BLOCK_SCOPE_OPEN_TAGS: &[&str] = &[
    "blockquote", "pre", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "dl",
    "table", "tr",
];

/// Tags that close block scope.
pub const BLOCK_SCOPE_CLOSE_TAGS: &[&str] = &["td", "th"];

pub const TABLE_TAGS: &[&str] = &["table", "tbody", "thead", "tfoot", "caption", "th", "tr", "td"];

pub const CHILD_TABLE_TAGS: &[&str] = &["tbody", "thead", "tfoot", "tr", "caption", "th", "td"];

pub const FOSTERABLE_POSITION_TAGS: &[&str] = &["table", "thead", "tbody", "tfoot", "tr"];

pub const FORMATTING_TAGS: &[&str] = &[
    "a", "b", "big", "code", "em", "font", "i", "nobr", "s", "small", "strike", "strong", "tt", "u",
];

pub const LIST_TAGS: &[&str] = &["ul", "ol", "dl"];

pub const LIST_ITEM_TAGS: &[&str] = &["li", "dd", "dt"];

/// Quote-syntax tags (`''`, `'''`).
pub const QUOTE_TAGS: &[&str] = &["i", "b"];

/// Tags whose wikitext form has zero width (derived from wikitext tag widths).
pub const ZERO_WIDTH_WIKITEXT_TAGS: &[&str] = &[
    "p", "meta", "ol", "ul", "dl", "tbody", "thead", "tfoot", "br", "figcaption",
];

/// Wikitext constructs whose content has surrounding whitespace trimmed.
pub const WIKITEXT_TAGS_WITH_TRIMMABLE_WS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "ol", "li", "ul", "dd", "dl", "dt", "td", "th", "caption",
];

/// Tags only produced by wikitext that starts a line.
pub const HTML_TAGS_REQUIRING_SOL_CONTEXT: &[&str] = &[
    "pre", "h1", "h2", "h3", "h4", "h5", "h6", "ol", "li", "ul", "dd", "dl", "dt",
];

/// Leading whitespace in direct children of these does not start an indent-pre.
pub const WEAK_INDENT_PRE_SUPPRESSING_TAGS: &[&str] = &["table", "tbody", "tr"];

/// Leading whitespace anywhere below these does not start an indent-pre.
pub const STRONG_INDENT_PRE_SUPPRESSING_TAGS: &[&str] = &[
    "blockquote", "pre", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "dl", "li",
];

/// Leading whitespace changes how the wikitext of these parses (`*#;:=`).
pub const SOL_SPACE_SENSITIVE_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "dl", "dd", "dt",
];

pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// HTML tags allowed verbatim in wikitext.
pub const ALLOWED_LITERAL_TAGS: &[&str] = &[
    "abbr", "b", "bdi", "bdo", "big", "blockquote", "br", "caption", "center", "cite", "code",
    "data", "dd", "del", "dfn", "div", "dl", "dt", "em", "font", "h1", "h2", "h3", "h4", "h5",
    "h6", "hr", "i", "ins", "kbd", "li", "mark", "ol", "p", "pre", "q", "rb", "rp", "rt", "rtc",
    "ruby", "s", "samp", "small", "span", "strike", "strong", "sub", "sup", "table", "td", "th",
    "time", "tr", "tt", "u", "ul", "var", "wbr",
];

pub const HTML5_TAGS: &[&str] = &[
    "a", "abbr", "address", "area", "article", "aside", "audio", "b", "base", "bdi", "bdo",
    "blockquote", "body", "br", "button", "canvas", "caption", "cite", "code", "col",
    "colgroup", "data", "datalist", "dd", "del", "details", "dfn", "div", "dl", "dt", "em",
    "embed", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "head", "header", "hgroup", "hr", "html", "i", "iframe", "img", "input", "ins", "kbd",
    "keygen", "label", "legend", "li", "link", "map", "mark", "menu", "meta", "meter", "nav",
    "noscript", "object", "ol", "optgroup", "option", "output", "p", "param", "pre", "progress",
    "q", "rb", "rp", "rt", "rtc", "ruby", "s", "samp", "script", "section", "select", "small",
    "source", "span", "strong", "style", "sub", "summary", "sup", "table", "tbody", "td",
    "textarea", "tfoot", "th", "thead", "time", "title", "tr", "track", "u", "ul", "var",
    "video", "wbr",
];

#[inline]
pub fn in_set(set: &[&str], tag: &str) -> bool {
    set.contains(&tag)
}

pub fn is_block_tag(tag: &str) -> bool {
    in_set(BLOCK_TAGS, tag)
}

/// Heading level for `h1`..`h6`.
pub fn heading_level(tag: &str) -> Option<usize> {
    match tag.as_bytes() {
        [b'h', d @ b'1'..=b'6'] => Some((d - b'0') as usize),
        _ => None,
    }
}

/// Typeof words that start encapsulated content.
fn is_first_encap_type(word: &str) -> bool {
    matches!(word, "mw:Transclusion" | "mw:Param" | "mw:LanguageVariant")
        || word.strip_prefix("mw:Extension/").is_some_and(|ext| !ext.is_empty())
}

fn is_sol_transparent_rel(word: &str) -> bool {
    matches!(
        word,
        "mw:PageProp/Category" | "mw:PageProp/redirect" | "mw:PageProp/Language"
    )
}

// =============================================================================
// Document predicates
// =============================================================================

impl Document {
    // ─────────────────────────────────────────────────────────────────────────
    // Node classes
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    pub fn is_body(&self, id: NodeId) -> bool {
        id == self.body()
    }

    /// At the root of the serialization scope
    #[inline]
    pub fn at_the_top(&self, id: NodeId) -> bool {
        self.is_body(id) || self.parent(id).is_none()
    }

    fn tag_in(&self, id: NodeId, set: &[&str]) -> bool {
        self.tag(id).is_some_and(|t| in_set(set, t))
    }

    pub fn is_block_node(&self, id: NodeId) -> bool {
        self.tag(id).is_some_and(is_block_tag)
    }

    pub fn is_formatting_elt(&self, id: NodeId) -> bool {
        self.tag_in(id, FORMATTING_TAGS)
    }

    pub fn is_list(&self, id: NodeId) -> bool {
        self.tag_in(id, LIST_TAGS)
    }

    pub fn is_list_item(&self, id: NodeId) -> bool {
        self.tag_in(id, LIST_ITEM_TAGS)
    }

    pub fn is_table_tag(&self, id: NodeId) -> bool {
        self.tag_in(id, TABLE_TAGS)
    }

    pub fn is_quote_elt(&self, id: NodeId) -> bool {
        self.tag_in(id, QUOTE_TAGS)
    }

    /// Whitespace-only (possibly empty) text node
    pub fn is_iew(&self, id: NodeId) -> bool {
        self.kind(id).as_text().is_some_and(|t| t.chars().all(char::is_whitespace))
    }

    /// Not a comment, whitespace text or diff marker
    pub fn is_content_node(&self, id: NodeId) -> bool {
        !self.is_comment(id) && !self.is_iew(id) && !self.is_diff_marker(id, None)
    }

    /// Element written with literal HTML syntax
    pub fn is_literal_html(&self, id: NodeId) -> bool {
        self.is_element(id) && self.dp(id).is_html()
    }

    pub fn is_zero_width_wikitext_elt(&self, id: NodeId) -> bool {
        self.tag_in(id, ZERO_WIDTH_WIKITEXT_TAGS) && !self.is_literal_html(id)
    }

    pub fn is_block_node_with_visible_wt(&self, id: NodeId) -> bool {
        self.is_block_node(id) && !self.is_zero_width_wikitext_elt(id)
    }

    pub fn is_sol_transparent_link(&self, id: NodeId) -> bool {
        self.is_tag(id, "link")
            && self
                .element(id)
                .and_then(|e| e.attrs.find_word("rel", is_sol_transparent_rel))
                .is_some()
    }

    /// Metadata-like nodes that never render (comments, category links, metas)
    pub fn is_rendering_transparent(&self, id: NodeId) -> bool {
        if self.is_comment(id) || self.is_sol_transparent_link(id) {
            return true;
        }
        if self.is_tag(id, "meta") {
            return self.has_type_of(id, "mw:StartTag")
                || self.has_type_of(id, "mw:EndTag")
                || !self.dp(id).is_html();
        }
        self.is_tag(id, "span") && self.has_type_of(id, "mw:FallbackId")
    }

    /// Emits wikitext that neither breaks the line nor changes SOL state
    pub fn emits_sol_transparent_single_line_wt(&self, id: NodeId) -> bool {
        match self.kind(id).as_text() {
            Some(t) => t.chars().all(|c| c == ' ' || c == '\t'),
            None => self.is_rendering_transparent(id),
        }
    }

    pub fn is_category_link(&self, id: NodeId) -> bool {
        self.is_tag(id, "link") && self.element(id).is_some_and(|e| e.has_rel("mw:PageProp/Category"))
    }

    /// Indent-pre (a `pre` from leading-space wikitext)
    pub fn is_indent_pre(&self, id: NodeId) -> bool {
        self.is_tag(id, "pre") && !self.is_literal_html(id)
    }

    pub fn is_redirect_link(&self, id: NodeId) -> bool {
        self.is_tag(id, "link") && self.element(id).is_some_and(|e| e.has_rel("mw:PageProp/redirect"))
    }

    /// List or list item somewhere below another list item
    pub fn is_nested_list_or_list_item(&self, id: NodeId) -> bool {
        (self.is_list(id) || self.is_list_item(id)) && {
            let mut cur = self.parent(id);
            loop {
                match cur {
                    Some(p) if self.is_list_item(p) => break true,
                    Some(p) => cur = self.parent(p),
                    None => break false,
                }
            }
        }
    }

    /// No element (other than diff markers), comment, or text beyond blanks.
    /// `strict` rejects whitespace-only text too.
    pub fn node_essentially_empty(&self, id: NodeId, strict: bool) -> bool {
        self.children(id).all(|c| match self.kind(c) {
            NodeKind::Element(_) => self.is_diff_marker(c, None),
            NodeKind::Text(t) => !strict && t.chars().all(|ch| ch == ' ' || ch == '\t'),
            NodeKind::Comment(_) => false,
        })
    }

    pub fn has_ancestor_of_name(&self, id: NodeId, tag: &str) -> bool {
        let mut cur = self.parent(id);
        while let Some(n) = cur {
            if self.is_tag(n, tag) {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Parent is a table-structure tag where text gets fostered
    pub fn is_fosterable_position(&self, id: NodeId) -> bool {
        self.parent(id).is_some_and(|p| self.tag_in(p, FOSTERABLE_POSITION_TAGS))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Encapsulated content
    // ─────────────────────────────────────────────────────────────────────────

    /// First wrapper of template/extension output
    pub fn is_first_encapsulation_wrapper(&self, id: NodeId) -> bool {
        self.element(id)
            .and_then(|e| e.attrs.find_word("typeof", is_first_encap_type))
            .is_some()
    }

    /// The first wrapper of the encapsulated run `id` belongs to
    pub fn find_first_encapsulation_wrapper(&self, id: NodeId) -> Option<NodeId> {
        if !self.is_element(id) {
            return None;
        }
        let about = self.attr(id, "about");
        let mut cur = id;
        loop {
            if self.is_first_encapsulation_wrapper(cur) {
                return Some(cur);
            }
            let about = about?;
            let prev = self.prev_sibling(cur)?;
            if !self.is_element(prev) || self.attr(prev, "about") != Some(about) {
                return None;
            }
            cur = prev;
        }
    }

    pub fn is_encapsulation_wrapper(&self, id: NodeId) -> bool {
        self.find_first_encapsulation_wrapper(id).is_some()
    }

    /// `id` followed by every sibling sharing its about-id
    pub fn about_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let mut nodes = vec![id];
        let Some(about) = self.attr(id, "about").filter(|a| !a.is_empty()) else {
            return nodes;
        };
        let mut cur = self.next_sibling(id);
        while let Some(n) = cur {
            let same_about = self.is_element(n) && self.attr(n, "about") == Some(about);
            let fostered_ws = !self.is_element(n) && self.is_fosterable_position(n) && self.is_iew(n);
            if !(same_about || fostered_ws) {
                break;
            }
            nodes.push(n);
            cur = self.next_sibling(n);
        }
        while nodes.len() > 1 && nodes.last().is_some_and(|&n| self.is_iew(n)) {
            nodes.pop();
        }
        nodes
    }

    /// The first node after the encapsulated run starting at `id`
    pub fn skip_over_encapsulated(&self, id: NodeId) -> Option<NodeId> {
        if self.has_attr(id, "about") {
            let run = self.about_siblings(id);
            run.last().and_then(|&n| self.next_sibling(n))
        } else {
            self.next_sibling(id)
        }
    }

    /// Next sibling, treating an encapsulated run as one node
    pub fn next_non_template_sibling(&self, id: NodeId) -> Option<NodeId> {
        if self.is_encapsulation_wrapper(id) {
            self.skip_over_encapsulated(id)
        } else {
            self.next_sibling(id)
        }
    }

    /// Newly authored element (checked on the wrapper for encapsulated content)
    pub fn is_new_elt(&self, id: NodeId) -> bool {
        if !self.is_element(id) {
            return false;
        }
        let wrapper = self.find_first_encapsulation_wrapper(id).unwrap_or(id);
        self.is_new(wrapper)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sibling navigation skipping separators / markers
    // ─────────────────────────────────────────────────────────────────────────

    pub fn next_non_sep_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut n = self.next_sibling(id);
        while let Some(c) = n {
            if self.is_content_node(c) {
                return Some(c);
            }
            n = self.next_sibling(c);
        }
        None
    }

    pub fn previous_non_sep_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut n = self.prev_sibling(id);
        while let Some(c) = n {
            if self.is_content_node(c) {
                return Some(c);
            }
            n = self.prev_sibling(c);
        }
        None
    }

    pub fn first_non_sep_child(&self, id: NodeId) -> Option<NodeId> {
        let first = self.first_child(id)?;
        if self.is_content_node(first) {
            Some(first)
        } else {
            self.next_non_sep_sibling(first)
        }
    }

    pub fn last_non_sep_child(&self, id: NodeId) -> Option<NodeId> {
        let last = self.last_child(id)?;
        if self.is_content_node(last) {
            Some(last)
        } else {
            self.previous_non_sep_sibling(last)
        }
    }

    pub fn next_non_deleted_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut n = self.next_sibling(id);
        while let Some(c) = n {
            if !self.is_diff_marker(c, None) {
                return Some(c);
            }
            n = self.next_sibling(c);
        }
        None
    }

    pub fn previous_non_deleted_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut n = self.prev_sibling(id);
        while let Some(c) = n {
            if !self.is_diff_marker(c, None) {
                return Some(c);
            }
            n = self.prev_sibling(c);
        }
        None
    }

    pub fn first_non_deleted_child(&self, id: NodeId) -> Option<NodeId> {
        let first = self.first_child(id)?;
        if self.is_diff_marker(first, None) {
            self.next_non_deleted_sibling(first)
        } else {
            Some(first)
        }
    }

    pub fn last_non_deleted_child(&self, id: NodeId) -> Option<NodeId> {
        let last = self.last_child(id)?;
        if self.is_diff_marker(last, None) {
            self.previous_non_deleted_sibling(last)
        } else {
            Some(last)
        }
    }

    /// Text children only (diff markers aside)
    pub fn all_children_are_text(&self, id: NodeId) -> bool {
        self.children(id).all(|c| self.is_text(c) || self.is_diff_marker(c, None))
    }

    /// Inside a table written with literal HTML syntax
    pub fn in_html_table_tag(&self, id: NodeId) -> bool {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if self.is_tag(p, "table") {
                return self.is_literal_html(p);
            }
            cur = self.parent(p);
        }
        false
    }

    /// Whether `id` has exactly `n` children, optionally not counting diff markers
    pub fn has_n_children(&self, id: NodeId, n: usize, count_diff_markers: bool) -> bool {
        self.children(id)
            .filter(|&c| count_diff_markers || !self.is_diff_marker(c, None))
            .take(n + 1)
            .count()
            == n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Element;

    #[test]
    fn test_tag_sets() {
        assert!(is_block_tag("table"));
        assert!(!is_block_tag("video"));
        assert!(!is_block_tag("span"));
        assert_eq!(heading_level("h3"), Some(3));
        assert_eq!(heading_level("h7"), None);
        assert_eq!(heading_level("hr"), None);
    }

    #[test]
    fn test_sep_navigation() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = doc.create_element("p");
        let ws = doc.create_text("\n");
        let c = doc.create_comment("x");
        let b = doc.create_element("p");
        for n in [a, ws, c, b] {
            doc.append_child(body, n);
        }
        assert_eq!(doc.next_non_sep_sibling(a), Some(b));
        assert_eq!(doc.previous_non_sep_sibling(b), Some(a));
        assert_eq!(doc.first_non_sep_child(body), Some(a));
        assert_eq!(doc.last_non_sep_child(body), Some(b));
        assert!(doc.is_iew(ws));
        assert!(!doc.is_content_node(c));
        assert!(doc.has_n_children(body, 4, true));
    }

    #[test]
    fn test_encapsulation_run() {
        let mut doc = Document::new();
        let body = doc.create_element("div");
        doc.append_child(doc.body(), body);
        let first = doc.create_element_with(
            Element::new("span").attr("typeof", "mw:Transclusion").attr("about", "#mwt1"),
        );
        let second = doc.create_element_with(Element::new("span").attr("about", "#mwt1"));
        let after = doc.create_text("x");
        for n in [first, second, after] {
            doc.append_child(body, n);
        }
        assert!(doc.is_first_encapsulation_wrapper(first));
        assert!(!doc.is_first_encapsulation_wrapper(second));
        assert_eq!(doc.find_first_encapsulation_wrapper(second), Some(first));
        assert_eq!(doc.about_siblings(first), vec![first, second]);
        assert_eq!(doc.skip_over_encapsulated(first), Some(after));
        assert_eq!(doc.next_non_template_sibling(first), Some(after));
    }

    #[test]
    fn test_literal_html_and_zero_width() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append_child(doc.body(), p);
        assert!(doc.is_zero_width_wikitext_elt(p));
        assert!(!doc.is_block_node_with_visible_wt(p));
        doc.dp_mut(p).stx = Some(crate::node::Stx::Html);
        assert!(doc.is_literal_html(p));
        assert!(doc.is_block_node_with_visible_wt(p));
    }

    #[test]
    fn test_sol_transparent() {
        let mut doc = Document::new();
        let link = doc.create_element_with(
            Element::new("link").attr("rel", "mw:PageProp/Category").attr("href", "./Category:X"),
        );
        let space = doc.create_text("  ");
        let word = doc.create_text("x");
        assert!(doc.is_sol_transparent_link(link));
        assert!(doc.is_category_link(link));
        assert!(doc.emits_sol_transparent_single_line_wt(link));
        assert!(doc.emits_sol_transparent_single_line_wt(space));
        assert!(!doc.emits_sol_transparent_single_line_wt(word));
    }
}
