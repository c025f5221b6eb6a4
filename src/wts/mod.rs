//! HTML to wikitext serializer.
//!
//! # Design
//!
//! [`WikitextSerializer`] walks the (normalized) DOM depth first. Every
//! element goes through [`serialize_dom_node`](WikitextSerializer::serialize_dom_node),
//! which in selser mode copies an unmodified node's original source
//! verbatim and only hands modified nodes to their tag handler. Around
//! each node the separator constraints of the adjacency are collected;
//! the separator itself is only produced when the next chunk is emitted
//! (see [`state`]).
//!
//! After the walk a few line-based passes remove `<nowiki>` escapes that
//! turned out to be unnecessary once the whole line was known.
//!
//! # Modules
//!
//! - `state` - output buffers and serialization flags
//! - `separators` - newline constraints and separator synthesis
//! - `escape` / `tokenizer` - deciding what text would parse as markup
//! - `utils` - tree queries shared with the normalizer

pub mod escape;
pub mod separators;
pub mod state;
pub mod tokenizer;
pub mod utils;

use std::mem;
use std::sync::LazyLock;

use log::{debug, trace};
use regex::{Captures, Regex};

use crate::config::SelserConfig;
use crate::error::SelserResult;
use crate::handlers::{EMPTY, HandlerTable, TagHandler};
use crate::node::predicates::{HTML5_TAGS, in_set, is_block_tag};
use crate::node::{Document, NodeId, NodeKind};
use crate::normalize::Normalizer;
use crate::span::SourceRange;
use crate::template::TemplateHintMap;

use escape::{EscapeHandler, escape_wt_entities, escaped_text};
use separators::{SepType, handle_separator_text, update_separator_constraints};
use state::SerializerState;
use utils::{COMMENT_PATTERN, comment_wt, orig_src_valid_in_edited_context, trace_node_name};

static SEP_PREFIX_WITH_NLS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*\n+\s*").expect("valid regex"));
static SEP_SUFFIX_WITH_NLS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*$").expect("valid regex"));
static DOUBLE_NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n([ \t]*\n)+").expect("valid regex"));

static TRAILING_NOWIKI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^=]*?)(?:<nowiki\s*/>\s*)+$").expect("valid regex"));
static SELF_CLOSING_NOWIKI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<nowiki\s*/>").expect("valid regex"));
static QUOTE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'''''|'''|''|\[\[|\]\]|\{\{|\}\}|<\w+(?:\s+[^>]*?|\s*?)/?>|</\w+\s*>").expect("valid regex")
});
static TAG_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^<(/?\w+)").expect("valid regex"));

static COMMENT_OR_WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^(?:\s|{COMMENT_PATTERN})*$")).expect("valid regex"));
static HEADING_NOWIKI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?:{COMMENT_PATTERN})*<nowiki>(=+[^=]+=+)</nowiki>(.+)$")).expect("valid regex")
});

/// Wikitext that renders nothing and keeps the line start: comments and
/// category links.
const SOL_TRANSPARENT_PATTERN: &str = r"(?:<!--(?:[^-]|-[^-]|--+[^->])*-*-->|\[\[Category:[^\]]*\]\])";

static INDENT_PRE_NOWIKI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?m)^((?:{SOL_TRANSPARENT_PATTERN})*)(<nowiki>\s+</nowiki>)([^\n]*(?:\n|$))"
    ))
    .expect("valid regex")
});
static SOL_TRANSPARENT_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?:\s|{SOL_TRANSPARENT_PATTERN})*$")).expect("valid regex")
});
static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^!][^<>]*>").expect("valid regex"));
static NOWIKI_SPACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<nowiki>(\s+)</nowiki>").expect("valid regex"));

// =============================================================================
// WikitextSerializer
// =============================================================================

/// Serializer for one document.
#[derive(Debug)]
pub struct WikitextSerializer<'a> {
    pub state: SerializerState<'a>,
    handlers: &'static HandlerTable,
    templates: &'a TemplateHintMap,
}

impl<'a> WikitextSerializer<'a> {
    pub fn new(
        doc: &'a Document,
        orig_src: Option<&'a str>,
        config: SelserConfig,
        templates: &'a TemplateHintMap,
    ) -> Self {
        Self {
            state: SerializerState::new(doc, orig_src, config),
            handlers: HandlerTable::global(),
            templates,
        }
    }

    /// Normalize `doc`, then serialize it.
    ///
    /// In selser mode, unmodified subtrees are copied from `orig_src`.
    pub fn serialize_dom(
        doc: &mut Document,
        orig_src: Option<&str>,
        config: SelserConfig,
        templates: &TemplateHintMap,
        selser_mode: bool,
    ) -> SelserResult<String> {
        let stats = Normalizer::new(&config, selser_mode).normalize(doc);
        debug!(target: "selser::wts", "normalized ({} rewrites), selser: {selser_mode}", stats.total());

        let doc: &Document = doc;
        let mut wts = WikitextSerializer::new(doc, orig_src, config, templates);
        wts.kick_off_serialize(selser_mode)
    }

    /// Serialize an HTML fragment non-selectively (template argument values).
    pub fn serialize_html_fragment(&self, html: &str) -> SelserResult<String> {
        let mut doc = Document::parse_html(html)?;
        Self::serialize_dom(&mut doc, None, self.state.config, self.templates, false)
    }

    /// Template hints collected before the walk.
    pub fn templates(&self) -> &'a TemplateHintMap {
        self.templates
    }

    /// Serialize the whole (already normalized) document.
    pub fn kick_off_serialize(&mut self, selser_mode: bool) -> SelserResult<String> {
        let doc = self.state.doc;
        let body = doc.body();
        self.state.init_mode(selser_mode);
        self.state.update_sep(body);
        self.state.reset_curr_line(doc.first_child(body));

        self.serialize_children(body, None)?;
        // Child-parent separators of the body
        self.state.emit_chunk("", body);
        self.state.flush_line();

        if self.state.has_indent_pre_nowikis {
            self.strip_unnecessary_indent_pre_nowikis();
        }

        let state = &self.state;
        let split_lines = state.selser_mode
            || state.has_quote_nowikis
            || state.has_self_closing_nowikis
            || state.has_heading_escapes;
        if split_lines {
            let out = state
                .out
                .split('\n')
                .map(|line| {
                    let line = self.strip_unnecessary_quote_nowikis(line);
                    let line = TRAILING_NOWIKI_RE.replace(&line, "$1").into_owned();
                    self.strip_unnecessary_heading_nowikis(line)
                })
                .collect::<Vec<_>>()
                .join("\n");
            self.state.out = out;
        }

        Ok(mem::take(&mut self.state.out))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Children
    // ─────────────────────────────────────────────────────────────────────────

    /// Serialize the children of `node` in place, under `escaper` if given.
    pub fn serialize_children(&mut self, node: NodeId, escaper: Option<EscapeHandler>) -> SelserResult<()> {
        let doc = self.state.doc;
        if escaper.is_some() {
            self.state.escape_handler_stack.push(escaper);
        }

        let mut child = doc.first_child(node);
        while let Some(c) = child {
            let next = self.serialize_node(c)?;
            if next == Some(node) {
                break;
            }
            child = if next == Some(c) { doc.next_sibling(c) } else { next };
        }

        if escaper.is_some() {
            self.state.escape_handler_stack.pop();
        }
        // Serializing children means the node itself was modified
        self.state.curr_node_unmodified = false;
        Ok(())
    }

    /// Serialize the children of `node` into a separate string, leaving the
    /// main output and separator state untouched.
    pub fn serialize_children_to_string(
        &mut self,
        node: NodeId,
        escaper: Option<EscapeHandler>,
    ) -> SelserResult<String> {
        let snapshot = self.state.begin_nested();
        let res = self.serialize_children(node, escaper);
        if res.is_ok() {
            self.state.emit_chunk("", node);
            self.state.flush_line();
        }
        let bits = self.state.end_nested(snapshot);
        res.map(|()| bits)
    }

    impl_flagged_children_to_string!(link, caption, indent_pre);

    // ─────────────────────────────────────────────────────────────────────────
    // Nodes
    // ─────────────────────────────────────────────────────────────────────────

    /// Serialize one node; returns the node to continue with.
    pub fn serialize_node(&mut self, node: NodeId) -> SelserResult<Option<NodeId>> {
        let doc = self.state.doc;
        trace!(
            target: "selser::wts",
            "{}; prev-unmodified: {}; SOL: {}",
            trace_node_name(doc, node),
            self.state.prev_node_unmodified,
            self.state.on_sol
        );

        let handler: &'static TagHandler = match doc.kind(node) {
            NodeKind::Element(_) => {
                // Diff markers emit nothing but break source reuse
                if doc.is_diff_marker(node, None) {
                    self.state.sep.last_source_node = Some(node);
                    self.state.update_modification_flags(node);
                    return Ok(doc.next_sibling(node));
                }
                self.handlers.lookup(doc, node)
            }
            NodeKind::Text(_) => {
                if handle_separator_text(&mut self.state, node) {
                    return Ok(doc.next_sibling(node));
                }
                if self.state.selser_mode {
                    let unmodified_position = match doc.prev_sibling(node) {
                        None => doc.parent(node).is_some_and(|p| doc.is_body(p)),
                        Some(prev) => !doc.is_diff_marker(prev, None),
                    };
                    self.state.curr_node_unmodified = !self.state.in_modified_content && unmodified_position;
                }
                &EMPTY
            }
            NodeKind::Comment(data) => {
                // Comments are separator material
                let sep = format!("{}{}", self.state.sep.src, comment_wt(data));
                self.state.set_sep(sep);
                return Ok(doc.next_sibling(node));
            }
        };

        if let Some(prev) = doc.previous_non_sep_sibling(node).or_else(|| doc.parent(node)) {
            let prev_handler = self.handlers.lookup(doc, prev);
            update_separator_constraints(&mut self.state, prev, prev_handler, node, handler);
        }

        let next = if doc.is_text(node) {
            self.serialize_text_node(node);
            doc.next_sibling(node)
        } else {
            self.serialize_dom_node(node, handler)?
        };

        if let Some(after) = doc.next_non_sep_sibling(node).or_else(|| doc.parent(node)) {
            let after_handler = self.handlers.lookup(doc, after);
            update_separator_constraints(&mut self.state, node, handler, after, after_handler);
        }

        self.state.update_modification_flags(node);
        Ok(next)
    }

    /// Serialize an element: from source when it is unmodified, otherwise
    /// through its handler.
    pub fn serialize_dom_node(&mut self, node: NodeId, handler: &TagHandler) -> SelserResult<Option<NodeId>> {
        let doc = self.state.doc;
        let dp = doc.dp(node);
        let mut wrapper_unmodified = false;

        let reusable = self.state.selser_mode
            && !self.state.in_modified_content
            && orig_src_valid_in_edited_context(doc, node);
        if reusable
            && let Some(dsr) = dp.dsr.filter(SourceRange::is_valid)
            && let (Some(start), Some(end)) = (dsr.start, dsr.end)
            && (end > start
                || (end == start && matches!(doc.tag(node), Some("p" | "br" | "ol")))
                || dp.fostered
                || dp.misnested)
        {
            if !doc.has_diff_markers(node) {
                return Ok(self.emit_orig_src(node, start, end));
            }

            let tags_trustworthy = (!dp.auto_inserted_start && !dp.auto_inserted_end)
                || matches!(doc.tag(node), Some("td" | "th" | "tr"));
            if doc.only_subtree_changed(node) && dsr.has_valid_tag_widths() && tags_trustworthy {
                wrapper_unmodified = true;
            }
        }

        self.state.curr_node_unmodified = false;

        let in_modified_content = self.state.selser_mode && doc.has_inserted_diff_mark(node);
        if in_modified_content {
            self.state.in_modified_content = true;
        }
        let next = (handler.handle)(self, node, wrapper_unmodified);
        if in_modified_content {
            self.state.in_modified_content = false;
        }
        next
    }

    /// Copy an unmodified node's source and skip its subtree.
    fn emit_orig_src(&mut self, node: NodeId, start: usize, end: usize) -> Option<NodeId> {
        let doc = self.state.doc;
        let state = &mut self.state;
        state.curr_node_unmodified = true;

        // A zero-width wrapper vanishes in wikitext: its constraints carry
        // over to its first child
        if doc.is_zero_width_wikitext_elt(node)
            && let Some(first) = doc.first_child(node)
            && let Some(info) = state.sep.constraints.as_mut().and_then(|c| c.info.as_mut())
            && info.sep_type == SepType::Sibling
        {
            info.on_sol = state.on_sol;
            info.sep_type = SepType::ParentChild;
            info.node_a = node;
            info.node_b = first;
        }

        let out = state.get_orig_src(start, end).unwrap_or_default();
        trace!(target: "selser::wts", "ORIG-src with DSR [{start},{end}] = {out:?}");

        let suppress_single_line = doc.is_first_encapsulation_wrapper(node)
            || matches!(doc.tag(node), Some("dl" | "ul" | "ol"))
            || (doc.is_tag(node, "table")
                && doc.parent(node).is_some_and(|p| doc.is_tag(p, "dd"))
                && doc.previous_non_sep_sibling(node).is_none());
        if suppress_single_line {
            state.single_line_context.disable();
        }
        state.emit_chunk(out, node);
        if suppress_single_line {
            state.single_line_context.pop();
        }

        if doc.is_first_encapsulation_wrapper(node) {
            doc.skip_over_encapsulated(node)
        } else {
            doc.next_sibling(node)
        }
    }

    fn serialize_text_node(&mut self, node: NodeId) {
        let doc = self.state.doc;
        let Some(text) = doc.text(node) else {
            return;
        };
        let state = &mut self.state;

        let double_newlines = DOUBLE_NEWLINE_RE.find_iter(text).count();
        let new_sep = SEP_SUFFIX_WITH_NLS_RE.find(text).map(|m| m.as_str().to_string());
        let mut res = SEP_SUFFIX_WITH_NLS_RE.replace(text, "").into_owned();

        if !state.in_indent_pre {
            // A single blank line between text-only content is a paragraph
            // break worth keeping; anything else collapses
            let text_only_parent = doc.parent(node).is_some_and(|p| doc.all_children_are_text(p));
            if !state.in_html_pre && (!text_only_parent || double_newlines != 1) {
                res = DOUBLE_NEWLINE_RE.replace_all(&res, "\n").into_owned();
            }
            // Already buffered as separator text
            res = SEP_PREFIX_WITH_NLS_RE.replace(&res, "").into_owned();
        }

        let res = escape_wt_entities(&res);

        state.escape_text = (state.on_sol || !state.curr_node_unmodified) && !state.in_no_wiki && !state.in_html_pre;
        state.emit_chunk(&res, node);
        state.escape_text = false;

        self.move_trailing_newlines_to_sep(new_sep, node);
    }

    /// Emit wikitext that needs no escaping.
    pub fn emit_wikitext(&mut self, text: &str, node: NodeId) {
        let res = SEP_PREFIX_WITH_NLS_RE.replace(text, "");
        let new_sep = SEP_SUFFIX_WITH_NLS_RE.find(&res).map(|m| m.as_str().to_string());
        let res = SEP_SUFFIX_WITH_NLS_RE.replace(&res, "");
        self.state.emit_chunk(&res, node);
        self.move_trailing_newlines_to_sep(new_sep, node);
    }

    fn move_trailing_newlines_to_sep(&mut self, new_sep: Option<String>, node: NodeId) {
        if let Some(sep) = new_sep
            && self.state.sep.src.is_empty()
        {
            self.state.set_sep(sep);
            self.state.update_sep(node);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Post passes
    // ─────────────────────────────────────────────────────────────────────────

    /// Drop `<nowiki>` around leading spaces on lines that cannot become
    /// an indent-pre anyway (block tags on the line).
    fn strip_unnecessary_indent_pre_nowikis(&mut self) {
        let scrub = self.state.config.scrub_wikitext;
        let out = INDENT_PRE_NOWIKI_RE
            .replace_all(&self.state.out, |caps: &Captures<'_>| {
                let prefix = &caps[1];
                let nowiki = &caps[2];
                let rest = &caps[3];

                let mut required = !SOL_TRANSPARENT_ONLY_RE.is_match(rest);
                if required {
                    for tag in HTML_TAG_RE.find_iter(rest) {
                        let name = tag
                            .as_str()
                            .trim_start_matches('<')
                            .trim_start_matches('/')
                            .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
                            .next()
                            .unwrap_or_default()
                            .to_ascii_lowercase();
                        if !in_set(HTML5_TAGS, &name) {
                            // Possibly an extension tag: leave the nowiki alone
                            required = true;
                            break;
                        } else if is_block_tag(&name) {
                            required = false;
                        }
                    }
                }

                if !required {
                    format!("{prefix}{}{rest}", NOWIKI_SPACES_RE.replace(nowiki, "$1"))
                } else if scrub {
                    format!(
                        "{prefix}{}{}",
                        NOWIKI_SPACES_RE.replace(nowiki, ""),
                        rest.trim_start()
                    )
                } else {
                    format!("{prefix}{nowiki}{rest}")
                }
            })
            .into_owned();
        self.state.out = out;
    }

    /// Remove the `<nowiki/>` protecting a lone `'` next to properly
    /// paired quote markup.
    fn strip_unnecessary_quote_nowikis(&self, line: &str) -> String {
        if !self.state.has_quote_nowikis || !SELF_CLOSING_NOWIKI_RE.is_match(line) || !line.contains('\'') {
            return line.to_string();
        }

        // Text and delimiters alternate: odd indices hold delimiters
        let mut p: Vec<&str> = Vec::new();
        let mut last = 0;
        for m in QUOTE_SPLIT_RE.find_iter(line) {
            p.push(&line[last..m.start()]);
            p.push(m.as_str());
            last = m.end();
        }
        p.push(&line[last..]);

        let n = p.len();
        let mut nowiki_index = None;
        let mut stack: Vec<String> = Vec::new();
        let mut quotes_on_stack = 0usize;
        let (mut in_nowiki, mut in_ref) = (false, false);

        let mut j = 1;
        while j < n {
            let piece = p[j];
            let mut tag = TAG_NAME_RE
                .captures(piece)
                .and_then(|c| c.get(1))
                .map_or(piece, |m| m.as_str())
                .to_string();
            let self_close = piece.ends_with("/>");
            if self_close {
                tag.push('/');
            }

            if tag == "ref" {
                in_ref = true;
            } else if in_ref {
                in_ref = tag != "/ref";
            } else if tag == "nowiki" {
                in_nowiki = true;
            } else if in_nowiki {
                in_nowiki = tag != "/nowiki";
            } else if tag == "]]" {
                if stack.pop().as_deref() != Some("[[") {
                    return line.to_string();
                }
            } else if tag == "}}" {
                if stack.pop().as_deref() != Some("{{") {
                    return line.to_string();
                }
            } else if let Some(closing) = tag.strip_prefix('/') {
                if stack.pop().as_deref() != Some(closing) {
                    return line.to_string();
                }
            } else if tag == "nowiki/" {
                let before = p[j - 1];
                let lone_quote_after_quotes = before == "'" && j >= 2 && p[j - 2].ends_with("''");
                let strippable_on_stack = quotes_on_stack == 0
                    || (quotes_on_stack == 1
                        && j + 2 < n
                        && p[j + 1].is_empty()
                        && p[j + 2].starts_with('\'')
                        && stack.last().map(String::as_str) == Some(p[j + 2]));
                if before.ends_with('\'') && !lone_quote_after_quotes && strippable_on_stack {
                    nowiki_index = Some(j);
                }
            } else if self_close || tag == "br" {
                // Void: nothing to pair
            } else if tag.starts_with('\'') && stack.last() == Some(&tag) {
                stack.pop();
                quotes_on_stack -= 1;
            } else {
                if tag.starts_with('\'') {
                    quotes_on_stack += 1;
                }
                stack.push(tag);
            }
            j += 2;
        }

        match nowiki_index {
            Some(idx) if stack.is_empty() => p
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != idx)
                .map(|(_, s)| *s)
                .collect(),
            _ => line.to_string(),
        }
    }

    /// `<nowiki>=a=</nowiki>b` is spurious: the trailing `=` is not at the
    /// end of the line.
    fn strip_unnecessary_heading_nowikis(&self, line: String) -> String {
        if !self.state.has_heading_escapes {
            return line;
        }
        match HEADING_NOWIKI_RE.captures(&line) {
            Some(caps) if !COMMENT_OR_WS_RE.is_match(&caps[2]) => {
                format!("{}{}", escaped_text(false, &caps[1], false, true), &caps[2])
            }
            _ => line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(html: &str) -> String {
        let mut doc = Document::parse_html(html).unwrap();
        let templates = TemplateHintMap::default();
        WikitextSerializer::serialize_dom(&mut doc, None, SelserConfig::default(), &templates, false).unwrap()
    }

    fn selser(html: &str, src: &str) -> String {
        let mut doc = Document::parse_html(html).unwrap();
        let templates = TemplateHintMap::default();
        WikitextSerializer::serialize_dom(&mut doc, Some(src), SelserConfig::default(), &templates, true).unwrap()
    }

    fn with_wts<R>(f: impl FnOnce(&mut WikitextSerializer<'_>) -> R) -> R {
        let doc = Document::parse_html("<p>x</p>").unwrap();
        let templates = TemplateHintMap::default();
        let mut wts = WikitextSerializer::new(&doc, None, SelserConfig::default(), &templates);
        f(&mut wts)
    }

    #[test]
    fn test_paragraphs() {
        assert_eq!(serialize("<p>a</p><p>b</p>"), "a\n\nb");
        assert_eq!(serialize("<p>a</p>"), "a");
    }

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(serialize("<p>* not a list</p>"), "<nowiki>*</nowiki> not a list");
    }

    #[test]
    fn test_unmodified_source_is_copied() {
        let src = "Some  ''odd''   text";
        let html = format!(r#"<p data-parsoid='{{"dsr":[0,{},0,0]}}'>whatever</p>"#, src.len());
        assert_eq!(selser(&html, src), src);
    }

    #[test]
    fn test_children_to_string_leaves_output_alone() {
        let doc = Document::parse_html("<p>a<b>bold</b></p>").unwrap();
        let templates = TemplateHintMap::default();
        let mut wts = WikitextSerializer::new(&doc, None, SelserConfig::default(), &templates);
        let p = doc.first_child(doc.body()).unwrap();
        let b = doc.last_child(p).unwrap();
        wts.state.emit_chunk("outer", p);
        let s = wts.serialize_link_children_to_string(b, None).unwrap();
        assert_eq!(s, "bold");
        assert!(!wts.state.in_link);
        assert!(wts.state.out.is_empty());
        assert_eq!(wts.state.curr_line.text, "outer");
    }

    #[test]
    fn test_trailing_newlines_move_to_separator() {
        with_wts(|wts| {
            let doc = wts.state.doc;
            let p = doc.first_child(doc.body()).unwrap();
            wts.emit_wikitext("\nabc\n\n", p);
            assert_eq!(wts.state.curr_line.text, "abc");
            assert_eq!(wts.state.sep.src, "\n\n");
            assert!(wts.state.on_sol);
        });
    }

    #[test]
    fn test_quote_nowiki_stripping() {
        with_wts(|wts| {
            wts.state.has_quote_nowikis = true;
            assert_eq!(wts.strip_unnecessary_quote_nowikis("'<nowiki/>''foo''"), "'''foo''");
            assert_eq!(wts.strip_unnecessary_quote_nowikis("''foo'<nowiki/>''"), "''foo'''");
            // Unbalanced: keep
            assert_eq!(wts.strip_unnecessary_quote_nowikis("'<nowiki/>''foo"), "'<nowiki/>''foo");
            assert_eq!(wts.strip_unnecessary_quote_nowikis("plain"), "plain");
        });
    }

    #[test]
    fn test_trailing_nowiki_pattern() {
        assert_eq!(TRAILING_NOWIKI_RE.replace("foo<nowiki/>", "$1"), "foo");
        assert_eq!(TRAILING_NOWIKI_RE.replace("foo<nowiki />  <nowiki/>", "$1"), "foo");
        // Template argument values keep theirs
        assert_eq!(TRAILING_NOWIKI_RE.replace("|a = <nowiki/>", "$1"), "|a = <nowiki/>");
        assert_eq!(TRAILING_NOWIKI_RE.replace("==<nowiki/>==", "$1"), "==<nowiki/>==");
    }

    #[test]
    fn test_heading_nowiki_stripping() {
        with_wts(|wts| {
            wts.state.has_heading_escapes = true;
            let line = "<nowiki>=a=</nowiki><!--c-->".to_string();
            assert_eq!(wts.strip_unnecessary_heading_nowikis(line.clone()), line);
            let stripped = wts.strip_unnecessary_heading_nowikis("<nowiki>=a=</nowiki>b".to_string());
            assert_eq!(stripped, "=a=b");
        });
    }

    #[test]
    fn test_indent_pre_nowiki_stripping() {
        with_wts(|wts| {
            wts.state.out = "<nowiki> </nowiki><div>x</div>\n<nowiki> </nowiki>text".to_string();
            wts.strip_unnecessary_indent_pre_nowikis();
            assert_eq!(wts.state.out, " <div>x</div>\n<nowiki> </nowiki>text");
        });
    }
}
