//! Wikitext escaping for text content.
//!
//! # Design
//!
//! Text nodes hold plain characters, but the same characters written into
//! wikitext may parse back as markup. The escaper answers "would this text
//! read back as itself here?" and, when it would not, wraps the smallest
//! offending stretches in `<nowiki>`.
//!
//! The checks run cheapest first:
//!
//! 1. a character-class quick check that clears most text outright
//! 2. the context handler on top of the stack (list items, table cells,
//!    link content), which knows syntax the tokenizer cannot see
//! 3. quote handling next to `<i>`/`<b>` siblings
//! 4. line splitting, SOL and indent-pre checks
//! 5. the [`tokenizer`](super::tokenizer) as the final arbiter

use std::sync::LazyLock;

use log::{error, trace};
use regex::Regex;

use crate::html::decode_entities;
use crate::node::predicates::{ALLOWED_LITERAL_TAGS, BLOCK_SCOPE_OPEN_TAGS, VOID_TAGS, heading_level, in_set};
use crate::node::{Document, NodeId};

use super::state::SerializerState;
use super::tokenizer::{TokenKind, WtToken, has_valid_protocol, is_valid_link_target, tokenize};

static MAGIC_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\W)(?:RFC|ISBN|PMID)\s").expect("valid regex"));
static PROTOCOL_ANYWHERE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:bitcoin:|ftps?://|geo:|git://|gopher://|https?://|ircs?://|magnet:|mailto:|mms://|news:|nntp://|redis://|sftp://|sips?:|sms:|ssh://|svn://|tel:|telnet://|urn:|worldwind://|xmpp:|//)")
        .expect("valid regex")
});
static INDENT_PRE_NL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n +[^\r\n]*?\S+").expect("valid regex"));
static INDENT_PRE_SOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ +[^\r\n]*?\S+").expect("valid regex"));
static NON_QUOTE_ESCAPABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[<>\[\]\-+|!=#*:;~{}]|__[^_]*__").expect("valid regex"));
static LANGUAGE_CONVERTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\{|\}-").expect("valid regex"));
static QUOTE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"''+").expect("valid regex"));
static TRANSCLUSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}").expect("valid regex"));
static MULTI_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n.").expect("valid regex"));
static TILDES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~{3,5}").expect("valid regex"));
static NOT_SOL_UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"''|[<>]|\[.*\]|\]|(?:=[ ]*(?:\n|$))|__[^_]*__").expect("valid regex")
});
static SOL_UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\n)[ #*:;=]|[<\[\]>|'!]|----|__[^_]*__").expect("valid regex")
});
static LINK_ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[|\]\]|-\{|^[^\[]*\]$").expect("valid regex"));
static LIST_BULLETS_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[#*:;]*$").expect("valid regex"));
static TH_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*!").expect("valid regex"));
static TH_UNSAFE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\n]*!!|\|").expect("valid regex"));
static NOWIKI_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?nowiki\s*/?\s*)>").expect("valid regex"));
static ESCAPED_NOWIKI_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&lt;(/?nowiki\s*/?\s*)&gt;").expect("valid regex"));
static SOL_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\n) ").expect("valid regex"));
static ENTITY_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&[#0-9a-zA-Z]+;").expect("valid regex"));
static AFTER_CLOSE_BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\][^\]]*$").expect("valid regex"));
static BRACKET_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\[\]]*)\]\]|\{\{([^{}]*)\}\}|-\{([^{}]*)\}-").expect("valid regex")
});
static UNMATCHED_BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\[\[|\]\]|-\{").expect("valid regex"));
static WELL_FORMED_NOWIKI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<nowiki>[^<]*</nowiki>").expect("valid regex"));

// =============================================================================
// Context handlers
// =============================================================================

/// Escaping rules of the syntactic context the text lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeHandler {
    /// First line of a list item
    Li(NodeId),
    /// Heading cell line (`!`)
    Th(NodeId),
    /// Data cell line; `wide` when the cell's `|` is not alone on the line
    Td { node: NodeId, wide: bool },
    /// Wikilink content
    Wikilink,
    /// Media caption or option
    MediaOption,
    /// External link content
    A,
}

/// Where the text being escaped comes from.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapeOptions {
    pub node: Option<NodeId>,
    pub is_last_child: bool,
    pub in_multiline_mode: bool,
}

fn is_first_content_node(doc: &Document, node: Option<NodeId>) -> bool {
    node.is_none_or(|n| doc.previous_non_deleted_sibling(n).is_none())
}

impl EscapeHandler {
    /// Whether `text` must be fully wrapped in this context.
    fn needs_escape(self, state: &SerializerState<'_>, text: &str, opts: &EscapeOptions) -> bool {
        let doc = state.doc;
        match self {
            Self::Li(li) => {
                if opts.node.and_then(|n| doc.parent(n)) != Some(li) {
                    return false;
                }
                if doc.is_tag(li, "dt") && text.contains(':') {
                    true
                } else if LIST_BULLETS_ONLY_RE.is_match(&state.curr_line.text)
                    && is_first_content_node(doc, opts.node)
                {
                    text.starts_with(['#', '*', ':', ';'])
                } else {
                    false
                }
            }
            Self::Th(_) => TH_LINE_RE.is_match(&state.curr_line.text) && TH_UNSAFE_RE.is_match(text),
            Self::Td { node: td, wide } => {
                let on_cell_line = opts.node.is_none() || state.curr_line.first_node == Some(td);
                on_cell_line
                    && (text.contains('|')
                        || (!wide
                            && state.curr_line.text == "|"
                            && text.starts_with(['-', '+', '}'])
                            && opts.node.is_some_and(|n| leftmost_path_is_silent(doc, n, td))))
            }
            Self::MediaOption => text.contains('|') || LINK_ESCAPE_RE.is_match(text),
            Self::Wikilink => LINK_ESCAPE_RE.is_match(text),
            Self::A => text.contains(']'),
        }
    }
}

/// Every node from `node` up to `ancestor` is a first child, and all but
/// `node` emit no wikitext of their own.
fn leftmost_path_is_silent(doc: &Document, node: NodeId, ancestor: NodeId) -> bool {
    let mut cur = Some(node);
    while let Some(n) = cur
        && n != ancestor
    {
        if !is_first_content_node(doc, Some(n)) || (n != node && !doc.is_zero_width_wikitext_elt(n)) {
            return false;
        }
        cur = doc.parent(n);
    }
    true
}

// =============================================================================
// Helpers
// =============================================================================

/// Escape `&` where it would start a valid entity.
pub fn escape_wt_entities(text: &str) -> String {
    ENTITY_LIKE_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let m = &caps[0];
            if decode_entities(m) != m {
                format!("&amp;{}", &m[1..])
            } else {
                m.to_string()
            }
        })
        .into_owned()
}

/// Entity-escape literal nowiki tags so they stay text.
pub fn escape_nowiki_tags(text: &str) -> String {
    NOWIKI_TAG_RE.replace_all(text, "&lt;$1&gt;").into_owned()
}

/// Block tags that start their own wikitext line.
fn starts_on_a_new_line(doc: &Document, node: NodeId) -> bool {
    doc.tag(node)
        .is_some_and(|t| in_set(BLOCK_SCOPE_OPEN_TAGS, t) && t != "blockquote")
        && !doc.is_literal_html(node)
}

/// Is there block content later on the current line?
fn has_blocks_on_line(doc: &Document, node: Option<NodeId>, first: bool) -> bool {
    let mut cur = node;
    if first {
        let Some(n) = cur else {
            return false;
        };
        if doc.text_content(n).chars().skip(1).any(|c| c == '\n') {
            return false;
        }
        cur = doc.next_sibling(n);
    }
    while let Some(n) = cur {
        if doc.is_element(n) {
            if doc.is_block_node(n) {
                return !starts_on_a_new_line(doc, n);
            }
            if doc.has_children(n) && has_blocks_on_line(doc, doc.first_child(n), false) {
                return true;
            }
        } else if doc.text_content(n).contains('\n') {
            return false;
        }
        cur = doc.next_sibling(n);
    }
    false
}

fn has_leading_escapable_quote_char(doc: &Document, opts: &EscapeOptions) -> bool {
    let Some(node) = opts.node else {
        return false;
    };
    if !doc.text_content(node).starts_with('\'') {
        return false;
    }
    let prev = doc.previous_non_deleted_sibling(node).or_else(|| doc.parent(node));
    prev.is_some_and(|p| doc.is_quote_elt(p))
}

fn has_trailing_escapable_quote_char(doc: &Document, opts: &EscapeOptions) -> bool {
    let Some(node) = opts.node else {
        return false;
    };
    if !doc.text_content(node).ends_with('\'') {
        return false;
    }
    let next = doc.next_non_deleted_sibling(node).or_else(|| doc.parent(node));
    next.is_some_and(|n| doc.is_quote_elt(n))
}

/// Quote characters next to `<i>`/`<b>` siblings.
fn escaped_ib_sibling_node_text(state: &mut SerializerState<'_>, text: &str, opts: &EscapeOptions) -> Option<String> {
    if QUOTE_RUN_RE.is_match(text) {
        // Two or more quotes need a full wrap; `<nowiki/>` at the ends is not enough
        let pieces: Vec<&str> = text.split('\'').collect();
        let (first, rest) = pieces.split_first()?;
        let (last, middle) = rest.split_last()?;
        return Some(format!("{first}<nowiki>'{}'</nowiki>{last}", middle.join("'")));
    }

    let doc = state.doc;
    let mut out = None;
    if has_trailing_escapable_quote_char(doc, opts) {
        state.has_quote_nowikis = true;
        out = Some(format!("{text}<nowiki/>"));
    }
    if has_leading_escapable_quote_char(doc, opts) {
        state.has_quote_nowikis = true;
        out = Some(format!("<nowiki/>{}", out.as_deref().unwrap_or(text)));
    }
    out
}

/// Split off trailing newlines.
fn split_trailing_newlines(text: &str) -> (&str, &str) {
    let mut end = text.len();
    loop {
        let head = &text[..end];
        if let Some(h) = head.strip_suffix("\r\n") {
            end = h.len();
        } else if let Some(h) = head.strip_suffix('\n') {
            end = h.len();
        } else {
            break;
        }
    }
    text.split_at(end)
}

// =============================================================================
// Escaping
// =============================================================================

/// Wrap the parts of `orig_text` that would parse as markup in `<nowiki>`.
///
/// `full_wrap` wraps everything. Otherwise only token spans are wrapped,
/// and when nothing tokenized the whole text is wrapped unless
/// `dont_wrap_if_unnecessary` is set.
pub fn escaped_text(
    mut sol: bool,
    orig_text: &str,
    full_wrap: bool,
    dont_wrap_if_unnecessary: bool,
) -> String {
    let (body, nls) = split_trailing_newlines(orig_text);
    if full_wrap {
        return format!("<nowiki>{body}</nowiki>{nls}");
    }

    let text = ESCAPED_NOWIKI_TAG_RE.replace_all(body, "<$1>").into_owned();
    let tokens = tokenize(&text, sol);

    let mut buf = String::new();
    let mut in_nowiki = false;
    let mut nowikis_added = false;
    let mut nowiki_wrap = |buf: &mut String, s: &str, close: bool| {
        if !in_nowiki {
            buf.push_str("<nowiki>");
            in_nowiki = true;
            nowikis_added = true;
        }
        buf.push_str(s);
        if close {
            buf.push_str("</nowiki>");
            in_nowiki = false;
        }
    };

    for t in &tokens {
        let Some(src) = text.get(t.span.clone()) else {
            error!(target: "selser::escape", "missing token offsets for {t:?} in {text:?}");
            return format!("<nowiki>{body}</nowiki>{nls}");
        };
        let t_src = escape_nowiki_tags(src);
        match t.kind {
            TokenKind::Text => {
                if t_src.is_empty() {
                    continue;
                }
                if (sol && t_src.starts_with(' ')) || t_src.contains("\n ") {
                    let mut last = 0;
                    for (k, m) in SOL_SPACE_RE.find_iter(&t_src).enumerate() {
                        buf.push_str(&t_src[last..m.start()]);
                        let nl = m.as_str().starts_with('\n');
                        if nl {
                            buf.push('\n');
                        }
                        if k != 0 || nl || sol {
                            nowiki_wrap(&mut buf, " ", true);
                        } else {
                            buf.push(' ');
                        }
                        last = m.end();
                    }
                    buf.push_str(&t_src[last..]);
                } else {
                    buf.push_str(&t_src);
                }
                sol = false;
            }
            TokenKind::Newline => {
                buf.push_str(&t_src);
                sol = true;
            }
            TokenKind::Comment => buf.push_str(&t_src),
            TokenKind::SelfClosing if t.name == "entity" => {
                buf.push_str(&t_src);
                sol = false;
            }
            TokenKind::StartTag => {
                // These have no closing counterpart
                let close = matches!(t.name.as_str(), "listItem" | "td" | "tr");
                nowiki_wrap(&mut buf, &t_src, close);
                sol = false;
            }
            TokenKind::EndTag | TokenKind::SelfClosing => {
                nowiki_wrap(&mut buf, &t_src, true);
                sol = false;
            }
        }
    }

    if in_nowiki {
        buf.push_str("</nowiki>");
    }
    if !nowikis_added && !dont_wrap_if_unnecessary {
        // Ex: "foo]]" tokenizes to nothing but still needs protection
        buf = format!("<nowiki>{text}</nowiki>");
    }
    buf.push_str(nls);
    buf
}

/// Does `text` contain anything the tokenizer reads as markup here?
pub fn has_wikitext_tokens(state: &mut SerializerState<'_>, on_newline: bool, text: &str) -> bool {
    trace!(target: "selser::escape", "nl: {on_newline} text: {text:?}");
    let sol = on_newline && !(state.in_indent_pre || state.in_php_block);
    // Inside an indent-pre every line starts with a space
    let text = if state.in_indent_pre {
        text.replace('\n', "\n ")
    } else {
        text.to_string()
    };

    let mut num_entities = 0usize;
    for t in tokenize(&text, sol) {
        if t.html {
            if t.is_extension_tag() || in_set(ALLOWED_LITERAL_TAGS, &t.name) {
                return true;
            }
            continue;
        }
        match t.kind {
            TokenKind::SelfClosing => match t.name.as_str() {
                "magiclink" | "urllink" if state.in_attribute || state.in_link => continue,
                "entity" => num_entities += 1,
                "wikilink" => {
                    if t.target.as_deref().is_some_and(is_valid_link_target) {
                        return true;
                    }
                }
                _ => return true,
            },
            TokenKind::StartTag => {
                if state.in_caption && t.name == "listItem" {
                    continue;
                }
                if matches!(t.name.as_str(), "caption" | "td" | "tr" | "th") && state.wikitable_nesting == 0 {
                    continue;
                }
                if t.is_heading() {
                    // Only the SOL half of the heading rule is checked here
                    state.has_heading_escapes = true;
                }
                return true;
            }
            TokenKind::EndTag => {
                if t.is_heading() {
                    continue;
                }
                if matches!(t.name.as_str(), "caption" | "table") && state.wikitable_nesting == 0 {
                    continue;
                }
                if in_set(VOID_TAGS, &t.name) {
                    continue;
                }
                return true;
            }
            TokenKind::Text | TokenKind::Newline | TokenKind::Comment => {}
        }
    }
    trace!(target: "selser::escape", "{num_entities} entities, no tokens");
    false
}

/// Would a closing bracket in `text` complete a link started earlier on
/// the current line?
fn text_can_parse_as_link(state: &SerializerState<'_>, text: &str) -> bool {
    trace!(target: "selser::escape", "link-test-text={text:?}");
    let text = AFTER_CLOSE_BRACKET_RE.replace(text, "]").into_owned();
    if text.contains('\n') {
        return false;
    }

    let line = format!("{}{text}", state.curr_line.text);
    let tokens: Vec<WtToken> = tokenize(&line, false);
    if let Some(last) = tokens.last()
        && last.kind == TokenKind::Text
        && last.src(&line).ends_with(text.as_str())
    {
        return false;
    }

    let mut buf = String::new();
    for t in tokens.iter().rev() {
        match (t.kind, t.name.as_str()) {
            (TokenKind::Text, _) => {}
            (TokenKind::SelfClosing, "wikilink") => {
                let target = t.target.as_deref().unwrap_or_default();
                if is_valid_link_target(target) && !has_valid_protocol(target) {
                    return true;
                }
            }
            (TokenKind::SelfClosing, "extlink") => {
                if t.target.as_deref().is_some_and(|h| h.starts_with("http://") || h.starts_with("https://")) {
                    return true;
                }
            }
            _ => return true,
        }
        buf.insert_str(0, t.src(&line));
        if buf.ends_with(text.as_str()) {
            return false;
        }
    }
    true
}

/// Escape `text` so it reads back as the same plain text in the current
/// serialization context.
pub fn escape_wiki_text(state: &mut SerializerState<'_>, text: &str, opts: &EscapeOptions) -> String {
    trace!(target: "selser::escape", "EWT: {text:?}");
    let doc = state.doc;

    let has_magic_word = MAGIC_WORD_RE.is_match(text);
    let has_autolink = PROTOCOL_ANYWHERE_RE.is_match(text);
    let mut full_check_needed = !state.in_link && (has_magic_word || has_autolink);
    let mut has_quote_char = false;
    let mut indent_pre_unsafe = false;
    let mut has_non_quote_escapable_chars = false;
    let indent_pre_safe_mode = state.in_indent_pre || state.in_php_block;
    let sol = state.on_sol && !indent_pre_safe_mode;

    if !full_check_needed {
        has_quote_char = text.contains('\'');
        indent_pre_unsafe = (!indent_pre_safe_mode && INDENT_PRE_NL_RE.is_match(text))
            || (sol && INDENT_PRE_SOL_RE.is_match(text));
        has_non_quote_escapable_chars = NON_QUOTE_ESCAPABLE_RE.is_match(text);
        if LANGUAGE_CONVERTER_RE.is_match(text) {
            full_check_needed = true;
        }
    }

    if !full_check_needed && !has_quote_char && !indent_pre_unsafe && !has_non_quote_escapable_chars {
        trace!(target: "selser::escape", "---No-checks needed---");
        return text.to_string();
    }

    if let Some(Some(handler)) = state.escape_handler_stack.last().copied()
        && handler.needs_escape(state, text, opts)
    {
        trace!(target: "selser::escape", "---Context-specific escape handler---");
        return escaped_text(false, text, true, false);
    }

    if QUOTE_RUN_RE.is_match(text)
        || has_leading_escapable_quote_char(doc, opts)
        || has_trailing_escapable_quote_char(doc, opts)
    {
        if full_check_needed
            || indent_pre_unsafe
            || (has_non_quote_escapable_chars && has_wikitext_tokens(state, sol, text))
        {
            trace!(target: "selser::escape", "---quotes: escaping text---");
            return escaped_text(sol, text, false, false);
        }
        if let Some(escaped) = escaped_ib_sibling_node_text(state, text, opts) {
            trace!(target: "selser::escape", "---sibling of i/b tag---");
            return escaped;
        }
    }

    // Brace pairs need template context to judge; always escape them
    if TRANSCLUSION_RE.is_match(text) {
        trace!(target: "selser::escape", "---Unconditional: transclusion chars---");
        return escaped_text(false, text, false, false);
    }

    if MULTI_LINE_RE.is_match(text) {
        trace!(target: "selser::escape", "-- <multi-line-escaping-mode> --");
        // The whole text already went through the context handler
        state.escape_handler_stack.push(None);
        let mut line_opts = *opts;
        let mut lines = Vec::new();
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                state.on_sol = true;
                state.curr_line.text.clear();
                line_opts.in_multiline_mode = true;
            }
            lines.push(escape_wiki_text(state, line, &line_opts));
        }
        state.escape_handler_stack.pop();
        let ret = lines.join("\n");

        // Tokens spanning lines, ex: <div\n>foo</div\n>
        if ret == text && has_wikitext_tokens(state, sol, text) {
            trace!(target: "selser::escape", "---Found multi-line wt tokens---");
            return escaped_text(sol, text, false, false);
        }
        return ret;
    }

    let has_tildes = TILDES_RE.is_match(text);
    if !full_check_needed && !has_tildes {
        if !sol && !NOT_SOL_UNSAFE_RE.is_match(text) {
            trace!(target: "selser::escape", "---Not-SOL and safe---");
            return text.to_string();
        }
        if sol && !SOL_UNSAFE_RE.is_match(text) {
            trace!(target: "selser::escape", "---SOL and safe---");
            return text.to_string();
        }
    }

    if indent_pre_unsafe
        && (!has_blocks_on_line(doc, state.curr_line.first_node, true) || opts.in_multiline_mode)
    {
        trace!(target: "selser::escape", "---SOL and pre---");
        state.has_indent_pre_nowikis = true;
        return escaped_text(sol, text, false, false);
    }

    let text = escape_nowiki_tags(text);

    if has_tildes {
        trace!(target: "selser::escape", "---Found tildes---");
        escaped_text(sol, &text, false, false)
    } else if has_wikitext_tokens(state, sol, &text) {
        trace!(target: "selser::escape", "---Found WT tokens---");
        escaped_text(sol, &text, false, false)
    } else if text.contains(']') && text_can_parse_as_link(state, &text) {
        trace!(target: "selser::escape", "---Links: complex single-line test---");
        escaped_text(sol, &text, false, false)
    } else if opts.is_last_child && text.ends_with('=') {
        let heading = state
            .curr_line
            .first_node
            .and_then(|n| doc.tag(n))
            .and_then(heading_level);
        let line_then_text = format!("{}{text}", state.curr_line.text);
        let needs = match heading {
            // The first character after the heading markup will be a '='
            Some(level) => line_then_text.as_bytes().get(level) == Some(&b'='),
            None => state.curr_line.text.starts_with('='),
        };
        if needs {
            trace!(target: "selser::escape", "---Heading: complex single-line test---");
            escaped_text(sol, &text, false, false)
        } else {
            text
        }
    } else {
        trace!(target: "selser::escape", "---All good!---");
        text
    }
}

/// Escape link content as it will sit between `[[..|` and `]]`.
pub fn escape_link_content(
    state: &mut SerializerState<'_>,
    text: &str,
    sol: bool,
    node: NodeId,
    is_media: bool,
) -> String {
    let text = escape_wt_entities(text);
    state.on_sol = sol;
    state.escape_handler_stack.push(Some(if is_media {
        EscapeHandler::MediaOption
    } else {
        EscapeHandler::Wikilink
    }));
    state.in_link = true;
    let res = escape_wiki_text(
        state,
        &text,
        &EscapeOptions {
            node: Some(node),
            ..EscapeOptions::default()
        },
    );
    state.in_link = false;
    state.escape_handler_stack.pop();
    res
}

// =============================================================================
// Template arguments
// =============================================================================

/// Kind of transclusion an argument belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TplArgKind {
    Template,
    TemplateArg,
    ParserFunction,
}

/// Position of the argument being escaped.
#[derive(Debug, Clone, Copy)]
pub struct TplArgOptions {
    pub kind: TplArgKind,
    pub serialize_as_named: bool,
    /// 1-based
    pub arg_index: usize,
    pub num_args: usize,
    pub num_positional_args: usize,
    /// 1-based among positional args
    pub arg_positional_index: usize,
}

/// Escaped argument and whether it must now be written as `name=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapedTplArg {
    pub serialize_as_named: bool,
    pub value: String,
}

struct TplArgWriter<'o> {
    opts: &'o TplArgOptions,
    buf: String,
    open_nowiki: bool,
    serialize_as_named: bool,
}

impl TplArgWriter<'_> {
    fn is_template(&self) -> bool {
        self.opts.kind == TplArgKind::Template
    }

    fn close_nowiki(&mut self) {
        if self.open_nowiki {
            self.buf.push_str("</nowiki>");
            self.open_nowiki = false;
        }
    }

    fn append(&mut self, s: &str, is_last: bool, check_nowiki: bool) {
        if !check_nowiki {
            self.close_nowiki();
            self.buf.push_str(s);
            return;
        }

        // '=' in a positional argument: promote to named when cheap
        if self.is_template()
            && !self.serialize_as_named
            && s.contains('=')
            && (self.opts.num_positional_args == 0
                || self.opts.num_positional_args == self.opts.arg_positional_index)
        {
            self.serialize_as_named = true;
        }

        let mut need_nowiki = 0;
        let mut substitution: Option<(&Regex, &str)> = None;
        static LAST_BRACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\}$").expect("valid regex"));
        static PIPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\|").expect("valid regex"));

        let stripped = BRACKET_PAIR_RE.replace_all(s, "_${1}_");
        if UNMATCHED_BRACKET_RE.is_match(&stripped) {
            need_nowiki += 1;
        }
        if self.opts.kind != TplArgKind::TemplateArg && !self.serialize_as_named && s.contains('=') {
            need_nowiki += 1;
        }
        if self.opts.arg_index == self.opts.num_args && is_last && s.ends_with('}') {
            // Would merge with the closing `}}`
            need_nowiki += 1;
            substitution = Some((&LAST_BRACE_RE, "<nowiki>}</nowiki>"));
        }
        if s.contains('|') {
            need_nowiki += 1;
            substitution = Some((&PIPE_RE, "{{!}}"));
        }

        let mut s = s.to_string();
        if !self.open_nowiki
            && need_nowiki == 1
            && let Some((re, rep)) = substitution
        {
            s = re.replace_all(&s, rep).into_owned();
            need_nowiki = 0;
        }
        if !self.open_nowiki && need_nowiki > 0 {
            self.buf.push_str("<nowiki>");
            self.open_nowiki = true;
        }
        if need_nowiki == 0 {
            self.close_nowiki();
        }
        self.buf.push_str(&s);
    }

    /// Link tokens keep their text; only `|` and `=` need entity escaping.
    fn append_link(&mut self, s: &str) {
        let mut s = s.to_string();
        if self.is_template() && !self.serialize_as_named && s.contains('=') {
            if self.opts.num_positional_args == 0 || self.opts.num_positional_args == self.opts.arg_index {
                self.serialize_as_named = true;
            } else {
                s = s.replace('=', "&#61;");
            }
        }
        self.buf.push_str(&s.replace('|', "&#124;"));
    }
}

/// Escape a template argument value.
///
/// Markup that tokenizes as tags is left alone. Stray brackets and braces,
/// `|`, a trailing `}` on the last argument, and `=` in positional
/// arguments are protected with `{{!}}`, entities or `<nowiki>`.
pub fn escape_tpl_arg_wt(arg: &str, opts: &TplArgOptions) -> EscapedTplArg {
    let mut w = TplArgWriter {
        opts,
        buf: String::new(),
        open_nowiki: false,
        serialize_as_named: opts.serialize_as_named,
    };

    let tokens = tokenize(arg, false);
    let n = tokens.len();
    for (i, t) in tokens.iter().enumerate() {
        let last = i + 1 == n;
        let src = t.src(arg);
        match t.kind {
            TokenKind::Text => w.append(src, last, true),
            TokenKind::SelfClosing if t.html && t.name == "nowiki" => {
                w.append(src, last, !WELL_FORMED_NOWIKI_RE.is_match(src));
            }
            TokenKind::SelfClosing if matches!(t.name.as_str(), "extlink" | "urllink") => w.append_link(src),
            _ => w.append(src, last, false),
        }
    }
    w.close_nowiki();

    EscapedTplArg {
        serialize_as_named: w.serialize_as_named,
        value: w.buf,
    }
}
