//! Mutable state of one wikitext serialization run.
//!
//! # Design
//!
//! Output is produced line by line. Chunks accumulate on the current line
//! and are flushed into `out` whenever the serializer reaches a new line,
//! so escaping decisions can look at everything already on the line.
//!
//! Separators are deferred: whitespace and comments between content are
//! buffered in [`Separator`] together with the newline constraints
//! collected from the handlers, and only resolved (see
//! [`build_sep`](super::separators::build_sep)) when the next chunk is
//! emitted.

use std::mem;
use std::sync::LazyLock;

use log::trace;
use regex::Regex;

use crate::config::SelserConfig;
use crate::node::{Document, NodeId};

use super::escape::{EscapeHandler, EscapeOptions, escape_wiki_text};
use super::separators::{SepConstraints, build_sep};
use super::utils::{COMMENT_PATTERN, is_valid_sep, next_to_deleted_block_node_in_wt};

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(COMMENT_PATTERN).expect("valid regex"));

/// Leading sol-transparent markup, then a character that starts block syntax.
static SOL_WIKITEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^((?:{COMMENT_PATTERN}|<includeonly>.*?</includeonly>)*)([ *#:;{{|!=].*)$"
    ))
    .expect("valid regex")
});

static SOL_SENSITIVE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[*#:;]|\{\||.*=$)").expect("valid regex"));

static INDENT_PRE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ \S").expect("valid regex"));

/// Output that leaves the serializer at start of line.
static ENDS_ON_SOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:^|\n)(?:<includeonly>.*?</includeonly>|{COMMENT_PATTERN})*$"
    ))
    .expect("valid regex")
});

// =============================================================================
// Line and separator buffers
// =============================================================================

/// One piece of output and the node it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub node: NodeId,
}

/// The wikitext line being assembled.
#[derive(Debug, Clone, Default)]
pub struct CurrLine {
    /// Everything emitted on this line so far, separators excluded
    pub text: String,
    pub chunks: Vec<Chunk>,
    pub first_node: Option<NodeId>,
}

/// Pending separator.
#[derive(Debug, Clone, Default)]
pub struct Separator {
    pub constraints: Option<SepConstraints>,
    /// Buffered whitespace and comments; empty when none were seen
    pub src: String,
    pub last_source_node: Option<NodeId>,
    pub last_source_sep: String,
}

/// Stack of single-line requirements. Newlines emitted while the top is
/// `true` become spaces.
#[derive(Debug, Clone, Default)]
pub struct SingleLineContext(Vec<bool>);

impl SingleLineContext {
    pub fn enforce(&mut self) {
        self.0.push(true);
    }

    pub fn enforced(&self) -> bool {
        self.0.last().copied().unwrap_or(false)
    }

    /// Lift enforcement until the matching [`pop`](Self::pop)
    pub fn disable(&mut self) {
        self.0.push(false);
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }
}

/// What a nested serialization must put back.
#[derive(Debug)]
pub(crate) struct NestedSnapshot {
    sep: Separator,
    on_sol: bool,
    out: String,
    at_start_of_output: bool,
    curr_line: CurrLine,
    prev_node_unmodified: bool,
    curr_node_unmodified: bool,
    prev_node: Option<NodeId>,
}

// =============================================================================
// SerializerState
// =============================================================================

/// State threaded through one serialization of a document.
#[derive(Debug)]
pub struct SerializerState<'a> {
    pub doc: &'a Document,
    pub orig_src: Option<&'a str>,
    pub config: SelserConfig,

    pub selser_mode: bool,
    pub rt_test_mode: bool,

    /// At the start of a wikitext line
    pub on_sol: bool,
    /// Nothing emitted yet
    pub at_start_of_output: bool,

    pub in_link: bool,
    pub in_caption: bool,
    pub in_indent_pre: bool,
    pub in_html_pre: bool,
    pub in_php_block: bool,
    pub in_attribute: bool,
    /// Below an inserted node: no original source applies
    pub in_modified_content: bool,
    pub in_no_wiki: bool,

    pub has_indent_pre_nowikis: bool,
    pub has_quote_nowikis: bool,
    pub has_self_closing_nowikis: bool,
    pub has_heading_escapes: bool,

    pub wikitable_nesting: usize,
    /// Context-specific escaping; `None` entries mask outer handlers
    pub escape_handler_stack: Vec<Option<EscapeHandler>>,

    pub curr_line: CurrLine,
    pub single_line_context: SingleLineContext,
    pub out: String,

    pub prev_node_unmodified: bool,
    pub curr_node_unmodified: bool,
    /// Escape the next emitted chunk as text
    pub escape_text: bool,
    pub prev_node: Option<NodeId>,

    pub sep: Separator,
}

impl<'a> SerializerState<'a> {
    pub fn new(doc: &'a Document, orig_src: Option<&'a str>, config: SelserConfig) -> Self {
        Self {
            doc,
            orig_src,
            config,
            selser_mode: false,
            rt_test_mode: config.rt_test_mode,
            on_sol: true,
            at_start_of_output: true,
            in_link: false,
            in_caption: false,
            in_indent_pre: false,
            in_html_pre: false,
            in_php_block: false,
            in_attribute: false,
            in_modified_content: false,
            in_no_wiki: false,
            has_indent_pre_nowikis: false,
            has_quote_nowikis: false,
            has_self_closing_nowikis: false,
            has_heading_escapes: false,
            wikitable_nesting: 0,
            escape_handler_stack: Vec::new(),
            curr_line: CurrLine::default(),
            single_line_context: SingleLineContext::default(),
            out: String::new(),
            prev_node_unmodified: false,
            curr_node_unmodified: false,
            escape_text: false,
            prev_node: None,
            sep: Separator::default(),
        }
    }

    /// Round-trip test mode never applies to selective serialization.
    pub fn init_mode(&mut self, selser_mode: bool) {
        self.selser_mode = selser_mode;
        self.rt_test_mode = self.config.rt_test_mode && !selser_mode;
    }

    /// Original wikitext in `start..end`.
    ///
    /// # Panics
    ///
    /// Outside selser mode.
    pub fn get_orig_src(&self, start: usize, end: usize) -> Option<&'a str> {
        assert!(self.selser_mode, "original source read outside selser mode");
        self.orig_src.and_then(|src| src.get(start..end))
    }

    pub fn update_modification_flags(&mut self, node: NodeId) {
        self.prev_node_unmodified = self.curr_node_unmodified;
        self.curr_node_unmodified = false;
        self.prev_node = Some(node);
    }

    /// A separator ending in a newline (comments aside) leaves us at SOL.
    pub fn sep_introduced_sol(&mut self, sep: &str) {
        if COMMENT_RE.replace_all(sep, "").ends_with('\n') {
            self.on_sol = true;
        }
    }

    pub fn set_sep(&mut self, src: String) {
        self.sep_introduced_sol(&src);
        self.sep.src = src;
    }

    pub fn append_sep(&mut self, src: &str) {
        let mut sep = mem::take(&mut self.sep.src);
        sep.push_str(src);
        self.set_sep(sep);
    }

    pub fn update_sep(&mut self, node: NodeId) {
        self.sep.last_source_node = Some(node);
        self.sep.last_source_sep = self.sep.src.clone();
    }

    pub fn reset_curr_line(&mut self, node: Option<NodeId>) {
        self.curr_line = CurrLine {
            text: String::new(),
            chunks: Vec::new(),
            first_node: node,
        };
    }

    pub fn flush_line(&mut self) {
        for chunk in self.curr_line.chunks.drain(..) {
            self.out.push_str(&chunk.text);
        }
    }

    fn push(&mut self, text: String, node: NodeId) {
        self.curr_line.chunks.push(Chunk { text, node });
    }

    /// Emit a resolved separator and reset the pending one.
    pub fn emit_sep(&mut self, sep: String, node: NodeId, prefix: &str) {
        let sep = if self.single_line_context.enforced() {
            sep.replace('\n', " ")
        } else {
            sep
        };
        trace!(target: "selser::wts", "---> {prefix} {sep:?}");
        self.sep_introduced_sol(&sep);
        self.push(sep, node);
        self.sep = Separator::default();
    }

    /// Emit the separator owed before `node`, reusing the original one
    /// when both neighbours are unmodified.
    pub fn emit_sep_for_node(&mut self, node: NodeId) {
        let doc = self.doc;
        let orig_sep_usable = self.prev_node_unmodified
            && !next_to_deleted_block_node_in_wt(doc, self.sep.last_source_node, true)
            && self.curr_node_unmodified
            && !next_to_deleted_block_node_in_wt(doc, Some(node), false);

        if orig_sep_usable {
            let orig_sep = match self.prev_node {
                Some(prev) if doc.is_element(prev) && doc.is_element(node) => {
                    let end = doc.dp(prev).dsr.and_then(|d| d.end);
                    let start = doc.dp(node).dsr.and_then(|d| d.start);
                    match (end, start) {
                        (Some(end), Some(start)) => self.get_orig_src(end, start).map(str::to_string),
                        _ => None,
                    }
                }
                _ => (!self.sep.src.is_empty()).then(|| self.sep.src.clone()),
            };
            if let Some(sep) = orig_sep
                && is_valid_sep(&sep)
            {
                self.emit_sep(sep, node, "ORIG-SEP:");
                return;
            }
        }

        if let Some(sep) = build_sep(self, node) {
            self.emit_sep(sep, node, "SEP:");
        }
    }

    /// Emit `text` for `node`: separator first, then the (escaped) text.
    pub fn emit_chunk(&mut self, text: &str, node: NodeId) {
        let mut res = if self.single_line_context.enforced() {
            text.replace('\n', " ")
        } else {
            text.to_string()
        };

        self.emit_sep_for_node(node);

        if self.on_sol {
            self.flush_line();
            self.reset_curr_line(Some(node));
        }

        if self.escape_text {
            let opts = EscapeOptions {
                node: Some(node),
                is_last_child: self.doc.next_non_deleted_sibling(node).is_none(),
                in_multiline_mode: false,
            };
            res = escape_wiki_text(self, &res, &opts);
            self.escape_text = false;
        } else if let Some(protected) = self.protect_sol_sensitive_selser_text(&res, node) {
            res = protected;
        }

        self.curr_line.text.push_str(&res);
        trace!(target: "selser::wts", "---> OUT: {res:?}");

        let ends_on_sol = ENDS_ON_SOL_RE.is_match(&res);
        self.push(res, node);
        self.update_sep(node);

        if !ends_on_sol {
            self.on_sol = false;
        }
        self.at_start_of_output = false;
    }

    /// Reused paragraph text that now lands at SOL (its block-level
    /// predecessor was deleted) must not turn into lists, headings or
    /// indent-pres.
    fn protect_sol_sensitive_selser_text(&self, res: &str, node: NodeId) -> Option<String> {
        let doc = self.doc;
        if !(self.selser_mode
            && self.on_sol
            && self.curr_node_unmodified
            && !self.prev_node_unmodified
            && doc.is_tag(node, "p")
            && !doc.is_literal_html(node))
        {
            return None;
        }
        if !doc.first_non_sep_child(node).is_some_and(|c| doc.is_text(c)) {
            return None;
        }

        let caps = SOL_WIKITEXT_RE.captures(res)?;
        let lead = caps.get(2)?.as_str();
        let needs_nowiki = SOL_SENSITIVE_START_RE.is_match(lead)
            || ((lead.starts_with('|') || lead.starts_with('!')) && self.wikitable_nesting > 0)
            || (INDENT_PRE_START_RE.is_match(lead) && !doc.has_ancestor_of_name(node, "blockquote"));
        if !needs_nowiki {
            return None;
        }

        let first_len = lead.chars().next().map_or(0, char::len_utf8);
        Some(format!(
            "{}<nowiki>{}</nowiki>{}",
            caps.get(1).map_or("", |m| m.as_str()),
            &lead[..first_len],
            &lead[first_len..]
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Nested serialization
    // ─────────────────────────────────────────────────────────────────────────

    /// Start serializing into a fresh buffer off the main output.
    pub(crate) fn begin_nested(&mut self) -> NestedSnapshot {
        let snapshot = NestedSnapshot {
            sep: mem::take(&mut self.sep),
            on_sol: self.on_sol,
            out: mem::take(&mut self.out),
            at_start_of_output: self.at_start_of_output,
            curr_line: mem::take(&mut self.curr_line),
            prev_node_unmodified: self.prev_node_unmodified,
            curr_node_unmodified: self.curr_node_unmodified,
            prev_node: self.prev_node,
        };
        self.on_sol = false;
        self.at_start_of_output = false;
        self.reset_curr_line(None);
        self.single_line_context.disable();
        snapshot
    }

    /// Restore the outer serialization and return what was produced.
    pub(crate) fn end_nested(&mut self, snapshot: NestedSnapshot) -> String {
        self.single_line_context.pop();
        let bits = mem::replace(&mut self.out, snapshot.out);
        self.sep = snapshot.sep;
        self.on_sol = snapshot.on_sol;
        self.at_start_of_output = snapshot.at_start_of_output;
        self.curr_line = snapshot.curr_line;
        self.prev_node_unmodified = snapshot.prev_node_unmodified;
        self.curr_node_unmodified = snapshot.curr_node_unmodified;
        self.prev_node = snapshot.prev_node;
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_p() -> (Document, NodeId) {
        let doc = Document::parse_html("<p>a</p>").unwrap();
        let p = doc.first_child(doc.body()).unwrap();
        (doc, p)
    }

    #[test]
    fn test_single_line_context() {
        let mut slc = SingleLineContext::default();
        assert!(!slc.enforced());
        slc.enforce();
        assert!(slc.enforced());
        slc.disable();
        assert!(!slc.enforced());
        slc.pop();
        assert!(slc.enforced());
        slc.pop();
        assert!(!slc.enforced());
    }

    #[test]
    fn test_init_mode_disables_rt_test() {
        let (doc, _) = doc_with_p();
        let mut state = SerializerState::new(&doc, Some("a"), SelserConfig::RT_TEST);
        state.init_mode(false);
        assert!(state.rt_test_mode);
        state.init_mode(true);
        assert!(!state.rt_test_mode);
        assert_eq!(state.get_orig_src(0, 1), Some("a"));
        assert_eq!(state.get_orig_src(0, 5), None);
    }

    #[test]
    #[should_panic(expected = "outside selser mode")]
    fn test_orig_src_needs_selser_mode() {
        let (doc, _) = doc_with_p();
        let state = SerializerState::new(&doc, Some("a"), SelserConfig::default());
        let _ = state.get_orig_src(0, 1);
    }

    #[test]
    fn test_sep_sol_ignores_comment_newlines() {
        let (doc, _) = doc_with_p();
        let mut state = SerializerState::new(&doc, None, SelserConfig::default());
        state.on_sol = false;
        state.set_sep("<!--\n-->".to_string());
        assert!(!state.on_sol);
        state.append_sep(" \n");
        assert!(state.on_sol);
        assert_eq!(state.sep.src, "<!--\n--> \n");
    }

    #[test]
    fn test_emit_chunk_tracks_sol() {
        let (doc, p) = doc_with_p();
        let mut state = SerializerState::new(&doc, None, SelserConfig::default());
        state.emit_chunk("abc", p);
        assert!(!state.on_sol);
        assert!(!state.at_start_of_output);
        assert_eq!(state.curr_line.text, "abc");

        // Chunks never put the state back at SOL; separators do
        state.emit_chunk("x\n", p);
        assert!(!state.on_sol);
        state.flush_line();
        assert_eq!(state.out, "abcx\n");
    }

    #[test]
    fn test_single_line_emit() {
        let (doc, p) = doc_with_p();
        let mut state = SerializerState::new(&doc, None, SelserConfig::default());
        state.single_line_context.enforce();
        state.emit_chunk("a\nb", p);
        state.flush_line();
        assert_eq!(state.out, "a b");
    }

    #[test]
    fn test_nested_restores_state() {
        let (doc, p) = doc_with_p();
        let mut state = SerializerState::new(&doc, None, SelserConfig::default());
        state.emit_chunk("outer", p);
        state.sep.src = " ".to_string();

        let snap = state.begin_nested();
        assert!(state.sep.src.is_empty());
        state.emit_chunk("inner", p);
        state.flush_line();
        let inner = state.end_nested(snap);

        assert_eq!(inner, "inner");
        assert_eq!(state.sep.src, " ");
        assert_eq!(state.curr_line.chunks.len(), 1);
        assert_eq!(state.curr_line.text, "outer");
        assert_eq!(state.curr_line.first_node, Some(p));
        assert!(state.out.is_empty());
    }

    #[test]
    fn test_nested_sol_keeps_enclosing_line() {
        let doc = Document::parse_html("<p>a<b>bold</b></p>").unwrap();
        let p = doc.first_child(doc.body()).unwrap();
        let b = doc.last_child(p).unwrap();
        let mut state = SerializerState::new(&doc, None, SelserConfig::default());
        state.emit_chunk("outer", p);

        // A SOL emit inside the nested run resets only the nested line
        let snap = state.begin_nested();
        state.on_sol = true;
        state.emit_chunk("bold", b);
        assert_eq!(state.curr_line.text, "bold");
        assert_eq!(state.curr_line.first_node, Some(b));
        state.flush_line();
        assert_eq!(state.end_nested(snap), "bold");

        assert_eq!(state.curr_line.text, "outer");
        assert_eq!(state.curr_line.chunks.len(), 1);
    }

    #[test]
    fn test_selser_paragraph_protection() {
        let (doc, p) = doc_with_p();
        let mut state = SerializerState::new(&doc, Some("*a"), SelserConfig::default());
        state.init_mode(true);
        state.on_sol = true;
        state.curr_node_unmodified = true;
        state.prev_node_unmodified = false;
        assert_eq!(
            state.protect_sol_sensitive_selser_text("*a", p).as_deref(),
            Some("<nowiki>*</nowiki>a")
        );
        assert_eq!(
            state.protect_sol_sensitive_selser_text("<!--c--> x", p).as_deref(),
            Some("<!--c--><nowiki> </nowiki>x")
        );
        assert_eq!(state.protect_sol_sensitive_selser_text("plain", p), None);
        // Table syntax is harmless outside tables
        assert_eq!(state.protect_sol_sensitive_selser_text("|a", p), None);
    }
}
