//! Lenient HTML loader.
//!
//! Reads the body fragment of an annotated document into the arena DOM and
//! lifts the JSON data attributes (`data-parsoid`, `data-mw`,
//! `data-parsoid-diff`) into the document's side tables.
//!
//! Known limitations (intentional):
//! - Not an HTML5 tree builder. Only the recoveries annotated documents
//!   actually need are implemented: unmatched end tags are dropped, an end
//!   tag closes every element opened after its match, open elements are
//!   closed at end of input, and `p`/`li`/`td`/`tr` close their own kind.
//! - Tag and attribute names are restricted to ASCII `[A-Za-z0-9:_-]`.
//! - Named entities are limited to the set in [`decode_entities`].

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::attr::Attrs;
use crate::diff::DiffRecord;
use crate::error::{SelserError, SelserResult};
use crate::node::predicates::{VOID_TAGS, in_set, is_block_tag};
use crate::node::{DataParsoid, Document, Element, NodeId};

const HTML_COMMENT_START: &str = "<!--";
const HTML_COMMENT_END: &str = "-->";

const DATA_PARSOID: &str = "data-parsoid";
const DATA_MW: &str = "data-mw";
const DATA_PARSOID_DIFF: &str = "data-parsoid-diff";

/// Tags whose content is not markup.
const RAWTEXT_TAGS: &[&str] = &["script", "style"];

/// Tags whose first newline is dropped by HTML parsing.
const NEWLINE_EATING_TAGS: &[&str] = &["pre", "textarea", "listing"];

// =============================================================================
// Entities
// =============================================================================

/// Decode the common named entities and well-formed numeric entities.
///
/// Named: `&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;`, `&nbsp;`. Numeric
/// entities must be `;`-terminated and name a valid scalar value. Anything
/// else passes through unchanged.
pub fn decode_entities(s: &str) -> String {
    const NAMED: &[(&str, char)] = &[
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&apos;", '\''),
        ("&nbsp;", '\u{a0}'),
    ];

    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut copy_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'&' {
            i += 1;
            continue;
        }
        out.push_str(&s[copy_start..i]);
        let rest = &s[i..];

        if let Some(&(ent, ch)) = NAMED.iter().find(|(ent, _)| rest.starts_with(ent)) {
            out.push(ch);
            i += ent.len();
            copy_start = i;
            continue;
        }
        if let Some((ch, len)) = decode_numeric_entity(rest) {
            out.push(ch);
            i += len;
            copy_start = i;
            continue;
        }

        out.push('&');
        i += 1;
        copy_start = i;
    }
    out.push_str(&s[copy_start..]);
    out
}

/// `&#123;` or `&#x7B;` at the start of `s`: the char and the entity length.
fn decode_numeric_entity(s: &str) -> Option<(char, usize)> {
    const MAX_HEX_DIGITS: usize = 6;
    const MAX_DEC_DIGITS: usize = 7;

    let body = s.strip_prefix("&#")?;
    let (digits, radix, prefix_len, max) = match body.strip_prefix(['x', 'X']) {
        Some(hex) => (hex, 16, 3, MAX_HEX_DIGITS),
        None => (body, 10, 2, MAX_DEC_DIGITS),
    };
    let end = digits.find(';')?;
    if end == 0 || end > max {
        return None;
    }
    let ch = u32::from_str_radix(&digits[..end], radix)
        .ok()
        .and_then(char::from_u32)?;
    Some((ch, prefix_len + end + 1))
}

static COMMENT_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--(&(amp;)*gt;|>)").expect("valid regex"));

/// Map DOM-escaped comment data to its wikitext form.
///
/// Entities are decoded, then any `-->` (or an entity-escaped variant of
/// it) is re-escaped so the comment can never terminate early.
pub fn decode_comment(data: &str) -> String {
    let true_value = decode_entities(data);
    COMMENT_CLOSE_RE
        .replace_all(&true_value, |caps: &Captures<'_>| {
            let m = &caps[0];
            if m == "-->" {
                "--&gt;".to_string()
            } else {
                format!("--&amp;{}", &m[3..])
            }
        })
        .into_owned()
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, PartialEq)]
enum Token {
    Text(String),
    Comment(String),
    StartTag {
        name: String,
        attrs: Attrs,
        self_closing: bool,
    },
    EndTag(String),
}

fn starts_with_ignore_ascii_case_at(haystack: &[u8], start: usize, needle: &[u8]) -> bool {
    haystack.len() >= start + needle.len()
        && haystack[start..start + needle.len()].eq_ignore_ascii_case(needle)
}

#[inline]
fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_' || c == b':'
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut i = 0;

    while i < len {
        if bytes[i] != b'<' {
            let start = i;
            while i < len && bytes[i] != b'<' {
                i += 1;
            }
            out.push(Token::Text(decode_entities(&input[start..i])));
            continue;
        }

        // comment
        if input[i..].starts_with(HTML_COMMENT_START) {
            let body_start = i + HTML_COMMENT_START.len();
            match input[body_start..].find(HTML_COMMENT_END) {
                Some(rel) => {
                    out.push(Token::Comment(input[body_start..body_start + rel].to_string()));
                    i = body_start + rel + HTML_COMMENT_END.len();
                }
                None => {
                    out.push(Token::Comment(input[body_start..].to_string()));
                    i = len;
                }
            }
            continue;
        }

        // doctype and processing instructions are dropped
        if i + 1 < len && (bytes[i + 1] == b'!' || bytes[i + 1] == b'?') {
            i = input[i..].find('>').map_or(len, |rel| i + rel + 1);
            continue;
        }

        // end tag
        if i + 1 < len && bytes[i + 1] == b'/' {
            let start = i + 2;
            let mut j = start;
            while j < len && is_name_char(bytes[j]) {
                j += 1;
            }
            if j == start {
                out.push(Token::Text("</".to_string()));
                i += 2;
                continue;
            }
            let name = input[start..j].to_ascii_lowercase();
            while j < len && bytes[j] != b'>' {
                j += 1;
            }
            out.push(Token::EndTag(name));
            i = (j + 1).min(len);
            continue;
        }

        // start tag
        let start = i + 1;
        let mut k = start;
        while k < len && is_name_char(bytes[k]) {
            k += 1;
        }
        if k == start {
            out.push(Token::Text("<".to_string()));
            i += 1;
            continue;
        }
        let name = input[start..k].to_ascii_lowercase();
        let mut attrs: Attrs = Vec::new();
        let mut self_closing = false;

        let skip_whitespace = |k: &mut usize| {
            while *k < len && bytes[*k].is_ascii_whitespace() {
                *k += 1;
            }
        };

        loop {
            skip_whitespace(&mut k);
            if k >= len {
                break;
            }
            if bytes[k] == b'>' {
                k += 1;
                break;
            }
            if bytes[k] == b'/' {
                if k + 1 < len && bytes[k + 1] == b'>' {
                    self_closing = true;
                    k += 2;
                    break;
                }
                k += 1;
                continue;
            }
            let name_start = k;
            while k < len && is_name_char(bytes[k]) {
                k += 1;
            }
            if name_start == k {
                k += 1;
                continue;
            }
            let attr_name = input[name_start..k].to_ascii_lowercase();

            skip_whitespace(&mut k);
            let value = if k < len && bytes[k] == b'=' {
                k += 1;
                skip_whitespace(&mut k);
                if k < len && (bytes[k] == b'"' || bytes[k] == b'\'') {
                    let quote = bytes[k];
                    k += 1;
                    let vstart = k;
                    while k < len && bytes[k] != quote {
                        k += 1;
                    }
                    let raw = &input[vstart..k];
                    if k < len {
                        k += 1;
                    }
                    decode_entities(raw)
                } else {
                    let vstart = k;
                    while k < len && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
                        if bytes[k] == b'/' && k + 1 < len && bytes[k + 1] == b'>' {
                            break;
                        }
                        k += 1;
                    }
                    decode_entities(&input[vstart..k])
                }
            } else {
                String::new()
            };
            // first occurrence wins, as in HTML
            if !attrs.iter().any(|(n, _)| *n == attr_name) {
                attrs.push((attr_name, value));
            }
        }

        let rawtext = in_set(RAWTEXT_TAGS, &name) && !self_closing;
        out.push(Token::StartTag {
            name: name.clone(),
            attrs,
            self_closing,
        });
        i = k;

        if rawtext {
            let close = format!("</{name}");
            let mut j = i;
            let end = loop {
                match input[j..].find("</") {
                    Some(rel) if starts_with_ignore_ascii_case_at(bytes, j + rel, close.as_bytes()) => {
                        break Some(j + rel);
                    }
                    Some(rel) => j += rel + 2,
                    None => break None,
                }
            };
            let raw_end = end.unwrap_or(len);
            if raw_end > i {
                out.push(Token::Text(input[i..raw_end].to_string()));
            }
            out.push(Token::EndTag(name));
            i = match end {
                Some(e) => input[e..].find('>').map_or(len, |rel| e + rel + 1),
                None => len,
            };
        }
    }
    out
}

// =============================================================================
// Tree builder
// =============================================================================

/// Whether opening `tag` implicitly closes an open `open` element.
fn closes_implicitly(open: &str, tag: &str) -> bool {
    match open {
        "p" => is_block_tag(tag) && tag != "td" && tag != "th",
        "li" => tag == "li",
        "dt" | "dd" => tag == "dt" || tag == "dd",
        "td" | "th" => matches!(tag, "td" | "th" | "tr"),
        "tr" => tag == "tr",
        _ => false,
    }
}

struct TreeBuilder {
    doc: Document,
    stack: Vec<NodeId>,
    strict: bool,
    drop_leading_newline: bool,
    in_head: bool,
}

impl TreeBuilder {
    fn new(strict: bool) -> Self {
        let doc = Document::new();
        let body = doc.body();
        Self {
            doc,
            stack: vec![body],
            strict,
            drop_leading_newline: false,
            in_head: false,
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.doc.body())
    }

    fn build(mut self, tokens: Vec<Token>) -> SelserResult<Document> {
        for token in tokens {
            let eat_newline = std::mem::take(&mut self.drop_leading_newline);
            match token {
                Token::Text(mut text) => {
                    if self.in_head {
                        continue;
                    }
                    if eat_newline && text.starts_with('\n') {
                        text.remove(0);
                    }
                    if text.is_empty() {
                        continue;
                    }
                    let parent = self.current();
                    match self.doc.last_child(parent).filter(|&l| self.doc.is_text(l)) {
                        Some(last) => {
                            let merged = format!("{}{text}", self.doc.text(last).unwrap_or_default());
                            self.doc.set_text(last, merged);
                        }
                        None => {
                            let t = self.doc.create_text(text);
                            self.doc.append_child(parent, t);
                        }
                    }
                }
                Token::Comment(data) => {
                    if self.in_head {
                        continue;
                    }
                    let c = self.doc.create_comment(data);
                    self.doc.append_child(self.current(), c);
                }
                Token::StartTag {
                    name,
                    attrs,
                    self_closing,
                } => self.start_tag(name, attrs, self_closing)?,
                Token::EndTag(name) => self.end_tag(&name),
            }
        }
        Ok(self.doc)
    }

    fn start_tag(&mut self, name: String, attrs: Attrs, self_closing: bool) -> SelserResult<()> {
        match name.as_str() {
            "html" | "body" => return Ok(()),
            "head" => {
                self.in_head = true;
                return Ok(());
            }
            _ if self.in_head => return Ok(()),
            _ => {}
        }

        while self.stack.len() > 1 {
            let open = self.current();
            if self.doc.tag(open).is_some_and(|t| closes_implicitly(t, &name)) {
                self.stack.pop();
            } else {
                break;
            }
        }

        let id = self.create(&name, attrs)?;
        self.doc.append_child(self.current(), id);
        if !self_closing && !in_set(VOID_TAGS, &name) {
            self.stack.push(id);
            self.drop_leading_newline = in_set(NEWLINE_EATING_TAGS, &name);
        }
        Ok(())
    }

    fn end_tag(&mut self, name: &str) {
        match name {
            "head" => {
                self.in_head = false;
                return;
            }
            "html" | "body" => return,
            _ if self.in_head => return,
            _ => {}
        }
        // Never pops the body at index 0
        let matched = self
            .stack
            .iter()
            .rposition(|&n| self.doc.is_tag(n, name))
            .filter(|&pos| pos > 0);
        match matched {
            Some(pos) => self.stack.truncate(pos),
            None => log::trace!(target: "selser::html", "dropping unmatched </{name}>"),
        }
    }

    /// Create an element, moving data attributes into side tables.
    fn create(&mut self, name: &str, attrs: Attrs) -> SelserResult<NodeId> {
        let mut kept = Attrs::with_capacity(attrs.len());
        let mut dp = None;
        let mut dmw = None;
        let mut diff = None;
        for (key, value) in attrs {
            match key.as_str() {
                DATA_PARSOID => dp = Some(value),
                DATA_MW => dmw = Some(value),
                DATA_PARSOID_DIFF => diff = Some(value),
                _ => kept.push((key, value)),
            }
        }

        let id = self.doc.create_element_with(Element::with_attrs(name, kept));

        let dp = match dp {
            Some(raw) => self.parse_json::<DataParsoid>(DATA_PARSOID, &raw, name)?,
            None => None,
        };
        self.doc.mark_new(id, dp.is_none());
        if let Some(dp) = dp {
            self.doc.set_dp(id, dp);
        }

        if let Some(raw) = dmw
            && let Some(value) = self.parse_json::<Value>(DATA_MW, &raw, name)?
        {
            self.doc.set_data_mw(id, value);
        }

        if let Some(raw) = diff
            && let Some(rec) = self.parse_json::<DiffRecord>(DATA_PARSOID_DIFF, &raw, name)?
        {
            self.doc.diff_marks.insert(id, rec);
        }

        Ok(id)
    }

    fn parse_json<T: serde::de::DeserializeOwned>(
        &self,
        attr: &'static str,
        raw: &str,
        tag: &str,
    ) -> SelserResult<Option<T>> {
        match serde_json::from_str(raw) {
            Ok(v) => Ok(Some(v)),
            Err(source) if self.strict => Err(SelserError::MalformedJson { attr, source }),
            Err(err) => {
                log::warn!(target: "selser::html", "ignoring malformed {attr} on <{tag}>: {err}");
                Ok(None)
            }
        }
    }
}

// =============================================================================
// Document API
// =============================================================================

impl Document {
    /// Load a body fragment (or a full document's body).
    ///
    /// Malformed data attributes are logged and ignored; an element whose
    /// `data-parsoid` could not be read is treated as newly authored.
    pub fn parse_html(html: &str) -> SelserResult<Document> {
        TreeBuilder::new(false).build(tokenize(html))
    }

    /// Like [`Document::parse_html`] but malformed data attributes are errors.
    pub fn parse_html_strict(html: &str) -> SelserResult<Document> {
        TreeBuilder::new(true).build(tokenize(html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffMark;
    use crate::span::SourceRange;

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&lt;tag&gt;"), "<tag>");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("&unknown; &#xZZ;"), "&unknown; &#xZZ;");
        assert_eq!(decode_entities("120×32 &nbsp;"), "120×32 \u{a0}");
    }

    #[test]
    fn test_decode_comment() {
        assert_eq!(decode_comment("plain"), "plain");
        assert_eq!(decode_comment("a --&gt; b"), "a --&gt; b");
        assert_eq!(decode_comment("a --&amp;gt; b"), "a --&amp;gt; b");
        assert_eq!(decode_comment("x &amp; y"), "x & y");
    }

    #[test]
    fn test_parse_structure() {
        let doc = Document::parse_html("<p>a<b>bold</b></p><!--c--><hr>text").unwrap();
        let body = doc.body();
        let kids = doc.child_ids(body);
        assert_eq!(kids.len(), 4);
        assert!(doc.is_tag(kids[0], "p"));
        assert!(doc.is_comment(kids[1]));
        assert_eq!(doc.text(kids[1]), Some("c"));
        assert!(doc.is_tag(kids[2], "hr"));
        assert_eq!(doc.text(kids[3]), Some("text"));
        assert_eq!(doc.text_content(kids[0]), "abold");
    }

    #[test]
    fn test_parse_attributes() {
        let doc = Document::parse_html(r#"<a href="./Foo" rel=mw:WikiLink title='T &amp; U'>x</a>"#)
            .unwrap();
        let a = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.attr(a, "href"), Some("./Foo"));
        assert_eq!(doc.attr(a, "rel"), Some("mw:WikiLink"));
        assert_eq!(doc.attr(a, "title"), Some("T & U"));
    }

    #[test]
    fn test_data_attributes_lifted() {
        let html = r#"<p data-parsoid='{"dsr":[0,3,0,0]}' data-mw='{"x":1}' data-parsoid-diff='{"id":0,"diff":["inserted"]}'>abc</p><p>new</p>"#;
        let doc = Document::parse_html(html).unwrap();
        let kids = doc.child_ids(doc.body());
        let p = kids[0];
        assert!(doc.attrs(p).is_empty());
        assert_eq!(doc.dp(p).dsr, Some(SourceRange::new(0, 3, 0, 0)));
        assert_eq!(doc.data_mw(p), Some(&serde_json::json!({"x": 1})));
        assert!(doc.has_diff_mark(p, DiffMark::Inserted));
        assert!(!doc.is_new(p));
        assert!(doc.is_new(kids[1]));
    }

    #[test]
    fn test_malformed_json_lenient_and_strict() {
        let html = r#"<p data-parsoid='{oops'>x</p>"#;
        let doc = Document::parse_html(html).unwrap();
        let p = doc.first_child(doc.body()).unwrap();
        assert!(doc.is_new(p));

        let err = Document::parse_html_strict(html).unwrap_err();
        assert!(matches!(err, SelserError::MalformedJson { attr: "data-parsoid", .. }));
    }

    #[test]
    fn test_lenient_recovery() {
        let doc = Document::parse_html("<div><span>a</div></i>b<p>c").unwrap();
        let kids = doc.child_ids(doc.body());
        assert_eq!(kids.len(), 3);
        assert!(doc.is_tag(kids[0], "div"));
        assert_eq!(doc.text(kids[1]), Some("b"));
        assert!(doc.is_tag(kids[2], "p"));
        assert_eq!(doc.text_content(kids[2]), "c");
    }

    #[test]
    fn test_implicit_closes() {
        let doc = Document::parse_html("<ul><li>a<li>b</ul><p>x<div>y</div>").unwrap();
        let ul = doc.first_child(doc.body()).unwrap();
        assert_eq!(doc.children(ul).count(), 2);
        let kids = doc.child_ids(doc.body());
        assert_eq!(kids.len(), 3);
        assert!(doc.is_tag(kids[2], "div"));
    }

    #[test]
    fn test_full_document_body() {
        let html = "<!DOCTYPE html><html><head><title>t</title></head><body><p>x</p></body></html>";
        let doc = Document::parse_html(html).unwrap();
        let kids = doc.child_ids(doc.body());
        assert_eq!(kids.len(), 1);
        assert!(doc.is_tag(kids[0], "p"));
    }

    #[test]
    fn test_pre_leading_newline_and_rawtext() {
        let doc = Document::parse_html("<pre>\n\nx</pre><style>a<b</style>").unwrap();
        let kids = doc.child_ids(doc.body());
        assert_eq!(doc.text_content(kids[0]), "\nx");
        assert_eq!(doc.text_content(kids[1]), "a<b");
    }

    #[test]
    fn test_self_closing() {
        let doc = Document::parse_html(r#"<meta typeof="mw:Placeholder"/><span/>x"#).unwrap();
        let kids = doc.child_ids(doc.body());
        assert_eq!(kids.len(), 3);
        assert!(!doc.has_children(kids[1]));
    }
}
