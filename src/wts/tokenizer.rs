//! A small wikitext reader for escaping decisions.
//!
//! It does not build a tree. It only reports which stretches of a text
//! would be read back as markup rather than as plain text, which is all
//! the escaper needs to decide where `<nowiki>` goes.

use std::ops::Range;
use std::sync::LazyLock;

use compact_str::CompactString;
use regex::Regex;

use crate::html::decode_entities;
use crate::node::predicates::{HTML5_TAGS, in_set};

/// URL schemes that start external links (`//` is protocol-relative).
const URL_PROTOCOLS: &[&str] = &[
    "bitcoin:", "ftp://", "ftps://", "geo:", "git://", "gopher://", "http://", "https://",
    "irc://", "ircs://", "magnet:", "mailto:", "mms://", "news:", "nntp://", "redis://",
    "sftp://", "sip:", "sips:", "sms:", "ssh://", "svn://", "tel:", "telnet://", "urn:",
    "worldwind://", "xmpp:", "//",
];

/// Tags whose content the wikitext parser does not read as wikitext.
pub const EXTENSION_TAGS: &[&str] = &[
    "nowiki", "pre", "ref", "references", "gallery", "math", "chem", "ce", "poem", "source",
    "syntaxhighlight", "templatedata", "templatestyles", "indicator", "section", "timeline",
    "hiero", "charinsert", "inputbox", "categorytree", "imagemap", "score", "graph",
    "mapframe", "maplink", "includeonly", "noinclude", "onlyinclude",
];

const BEHAVIOR_SWITCHES: &[&str] = &[
    "NOTOC", "FORCETOC", "TOC", "NOEDITSECTION", "NEWSECTIONLINK", "NONEWSECTIONLINK",
    "NOGALLERY", "HIDDENCAT", "EXPECTUNUSEDCATEGORY", "NOCONTENTCONVERT", "NOCC",
    "NOTITLECONVERT", "NOTC", "INDEX", "NOINDEX", "STATICREDIRECT", "DISAMBIG",
];

static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(/?)([A-Za-z][A-Za-z0-9-]*)(?:\s[^<>]*)?/?>").expect("valid regex")
});

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<!--(?s:.*?)(?:-->|\z)").expect("valid regex"));

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").expect("valid regex")
});

static BEHAVIOR_SWITCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^__([A-Z]+)__").expect("valid regex"));

static MAGIC_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:RFC[ \t]+[0-9]+|PMID[ \t]+[0-9]+|ISBN[ \t]+(?:97[89][- ]?)?(?:[0-9][- ]?){9}[0-9Xx])\b",
    )
    .expect("valid regex")
});

static URL_BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[^\s\[\]<>"\x00-\x20\x7F]+"#).expect("valid regex"));

static INVALID_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[{}<>\[\]]|\x{FFFD}|[\x00-\x1F\x7F]|^\.$|^\.\.$|~{3,}").expect("valid regex")
});

static INVALID_TITLE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^\.\.?/)+|(?:/\.\.?)+$|/\./|/\.\./").expect("valid regex"));

/// Whether `s` starts with a URL protocol.
pub fn has_valid_protocol(s: &str) -> bool {
    protocol_len(s).is_some()
}

/// Whether a URL protocol occurs anywhere in `s`.
pub fn find_valid_protocol(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    URL_PROTOCOLS.iter().any(|p| lower.contains(p))
}

fn protocol_len(s: &str) -> Option<usize> {
    URL_PROTOCOLS
        .iter()
        .find(|p| s.len() >= p.len() && s[..p.len()].eq_ignore_ascii_case(p))
        .map(|p| p.len())
}

/// Whether `href` names a page that a wikilink can point at.
pub fn is_valid_link_target(href: &str) -> bool {
    let title = match href.rfind('#') {
        Some(i) => &href[..i],
        None => href,
    };
    if href.trim().is_empty() {
        return false;
    }
    !INVALID_TITLE_RE.is_match(title) && !INVALID_TITLE_PATH_RE.is_match(title)
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    Newline,
    Comment,
    StartTag,
    EndTag,
    SelfClosing,
}

/// One token and the source it was read from.
///
/// Wikitext constructs use pseudo-tag names: `mw-quote`, `wikilink`,
/// `extlink`, `urllink`, `magiclink`, `template`, `templatearg`,
/// `language-variant`, `behavior-switch`, `signature`, `entity`,
/// `listItem`, `hr`, `h1`..`h6` and the table tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WtToken {
    pub kind: TokenKind,
    pub name: CompactString,
    pub span: Range<usize>,
    /// Written as a literal HTML tag
    pub html: bool,
    /// Link target or URL
    pub target: Option<String>,
}

impl WtToken {
    fn new(kind: TokenKind, name: &str, span: Range<usize>) -> Self {
        Self {
            kind,
            name: CompactString::from(name),
            span,
            html: false,
            target: None,
        }
    }

    /// Source text of this token in `text`.
    pub fn src<'t>(&self, text: &'t str) -> &'t str {
        &text[self.span.clone()]
    }

    pub fn is_heading(&self) -> bool {
        matches!(self.name.as_bytes(), [b'h', b'1'..=b'6'])
    }

    pub fn is_extension_tag(&self) -> bool {
        self.html && in_set(EXTENSION_TAGS, &self.name)
    }
}

/// Tokenize `text`, starting at line start when `sol` is set.
pub fn tokenize(text: &str, sol: bool) -> Vec<WtToken> {
    let mut tokenizer = Tokenizer {
        src: text,
        pos: 0,
        text_start: 0,
        sol,
        cell: None,
        heading_close: None,
        tokens: Vec::new(),
    };
    tokenizer.run();
    tokenizer.tokens
}

// =============================================================================
// Scanner
// =============================================================================

struct Tokenizer<'t> {
    src: &'t str,
    pos: usize,
    text_start: usize,
    sol: bool,
    /// Table cell line in progress (`td` or `th`)
    cell: Option<&'static str>,
    /// Closing `=` run of the heading on this line: `(start, end, level)`
    heading_close: Option<(usize, usize, usize)>,
    tokens: Vec<WtToken>,
}

impl<'t> Tokenizer<'t> {
    fn rest(&self) -> &'t str {
        &self.src[self.pos..]
    }

    fn line_end(&self, from: usize) -> usize {
        self.src[from..].find('\n').map_or(self.src.len(), |i| from + i)
    }

    fn flush_text(&mut self) {
        if self.text_start < self.pos {
            self.tokens
                .push(WtToken::new(TokenKind::Text, "", self.text_start..self.pos));
        }
    }

    fn emit(&mut self, token: WtToken) {
        self.flush_text();
        self.pos = token.span.end;
        self.text_start = self.pos;
        self.tokens.push(token);
    }

    fn run(&mut self) {
        while self.pos < self.src.len() {
            if self.sol {
                self.sol = false;
                if self.sol_token() {
                    continue;
                }
            }
            if !self.inline_token() {
                self.pos += self.rest().chars().next().map_or(1, char::len_utf8);
            }
        }
        self.flush_text();
    }

    /// Constructs only recognized at line start.
    fn sol_token(&mut self) -> bool {
        let rest = self.rest();
        let start = self.pos;
        let run = |c: char| rest.len() - rest.trim_start_matches(c).len();

        let token = if rest.starts_with("----") {
            WtToken::new(TokenKind::SelfClosing, "hr", start..start + run('-'))
        } else if rest.starts_with("{|") {
            WtToken::new(TokenKind::StartTag, "table", start..start + 2)
        } else if rest.starts_with("|}") {
            WtToken::new(TokenKind::EndTag, "table", start..start + 2)
        } else if rest.starts_with("|-") {
            let dashes = rest[1..].len() - rest[1..].trim_start_matches('-').len();
            WtToken::new(TokenKind::StartTag, "tr", start..start + 1 + dashes)
        } else if rest.starts_with("|+") {
            WtToken::new(TokenKind::StartTag, "caption", start..start + 2)
        } else if rest.starts_with('|') {
            self.cell = Some("td");
            WtToken::new(TokenKind::StartTag, "td", start..start + 1)
        } else if rest.starts_with('!') {
            self.cell = Some("th");
            WtToken::new(TokenKind::StartTag, "th", start..start + 1)
        } else if rest.starts_with(['*', '#', ':', ';']) {
            let bullets = rest.len() - rest.trim_start_matches(['*', '#', ':', ';']).len();
            WtToken::new(TokenKind::StartTag, "listItem", start..start + bullets)
        } else if rest.starts_with('=') {
            match self.heading() {
                Some(token) => token,
                None => return false,
            }
        } else {
            return false;
        };
        self.emit(token);
        true
    }

    fn heading(&mut self) -> Option<WtToken> {
        let start = self.pos;
        let line = &self.src[start..self.line_end(start)];
        let trimmed = line.trim_end_matches([' ', '\t']);
        let len = trimmed.len();
        let leading = len - trimmed.trim_start_matches('=').len();
        let trailing = len - trimmed.trim_end_matches('=').len();
        let level = if leading == len {
            (len.saturating_sub(1) / 2).min(6)
        } else {
            leading.min(trailing).min(6)
        };
        if level == 0 {
            return None;
        }
        let name = format!("h{level}");
        self.heading_close = Some((start + len - level, start + len, level));
        Some(WtToken::new(TokenKind::StartTag, &name, start..start + level))
    }

    fn inline_token(&mut self) -> bool {
        let start = self.pos;
        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            return false;
        };

        if let Some((close_start, close_end, level)) = self.heading_close
            && start == close_start
        {
            self.heading_close = None;
            let name = format!("h{level}");
            self.emit(WtToken::new(TokenKind::EndTag, &name, close_start..close_end));
            return true;
        }

        let token = match c {
            '\n' => {
                self.cell = None;
                self.heading_close = None;
                let token = WtToken::new(TokenKind::Newline, "", start..start + 1);
                self.emit(token);
                self.sol = true;
                return true;
            }
            '<' => self.angle_token(),
            '\'' if rest.starts_with("''") => {
                let n = rest.len() - rest.trim_start_matches('\'').len();
                Some(WtToken::new(TokenKind::SelfClosing, "mw-quote", start..start + n))
            }
            '[' if rest.starts_with("[[") => self.wikilink(),
            '[' => self.extlink(),
            '{' if rest.starts_with("{{") => self.braces("template", "templatearg"),
            '-' if rest.starts_with("-{") => rest
                .find("}-")
                .map(|i| WtToken::new(TokenKind::SelfClosing, "language-variant", start..start + i + 2)),
            '_' => BEHAVIOR_SWITCH_RE
                .captures(rest)
                .filter(|caps| in_set(BEHAVIOR_SWITCHES, &caps[1]))
                .and_then(|caps| caps.get(0))
                .map(|m| WtToken::new(TokenKind::SelfClosing, "behavior-switch", start..start + m.end())),
            '~' if rest.starts_with("~~~") => {
                let n = (rest.len() - rest.trim_start_matches('~').len()).min(5);
                Some(WtToken::new(TokenKind::SelfClosing, "signature", start..start + n))
            }
            '&' => ENTITY_RE
                .find(rest)
                .filter(|m| decode_entities(m.as_str()) != m.as_str())
                .map(|m| WtToken::new(TokenKind::SelfClosing, "entity", start..start + m.end())),
            '|' if self.cell.is_some() && rest.starts_with("||") => {
                let name = self.cell.unwrap_or("td");
                Some(WtToken::new(TokenKind::StartTag, name, start..start + 2))
            }
            '!' if self.cell == Some("th") && rest.starts_with("!!") => {
                Some(WtToken::new(TokenKind::StartTag, "th", start..start + 2))
            }
            _ if self.at_word_start() => self.autolink().or_else(|| {
                MAGIC_LINK_RE
                    .find(rest)
                    .map(|m| WtToken::new(TokenKind::SelfClosing, "magiclink", start..start + m.end()))
            }),
            _ => None,
        };

        match token {
            Some(token) => {
                self.emit(token);
                true
            }
            None => false,
        }
    }

    fn at_word_start(&self) -> bool {
        !self.src[..self.pos]
            .chars()
            .next_back()
            .is_some_and(char::is_alphanumeric)
    }

    fn angle_token(&self) -> Option<WtToken> {
        let start = self.pos;
        let rest = self.rest();
        if rest.starts_with("<!--") {
            let m = COMMENT_RE.find(rest)?;
            return Some(WtToken::new(TokenKind::Comment, "", start..start + m.end()));
        }

        let caps = HTML_TAG_RE.captures(rest)?;
        let whole = caps.get(0)?;
        let name = caps[2].to_ascii_lowercase();
        let closing = !caps[1].is_empty();
        let self_closing = whole.as_str().ends_with("/>");
        let mut end = start + whole.end();

        let kind = if closing {
            TokenKind::EndTag
        } else if self_closing {
            TokenKind::SelfClosing
        } else if in_set(EXTENSION_TAGS, &name) {
            // Extension content is opaque: swallow it up to the close tag
            let close_re = Regex::new(&format!(r"(?i)</{}\s*>", regex::escape(&name))).ok()?;
            match close_re.find(&self.src[end..]) {
                Some(m) => {
                    end += m.end();
                    TokenKind::SelfClosing
                }
                None => TokenKind::StartTag,
            }
        } else {
            TokenKind::StartTag
        };

        let mut token = WtToken::new(kind, &name, start..end);
        token.html = true;
        Some(token)
    }

    fn wikilink(&self) -> Option<WtToken> {
        let start = self.pos;
        let line = &self.src[start..self.line_end(start)];
        let mut depth = 0usize;
        let mut i = 0;
        let bytes = line.as_bytes();
        while i + 1 < bytes.len() {
            match &bytes[i..i + 2] {
                b"[[" => {
                    depth += 1;
                    i += 2;
                }
                b"]]" => {
                    depth -= 1;
                    i += 2;
                    if depth == 0 {
                        let inner = &line[2..i - 2];
                        let target = inner.split('|').next().unwrap_or_default();
                        let mut token = WtToken::new(TokenKind::SelfClosing, "wikilink", start..start + i);
                        token.target = Some(target.trim().to_string());
                        return Some(token);
                    }
                }
                _ => i += 1,
            }
        }
        None
    }

    fn extlink(&self) -> Option<WtToken> {
        let start = self.pos;
        let rest = &self.rest()[1..];
        let proto = protocol_len(rest)?;
        let url_len = URL_BODY_RE.find(rest).map_or(0, |m| m.end());
        if url_len <= proto {
            return None;
        }
        let line = &rest[..rest.find('\n').unwrap_or(rest.len())];
        let close = line[url_len..].find(']')? + url_len;
        let mut token = WtToken::new(TokenKind::SelfClosing, "extlink", start..start + 1 + close + 1);
        token.target = Some(rest[..url_len].to_string());
        Some(token)
    }

    /// Bare URL
    fn autolink(&self) -> Option<WtToken> {
        let start = self.pos;
        let rest = self.rest();
        let proto = protocol_len(rest).filter(|_| !rest.starts_with("//"))?;
        let body = URL_BODY_RE.find(rest)?.as_str();
        let mut url = body.trim_end_matches([',', ';', '\\', '.', ':', '!', '?']);
        if !url.contains('(') {
            url = url.trim_end_matches(')');
        }
        if url.len() <= proto {
            return None;
        }
        let mut token = WtToken::new(TokenKind::SelfClosing, "urllink", start..start + url.len());
        token.target = Some(url.to_string());
        Some(token)
    }

    /// `{{..}}` or `{{{..}}}` with balanced braces.
    fn braces(&self, template: &str, arg: &str) -> Option<WtToken> {
        let start = self.pos;
        let rest = self.rest();
        let mut depth = 0usize;
        for (i, c) in rest.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        let end = i + 1;
                        let name = if rest.starts_with("{{{") && rest[..end].ends_with("}}}") {
                            arg
                        } else {
                            template
                        };
                        return Some(WtToken::new(TokenKind::SelfClosing, name, start..start + end));
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// HTML5 element names, for callers sorting tag-like text.
pub fn is_html5_tag(name: &str) -> bool {
    in_set(HTML5_TAGS, &name.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(text: &str, sol: bool) -> Vec<(TokenKind, String)> {
        tokenize(text, sol)
            .into_iter()
            .map(|t| (t.kind, t.name.to_string()))
            .collect()
    }

    #[test]
    fn test_plain_text() {
        let tokens = tokenize("just text", true);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].src("just text"), "just text");
    }

    #[test]
    fn test_sol_constructs() {
        assert_eq!(names("* a", true)[0], (TokenKind::StartTag, "listItem".into()));
        assert_eq!(names("* a", false)[0].0, TokenKind::Text);
        assert_eq!(names("----", true)[0], (TokenKind::SelfClosing, "hr".into()));
        assert_eq!(names("{|", true)[0], (TokenKind::StartTag, "table".into()));
        assert_eq!(names("|-", true)[0], (TokenKind::StartTag, "tr".into()));
    }

    #[test]
    fn test_heading() {
        let toks = names("== a ==", true);
        assert_eq!(toks[0], (TokenKind::StartTag, "h2".into()));
        assert_eq!(toks[2], (TokenKind::EndTag, "h2".into()));
        // No closing run, no heading
        assert_eq!(names("=a", true)[0].0, TokenKind::Text);
        assert_eq!(names("a\n=b=", true)[2], (TokenKind::StartTag, "h1".into()));
    }

    #[test]
    fn test_links() {
        let toks = tokenize("see [[Foo|bar]] and [http://x.org y]", false);
        let link = toks.iter().find(|t| t.name == "wikilink").unwrap();
        assert_eq!(link.target.as_deref(), Some("Foo"));
        let ext = toks.iter().find(|t| t.name == "extlink").unwrap();
        assert_eq!(ext.target.as_deref(), Some("http://x.org"));

        let toks = tokenize("go to https://example.org/a.", false);
        let url = toks.iter().find(|t| t.name == "urllink").unwrap();
        assert_eq!(url.target.as_deref(), Some("https://example.org/a"));

        assert!(tokenize("foo]]", false).iter().all(|t| t.kind == TokenKind::Text));
    }

    #[test]
    fn test_inline_constructs() {
        let toks = names("''a'' {{t|x}} {{{p}}} __NOTOC__ ~~~~ &amp; RFC 1234", false);
        for name in ["mw-quote", "template", "templatearg", "behavior-switch", "signature", "entity", "magiclink"] {
            assert!(toks.iter().any(|(_, n)| n == name), "missing {name}");
        }
        // Unknown switch and non-entity stay text
        let toks = names("__FOO__ &bogus;", false);
        assert!(toks.iter().all(|(k, _)| *k == TokenKind::Text));
    }

    #[test]
    fn test_html_tags() {
        let toks = tokenize("<b>x</b><ref>[[y]]</ref><nowiki/>", false);
        assert_eq!(toks[0].kind, TokenKind::StartTag);
        assert!(toks[0].html);
        let ext = toks.iter().find(|t| t.name == "ref").unwrap();
        assert_eq!(ext.kind, TokenKind::SelfClosing);
        assert!(ext.is_extension_tag());
        assert!(!toks.iter().any(|t| t.name == "wikilink"));
        assert_eq!(toks.last().unwrap().kind, TokenKind::SelfClosing);
    }

    #[test]
    fn test_table_cells() {
        let toks = names("|a||b", true);
        assert_eq!(toks.iter().filter(|(_, n)| n == "td").count(), 2);
        let toks = names("a||b", true);
        assert!(toks.iter().all(|(_, n)| n != "td"));
    }

    #[test]
    fn test_link_targets() {
        assert!(is_valid_link_target("Foo"));
        assert!(is_valid_link_target("Foo#bar"));
        assert!(!is_valid_link_target("Foo<b>"));
        assert!(!is_valid_link_target(""));
        assert!(!is_valid_link_target(".."));
        assert!(has_valid_protocol("HTTP://x"));
        assert!(find_valid_protocol("a mailto:x"));
        assert!(!find_valid_protocol("plain"));
    }
}
