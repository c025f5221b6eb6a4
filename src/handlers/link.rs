//! Links: `a` and sol-transparent `link` elements.
//!
//! # Design
//!
//! A link is first reduced to [`LinkData`]: its kind (from `rel`), its
//! target as the author wrote it when the href is unchanged, its content
//! (a plain string when all children are text) and any prefix or tail
//! text the parser folded into the link.
//!
//! Wikilinks then choose between the simple form `[[Target]]` and the
//! piped form `[[Target|content]]`. An unmodified piped link stays piped
//! even if its content equals its target; an edit to either side lets
//! the serializer pick the minimal form. External links do the same
//! between a bare URL and `[url content]`, and recognize the RFC, ISBN
//! and PMID magic-link URLs.

use std::sync::LazyLock;

use log::error;
use regex::Regex;

use super::{TagHandler, emit_placeholder_src, html};
use crate::diff::DiffMark;
use crate::error::SelserResult;
use crate::html::decode_entities;
use crate::node::{DataParsoid, Document, NodeId, Stx};
use crate::wts::WikitextSerializer;
use crate::wts::escape::{EscapeHandler, EscapeOptions, escape_link_content, escape_wiki_text, escape_wt_entities};
use crate::wts::separators::SepConstraints;
use crate::wts::state::SerializerState;
use crate::wts::tokenizer::is_valid_link_target;

pub const HANDLERS: &[TagHandler] = &[
    TagHandler::new("a", handle_a),
    TagHandler::new("link", handle_link)
        .with_before(link_before)
        .with_after(link_after),
];

static LINK_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(mw:(?:WikiLink|ExtLink|PageProp)\S*)").expect("valid regex"));
static RELATIVE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:\.\.?/)+").expect("valid regex"));
static ABSOLUTE_URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:\w+:)?//").expect("valid regex"));
static HAS_PROTOCOL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+://").expect("valid regex"));
static EXT_LINK_UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[\\]\\[<>\"\\x00-\\x20\\x7F\u{00A0}\u{1680}\u{180E}\u{2000}-\u{200A}\u{202F}\u{205F}\u{3000}]")
        .expect("valid regex")
});
static BRACKETED_IPV6_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z][^:/]*:)?//&#x5B;([0-9a-f:.]+)&#x5D;(:\d|/|$)").expect("valid regex")
});
static COLON_ESCAPED_NS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:category|file|image)\s*:").expect("valid regex"));
static CATEGORY_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^category\s*:").expect("valid regex"));
static MAGIC_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"(?:(?:\.\.?/)*)Special(?:%3[Aa]|:)Book[Ss]ources(?:%2[Ff]|/)(\d+[Xx]?)",
        r"|//tools\.ietf\.org/html/rfc(\w+)",
        r"|//www\.ncbi\.nlm\.nih\.gov/pubmed/(\w+)\?dopt=Abstract",
        r")$",
    ))
    .expect("valid regex")
});
static ISBN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ISBN(?:97[89])?\d{9}[\dX]$").expect("valid regex"));
static UNISPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[ \u{00A0}\u{1680}\u{2000}-\u{200A}\u{202F}\u{205F}\u{3000}]+").expect("valid regex")
});

/// Attributes a plain `<a>` may carry and still be written as `[url ..]`.
const SAFE_LINK_ATTRIBUTES: &[&str] = &["href", "rel", "class", "title"];

// =============================================================================
// Round-trip data
// =============================================================================

/// Link flavours distinguished by `rel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    WikiLink,
    ExtLink,
    Category,
    Redirect,
    Language,
}

impl LinkKind {
    fn from_rel(rel: &str) -> Option<Self> {
        let ty = LINK_TYPE_RE.captures(rel)?.get(1)?.as_str();
        Some(match ty {
            "mw:WikiLink" => Self::WikiLink,
            "mw:PageProp/Category" => Self::Category,
            "mw:PageProp/redirect" => Self::Redirect,
            "mw:PageProp/Language" => Self::Language,
            // Other PageProps and ExtLink subtypes
            _ => Self::ExtLink,
        })
    }

    fn is_wikilink_syntax(self) -> bool {
        !matches!(self, Self::ExtLink)
    }
}

/// The href as it should be written.
#[derive(Debug, Clone)]
struct LinkTarget {
    value: String,
    /// `value` is the author's original text
    from_src: bool,
    /// The href differs from what was parsed
    modified: bool,
}

impl LinkTarget {
    fn of(doc: &Document, node: NodeId) -> Option<Self> {
        let href = doc.attr(node, "href")?;
        Some(match doc.dp(node).shadow("href") {
            Some((Some(norm), Some(src))) if norm == href => Self {
                value: src.to_string(),
                from_src: true,
                modified: false,
            },
            Some((norm, _)) => Self {
                value: href.to_string(),
                from_src: false,
                modified: norm != Some(href),
            },
            None => Self {
                value: href.to_string(),
                from_src: false,
                modified: false,
            },
        })
    }
}

#[derive(Debug)]
struct LinkData {
    kind: Option<LinkKind>,
    /// href without leading `./` or `../`
    href: String,
    orig_href: String,
    target: Option<LinkTarget>,
    /// Content when it is plain text
    content: Option<String>,
    /// The content is the author's original text
    content_from_src: bool,
    /// Non-text content, serialized from the children
    content_is_node: bool,
    content_modified: bool,
    prefix: String,
    tail: String,
}

impl LinkData {
    fn collect(wts: &WikitextSerializer<'_>, node: NodeId) -> Self {
        let doc = wts.state.doc;
        let dp = doc.dp(node);

        let mut kind = doc.attr(node, "rel").and_then(LinkKind::from_rel);
        if kind.is_none() && !doc.descendants(node).any(|d| d != node && doc.is_tag(d, "img")) {
            kind = Some(LinkKind::ExtLink);
        }

        let orig_href = doc.attr(node, "href").unwrap_or_default().to_string();
        let href = RELATIVE_PREFIX_RE.replace(&orig_href, "").into_owned();
        if kind == Some(LinkKind::WikiLink) && (ABSOLUTE_URL_RE.is_match(&href) || orig_href.starts_with('/')) {
            kind = Some(LinkKind::ExtLink);
        }

        let mut data = Self {
            kind,
            href,
            orig_href,
            target: LinkTarget::of(doc, node),
            content: None,
            content_from_src: false,
            content_is_node: false,
            content_modified: wts.state.in_modified_content || doc.has_diff_mark(node, DiffMark::SubtreeChanged),
            prefix: extra_str(doc, node, "prefix").to_string(),
            tail: extra_str(doc, node, "tail").to_string(),
        };

        let has_content = doc.children(node).any(|c| !doc.is_diff_marker(c, None));
        if has_content && doc.all_children_are_text(node) {
            let content = doc.text_content(node);
            if data.target.as_ref().is_some_and(|t| t.value != content) {
                data.split_content(content);
            } else {
                data.prefix.clear();
                data.tail.clear();
                data.content = Some(content);
            }
        } else if has_content {
            data.content_is_node = true;
        } else if data.kind == Some(LinkKind::Redirect) {
            data.prefix = dp.src.clone().unwrap_or_else(|| "#REDIRECT ".to_string());
        }

        // A URL of an RFC/ISBN/PMID page is written as a magic link
        if MAGIC_LINK_RE.is_match(&decode_uri(&data.orig_href)) {
            data.kind = Some(LinkKind::ExtLink);
        }
        data
    }

    /// Strip the recorded prefix and tail off `content` where they still match.
    fn split_content(&mut self, content: String) {
        let mut content = content.as_str();
        if !self.tail.is_empty() && content.ends_with(self.tail.as_str()) {
            content = &content[..content.len() - self.tail.len()];
        } else {
            self.tail.clear();
        }
        if !self.prefix.is_empty() && content.starts_with(self.prefix.as_str()) {
            content = &content[self.prefix.len()..];
        } else {
            self.prefix.clear();
        }
        self.content = Some(content.to_string());
    }
}

fn extra_str<'d>(doc: &'d Document, node: NodeId, key: &str) -> &'d str {
    doc.dp(node).extra.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

// =============================================================================
// Handlers
// =============================================================================

fn handle_a(wts: &mut WikitextSerializer<'_>, node: NodeId, wrapper_unmodified: bool) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let data = LinkData::collect(wts, node);
    match (data.kind, &data.target) {
        (Some(kind), Some(_)) if kind.is_wikilink_syntax() => serialize_as_wiki_link(wts, node, data)?,
        (Some(_), Some(_)) => serialize_as_ext_link(wts, node, data)?,
        _ => return serialize_untyped_link(wts, node, wrapper_unmodified),
    }
    Ok(doc.next_sibling(node))
}

fn handle_link(
    wts: &mut WikitextSerializer<'_>,
    node: NodeId,
    wrapper_unmodified: bool,
) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    if doc.is_sol_transparent_link(node) {
        return handle_a(wts, node, wrapper_unmodified);
    }
    if doc.dp(node).src.is_some() {
        emit_placeholder_src(wts, node);
        return Ok(doc.next_sibling(node));
    }
    (html::HTML.handle)(wts, node, wrapper_unmodified)
}

/// An `<a>` without link type or href: an HTML figure, or an external
/// link that loses its unsupported attributes.
fn serialize_untyped_link(
    wts: &mut WikitextSerializer<'_>,
    node: NodeId,
    wrapper_unmodified: bool,
) -> SelserResult<Option<NodeId>> {
    let doc = wts.state.doc;
    let complex = doc
        .attrs(node)
        .iter()
        .any(|(k, _)| !SAFE_LINK_ATTRIBUTES.contains(&k.as_str()));
    let wraps_image = doc.children(node).any(|c| doc.is_tag(c, "img"));

    if !complex && wraps_image {
        return (html::HTML.handle)(wts, node, wrapper_unmodified);
    }
    if complex {
        error!(
            target: "selser::wts",
            "Encountered {} -- serializing as extlink and dropping <a> attributes unsupported in wikitext.",
            doc.outer_html(node)
        );
    }

    let href = escape_ext_link_url(doc.attr(node, "href").unwrap_or_default());
    let content = wts.serialize_link_children_to_string(node, Some(EscapeHandler::A))?;
    wts.state.emit_chunk(&format!("[{href} {content}]"), node);
    Ok(doc.next_sibling(node))
}

/// New category and redirect links go on their own line.
fn link_before(doc: &Document, node: NodeId, _: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.is_new_elt(node) && (doc.is_category_link(node) || doc.is_redirect_link(node)) {
        SepConstraints::at_least(1)
    } else {
        SepConstraints::NONE
    }
}

fn link_after(doc: &Document, node: NodeId, other: NodeId, _: &SerializerState<'_>) -> SepConstraints {
    if doc.is_new_elt(node) && doc.is_category_link(node) && !doc.is_body(other) {
        SepConstraints::at_least(1)
    } else {
        SepConstraints::NONE
    }
}

// =============================================================================
// Wikilinks
// =============================================================================

fn serialize_as_wiki_link(wts: &mut WikitextSerializer<'_>, node: NodeId, mut data: LinkData) -> SelserResult<()> {
    let doc = wts.state.doc;
    let dp = doc.dp(node);
    let old_sol = wts.state.on_sol;
    let Some(mut target) = data.target.take() else {
        return Ok(());
    };

    if !target.from_src {
        target.value = decode_uri(&target.value);
    }

    match data.kind {
        Some(LinkKind::Category) => {
            if let Some((page, sort_key)) = target.value.split_once('#') {
                let key = decode_uri(sort_key).replace("%23", "#");
                let new_value = RELATIVE_PREFIX_RE.replace(page, "").replace('_', " ");
                target.value = new_value;
                data.split_content(key);
            } else {
                data.content = Some(target.value.trim_start_matches("./").replace('_', " "));
            }
            data.content_is_node = false;
            // Sort keys produced by templates are shadowed
            if !target.modified
                && let Some(src) = dp.sa.get("mw:sortKey").and_then(|v| v.as_str())
            {
                data.content = Some(src.to_string());
                data.content_from_src = true;
            }
        }
        Some(LinkKind::Language) if data.content.is_none() => {
            data.content = Some(decode_uri(&decode_entities(&target.value)));
        }
        _ => {}
    }

    let mut piped: Option<(String, bool)> = None;
    let mut escaped_target: Option<(String, bool)> = None;
    let link_target = if data.kind == Some(LinkKind::Redirect) {
        let mut link_target = target.value.clone();
        if target.modified || !target.from_src {
            let escaped = escape_link_target(&normalize_target(&link_target, true));
            link_target = escaped.0.clone();
            // A redirect to a category needs a colon, unless a category
            // link for the same page follows
            if CATEGORY_PREFIX_RE.is_match(&link_target) {
                let next_is_same_category = doc.next_sibling(node).is_some_and(|n| {
                    doc.is_category_link(n) && doc.attr(n, "href") == doc.attr(node, "href")
                });
                if !next_is_same_category {
                    link_target.insert(0, ':');
                }
            }
            escaped_target = Some(escaped);
        }
        link_target
    } else if is_simple_wiki_link(dp, &target, &data) {
        if !target.modified && !data.content_modified {
            add_colon_escape(target.value.trim_start_matches("./"), &target, data.kind)
        } else {
            let escaped = escape_link_target(data.content.as_deref().unwrap_or_default());
            let link_target = add_colon_escape(&escaped.0, &target, data.kind);
            escaped_target = Some(escaped);
            link_target
        }
    } else {
        let (mut content, mut requires_escaping) = if data.content_is_node {
            let src = wts.serialize_link_children_to_string(node, Some(EscapeHandler::Wikilink))?;
            data.split_content(src);
            (data.content.take().unwrap_or_default(), false)
        } else {
            (data.content.clone().unwrap_or_default(), !data.content_from_src)
        };
        if content.is_empty() && data.kind != Some(LinkKind::Category) {
            // Keep the pipe trick from firing on empty content
            content = "<nowiki/>".to_string();
            requires_escaping = false;
        }
        piped = Some((content, requires_escaping));

        let mut link_target = target.value.clone();
        if target.modified || !target.from_src {
            let relative_content = data.content.as_deref().is_some_and(|c| c.starts_with("./"));
            let escaped = escape_link_target(&normalize_target(&link_target, !relative_content));
            link_target = escaped.0.clone();
            escaped_target = Some(escaped);
        }
        add_colon_escape(&link_target, &target, data.kind)
    };

    if escaped_target.as_ref().is_some_and(|(_, invalid)| *invalid) {
        // No valid link can be written: keep only the text
        error!(target: "selser::wts", "Bad title text: {}", doc.outer_html(node));
        let (text, requires_escaping) = match piped {
            Some(p) => p,
            None => (link_target, true),
        };
        let text = if requires_escaping {
            wts.state.on_sol = old_sol;
            let opts = EscapeOptions {
                node: Some(node),
                ..EscapeOptions::default()
            };
            escape_wiki_text(&mut wts.state, &text, &opts)
        } else {
            text
        };
        let chunk = format!("{}{text}{}", data.prefix, data.tail);
        wts.state.emit_chunk(&chunk, node);
        return Ok(());
    }

    let piped_text = match piped {
        // Content follows "[[", so never at line start
        Some((content, true)) => format!("|{}", escape_link_content(&mut wts.state, &content, false, node, false)),
        Some((content, false)) => format!("|{content}"),
        None => String::new(),
    };
    let chunk = format!("{}[[{link_target}{piped_text}]]{}", data.prefix, data.tail);
    wts.state.emit_chunk(&chunk, node);
    Ok(())
}

/// Whether `[[content]]` says the same as the piped form.
///
/// Unmodified piped links keep their pipe.
fn is_simple_wiki_link(dp: &DataParsoid, target: &LinkTarget, data: &LinkData) -> bool {
    let Some(content) = data.content.as_deref() else {
        return false;
    };
    if data.content_is_node
        || !(target.modified || data.content_modified || !dp.stx_is(&Stx::Piped))
        || content.starts_with("./")
    {
        return false;
    }

    let stripped = target.value.strip_prefix(':').unwrap_or(&target.value);
    let decoded = decode_uri(&decode_entities(stripped)).replace('_', " ");
    let content = content.replace('_', " ");
    let href_has_proto = HAS_PROTOCOL_RE.is_match(&data.href);

    content == decoded
        || format!("/{content}/") == decoded
        || normalize_title(&content, false) == decode_uri(stripped)
        || (!href_has_proto
            && (content == data.href || normalize_title(&content, true) == decode_uri(&data.href)))
}

/// Strip relative prefixes and, unless asked not to, turn `_` into spaces.
fn normalize_target(target: &str, underscores_to_spaces: bool) -> String {
    let t = RELATIVE_PREFIX_RE.replace(target, "");
    if underscores_to_spaces {
        t.replace('_', " ")
    } else {
        t.into_owned()
    }
}

/// Entity-escape a link target; the flag marks targets no link can have.
fn escape_link_target(target: &str) -> (String, bool) {
    let escaped = escape_wt_entities(target);
    let invalid = !is_valid_link_target(&escaped) || escaped.contains('|');
    (escaped, invalid)
}

/// `[[Category:X]]` and `[[File:X]]` would not be links; a leading colon
/// makes them plain links again.
fn add_colon_escape(link_target: &str, target: &LinkTarget, kind: Option<LinkKind>) -> String {
    if !target.from_src
        && kind == Some(LinkKind::WikiLink)
        && !link_target.starts_with(':')
        && COLON_ESCAPED_NS_RE.is_match(link_target)
    {
        format!(":{link_target}")
    } else {
        link_target.to_string()
    }
}

/// Page-title normalization: single separators, first letter upper case.
fn normalize_title(title: &str, underscores: bool) -> String {
    let sep = if underscores { "_" } else { " " };
    let words: Vec<_> = title
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect();
    let joined = words.join(sep);
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => joined,
    }
}

// =============================================================================
// External links
// =============================================================================

fn serialize_as_ext_link(wts: &mut WikitextSerializer<'_>, node: NodeId, data: LinkData) -> SelserResult<()> {
    let doc = wts.state.doc;
    let Some(target) = data.target.as_ref() else {
        return Ok(());
    };

    let url = if target.modified || !target.from_src {
        escape_ext_link_url(&target.value)
    } else {
        target.value.clone()
    };

    let plain = doc.has_children(node) && doc.all_children_are_text(node);
    if plain {
        let content = doc.text_content(node);
        let minimal = target.value == content || data.orig_href == content;
        if minimal && (target.modified || data.content_modified || doc.dp(node).stx_is(&Stx::Url)) {
            wts.state.emit_chunk(&url, node);
            return Ok(());
        }
    }

    let magic = magic_link_match(&decode_uri(&data.orig_href));
    let content = wts.serialize_link_children_to_string(node, Some(EscapeHandler::A))?;
    let chunk = if let Some(magic) = magic {
        magic.serialize(&target.value, &content)
    } else if url.starts_with('#') {
        // Fragment-only: a link within the page
        let piped = if content.is_empty() { String::new() } else { format!("|{content}") };
        format!("[[{url}{piped}]]")
    } else {
        let text = if content.is_empty() { String::new() } else { format!(" {content}") };
        format!("[{url}{text}]")
    };
    wts.state.emit_chunk(&chunk, node);
    Ok(())
}

/// Make an already percent-encoded URL safe inside `[..]`.
pub fn escape_ext_link_url(url: &str) -> String {
    let escaped = EXT_LINK_UNSAFE_RE.replace_all(url, |caps: &regex::Captures<'_>| {
        caps[0]
            .chars()
            .map(|c| match c {
                '\u{a0}' => "&nbsp;".to_string(),
                c => format!("&#x{:02X};", u32::from(c)),
            })
            .collect::<String>()
    });
    // Bracketed IPv6 hosts keep their brackets
    BRACKETED_IPV6_RE.replace(&escaped, "$1//[$2]$3").into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MagicLink {
    Isbn(String),
    Rfc(String),
    Pmid(String),
}

fn magic_link_match(href: &str) -> Option<MagicLink> {
    let caps = MAGIC_LINK_RE.captures(href)?;
    let group = |i| caps.get(i).map(|m| m.as_str().to_string());
    group(1)
        .map(MagicLink::Isbn)
        .or_else(|| group(2).map(MagicLink::Rfc))
        .or_else(|| group(3).map(MagicLink::Pmid))
}

impl MagicLink {
    /// The magic-link text when the content is exactly what it renders as,
    /// otherwise an explicit link.
    fn serialize(&self, href: &str, content: &str) -> String {
        let normalized = UNISPACE_RE.replace_all(&decode_entities(content), " ").into_owned();
        match self {
            Self::Isbn(num) => {
                let compact: String = normalized
                    .chars()
                    .filter(|c| !matches!(c, '-' | ' ' | '\t'))
                    .collect::<String>()
                    .to_uppercase();
                if compact == format!("ISBN{num}") && ISBN_RE.is_match(&compact) {
                    content.to_string()
                } else {
                    format!("[[{}|{content}]]", href.trim_start_matches("./"))
                }
            }
            Self::Rfc(num) | Self::Pmid(num) => {
                let name = if matches!(self, Self::Rfc(_)) { "RFC" } else { "PMID" };
                if normalized.replace('\t', " ") == format!("{name} {num}") {
                    content.to_string()
                } else {
                    format!("[{href} {content}]")
                }
            }
        }
    }
}

// =============================================================================
// Percent-decoding
// =============================================================================

/// Decode `%XX` escapes; runs that do not decode to UTF-8 stay encoded.
fn decode_uri(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            let next = s[i..].find('%').map_or(s.len(), |p| i + p);
            out.push_str(&s[i..next]);
            i = next;
            continue;
        }

        let start = i;
        let mut run = Vec::new();
        while i + 2 < bytes.len() && bytes[i] == b'%' {
            match std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                Some(b) => {
                    run.push(b);
                    i += 3;
                }
                None => break,
            }
        }
        if run.is_empty() {
            out.push('%');
            i = start + 1;
            continue;
        }
        match String::from_utf8(run) {
            Ok(decoded) => out.push_str(&decoded),
            Err(_) => out.push_str(&s[start..i]),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelserConfig;
    use crate::template::TemplateHintMap;

    fn serialize(html: &str) -> String {
        let mut doc = Document::parse_html(html).unwrap();
        let templates = TemplateHintMap::default();
        WikitextSerializer::serialize_dom(&mut doc, None, SelserConfig::default(), &templates, false).unwrap()
    }

    #[test]
    fn test_new_wikilinks() {
        assert_eq!(serialize(r#"<a rel="mw:WikiLink" href="./Foo">Foo</a>"#), "[[Foo]]");
        assert_eq!(serialize(r#"<a rel="mw:WikiLink" href="./Foo_bar">foo bar</a>"#), "[[Foo_bar]]");
        assert_eq!(serialize(r#"<a rel="mw:WikiLink" href="./Foo">bar</a>"#), "[[Foo|bar]]");
        assert_eq!(serialize(r#"<a rel="mw:WikiLink" href="./Foo_bar">baz</a>"#), "[[Foo bar|baz]]");
    }

    #[test]
    fn test_unmodified_piped_link_keeps_pipe() {
        let html = r#"<a rel="mw:WikiLink" href="./Foo" data-parsoid='{"stx":"piped","a":{"href":"./Foo"},"sa":{"href":"Foo"}}'>Foo</a>"#;
        assert_eq!(serialize(html), "[[Foo|Foo]]");
    }

    #[test]
    fn test_link_tail() {
        let html = r#"<a rel="mw:WikiLink" href="./Foo" data-parsoid='{"tail":"s"}'>Foos</a>"#;
        assert_eq!(serialize(html), "[[Foo]]s");
    }

    #[test]
    fn test_colon_escape() {
        let html = r#"<a rel="mw:WikiLink" href="./Category:Foo">Category:Foo</a>"#;
        assert_eq!(serialize(html), "[[:Category:Foo]]");
    }

    #[test]
    fn test_category_links() {
        assert_eq!(
            serialize(r#"<link rel="mw:PageProp/Category" href="./Category:Foo">"#),
            "[[Category:Foo]]"
        );
        assert_eq!(
            serialize(r#"<link rel="mw:PageProp/Category" href="./Category:Foo#Bar">"#),
            "[[Category:Foo|Bar]]"
        );
    }

    #[test]
    fn test_external_links() {
        assert_eq!(
            serialize(r#"<a rel="mw:ExtLink" href="http://example.com">site</a>"#),
            "[http://example.com site]"
        );
        assert_eq!(
            serialize(r#"<a rel="mw:ExtLink" href="http://example.com" data-parsoid='{"stx":"url"}'>http://example.com</a>"#),
            "http://example.com"
        );
        assert_eq!(
            serialize(r#"<a rel="mw:ExtLink" href="http://example.com/a b"></a>"#),
            "[http://example.com/a&#x20;b]"
        );
    }

    #[test]
    fn test_magic_links() {
        let html = r#"<a rel="mw:ExtLink" href="//tools.ietf.org/html/rfc1234">RFC 1234</a>"#;
        assert_eq!(serialize(html), "RFC 1234");
        let html = r#"<a rel="mw:ExtLink" href="//tools.ietf.org/html/rfc1234">the rfc</a>"#;
        assert_eq!(serialize(html), "[//tools.ietf.org/html/rfc1234 the rfc]");
        let html = r#"<a rel="mw:WikiLink" href="./Special:BookSources/0123456789">ISBN 0-12-345678-9</a>"#;
        assert_eq!(serialize(html), "ISBN 0-12-345678-9");
    }

    #[test]
    fn test_link_kinds() {
        assert_eq!(LinkKind::from_rel("mw:WikiLink"), Some(LinkKind::WikiLink));
        assert_eq!(LinkKind::from_rel("mw:ExtLink/ISBN"), Some(LinkKind::ExtLink));
        assert_eq!(LinkKind::from_rel("nofollow mw:PageProp/Category"), Some(LinkKind::Category));
        assert_eq!(LinkKind::from_rel("nofollow"), None);
    }

    #[test]
    fn test_escape_ext_link_url() {
        assert_eq!(escape_ext_link_url("http://x/[a]"), "http://x/&#x5B;a&#x5D;");
        assert_eq!(escape_ext_link_url("http://[::1]/"), "http://[::1]/");
    }

    #[test]
    fn test_decode_uri() {
        assert_eq!(decode_uri("Foo%20bar"), "Foo bar");
        assert_eq!(decode_uri("%C3%A9t%C3%A9"), "été");
        assert_eq!(decode_uri("100%"), "100%");
        assert_eq!(decode_uri("%FF%zz"), "%FF%zz");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("foo  bar", false), "Foo bar");
        assert_eq!(normalize_title("foo bar", true), "Foo_bar");
    }
}
