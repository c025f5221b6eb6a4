//! Template metadata and template-part serialization.
//!
//! # Design
//!
//! Template metadata (preferred parameter order, named-only templates)
//! lives outside this crate and is only reachable asynchronously. The
//! serializer itself is synchronous, so lookups happen up front:
//! [`prefetch_template_hints`] walks the document, asks a
//! [`TemplateInfoSource`] about every template it finds (one request at a
//! time) and collects the answers into a [`TemplateHintMap`]. The walk
//! then reads that map. A failed lookup only costs the hints: the
//! template is written in its default layout.
//!
//! [`serialize_from_parts`] rebuilds `{{name|args}}` text from the
//! `data-mw` parts of an encapsulated node, keeping the original
//! parameter order and spacing where the parser recorded it.

use std::fmt;
use std::future::{self, Future};

use compact_str::CompactString;
use log::{debug, warn};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use crate::error::{SelserError, SelserResult};
use crate::node::{Document, NodeId, ParamInfo};
use crate::wts::WikitextSerializer;
use crate::wts::escape::{TplArgKind, TplArgOptions, escape_tpl_arg_wt};

// =============================================================================
// Keys and hints
// =============================================================================

/// Template identity: the target href without `./`, or the target wikitext.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateKey(CompactString);

impl TemplateKey {
    pub fn new(name: &str) -> Self {
        Self(CompactString::from(name))
    }

    /// Key of a `data-mw` template `target` object.
    pub fn from_target(target: &Value) -> Option<Self> {
        if let Some(href) = target.get("href").and_then(Value::as_str) {
            return Some(Self::new(href.trim_start_matches("./")));
        }
        let wt = target.get("wt").and_then(Value::as_str)?.trim();
        (!wt.is_empty()).then(|| Self::new(wt))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the metadata says about a template's parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateHints {
    /// Parameter names in preferred order
    pub param_order: Vec<String>,
    /// Every parameter is written as `name=value`
    pub named_only: bool,
}

impl TemplateHints {
    pub fn with_order<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            param_order: names.into_iter().map(Into::into).collect(),
            named_only: false,
        }
    }

    pub fn named_only(mut self) -> Self {
        self.named_only = true;
        self
    }
}

// =============================================================================
// Sources
// =============================================================================

/// Asynchronous provider of template metadata.
pub trait TemplateInfoSource: Send + Sync {
    fn fetch(&self, key: &TemplateKey) -> impl Future<Output = SelserResult<TemplateHints>> + Send;
}

/// No metadata: every template gets the default layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTemplateInfo;

impl TemplateInfoSource for NoTemplateInfo {
    fn fetch(&self, _: &TemplateKey) -> impl Future<Output = SelserResult<TemplateHints>> + Send {
        future::ready(Ok(TemplateHints::default()))
    }
}

/// Memoizing wrapper, shareable between serializations.
#[derive(Debug, Default)]
pub struct CachedTemplateInfo<S> {
    inner: S,
    cache: RwLock<FxHashMap<TemplateKey, TemplateHints>>,
}

impl<S> CachedTemplateInfo<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }
}

impl<S: TemplateInfoSource> TemplateInfoSource for CachedTemplateInfo<S> {
    fn fetch(&self, key: &TemplateKey) -> impl Future<Output = SelserResult<TemplateHints>> + Send {
        async move {
            let cached = self.cache.read().get(key).cloned();
            if let Some(hints) = cached {
                return Ok(hints);
            }
            // Failures are not cached
            let hints = self.inner.fetch(key).await?;
            self.cache.write().insert(key.clone(), hints.clone());
            Ok(hints)
        }
    }
}

// =============================================================================
// Prefetch
// =============================================================================

/// Hints gathered for one serialization.
#[derive(Debug, Clone, Default)]
pub struct TemplateHintMap {
    hints: FxHashMap<TemplateKey, TemplateHints>,
}

impl TemplateHintMap {
    pub fn get(&self, key: &TemplateKey) -> Option<&TemplateHints> {
        self.hints.get(key)
    }

    pub fn insert(&mut self, key: TemplateKey, hints: TemplateHints) {
        self.hints.insert(key, hints);
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

/// Template keys in document order, each once.
pub fn template_keys(doc: &Document) -> Vec<TemplateKey> {
    let mut seen = FxHashSet::default();
    let mut keys = Vec::new();
    for id in doc.descendants(doc.body()) {
        if !doc.is_first_encapsulation_wrapper(id) {
            continue;
        }
        let Some(parts) = doc.data_mw(id).and_then(|mw| mw.get("parts")).and_then(Value::as_array) else {
            continue;
        };
        for target in parts.iter().filter_map(|p| p.get("template")?.get("target")) {
            if let Some(key) = TemplateKey::from_target(target)
                && seen.insert(key.clone())
            {
                keys.push(key);
            }
        }
    }
    keys
}

/// Look up every template in `doc`, strictly one after another.
pub async fn prefetch_template_hints<S: TemplateInfoSource>(doc: &Document, source: &S) -> TemplateHintMap {
    let mut map = TemplateHintMap::default();
    for key in template_keys(doc) {
        match source.fetch(&key).await {
            Ok(hints) => map.insert(key, hints),
            Err(err) => warn!(target: "selser::template", "no metadata for {key}, using default layout: {err}"),
        }
    }
    debug!(target: "selser::template", "prefetched hints for {} templates", map.len());
    map
}

// =============================================================================
// Serialization from parts
// =============================================================================

/// One argument, ready for layout.
#[derive(Debug)]
struct Arg<'p> {
    key: &'p str,
    /// `None` for positional arguments
    name: Option<String>,
    value: String,
}

/// Rebuild the wikitext of an encapsulated node from its `data-mw` parts.
pub fn serialize_from_parts(wts: &WikitextSerializer<'_>, node: NodeId, parts: &[Value]) -> SelserResult<String> {
    let doc = wts.state.doc;
    let use_hints = doc.is_new_elt(node) || doc.has_diff_markers(node);

    let mut buf = String::new();
    for part in parts {
        if let Some(s) = part.as_str() {
            buf.push_str(s);
        } else if let Some(tpl) = part.get("template") {
            let is_template = tpl.get("target").and_then(|t| t.get("href")).is_some();
            let kind = if is_template {
                TplArgKind::Template
            } else {
                TplArgKind::ParserFunction
            };
            let hints = tpl
                .get("target")
                .and_then(TemplateKey::from_target)
                .filter(|_| use_hints && is_template)
                .and_then(|key| wts.templates().get(&key));
            buf.push_str(&serialize_template(wts, node, tpl, kind, hints)?);
        } else if let Some(arg) = part.get("templatearg") {
            buf.push_str(&serialize_template(wts, node, arg, TplArgKind::TemplateArg, None)?);
        } else {
            return Err(SelserError::malformed(format!("unknown data-mw part: {part}")));
        }
    }
    Ok(buf)
}

fn serialize_template(
    wts: &WikitextSerializer<'_>,
    node: NodeId,
    tpl: &Value,
    kind: TplArgKind,
    hints: Option<&TemplateHints>,
) -> SelserResult<String> {
    let doc = wts.state.doc;
    let (open, close) = match kind {
        TplArgKind::TemplateArg => ("{{{", "}}}"),
        _ => ("{{", "}}"),
    };
    let target = tpl
        .get("target")
        .and_then(|t| t.get("wt"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut buf = format!("{open}{target}");

    let empty = serde_json::Map::new();
    let params = tpl.get("params").and_then(Value::as_object).unwrap_or(&empty);
    if params.is_empty() {
        return Ok(buf + close);
    }
    // Keys are compared trimmed
    let param = |k: &str| params.get(k).or_else(|| params.iter().find(|(pk, _)| pk.trim() == k).map(|(_, v)| v));
    let keys: Vec<&str> = params.keys().map(|k| k.trim()).collect();

    let dp = doc.dp(node);
    let arg_info: &[ParamInfo] = tpl
        .get("i")
        .and_then(Value::as_u64)
        .and_then(|i| dp.pi.get(usize::try_from(i).ok()?))
        .map(Vec::as_slice)
        .unwrap_or_default();
    let info_of = |k: &str| arg_info.iter().find(|a| a.k == k);

    // Recorded order, then hint order, then data-mw order; each key once
    let mut order: Vec<&str> = Vec::with_capacity(keys.len());
    let hinted = hints.map(|h| h.param_order.iter().map(String::as_str)).into_iter().flatten();
    for k in arg_info.iter().map(|a| a.k.as_str()).chain(hinted).chain(keys.iter().copied()) {
        if keys.contains(&k) && !order.contains(&k) {
            order.push(k);
        }
    }

    let num_positional_args = arg_info
        .iter()
        .filter(|a| param(&a.k).is_some() && !a.named)
        .count();
    let named_only = hints.is_some_and(|h| h.named_only);

    let mut args = Vec::with_capacity(order.len());
    let mut numeric_index = 1;
    for (i, &k) in order.iter().enumerate() {
        let Some(p) = param(k) else {
            continue;
        };
        let value = match (p.get("wt").and_then(Value::as_str), p.get("html").and_then(Value::as_str)) {
            (Some(wt), _) => wt.to_string(),
            (None, Some(html)) => wts.serialize_html_fragment(html)?,
            (None, None) => String::new(),
        };

        let mut named = info_of(k).is_some_and(|a| a.named) || named_only;
        let name = match p.get("key").and_then(|key| key.get("wt")).and_then(Value::as_str) {
            Some(key_wt) => {
                named = true;
                key_wt.to_string()
            }
            None => k.to_string(),
        };

        let escaped = escape_tpl_arg_wt(
            &value,
            &TplArgOptions {
                kind,
                serialize_as_named: named || k != numeric_index.to_string(),
                arg_index: i + 1,
                num_args: keys.len(),
                num_positional_args,
                arg_positional_index: numeric_index,
            },
        );
        if escaped.serialize_as_named {
            args.push(Arg {
                key: k,
                name: Some(name),
                value: escaped.value.trim().to_string(),
            });
        } else {
            // Whitespace is significant in positional arguments
            numeric_index += 1;
            args.push(Arg {
                key: k,
                name: None,
                value: escaped.value,
            });
        }
    }

    // New transclusions are written inline
    let inline = doc.is_new_elt(node);
    if inline {
        buf = buf.replace('\n', " ").trim().to_string();
    }
    for arg in args {
        buf.push('|');
        let Some(name) = arg.name else {
            buf.push_str(&arg.value);
            continue;
        };
        let spc: [&str; 4] = match info_of(arg.key).and_then(|a| a.spc.as_deref()) {
            Some([a, b, c, d]) if !name.is_empty() => [a.as_str(), b.as_str(), c.as_str(), d.as_str()],
            _ => ["", "", "", ""],
        };
        let kv = format!("{}{name}{}={}{}{}", spc[0], spc[1], spc[2], arg.value, spc[3]);
        if inline {
            buf.push_str(kv.replace('\n', " ").trim());
        } else {
            buf.push_str(&kv);
        }
    }
    Ok(buf + close)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::config::SelserConfig;

    assert_impl_all!(CachedTemplateInfo<NoTemplateInfo>: Send, Sync);
    assert_impl_all!(TemplateHintMap: Send, Sync);

    fn from_parts(html: &str, templates: &TemplateHintMap) -> String {
        let doc = Document::parse_html(html).unwrap();
        let node = doc.first_child(doc.body()).unwrap();
        let wts = WikitextSerializer::new(&doc, None, SelserConfig::default(), templates);
        let parts = doc.data_mw(node).unwrap()["parts"].as_array().unwrap().clone();
        serialize_from_parts(&wts, node, &parts).unwrap()
    }

    const ECHO: &str = r#"{"wt":"echo","href":"./Template:Echo"}"#;

    fn tpl_span(params: &str, dp: Option<&str>) -> String {
        let dp = dp.map(|d| format!(" data-parsoid='{d}'")).unwrap_or_default();
        format!(
            r##"<span about="#mwt1" typeof="mw:Transclusion"{dp} data-mw='{{"parts":[{{"template":{{"target":{ECHO},"params":{params},"i":0}}}}]}}'>x</span>"##
        )
    }

    #[test]
    fn test_positional_from_source() {
        let html = tpl_span(r#"{"1":{"wt":"foo"}}"#, Some(r#"{"pi":[[{"k":"1"}]]}"#));
        assert_eq!(from_parts(&html, &TemplateHintMap::default()), "{{echo|foo}}");
    }

    #[test]
    fn test_named_keeps_spacing() {
        let html = tpl_span(
            r#"{"a":{"wt":"x"}}"#,
            Some(r#"{"pi":[[{"k":"a","named":true,"spc":[""," "," ",""]}]]}"#),
        );
        assert_eq!(from_parts(&html, &TemplateHintMap::default()), "{{echo|a = x}}");
    }

    #[test]
    fn test_hints_order_new_template() {
        let mut hints = TemplateHintMap::default();
        hints.insert(TemplateKey::new("Template:Echo"), TemplateHints::with_order(["a", "b"]));
        let html = tpl_span(r#"{"b":{"wt":"2"},"a":{"wt":"1"}}"#, None);
        assert_eq!(from_parts(&html, &hints), "{{echo|a=1|b=2}}");
    }

    #[test]
    fn test_named_only_hint() {
        let mut hints = TemplateHintMap::default();
        hints.insert(
            TemplateKey::new("Template:Echo"),
            TemplateHints::with_order(["1"]).named_only(),
        );
        let html = tpl_span(r#"{"1":{"wt":"v"}}"#, None);
        assert_eq!(from_parts(&html, &hints), "{{echo|1=v}}");
    }

    #[test]
    fn test_argument_escaping() {
        let html = tpl_span(r#"{"1":{"wt":"a|b"}}"#, None);
        assert_eq!(from_parts(&html, &TemplateHintMap::default()), "{{echo|a{{!}}b}}");
        // '=' in the only positional argument: written as named
        let html = tpl_span(r#"{"1":{"wt":"a=b"}}"#, None);
        assert_eq!(from_parts(&html, &TemplateHintMap::default()), "{{echo|1=a=b}}");
    }

    #[test]
    fn test_string_parts_and_template_args() {
        let html = r##"<span about="#mwt1" typeof="mw:Param" data-mw='{"parts":["* ",{"templatearg":{"target":{"wt":"1"},"params":{},"i":0}}]}'>x</span>"##;
        assert_eq!(from_parts(html, &TemplateHintMap::default()), "* {{{1}}}");
    }

    #[test]
    fn test_template_keys() {
        let html = concat!(
            r##"<span about="#mwt1" typeof="mw:Transclusion" data-mw='{"parts":[{"template":{"target":{"wt":"echo","href":"./Template:Echo"},"params":{},"i":0}}]}'>a</span>"##,
            r##"<span about="#mwt2" typeof="mw:Transclusion" data-mw='{"parts":[{"template":{"target":{"wt":"#if:x"},"params":{},"i":0}},{"template":{"target":{"wt":"echo","href":"./Template:Echo"},"params":{},"i":1}}]}'>b</span>"##,
        );
        let doc = Document::parse_html(html).unwrap();
        let keys = template_keys(&doc);
        assert_eq!(keys, [TemplateKey::new("Template:Echo"), TemplateKey::new("#if:x")]);
    }

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl TemplateInfoSource for Counting {
        fn fetch(&self, key: &TemplateKey) -> impl Future<Output = SelserResult<TemplateHints>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let res = if self.fail {
                Err(SelserError::template("unavailable"))
            } else {
                Ok(TemplateHints::with_order([key.as_str()]))
            };
            future::ready(res)
        }
    }

    #[tokio::test]
    async fn test_cached_source_fetches_once() {
        let source = CachedTemplateInfo::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let key = TemplateKey::new("Template:Echo");
        let first = source.fetch(&key).await.unwrap();
        let second = source.fetch(&key).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let source = CachedTemplateInfo::new(Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let key = TemplateKey::new("Template:Echo");
        assert!(source.fetch(&key).await.is_err());
        assert!(source.fetch(&key).await.is_err());
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_prefetch_skips_failed_lookups() {
        let html = r##"<span about="#mwt1" typeof="mw:Transclusion" data-mw='{"parts":[{"template":{"target":{"wt":"echo","href":"./Template:Echo"},"params":{},"i":0}}]}'>a</span>"##;
        let doc = Document::parse_html(html).unwrap();

        let ok = Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let map = prefetch_template_hints(&doc, &ok).await;
        assert_eq!(
            map.get(&TemplateKey::new("Template:Echo")).map(|h| h.param_order.clone()),
            Some(vec!["Template:Echo".to_string()])
        );

        let failing = Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let map = prefetch_template_hints(&doc, &failing).await;
        assert!(map.is_empty());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_template_info() {
        let hints = NoTemplateInfo.fetch(&TemplateKey::new("X")).await.unwrap();
        assert_eq!(hints, TemplateHints::default());
    }
}
