//! Structural equality across two documents.
//!
//! Used by the tree differ for both its shallow node check and the deep
//! look-ahead matches. Attributes are compared as sorted sets; the two
//! JSON side tables get specialized comparisons.

use serde_json::Value;

use crate::attr::AttrsExt;
use crate::html::decode_comment;
use crate::node::{Document, NodeId, NodeKind};

/// Attributes that never make two elements differ.
pub const IGNORED_ATTRIBUTES: &[&str] = &["data-parsoid-diff", "about"];

/// One entry of an element's comparable attribute set
#[derive(Debug, Clone, Copy)]
enum AttrSlot<'a> {
    Plain(&'a str),
    DataParsoid,
    DataMw(&'a Value),
}

/// Compares nodes of document `a` against nodes of document `b`.
#[derive(Debug, Clone, Copy)]
pub struct TreeComparator<'a> {
    a: &'a Document,
    b: &'a Document,
}

impl<'a> TreeComparator<'a> {
    pub fn new(a: &'a Document, b: &'a Document) -> Self {
        Self { a, b }
    }

    /// Node equality; with `deep`, children are compared pairwise too.
    pub fn tree_equals(&self, na: NodeId, nb: NodeId, deep: bool) -> bool {
        match (self.a.kind(na), self.b.kind(nb)) {
            (NodeKind::Text(x), NodeKind::Text(y)) => x == y,
            (NodeKind::Comment(x), NodeKind::Comment(y)) => decode_comment(x) == decode_comment(y),
            (NodeKind::Element(ea), NodeKind::Element(eb)) => {
                if ea.tag != eb.tag || !self.attribs_equals(na, nb) {
                    return false;
                }
                if !deep {
                    return true;
                }
                if self.a.children(na).count() != self.b.children(nb).count() {
                    return false;
                }
                self.a
                    .children(na)
                    .zip(self.b.children(nb))
                    .all(|(ca, cb)| self.tree_equals(ca, cb, true))
            }
            _ => false,
        }
    }

    fn attr_slots<'d>(doc: &'d Document, id: NodeId) -> Vec<(&'d str, AttrSlot<'d>)> {
        let mut slots: Vec<(&str, AttrSlot<'_>)> = doc
            .attrs(id)
            .iter()
            .filter(|(k, _)| !IGNORED_ATTRIBUTES.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), AttrSlot::Plain(v.as_str())))
            .collect();
        // Every element carries data-parsoid, possibly empty
        slots.push(("data-parsoid", AttrSlot::DataParsoid));
        if let Some(dmw) = doc.data_mw(id).filter(|v| !is_empty_object(v)) {
            slots.push(("data-mw", AttrSlot::DataMw(dmw)));
        }
        slots.sort_by(|x, y| x.0.cmp(y.0));
        slots
    }

    /// Sorted-key attribute comparison ignoring [`IGNORED_ATTRIBUTES`].
    pub fn attribs_equals(&self, na: NodeId, nb: NodeId) -> bool {
        let xa = Self::attr_slots(self.a, na);
        let xb = Self::attr_slots(self.b, nb);
        if xa.len() != xb.len() {
            return false;
        }
        xa.iter().zip(&xb).all(|((ka, va), (kb, vb))| {
            ka == kb
                && match (va, vb) {
                    (AttrSlot::Plain(x), AttrSlot::Plain(y)) => x == y,
                    (AttrSlot::DataParsoid, AttrSlot::DataParsoid) => self.a.dp(na) == self.b.dp(nb),
                    (AttrSlot::DataMw(x), AttrSlot::DataMw(y)) => {
                        x == y || self.data_mw_equals(na, x, nb, y)
                    }
                    _ => false,
                }
        })
    }

    /// Order-independent data-mw comparison.
    ///
    /// Inside the top-level `body`, `id` values are resolved to elements
    /// and `html` values are parsed; both are compared as trees.
    pub fn data_mw_equals(&self, na: NodeId, dmw_a: &Value, nb: NodeId, dmw_b: &Value) -> bool {
        self.dmw_equals(na, dmw_a, nb, dmw_b, true, false)
    }

    fn dmw_equals(
        &self,
        na: NodeId,
        va: &Value,
        nb: NodeId,
        vb: &Value,
        top_level: bool,
        in_body: bool,
    ) -> bool {
        match (va, vb) {
            (Value::Object(oa), Value::Object(ob)) => {
                if oa.len() != ob.len() {
                    return false;
                }
                let mut ka: Vec<&String> = oa.keys().collect();
                let mut kb: Vec<&String> = ob.keys().collect();
                ka.sort();
                kb.sort();
                ka.iter().zip(&kb).all(|(k, kb)| {
                    *k == *kb
                        && match (oa.get(k.as_str()), ob.get(k.as_str())) {
                            (Some(x), Some(y)) => self.dmw_value_equals(na, x, nb, y, k, top_level, in_body),
                            _ => false,
                        }
                })
            }
            (Value::Array(aa), Value::Array(ab)) => {
                aa.len() == ab.len()
                    && aa
                        .iter()
                        .zip(ab)
                        .all(|(x, y)| self.dmw_value_equals(na, x, nb, y, "", false, in_body))
            }
            _ => va == vb,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dmw_value_equals(
        &self,
        na: NodeId,
        va: &Value,
        nb: NodeId,
        vb: &Value,
        key: &str,
        top_level: bool,
        in_body: bool,
    ) -> bool {
        if is_falsy(va) || is_falsy(vb) {
            return va == vb;
        }
        if std::mem::discriminant(va) != std::mem::discriminant(vb) {
            return false;
        }
        match (key, va, vb) {
            ("id", Value::String(ida), Value::String(idb)) if in_body => self.ids_equal(na, ida, nb, idb),
            ("html", Value::String(ha), Value::String(hb)) if in_body => html_equals(ha, hb),
            (_, Value::Object(_) | Value::Array(_), _) => {
                let body = top_level && key == "body";
                self.dmw_equals(na, va, nb, vb, false, body)
            }
            _ => va == vb,
        }
    }

    /// Compare the elements two `body.id` references point at.
    fn ids_equal(&self, na: NodeId, ida: &str, nb: NodeId, idb: &str) -> bool {
        let ha = self.a.get_element_by_id(ida);
        let hb = self.b.get_element_by_id(idb);
        if let (Some(ha), Some(hb)) = (ha, hb) {
            return self.tree_equals(ha, hb, true);
        }
        let ext = extension_name(self.a, na);
        if ha.is_none() {
            log::warn!(
                target: "selser::domdiff",
                "orig/{ext}: extension src id {ida:?} points to non-existent element for {}",
                self.a.outer_html(na)
            );
        }
        if hb.is_none() {
            log::warn!(
                target: "selser::domdiff",
                "edited/{ext}: extension src id {idb:?} points to non-existent element for {}",
                self.b.outer_html(nb)
            );
        }
        ida == idb
    }
}

/// Parse both fragments and compare them as trees.
fn html_equals(ha: &str, hb: &str) -> bool {
    match (Document::parse_html(ha), Document::parse_html(hb)) {
        (Ok(da), Ok(db)) => TreeComparator::new(&da, &db).tree_equals(da.body(), db.body(), true),
        _ => ha == hb,
    }
}

fn extension_name(doc: &Document, id: NodeId) -> String {
    doc.element(id)
        .and_then(|e| {
            e.attrs
                .find_word("typeof", |w| w.starts_with("mw:Extension/"))
                .map(|w| w.trim_start_matches("mw:Extension/").to_string())
        })
        .unwrap_or_else(|| "---".to_string())
}

/// Values that cannot be inspected further: null, false, 0 and "".
fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn is_empty_object(v: &Value) -> bool {
    v.as_object().is_some_and(|o| o.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair(a: &str, b: &str) -> (Document, Document) {
        (Document::parse_html(a).unwrap(), Document::parse_html(b).unwrap())
    }

    fn first(doc: &Document) -> NodeId {
        doc.first_child(doc.body()).unwrap()
    }

    #[test]
    fn test_text_and_comment_equality() {
        let (a, b) = pair("x<!--a --&gt; b-->", "x<!--a --&#62; b-->");
        let cmp = TreeComparator::new(&a, &b);
        assert!(cmp.tree_equals(first(&a), first(&b), true));
        assert!(cmp.tree_equals(a.body(), b.body(), true));

        let (a, b) = pair("x", "y");
        assert!(!TreeComparator::new(&a, &b).tree_equals(first(&a), first(&b), false));
    }

    #[test]
    fn test_attribute_order_and_ignored() {
        let (a, b) = pair(
            r##"<span class="c" id="i" about="#mwt1">x</span>"##,
            r##"<span id="i" class="c" about="#mwt2">x</span>"##,
        );
        assert!(TreeComparator::new(&a, &b).attribs_equals(first(&a), first(&b)));

        let (a, b) = pair(r#"<span class="c">x</span>"#, r#"<span class="d">x</span>"#);
        assert!(!TreeComparator::new(&a, &b).attribs_equals(first(&a), first(&b)));
    }

    #[test]
    fn test_data_parsoid_compared_structurally() {
        let (a, b) = pair(
            r#"<p data-parsoid='{"dsr":[0,1,0,0]}'>x</p>"#,
            r#"<p data-parsoid='{"dsr": [0, 1, 0, 0]}'>x</p>"#,
        );
        assert!(TreeComparator::new(&a, &b).tree_equals(first(&a), first(&b), true));

        let (a, b) = pair(r#"<p data-parsoid='{"dsr":[0,1,0,0]}'>x</p>"#, "<p>x</p>");
        assert!(!TreeComparator::new(&a, &b).tree_equals(first(&a), first(&b), false));
    }

    #[test]
    fn test_shallow_ignores_children() {
        let (a, b) = pair("<p>x</p>", "<p>y<b>z</b></p>");
        let cmp = TreeComparator::new(&a, &b);
        assert!(cmp.tree_equals(first(&a), first(&b), false));
        assert!(!cmp.tree_equals(first(&a), first(&b), true));
    }

    #[test]
    fn test_data_mw_key_order_and_kinds() {
        let (a, b) = pair("<span></span>", "<span></span>");
        let cmp = TreeComparator::new(&a, &b);
        let (na, nb) = (first(&a), first(&b));
        assert!(cmp.data_mw_equals(na, &json!({"x": 1, "y": [1, {"z": 2}]}), nb, &json!({"y": [1, {"z": 2}], "x": 1})));
        assert!(!cmp.data_mw_equals(na, &json!({"x": 1}), nb, &json!({"x": "1"})));
        assert!(!cmp.data_mw_equals(na, &json!({"x": 0}), nb, &json!({"x": null})));
        assert!(cmp.data_mw_equals(na, &json!({"x": null}), nb, &json!({"x": null})));
        assert!(!cmp.data_mw_equals(na, &json!({"x": 1}), nb, &json!({"x": 1, "y": 2})));
    }

    #[test]
    fn test_data_mw_body_html_parsed() {
        let (a, b) = pair("<span></span>", "<span></span>");
        let cmp = TreeComparator::new(&a, &b);
        let (na, nb) = (first(&a), first(&b));
        let x = json!({"body": {"html": "<b class=\"k\" id=\"q\">t</b>"}});
        let y = json!({"body": {"html": "<b id=\"q\" class=\"k\">t</b>"}});
        assert!(cmp.data_mw_equals(na, &x, nb, &y));

        // Outside body, html is an opaque string
        let x = json!({"attrs": {"html": "<b class=\"k\" id=\"q\">t</b>"}});
        let y = json!({"attrs": {"html": "<b id=\"q\" class=\"k\">t</b>"}});
        assert!(!cmp.data_mw_equals(na, &x, nb, &y));
    }

    #[test]
    fn test_data_mw_body_id_resolved() {
        let (a, b) = pair(
            r#"<span typeof="mw:Extension/ref"></span><span id="r1">note</span>"#,
            r#"<span typeof="mw:Extension/ref"></span><span id="r2">note</span>"#,
        );
        let cmp = TreeComparator::new(&a, &b);
        let (na, nb) = (first(&a), first(&b));
        // Different ids, but they point at equal content... except the id attribute itself
        assert!(!cmp.data_mw_equals(na, &json!({"body": {"id": "r1"}}), nb, &json!({"body": {"id": "r2"}})));
        assert!(cmp.data_mw_equals(na, &json!({"body": {"id": "r1"}}), nb, &json!({"body": {"id": "r1"}})));
        // Unresolvable on one side: raw comparison
        assert!(!cmp.data_mw_equals(na, &json!({"body": {"id": "zz"}}), nb, &json!({"body": {"id": "r2"}})));
    }

    #[test]
    fn test_empty_data_mw_is_absent() {
        let (mut a, b) = pair("<span></span>", "<span></span>");
        let na = first(&a);
        a.set_data_mw(na, json!({}));
        assert!(TreeComparator::new(&a, &b).attribs_equals(na, first(&b)));
    }
}
