//! Parse metadata (`data-parsoid`) attached to nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::span::SourceRange;

/// Syntax style a node was written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Stx {
    /// Literal HTML tag syntax
    Html,
    /// Table cell sharing a line with its predecessor (`||`, `!!`)
    Row,
    /// `[[target|text]]`
    Piped,
    /// `[[target]]`
    Simple,
    Magiclink,
    Url,
    Other(String),
}

impl Stx {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Html => "html",
            Self::Row => "row",
            Self::Piped => "piped",
            Self::Simple => "simple",
            Self::Magiclink => "magiclink",
            Self::Url => "url",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Stx {
    fn from(s: String) -> Self {
        match s.as_str() {
            "html" => Self::Html,
            "row" => Self::Row,
            "piped" => Self::Piped,
            "simple" => Self::Simple,
            "magiclink" => Self::Magiclink,
            "url" => Self::Url,
            _ => Self::Other(s),
        }
    }
}

impl From<Stx> for String {
    fn from(stx: Stx) -> Self {
        stx.as_str().to_string()
    }
}

/// Original layout of one template parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamInfo {
    /// Parameter key
    pub k: String,
    /// Written as `name=value` rather than positionally
    #[serde(skip_serializing_if = "is_false")]
    pub named: bool,
    /// Whitespace around `|`, name, `=` and value: `[before_name, after_name, before_value, after_value]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spc: Option<Vec<String>>,
}

/// Per-node parse metadata.
///
/// Unknown keys are kept in `extra` so a round trip through the side
/// table never loses information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataParsoid {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsr: Option<SourceRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsr: Option<SourceRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stx: Option<Stx>,
    /// Original source of placeholder-like nodes and encapsulated content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub auto_inserted_start: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub auto_inserted_end: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub fostered: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub misnested: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub self_close: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_tag_src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_tag_src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attr_sep_src: Option<String>,
    /// Shadowed attributes: normalized value at parse time
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub a: BTreeMap<String, Value>,
    /// Shadowed attributes: source text at parse time
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sa: BTreeMap<String, Value>,
    /// Template parameter layout, one list per transclusion part
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pi: Vec<Vec<ParamInfo>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataParsoid {
    /// Literal HTML syntax
    #[inline]
    pub fn is_html(&self) -> bool {
        self.stx == Some(Stx::Html)
    }

    #[inline]
    pub fn stx_is(&self, stx: &Stx) -> bool {
        self.stx.as_ref() == Some(stx)
    }

    /// Source range with unknown tag widths where tags were auto-inserted.
    pub fn dsr_without_auto_inserted(&self) -> Option<SourceRange> {
        let mut dsr = self.dsr?;
        if self.auto_inserted_start {
            dsr.open_width = None;
        }
        if self.auto_inserted_end {
            dsr.close_width = None;
        }
        Some(dsr)
    }

    /// Shadowed attribute pair: `(normalized, source)`.
    pub fn shadow(&self, name: &str) -> Option<(Option<&str>, Option<&str>)> {
        let norm = self.a.get(name)?;
        Some((norm.as_str(), self.sa.get(name).and_then(Value::as_str)))
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_parsoid() {
        let json = r#"{"stx":"piped","dsr":[0,11,2,2],"autoInsertedEnd":true,
            "a":{"href":"./Foo"},"sa":{"href":"Foo"},"custom":1}"#;
        let dp: DataParsoid = serde_json::from_str(json).unwrap();
        assert_eq!(dp.stx, Some(Stx::Piped));
        assert_eq!(dp.dsr, Some(SourceRange::new(0, 11, 2, 2)));
        assert!(dp.auto_inserted_end && !dp.auto_inserted_start);
        assert_eq!(dp.shadow("href"), Some((Some("./Foo"), Some("Foo"))));
        assert_eq!(dp.extra.get("custom"), Some(&Value::from(1)));
    }

    #[test]
    fn test_unknown_stx_is_kept() {
        let dp: DataParsoid = serde_json::from_str(r#"{"stx":"weird"}"#).unwrap();
        assert_eq!(dp.stx, Some(Stx::Other("weird".into())));
        let back = serde_json::to_string(&dp).unwrap();
        assert_eq!(back, r#"{"stx":"weird"}"#);
    }

    #[test]
    fn test_auto_inserted_widths() {
        let dp = DataParsoid {
            dsr: Some(SourceRange::new(0, 10, 3, 4)),
            auto_inserted_start: true,
            ..Default::default()
        };
        let dsr = dp.dsr_without_auto_inserted().unwrap();
        assert_eq!(dsr.open_width, None);
        assert_eq!(dsr.close_width, Some(4));
    }

    #[test]
    fn test_param_info() {
        let dp: DataParsoid =
            serde_json::from_str(r#"{"pi":[[{"k":"1"},{"k":"x","named":true,"spc":[""," "," ",""]}]]}"#)
                .unwrap();
        assert_eq!(dp.pi[0].len(), 2);
        assert!(!dp.pi[0][0].named);
        assert_eq!(dp.pi[0][1].spc.as_ref().map(Vec::len), Some(4));
    }
}
