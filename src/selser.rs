//! Selective serialization entry point.
//!
//! # Design
//!
//! [`SelectiveSerializer`] ties the stages together:
//!
//! 1. Without a prior document (or source) the edited document is
//!    serialized from scratch.
//! 2. Otherwise the tree differ marks the edited document against the
//!    prior one. An empty diff returns the prior source untouched.
//! 3. Template metadata is fetched up front, one template at a time.
//! 4. The document is normalized and walked; unmodified subtrees are
//!    copied from source, modified ones go through their handlers.
//!
//! Only step 3 awaits. [`SelectiveSerializer::serialize_sync`] drives the
//! same path for sources that answer immediately.

use futures_util::FutureExt;
use log::{debug, info};

use crate::algo::diff;
use crate::config::SelserConfig;
use crate::error::{SelserError, SelserResult};
use crate::node::Document;
use crate::template::{TemplateInfoSource, prefetch_template_hints};
use crate::wts::WikitextSerializer;

/// What the edited document was derived from.
#[derive(Debug, Default)]
pub struct PriorState {
    /// Original wikitext
    pub source: String,
    /// Document the original wikitext parsed to
    pub doc: Option<Document>,
}

impl PriorState {
    pub fn new(source: impl Into<String>, doc: Document) -> Self {
        Self {
            source: source.into(),
            doc: Some(doc),
        }
    }

    /// Source without a document: serialization is not selective.
    pub fn source_only(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            doc: None,
        }
    }
}

/// Serializer of edited documents back to wikitext.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectiveSerializer {
    config: SelserConfig,
}

impl SelectiveSerializer {
    pub fn new(config: SelserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelserConfig {
        &self.config
    }

    /// Serialize `edited`, reusing the prior source where nothing changed.
    pub async fn serialize<S: TemplateInfoSource>(
        &self,
        mut edited: Document,
        prior: Option<PriorState>,
        templates: &S,
    ) -> SelserResult<String> {
        let config = self.config;
        let Some(PriorState {
            source,
            doc: Some(base),
        }) = prior
        else {
            debug!(target: "selser", "no prior document, serializing from scratch");
            let hints = prefetch_template_hints(&edited, templates).await;
            return WikitextSerializer::serialize_dom(&mut edited, None, config, &hints, false);
        };

        let revision = config.revision_for(&source);
        let result = diff(&base, &mut edited, &config.diff_config().with_revision(revision));
        if result.is_empty {
            info!(target: "selser", "no changes, returning original source");
            return Ok(source);
        }
        debug!(
            target: "selser",
            "diff: {} compared, {} inserted, {} deleted, {} wrappers modified",
            result.stats.nodes_compared,
            result.stats.inserted,
            result.stats.deleted,
            result.stats.modified_wrappers
        );

        let hints = prefetch_template_hints(&edited, templates).await;
        WikitextSerializer::serialize_dom(&mut edited, Some(&source), config, &hints, true)
    }

    /// [`serialize`](Self::serialize) for template sources that answer
    /// without suspending.
    pub fn serialize_sync<S: TemplateInfoSource>(
        &self,
        edited: Document,
        prior: Option<PriorState>,
        templates: &S,
    ) -> SelserResult<String> {
        self.serialize(edited, prior, templates)
            .now_or_never()
            .unwrap_or(Err(SelserError::PendingTemplateLookup))
    }
}

#[cfg(test)]
mod tests {
    use std::future::{self, Future};

    use super::*;
    use crate::template::{NoTemplateInfo, TemplateHints, TemplateKey};

    fn load(html: &str) -> Document {
        Document::parse_html(html).unwrap()
    }

    fn selser(base: &str, edited: &str, src: &str, config: SelserConfig) -> String {
        let prior = PriorState::new(src, load(base));
        SelectiveSerializer::new(config)
            .serialize_sync(load(edited), Some(prior), &NoTemplateInfo)
            .unwrap()
    }

    fn from_scratch(html: &str, config: SelserConfig) -> String {
        SelectiveSerializer::new(config)
            .serialize_sync(load(html), None, &NoTemplateInfo)
            .unwrap()
    }

    const LINK_BASE: &str = r#"<p data-parsoid='{"dsr":[0,11,0,0]}'><a rel="mw:WikiLink" href="./Foo" data-parsoid='{"stx":"piped","a":{"href":"./Foo"},"sa":{"href":"Foo"},"dsr":[0,11,6,2]}'>bar</a></p>"#;

    #[test]
    fn test_piped_link_becomes_simple() {
        let edited = LINK_BASE.replace(">bar<", ">Foo<");
        assert_eq!(selser(LINK_BASE, &edited, "[[Foo|bar]]", SelserConfig::default()), "[[Foo]]");
        // Non-selective: the recorded syntax stays
        assert_eq!(from_scratch(&edited, SelserConfig::default()), "[[Foo|Foo]]");
    }

    #[test]
    fn test_empty_new_heading() {
        assert_eq!(from_scratch("<h2></h2>", SelserConfig::default()).trim_end(), "==<nowiki/>==");
        assert_eq!(from_scratch("<h2></h2>", SelserConfig::EDIT), "");
    }

    const LIST_BASE: &str =
        r#"<ul data-parsoid='{"dsr":[0,6,0,0]}'><li data-parsoid='{"dsr":[0,6,1,0]}'>item</li></ul>"#;

    #[test]
    fn test_list_item_keeps_bullet_space() {
        let edited = LIST_BASE.replace(">item<", ">edited item<");
        assert_eq!(selser(LIST_BASE, &edited, "* item", SelserConfig::default()), "* edited item");
        assert_eq!(from_scratch(&edited, SelserConfig::default()), "*edited item");
    }

    const TABLE_SRC: &str = "{|\n|  unedited c1  || cell\n|}";

    fn table_html(second_cell: &str) -> String {
        format!(
            concat!(
                r#"<table data-parsoid='{{"dsr":[0,29,2,2]}}'>"#,
                r#"<tbody data-parsoid='{{"dsr":[3,26,0,0]}}'>"#,
                r#"<tr data-parsoid='{{"autoInsertedStart":true,"dsr":[3,26,0,0]}}'>"#,
                r#"<td data-parsoid='{{"dsr":[3,19,1,0]}}'>unedited c1</td>"#,
                r#"<td data-parsoid='{{"stx":"row","dsr":[19,26,2,0]}}'>{}</td>"#,
                "</tr></tbody></table>"
            ),
            second_cell
        )
    }

    #[test]
    fn test_table_cell_edit_keeps_neighbour() {
        let base = table_html("cell");
        let edited = table_html("edited cell");
        assert_eq!(
            selser(&base, &edited, TABLE_SRC, SelserConfig::default()),
            "{|\n|  unedited c1  || edited cell\n|}"
        );
    }

    #[test]
    fn test_unchanged_document_returns_source() {
        let src = "[[Foo|bar]]";
        assert_eq!(selser(LINK_BASE, LINK_BASE, src, SelserConfig::default()), src);

        // Even with a source the document would not reproduce
        let odd = "[[Foo|bar]]   <!-- kept -->";
        assert_eq!(selser(LINK_BASE, LINK_BASE, odd, SelserConfig::default()), odd);
    }

    #[test]
    fn test_source_without_document_is_not_selective() {
        let edited = LIST_BASE.replace(">item<", ">edited item<");
        let res = SelectiveSerializer::default()
            .serialize_sync(load(&edited), Some(PriorState::source_only("* item")), &NoTemplateInfo)
            .unwrap();
        assert_eq!(res, "*edited item");
    }

    struct Pending;

    impl TemplateInfoSource for Pending {
        fn fetch(&self, _: &TemplateKey) -> impl Future<Output = SelserResult<TemplateHints>> + Send {
            future::pending()
        }
    }

    const NEW_TEMPLATE: &str = r##"<span about="#mwt1" typeof="mw:Transclusion" data-mw='{"parts":[{"template":{"target":{"wt":"echo","href":"./Template:Echo"},"params":{"b":{"wt":"2"},"a":{"wt":"1"}},"i":0}}]}'>x</span>"##;

    #[test]
    fn test_sync_entry_point_rejects_pending_lookups() {
        let err = SelectiveSerializer::default()
            .serialize_sync(load(NEW_TEMPLATE), None, &Pending)
            .unwrap_err();
        assert!(matches!(err, SelserError::PendingTemplateLookup));
        assert!(!err.is_client_error());

        // No templates, nothing to wait for
        let res = SelectiveSerializer::default().serialize_sync(load("<p>a</p>"), None, &Pending);
        assert_eq!(res.unwrap(), "a");
    }

    struct Ordered;

    impl TemplateInfoSource for Ordered {
        fn fetch(&self, _: &TemplateKey) -> impl Future<Output = SelserResult<TemplateHints>> + Send {
            async {
                tokio::task::yield_now().await;
                Ok(TemplateHints::with_order(["a", "b"]))
            }
        }
    }

    #[tokio::test]
    async fn test_async_template_hints_order_parameters() {
        let res = SelectiveSerializer::default()
            .serialize(load(NEW_TEMPLATE), None, &Ordered)
            .await
            .unwrap();
        assert_eq!(res, "{{echo|a=1|b=2}}");

        let res = SelectiveSerializer::default()
            .serialize(load(NEW_TEMPLATE), None, &NoTemplateInfo)
            .await
            .unwrap();
        assert_eq!(res, "{{echo|b=2|a=1}}");
    }
}
