//! Error types for wt-selser.
//!
//! Only client-input problems surface as errors. Recoverable input
//! problems are logged and degraded locally; contract violations between
//! the differ, normalizer and serializer are assertions.

use thiserror::Error;

/// Errors that can occur while serializing a document back to wikitext.
#[derive(Debug, Error)]
pub enum SelserError {
    /// Encapsulated (template/extension) content that carries neither
    /// round-trip metadata nor a usable source range.
    #[error("cannot serialize encapsulated <{tag}> (about={about:?}): no data-mw and no source")]
    EncapsulatedWithoutSource {
        /// Tag name of the wrapper element
        tag: String,
        /// About-id shared by the wrapper siblings, if any
        about: Option<String>,
    },

    /// The HTML loader could not build a tree
    #[error("malformed html: {0}")]
    MalformedHtml(String),

    /// A JSON-valued data attribute did not parse (strict loading only)
    #[error("malformed {attr} json: {source}")]
    MalformedJson {
        /// Attribute name
        attr: &'static str,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// Template metadata lookup failed
    #[error("template metadata: {0}")]
    Template(String),

    /// The synchronous entry point could not resolve a template lookup immediately
    #[error("template metadata lookup did not complete synchronously")]
    PendingTemplateLookup,
}

/// Result type alias for serializer operations.
pub type SelserResult<T> = Result<T, SelserError>;

impl SelserError {
    /// Create a malformed-html error with a message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedHtml(msg.into())
    }

    /// Create a template-lookup error from any error type.
    pub fn template(err: impl std::fmt::Display) -> Self {
        Self::Template(err.to_string())
    }

    /// Whether the error was caused by the caller's input rather than a lookup.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EncapsulatedWithoutSource { .. } | Self::MalformedHtml(_) | Self::MalformedJson { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SelserError::EncapsulatedWithoutSource {
            tag: "span".to_string(),
            about: Some("#mwt1".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "cannot serialize encapsulated <span> (about=Some(\"#mwt1\")): no data-mw and no source"
        );

        let err = SelserError::malformed("unexpected eof");
        assert_eq!(err.to_string(), "malformed html: unexpected eof");

        let err = SelserError::template("timeout");
        assert_eq!(err.to_string(), "template metadata: timeout");
    }

    #[test]
    fn test_malformed_json_keeps_source() {
        use std::error::Error as _;

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SelserError::MalformedJson { attr: "data-parsoid", source };
        assert!(err.to_string().starts_with("malformed data-parsoid json"));
        assert!(err.source().is_some());
        assert!(err.is_client_error());
        assert!(!SelserError::PendingTemplateLookup.is_client_error());
    }

    #[test]
    fn test_error_is_send_sync() {
        static_assertions::assert_impl_all!(SelserError: Send, Sync);
    }
}
