//! Element payload of an arena node
//!
//! Elements own only their tag and attributes. Structure lives in the
//! arena links of `Document`; per-node metadata lives in side tables.

use compact_str::CompactString;

use crate::attr::{Attrs, AttrsExt};

// =============================================================================
// Element
// =============================================================================

/// HTML element data (tag name and ordered attributes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercase HTML tag name
    pub tag: CompactString,
    /// Element attributes in source order
    pub attrs: Attrs,
}

impl Element {
    /// Create an element with no attributes
    pub fn new(tag: &str) -> Self {
        Self {
            tag: CompactString::from(tag.to_ascii_lowercase()),
            attrs: Vec::new(),
        }
    }

    /// Create an element with attributes
    pub fn with_attrs(tag: &str, attrs: Attrs) -> Self {
        Self {
            attrs,
            ..Self::new(tag)
        }
    }

    /// Builder-style attribute setter
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.set_attr(name, value);
        self
    }

    #[inline]
    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    /// Whether `typeof` contains `word`
    pub fn has_type_of(&self, word: &str) -> bool {
        self.attrs.has_word("typeof", word)
    }

    /// First `typeof` word with the given prefix
    pub fn type_of_with_prefix(&self, prefix: &str) -> Option<&str> {
        self.attrs.find_word("typeof", |w| w.starts_with(prefix))
    }

    /// Whether `rel` contains `word`
    pub fn has_rel(&self, word: &str) -> bool {
        self.attrs.has_word("rel", word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_builder() {
        let elem = Element::new("A").attr("rel", "mw:WikiLink").attr("href", "./Foo");
        assert!(elem.is("a"));
        assert!(elem.has_rel("mw:WikiLink"));
        assert!(!elem.has_type_of("mw:WikiLink"));
        assert_eq!(elem.attrs.get_attr("href"), Some("./Foo"));
    }

    #[test]
    fn test_type_of_prefix() {
        let elem = Element::new("span").attr("typeof", "mw:Extension/ref mw:Foo");
        assert_eq!(elem.type_of_with_prefix("mw:Extension/"), Some("mw:Extension/ref"));
        assert_eq!(elem.type_of_with_prefix("mw:Transclusion"), None);
    }
}
