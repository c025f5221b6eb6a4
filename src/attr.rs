//! Attribute system for document elements
//!
//! Attributes stay a plain ordered `Vec<(String, String)>`; source order
//! matters when literal HTML is re-emitted. Space-separated token lists
//! (`typeof`, `rel`, `class`) get word-level helpers since most element
//! classification in the serializer is done on `typeof`/`rel` words.

/// Element attributes as ordered key-value pairs
pub type Attrs = Vec<(String, String)>;

/// Extension trait for attribute operations on Attrs
pub trait AttrsExt {
    /// Get an attribute value by name
    fn get_attr(&self, name: &str) -> Option<&str>;

    /// Check if an attribute exists
    fn has_attr(&self, name: &str) -> bool;

    /// Set an attribute value (insert or update)
    fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>);

    /// Remove an attribute by name, returning the old value if present
    fn remove_attr(&mut self, name: &str) -> Option<String>;

    /// Whether the space-separated list in `name` contains `word`
    fn has_word(&self, name: &str, word: &str) -> bool;

    /// First word of the list in `name` satisfying `pred`
    fn find_word(&self, name: &str, pred: impl Fn(&str) -> bool) -> Option<&str>;

    /// Append `word` to the list in `name` unless present
    fn add_word(&mut self, name: &str, word: &str);
}

impl AttrsExt for Attrs {
    fn get_attr(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn has_attr(&self, name: &str) -> bool {
        self.iter().any(|(k, _)| k == name)
    }

    fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(attr) = self.iter_mut().find(|(k, _)| k == &name) {
            attr.1 = value;
        } else {
            self.push((name, value));
        }
    }

    fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.iter()
            .position(|(k, _)| k == name)
            .map(|pos| self.remove(pos).1)
    }

    fn has_word(&self, name: &str, word: &str) -> bool {
        self.find_word(name, |w| w == word).is_some()
    }

    fn find_word(&self, name: &str, pred: impl Fn(&str) -> bool) -> Option<&str> {
        self.get_attr(name)?.split_ascii_whitespace().find(|w| pred(w))
    }

    fn add_word(&mut self, name: &str, word: &str) {
        match self.get_attr(name) {
            Some(list) if list.split_ascii_whitespace().any(|w| w == word) => {}
            Some(list) if !list.trim().is_empty() => {
                let joined = format!("{list} {word}");
                self.set_attr(name, joined);
            }
            _ => self.set_attr(name, word),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attrs_operations() {
        let mut attrs: Attrs = Vec::new();

        // Set
        attrs.set_attr("href", "./Foo");
        attrs.set_attr("rel", "mw:WikiLink");
        assert_eq!(attrs.len(), 2);

        // Get
        assert_eq!(attrs.get_attr("href"), Some("./Foo"));
        assert_eq!(attrs.get_attr("title"), None);

        // Update existing
        attrs.set_attr("href", "./Bar");
        assert_eq!(attrs.get_attr("href"), Some("./Bar"));
        assert_eq!(attrs.len(), 2);

        // Remove
        let removed = attrs.remove_attr("href");
        assert_eq!(removed.as_deref(), Some("./Bar"));
        assert!(!attrs.has_attr("href"));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn test_word_lists() {
        let mut attrs: Attrs = vec![("typeof".into(), "mw:Transclusion  mw:Foo".into())];
        assert!(attrs.has_word("typeof", "mw:Transclusion"));
        assert!(!attrs.has_word("typeof", "mw:Trans"));
        assert_eq!(
            attrs.find_word("typeof", |w| w.starts_with("mw:F")),
            Some("mw:Foo")
        );

        attrs.add_word("typeof", "mw:Foo");
        assert_eq!(attrs.get_attr("typeof"), Some("mw:Transclusion  mw:Foo"));

        attrs.add_word("rel", "mw:WikiLink");
        assert_eq!(attrs.get_attr("rel"), Some("mw:WikiLink"));
    }
}
