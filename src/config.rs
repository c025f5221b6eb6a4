//! Serializer configuration.
//!
//! One explicit value is constructed by the caller and threaded through
//! every stage (differ, normalizer, serializer). Nothing is global.

use crate::algo::DiffConfig;
use crate::diff::RevisionId;

/// Options shared by all stages of a serialization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelserConfig {
    /// Strict markup: enables the normalizer's rewrites (empty heading
    /// removal, tag minimization of new links, trailing-space hoisting).
    pub scrub_wikitext: bool,
    /// Round-trip test mode: stricter emptiness checks, auto-inserted
    /// tags are not re-emitted.
    pub rt_test_mode: bool,
    /// Recover whitespace that wikitext syntax trims (list bullets,
    /// heading markers, table cells) from the original source.
    pub use_whitespace_heuristics: bool,
    /// Revision the diff marks are stamped with. Derived from the source
    /// hash when absent.
    pub revision: Option<RevisionId>,
    /// Bound on sibling look-ahead during tree diffing.
    pub max_lookahead: usize,
}

impl SelserConfig {
    /// Editing defaults: scrub on, whitespace heuristics on.
    pub const EDIT: Self = Self {
        scrub_wikitext: true,
        rt_test_mode: false,
        use_whitespace_heuristics: true,
        revision: None,
        max_lookahead: usize::MAX,
    };

    /// Round-trip testing: no scrubbing, strict emptiness.
    pub const RT_TEST: Self = Self {
        scrub_wikitext: false,
        rt_test_mode: true,
        use_whitespace_heuristics: true,
        revision: None,
        max_lookahead: usize::MAX,
    };

    /// Create a config with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set strict markup mode.
    pub fn with_scrub_wikitext(mut self, on: bool) -> Self {
        self.scrub_wikitext = on;
        self
    }

    /// Set round-trip test mode.
    pub fn with_rt_test_mode(mut self, on: bool) -> Self {
        self.rt_test_mode = on;
        self
    }

    /// Set recovery of trimmed whitespace from the original source.
    pub fn with_whitespace_heuristics(mut self, on: bool) -> Self {
        self.use_whitespace_heuristics = on;
        self
    }

    /// Stamp diff marks with a fixed revision.
    pub fn with_revision(mut self, revision: RevisionId) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Set the sibling look-ahead bound of the tree differ.
    pub fn with_max_lookahead(mut self, max_lookahead: usize) -> Self {
        self.max_lookahead = max_lookahead;
        self
    }

    /// Differ settings derived from this config.
    pub fn diff_config(&self) -> DiffConfig {
        DiffConfig::new(self.max_lookahead)
    }

    /// Revision to stamp marks with, falling back to a hash of `source`.
    pub fn revision_for(&self, source: &str) -> RevisionId {
        self.revision.unwrap_or_else(|| RevisionId::of_source(source))
    }
}

impl Default for SelserConfig {
    fn default() -> Self {
        Self {
            scrub_wikitext: false,
            rt_test_mode: false,
            use_whitespace_heuristics: true,
            revision: None,
            max_lookahead: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let cfg = SelserConfig::new();
        assert!(!cfg.scrub_wikitext);
        assert!(cfg.use_whitespace_heuristics);
        assert_eq!(cfg.max_lookahead, usize::MAX);

        assert!(SelserConfig::EDIT.scrub_wikitext);
        assert!(SelserConfig::RT_TEST.rt_test_mode);
        assert!(!SelserConfig::RT_TEST.scrub_wikitext);
    }

    #[test]
    fn test_builders() {
        let cfg = SelserConfig::new()
            .with_scrub_wikitext(true)
            .with_rt_test_mode(true)
            .with_whitespace_heuristics(false)
            .with_revision(RevisionId::new(7))
            .with_max_lookahead(3);
        assert!(cfg.scrub_wikitext && cfg.rt_test_mode);
        assert!(!cfg.use_whitespace_heuristics);
        assert_eq!(cfg.revision_for("ignored"), RevisionId::new(7));
        assert_eq!(cfg.diff_config().max_lookahead, 3);
    }

    #[test]
    fn test_revision_derived_from_source() {
        let cfg = SelserConfig::new();
        assert_eq!(cfg.revision_for("abc"), cfg.revision_for("abc"));
        assert_ne!(cfg.revision_for("abc"), cfg.revision_for("abd"));
    }
}
