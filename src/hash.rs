//! Deterministic hashing for revision stamps
//!
//! Diff marks carry the revision they were computed against. When the
//! caller does not supply one, it is derived from the original source so
//! that repeated runs over the same input agree across processes.

// =============================================================================
// StableHasher - Builder Pattern
// =============================================================================

/// A deterministic hasher using blake3
///
/// Unlike `std::hash::Hasher`, this produces the same output across
/// process restarts for the same input.
pub struct StableHasher {
    inner: blake3::Hasher,
}

impl StableHasher {
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    /// Update with raw bytes
    #[inline]
    pub fn update(mut self, data: &[u8]) -> Self {
        self.inner.update(data);
        self
    }

    /// Update with a length-prefixed string, so that `("ab","c")` and
    /// `("a","bc")` hash differently.
    #[inline]
    pub fn update_str(self, s: &str) -> Self {
        self.update_usize(s.len()).update(s.as_bytes())
    }

    /// Update with a u64 value (little-endian)
    #[inline]
    pub fn update_u64(self, v: u64) -> Self {
        self.update(&v.to_le_bytes())
    }

    /// Update with a usize value (little-endian, widened to u64)
    #[inline]
    pub fn update_usize(self, v: usize) -> Self {
        self.update_u64(v as u64)
    }

    /// Finish and return the first 8 bytes of the digest as a little-endian u64
    #[inline]
    pub fn finish(self) -> u64 {
        let hash = self.inner.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}

impl Default for StableHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash of an original wikitext source.
pub fn source_hash(source: &str) -> u64 {
    StableHasher::new().update_str("wt-source").update_str(source).finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_across_builders() {
        let a = StableHasher::new().update_str("[[Foo]]").update_u64(3).finish();
        let b = StableHasher::new().update_str("[[Foo]]").update_u64(3).finish();
        assert_eq!(a, b);
    }

    #[test]
    fn test_length_prefix_separates_fields() {
        let a = StableHasher::new().update_str("ab").update_str("c").finish();
        let b = StableHasher::new().update_str("a").update_str("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_source_hash() {
        assert_eq!(source_hash("x"), source_hash("x"));
        assert_ne!(source_hash("x"), source_hash("y"));
    }
}
