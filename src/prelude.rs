//! Prelude module for common imports.
//!
//! ```ignore
//! use wt_selser::prelude::*;
//! ```

// Node types
pub use crate::node::{Children, DataParsoid, Document, Element, NodeId, NodeKind, Stx};

// Attributes
pub use crate::attr::{Attrs, AttrsExt};

// Diff
pub use crate::algo::{DiffConfig, DiffResult, DiffStats, diff};
pub use crate::diff::{DiffMark, RevisionId};

// Normalization
pub use crate::normalize::{NormalizeStats, Normalizer};

// Serialization
pub use crate::selser::{PriorState, SelectiveSerializer};
pub use crate::wts::WikitextSerializer;

// Templates
pub use crate::template::{
    CachedTemplateInfo, NoTemplateInfo, TemplateHintMap, TemplateHints, TemplateInfoSource, TemplateKey,
    prefetch_template_hints,
};

// Configuration
pub use crate::config::SelserConfig;

// Error
pub use crate::error::{SelserError, SelserResult};

// Span
pub use crate::span::SourceRange;
