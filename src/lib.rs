//! wt-selser - Selective HTML to wikitext serialization
//!
//! ## Core Concepts
//!
//! **Selective serialization**: an edited HTML document is compared with
//! the document its wikitext originally parsed to. Subtrees the edit did
//! not touch are copied from the original source byte for byte; only the
//! changed parts are serialized, so an edit never reformats text around it.
//!
//! **Side data**: parse metadata (`data-parsoid`: source ranges, syntax
//! hints), template metadata (`data-mw`) and diff marks are kept in side
//! tables of the arena [`Document`], keyed by [`NodeId`].
//!
//! ## Modules
//! - `node`: arena document model and tree predicates
//! - `html`: HTML loading (with side-data extraction) and rendering
//! - `diff` / `algo`: diff marks and the tree differ
//! - `normalize`: DOM rewrites that make serialization canonical
//! - `wts`: serializer state, separators and escaping
//! - `handlers`: per-tag serialization handlers
//! - `template`: template metadata capability and part serialization
//! - `selser`: the entry point
//!
//! ## Usage
//!
//! ```ignore
//! use wt_selser::prelude::*;
//!
//! let base = Document::parse_html(&original_html)?;
//! let edited = Document::parse_html(&edited_html)?;
//!
//! let wikitext = SelectiveSerializer::new(SelserConfig::default())
//!     .serialize(edited, Some(PriorState::new(source, base)), &NoTemplateInfo)
//!     .await?;
//! ```

#[macro_use]
mod macros;

// =============================================================================
// Document model
// =============================================================================

/// Node types: Document, Element, NodeId
pub mod node;

/// Attribute lists
pub mod attr;

/// Source ranges into the original wikitext
pub mod span;

/// HTML loading
pub mod html;

/// HTML rendering
pub mod render;

/// Deterministic hashing for revision stamps
pub mod hash;

// =============================================================================
// Pipeline stages
// =============================================================================

/// Diff marks
pub mod diff;

/// Algorithms: tree differ, tree equality
pub mod algo;

/// DOM normalization
pub mod normalize;

/// Wikitext serializer
pub mod wts;

/// Tag handlers
pub mod handlers;

/// Template metadata
pub mod template;

/// Selective serialization entry point
pub mod selser;

// =============================================================================
// Support
// =============================================================================

/// Configuration
pub mod config;

/// Error types
pub mod error;

/// Prelude for common imports
pub mod prelude;

// =============================================================================
// Re-exports
// =============================================================================

// Node types
pub use node::{DataParsoid, Document, Element, NodeId, NodeKind, Stx};

// Diff
pub use algo::{DiffConfig, DiffResult, DiffStats, diff as diff_documents};
pub use diff::{DiffMark, RevisionId};

// Serialization
pub use selser::{PriorState, SelectiveSerializer};
pub use wts::WikitextSerializer;

// Templates
pub use template::{
    CachedTemplateInfo, NoTemplateInfo, TemplateHintMap, TemplateHints, TemplateInfoSource, TemplateKey,
};

// Configuration
pub use config::SelserConfig;

// Error types
pub use error::{SelserError, SelserResult};

// Span
pub use span::SourceRange;
