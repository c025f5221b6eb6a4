//! Algorithm implementations for document comparison.
//!
//! - `diff`: tree differ annotating the edited document with diff marks
//! - `equal`: structural node equality across two documents

mod diff;
mod equal;

pub use diff::{DiffConfig, DiffResult, DiffStats, diff};
pub use equal::{IGNORED_ATTRIBUTES, TreeComparator};
