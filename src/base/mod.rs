//! Primitives shared by every layer: file handles and text positions.
//!
//! Nothing in here depends on the rest of the crate.

mod file_id;
mod span;

pub use file_id::FileId;
pub use span::{LineCol, LineIndex, TextRange, TextSize};
