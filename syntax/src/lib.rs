//! Go source declarations for the traversal engine.
//!
//! [`GoSyntaxIndex`] implements [`callscout_types::SyntaxIndex`] over a
//! workspace root with tree-sitter.

mod go;
mod index;

pub use go::{ParseError, parse_go};
pub use index::GoSyntaxIndex;
