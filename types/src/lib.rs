//! Core domain types for callscout.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the workspace: the LSP client,
//! the syntax index, the traversal engine and the binary.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod ids;
mod record;
mod syntax;

pub use ids::{FunctionId, SymbolRef};
pub use record::{Endpoint, Extracted, Finding};
pub use syntax::{
    FieldDecl, FunctionDecl, InterfaceDecl, InterfaceMethod, LookupError, ParsedFile, SourcePoint,
    StructDecl, SyntaxIndex,
};
