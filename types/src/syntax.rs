//! Parsed-file model and the syntax index contract.
//!
//! The traversal engine never parses source itself. It asks a [`SyntaxIndex`]
//! for the [`ParsedFile`] behind an absolute path and inspects declarations
//! and their positions. Positions are zero-based, matching LSP.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Zero-based line and column of a declaration name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePoint {
    pub line: u32,
    pub character: u32,
}

impl SourcePoint {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A function or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    /// Receiver type name for methods, pointer marker stripped.
    pub receiver: Option<String>,
    /// Position of the name identifier.
    pub name_at: SourcePoint,
    pub start_line: u32,
    pub end_line: u32,
    /// Full declaration text, signature through closing brace.
    pub text: String,
}

impl FunctionDecl {
    #[must_use]
    pub fn spans_line(&self, line: u32) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMethod {
    pub name: String,
    pub at: SourcePoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDecl {
    pub name: String,
    pub methods: Vec<InterfaceMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Empty for embedded fields.
    pub names: Vec<String>,
    pub type_text: String,
    /// Raw tag literal including its quotes, e.g. `` `xml:"volume-create"` ``.
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

/// Declarations of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFile {
    path: PathBuf,
    functions: Vec<FunctionDecl>,
    interfaces: Vec<InterfaceDecl>,
    structs: Vec<StructDecl>,
}

impl ParsedFile {
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        functions: Vec<FunctionDecl>,
        interfaces: Vec<InterfaceDecl>,
        structs: Vec<StructDecl>,
    ) -> Self {
        Self {
            path: path.into(),
            functions,
            interfaces,
            structs,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }

    #[must_use]
    pub fn interfaces(&self) -> &[InterfaceDecl] {
        &self.interfaces
    }

    #[must_use]
    pub fn structs(&self) -> &[StructDecl] {
        &self.structs
    }

    /// Function named `name` whose declaration spans `line`.
    ///
    /// Generated clients declare many methods with the same name in one file,
    /// so the line disambiguates. Falls back to the first declaration with
    /// that name when none spans the line.
    #[must_use]
    pub fn function(&self, name: &str, line: u32) -> Option<&FunctionDecl> {
        let mut named = self.functions.iter().filter(|f| f.name == name);
        let first = named.clone().next();
        named.find(|f| f.spans_line(line)).or(first)
    }

    /// Interface method `name` whose name identifier sits on `line`.
    #[must_use]
    pub fn interface_method(
        &self,
        name: &str,
        line: u32,
    ) -> Option<(&InterfaceDecl, &InterfaceMethod)> {
        self.interfaces.iter().find_map(|iface| {
            iface
                .methods
                .iter()
                .find(|m| m.name == name && m.at.line == line)
                .map(|m| (iface, m))
        })
    }

    #[must_use]
    pub fn struct_decl(&self, name: &str) -> Option<&StructDecl> {
        self.structs.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{} is not part of the indexed workspace", path.display())]
    NotIndexed { path: PathBuf },
    #[error("failed to read {}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {reason}", path.display())]
    Unparseable { path: PathBuf, reason: String },
}

impl LookupError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotIndexed { path }
            | Self::Unreadable { path, .. }
            | Self::Unparseable { path, .. } => path,
        }
    }
}

/// Source of parsed files, keyed by absolute path.
pub trait SyntaxIndex: Send + Sync {
    fn parsed(&self, path: &Path) -> Result<Arc<ParsedFile>, LookupError>;
}
