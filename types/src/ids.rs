use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

/// A zero-based source position naming one declaration or call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    path: PathBuf,
    line: u32,
    character: u32,
}

impl SymbolRef {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, line: u32, character: u32) -> Self {
        Self {
            path: path.into(),
            line,
            character,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 0-indexed line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 0-indexed column.
    #[must_use]
    pub fn character(&self) -> u32 {
        self.character
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.character)
    }
}

/// Traversal key: a declaration position plus the function name found there.
///
/// Two call sites that resolve to the same position and name are the same graph
/// node regardless of the call path that reached them. Ordering is by path, then
/// position, then name, which keeps report output stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId {
    path: PathBuf,
    line: u32,
    character: u32,
    name: String,
}

impl FunctionId {
    #[must_use]
    pub fn new(at: &SymbolRef, name: impl Into<String>) -> Self {
        Self {
            path: at.path.clone(),
            line: at.line,
            character: at.character,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn character(&self) -> u32 {
        self.character
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn symbol(&self) -> SymbolRef {
        SymbolRef::new(self.path.clone(), self.line, self.character)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.path.display(),
            self.line,
            self.character,
            self.name
        )
    }
}

impl Serialize for FunctionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
