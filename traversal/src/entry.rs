//! Entry-point discovery: every function declared in the files a flavor
//! starts from.

use std::path::{Path, PathBuf};

use callscout_types::{FunctionId, LookupError, SymbolRef, SyntaxIndex};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("invalid entry pattern '{pattern}'")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("walking {}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: ignore::Error,
    },
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

fn entry_globs(patterns: &[String]) -> Result<GlobSet, EntryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern.trim()).map_err(|source| EntryError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| EntryError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

/// Functions declared in `.go` files under `root` whose root-relative path
/// matches one of `patterns`, ordered by identity.
pub fn discover_entries(
    root: &Path,
    patterns: &[String],
    syntax: &dyn SyntaxIndex,
) -> Result<Vec<FunctionId>, EntryError> {
    let globs = entry_globs(patterns)?;
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !matches!(name.as_ref(), ".git" | "vendor" | "node_modules")
        })
        .build();

    let mut entries = Vec::new();
    for item in walker {
        let item = item.map_err(|source| EntryError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !item.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = item.path();
        if path.extension().is_none_or(|ext| ext != "go") {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !globs.is_match(relative) {
            continue;
        }

        let file = syntax.parsed(path)?;
        for function in file.functions() {
            let at = SymbolRef::new(path, function.name_at.line, function.name_at.character);
            entries.push(FunctionId::new(&at, function.name.as_str()));
        }
    }

    entries.sort();
    tracing::debug!("Discovered {} entry points under {}", entries.len(), root.display());
    Ok(entries)
}
