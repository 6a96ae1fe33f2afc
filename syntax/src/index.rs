use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use callscout_types::{LookupError, ParsedFile, SyntaxIndex};

use crate::go::parse_go;

/// Lazily parsed Go files under one workspace root.
///
/// Each file is read and parsed on first request and shared afterwards.
pub struct GoSyntaxIndex {
    root: PathBuf,
    cache: Mutex<HashMap<PathBuf, Arc<ParsedFile>>>,
}

impl GoSyntaxIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of files parsed so far.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl SyntaxIndex for GoSyntaxIndex {
    fn parsed(&self, path: &Path) -> Result<Arc<ParsedFile>, LookupError> {
        let is_go = path.extension().is_some_and(|ext| ext == "go");
        if !is_go || !path.starts_with(&self.root) {
            return Err(LookupError::NotIndexed {
                path: path.to_path_buf(),
            });
        }

        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Ok(Arc::clone(hit));
        }

        // Parsed outside the lock; a concurrent parse of the same file loses
        // the insert race and returns the winner's copy.
        let source = fs::read_to_string(path).map_err(|source| LookupError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = parse_go(path, &source).map_err(|e| LookupError::Unparseable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::trace!("Indexed {}", path.display());

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            cache
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(parsed)),
        ))
    }
}
