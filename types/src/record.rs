//! What a traversal records when it reaches a terminal declaration.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::FunctionId;

/// A REST call site: HTTP verb and path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Endpoint {
    verb: String,
    path: String,
}

impl Endpoint {
    #[must_use]
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// The literal pulled out of a terminal declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Extracted {
    Endpoint(Endpoint),
    Command { name: String },
}

impl Extracted {
    /// Flat field list, `[verb, path]` or `[command]`.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Endpoint(endpoint) => vec![endpoint.verb(), endpoint.path()],
            Self::Command { name } => vec![name.as_str()],
        }
    }

    #[must_use]
    pub fn as_endpoint(&self) -> Option<&Endpoint> {
        match self {
            Self::Endpoint(endpoint) => Some(endpoint),
            Self::Command { .. } => None,
        }
    }

    #[must_use]
    pub fn as_command(&self) -> Option<&str> {
        match self {
            Self::Command { name } => Some(name),
            Self::Endpoint(_) => None,
        }
    }
}

/// One result record: the extracted literal and every entry point whose
/// exploration reaches it within the depth ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    entries: BTreeSet<FunctionId>,
    extracted: Extracted,
}

impl Finding {
    #[must_use]
    pub fn new(entries: BTreeSet<FunctionId>, extracted: Extracted) -> Self {
        Self { entries, extracted }
    }

    /// Entry points reaching this literal, in identity order.
    #[must_use]
    pub fn entries(&self) -> &BTreeSet<FunctionId> {
        &self.entries
    }

    #[must_use]
    pub fn extracted(&self) -> &Extracted {
        &self.extracted
    }
}
