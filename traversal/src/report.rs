use std::collections::BTreeMap;

use callscout_types::{Extracted, Finding, FunctionId, LookupError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraversalError {
    /// The syntax index could not produce a file the traversal needed.
    #[error("traversal aborted")]
    Lookup(#[from] LookupError),
    #[error("traversal task ended before reporting")]
    Abandoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TraversalStats {
    /// Distinct functions claimed.
    pub visited: usize,
    /// Branches abandoned because a query failed.
    pub dead_ends: usize,
    /// Visits refused by the depth ceiling.
    pub depth_cutoffs: usize,
    /// Interface methods resolved to implementations.
    pub interfaces: usize,
}

/// Everything one flavor found, keyed by the terminal function that yielded
/// each literal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraversalReport {
    flavor: String,
    findings: BTreeMap<FunctionId, Finding>,
    stats: TraversalStats,
}

impl TraversalReport {
    pub(crate) fn new(
        flavor: impl Into<String>,
        findings: BTreeMap<FunctionId, Finding>,
        stats: TraversalStats,
    ) -> Self {
        Self {
            flavor: flavor.into(),
            findings,
            stats,
        }
    }

    #[must_use]
    pub fn flavor(&self) -> &str {
        &self.flavor
    }

    #[must_use]
    pub fn findings(&self) -> &BTreeMap<FunctionId, Finding> {
        &self.findings
    }

    #[must_use]
    pub fn stats(&self) -> TraversalStats {
        self.stats
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Extracted literals grouped under every entry point that reaches them.
    #[must_use]
    pub fn by_entry(&self) -> BTreeMap<&FunctionId, Vec<&Extracted>> {
        let mut grouped: BTreeMap<&FunctionId, Vec<&Extracted>> = BTreeMap::new();
        for finding in self.findings.values() {
            for entry in finding.entries() {
                let literals = grouped.entry(entry).or_default();
                if !literals.contains(&finding.extracted()) {
                    literals.push(finding.extracted());
                }
            }
        }
        grouped
    }

    pub fn extracted(&self) -> impl Iterator<Item = &Extracted> {
        self.findings.values().map(Finding::extracted)
    }
}
