//! Call-graph traversal from entry points to terminal declarations.
//!
//! A [`Recurser`] runs one [`Flavor`] against a shared
//! [`callscout_lsp::CallGraph`] and a [`callscout_types::SyntaxIndex`],
//! fanning out one task per call edge, and hands back a [`TraversalReport`].

mod barrier;
mod entry;
mod extract;
mod flavor;
mod recurser;
mod report;

pub use entry::{EntryError, discover_entries};
pub use extract::{CommandExtractor, EndpointExtractor, Extractor};
pub use flavor::{COMMANDS_MAX_DEPTH, Flavor, NamespaceFilter, REST_MAX_DEPTH, TerminalPattern};
pub use recurser::Recurser;
pub use report::{TraversalError, TraversalReport, TraversalStats};
