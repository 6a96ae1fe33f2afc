//! What distinguishes one traversal from another: where it stops, which
//! callees it follows, and how deep it may go.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::extract::{CommandExtractor, EndpointExtractor, Extractor};

const MODULE: &str = "github.com/netapp/trident";
const ONTAP_API: &str = "github.com/netapp/trident/storage_drivers/ontap/api";

pub const REST_MAX_DEPTH: u32 = 12;
pub const COMMANDS_MAX_DEPTH: u32 = 6;

/// Files and functions handed to the extractor instead of being expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalPattern {
    /// Every fragment must occur in the path.
    pub path_contains: Vec<String>,
    pub file_prefix: Option<String>,
    /// Suffix of the whole path, e.g. `client.go`.
    pub file_suffix: Option<String>,
    pub function: Option<String>,
}

impl TerminalPattern {
    #[must_use]
    pub fn matches(&self, path: &Path, function: &str) -> bool {
        let full = path.to_string_lossy();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        self.path_contains.iter().all(|frag| full.contains(frag.as_str()))
            && self
                .file_prefix
                .as_deref()
                .is_none_or(|prefix| file_name.starts_with(prefix))
            && self
                .file_suffix
                .as_deref()
                .is_none_or(|suffix| full.ends_with(suffix))
            && self.function.as_deref().is_none_or(|name| name == function)
    }
}

/// Which callees are worth following, judged by the module path the server
/// reports in a call-hierarchy item's `detail`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceFilter {
    pub module: String,
    /// When non-empty, the detail must contain at least one of these.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl NamespaceFilter {
    #[must_use]
    pub fn admits(&self, detail: &str) -> bool {
        detail.contains(self.module.as_str())
            && (self.include.is_empty()
                || self.include.iter().any(|p| detail.contains(p.as_str())))
            && !self.exclude.iter().any(|p| detail.contains(p.as_str()))
    }
}

#[derive(Clone)]
pub struct Flavor {
    pub name: String,
    pub terminal: TerminalPattern,
    pub namespace: NamespaceFilter,
    /// Implementations whose URI contains this are skipped.
    pub mock_marker: Option<String>,
    pub max_depth: u32,
    pub extractor: Arc<dyn Extractor>,
}

impl Flavor {
    /// REST endpoint discovery through the generated swagger clients.
    #[must_use]
    pub fn rest_endpoints() -> Self {
        Self {
            name: "rest".to_string(),
            terminal: TerminalPattern {
                path_contains: vec!["ontap/api/rest/client".to_string()],
                file_suffix: Some("client.go".to_string()),
                ..TerminalPattern::default()
            },
            namespace: Self::ontap_namespace(),
            mock_marker: Some("mocks".to_string()),
            max_depth: REST_MAX_DEPTH,
            extractor: Arc::new(EndpointExtractor),
        }
    }

    /// Vendor command discovery through the generated `azgo` bindings.
    #[must_use]
    pub fn commands() -> Self {
        Self {
            name: "commands".to_string(),
            terminal: TerminalPattern {
                path_contains: vec!["ontap/api/azgo".to_string()],
                file_prefix: Some("api-".to_string()),
                function: Some("ExecuteUsing".to_string()),
                ..TerminalPattern::default()
            },
            namespace: Self::ontap_namespace(),
            mock_marker: Some("mocks".to_string()),
            max_depth: COMMANDS_MAX_DEPTH,
            extractor: Arc::new(CommandExtractor),
        }
    }

    fn ontap_namespace() -> NamespaceFilter {
        NamespaceFilter {
            module: MODULE.to_string(),
            include: vec![ONTAP_API.to_string()],
            exclude: vec![
                format!("{MODULE}/logging"),
                format!("{MODULE}/persistent_store"),
                format!("{MODULE}/storage_attribute"),
            ],
        }
    }

    #[must_use]
    pub fn is_mock(&self, uri: &str) -> bool {
        self.mock_marker
            .as_deref()
            .is_some_and(|marker| uri.contains(marker))
    }
}

impl fmt::Debug for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flavor")
            .field("name", &self.name)
            .field("terminal", &self.terminal)
            .field("namespace", &self.namespace)
            .field("mock_marker", &self.mock_marker)
            .field("max_depth", &self.max_depth)
            .field("extractor", &self.extractor.label())
            .finish()
    }
}
