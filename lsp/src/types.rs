//! Public types consumed by the traversal engine and the binary.
//!
//! Wire shapes are hand-written serde structs covering just the fields the
//! call-graph queries need. [`CallHierarchyItem`] keeps its optional `data`
//! payload so it can be sent back to the server unchanged.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use callscout_types::SymbolRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::file_uri_to_path;

// ── Configuration ───────────────────────────────────────────────────────

const DEFAULT_ADDRESS: &str = "localhost:7070";

const fn default_request_timeout_secs() -> u64 {
    120
}

const fn default_ready_timeout_secs() -> u64 {
    60
}

fn default_ready_markers() -> Vec<String> {
    vec![String::from("Finished loading packages.")]
}

/// How to reach the language server and how long to wait for it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port` of a server started with `-listen`.
    #[serde(default)]
    address: Option<String>,
    /// Executable to spawn and talk to over stdio. Takes precedence over `address`.
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    /// Upper bound on waiting for the server to finish loading the workspace.
    /// Zero skips the wait.
    #[serde(default = "default_ready_timeout_secs")]
    ready_timeout_secs: u64,
    /// Substrings of `window/logMessage` / `window/showMessage` text that
    /// mean the workspace is loaded.
    #[serde(default = "default_ready_markers")]
    ready_markers: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: None,
            command: None,
            args: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
            ready_markers: default_ready_markers(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self.command = None;
        self
    }

    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.command = Some(command.into());
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, request: Duration, ready: Duration) -> Self {
        self.request_timeout_secs = request.as_secs();
        self.ready_timeout_secs = ready.as_secs();
        self
    }

    /// Rewrite string fields in place, e.g. for `${VAR}` expansion.
    pub fn map_strings(&mut self, f: impl Fn(&str) -> String) {
        if let Some(address) = &mut self.address {
            *address = f(address);
        }
        if let Some(command) = &mut self.command {
            *command = f(command);
        }
        for arg in &mut self.args {
            *arg = f(arg);
        }
    }

    #[must_use]
    pub fn transport(&self) -> Transport {
        match &self.command {
            Some(command) => Transport::Spawn {
                command: command.clone(),
                args: self.args.clone(),
            },
            None => Transport::Tcp(
                self.address
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            ),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    #[must_use]
    pub fn ready_markers(&self) -> &[String] {
        &self.ready_markers
    }
}

/// Physical connection to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp(String),
    Spawn { command: String, args: Vec<String> },
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(address) => write!(f, "tcp://{address}"),
            Self::Spawn { command, .. } => write!(f, "{command} (stdio)"),
        }
    }
}

// ── Positions and locations ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

impl Location {
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        file_uri_to_path(&self.uri)
    }

    /// Start of the range as a [`SymbolRef`], if the URI is a file URI.
    #[must_use]
    pub fn symbol(&self) -> Option<SymbolRef> {
        self.path()
            .map(|path| SymbolRef::new(path, self.range.start.line, self.range.start.character))
    }
}

/// `LocationLink` as sent by servers advertising link support.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LocationLink {
    pub target_uri: String,
    pub target_selection_range: Range,
}

/// Every shape `textDocument/implementation` and friends may return.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum LocationsResponse {
    One(Location),
    Many(Vec<Location>),
    Links(Vec<LocationLink>),
}

impl LocationsResponse {
    pub fn into_locations(self) -> Vec<Location> {
        match self {
            Self::One(location) => vec![location],
            Self::Many(locations) => locations,
            Self::Links(links) => links
                .into_iter()
                .map(|link| Location {
                    uri: link.target_uri,
                    range: link.target_selection_range,
                })
                .collect(),
        }
    }
}

// ── Symbols ─────────────────────────────────────────────────────────────

/// LSP `SymbolKind`. Kept numeric so unknown kinds survive a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolKind(pub u32);

impl SymbolKind {
    pub const FILE: Self = Self(1);
    pub const MODULE: Self = Self(2);
    pub const NAMESPACE: Self = Self(3);
    pub const PACKAGE: Self = Self(4);
    pub const CLASS: Self = Self(5);
    pub const METHOD: Self = Self(6);
    pub const PROPERTY: Self = Self(7);
    pub const FIELD: Self = Self(8);
    pub const CONSTRUCTOR: Self = Self(9);
    pub const ENUM: Self = Self(10);
    pub const INTERFACE: Self = Self(11);
    pub const FUNCTION: Self = Self(12);
    pub const VARIABLE: Self = Self(13);
    pub const CONSTANT: Self = Self(14);
    pub const STRING: Self = Self(15);
    pub const NUMBER: Self = Self(16);
    pub const BOOLEAN: Self = Self(17);
    pub const ARRAY: Self = Self(18);
    pub const OBJECT: Self = Self(19);
    pub const KEY: Self = Self(20);
    pub const NULL: Self = Self(21);
    pub const ENUM_MEMBER: Self = Self(22);
    pub const STRUCT: Self = Self(23);
    pub const EVENT: Self = Self(24);
    pub const OPERATOR: Self = Self(25);
    pub const TYPE_PARAMETER: Self = Self(26);

    #[must_use]
    pub fn label(self) -> &'static str {
        const LABELS: [&str; 26] = [
            "file",
            "module",
            "namespace",
            "package",
            "class",
            "method",
            "property",
            "field",
            "constructor",
            "enum",
            "interface",
            "function",
            "variable",
            "constant",
            "string",
            "number",
            "boolean",
            "array",
            "object",
            "key",
            "null",
            "enum member",
            "struct",
            "event",
            "operator",
            "type parameter",
        ];
        (self.0 as usize)
            .checked_sub(1)
            .and_then(|i| LABELS.get(i))
            .copied()
            .unwrap_or("unknown")
    }
}

/// Server handle for a callable symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchyItem {
    pub name: String,
    pub kind: SymbolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<u32>>,
    /// For gopls: the package path plus receiver, e.g.
    /// `github.com/netapp/trident/storage_drivers/ontap/api • client.go`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub uri: String,
    pub range: Range,
    pub selection_range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CallHierarchyItem {
    #[must_use]
    pub fn detail(&self) -> &str {
        self.detail.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        file_uri_to_path(&self.uri)
    }

    /// Position of the symbol's name, the natural place to query it again.
    #[must_use]
    pub fn declaration(&self) -> Option<SymbolRef> {
        let start = self.selection_range.start;
        self.path()
            .map(|path| SymbolRef::new(path, start.line, start.character))
    }
}

/// One edge out of the symbol under exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingCall {
    pub to: CallHierarchyItem,
    #[serde(default)]
    pub from_ranges: Vec<Range>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SymbolInformation {
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
    #[serde(default)]
    pub container_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub range: Range,
    pub selection_range: Range,
    #[serde(default)]
    pub children: Vec<DocumentSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DocumentSymbolResponse {
    Flat(Vec<SymbolInformation>),
    Nested(Vec<DocumentSymbol>),
}

/// A document symbol, flattened from either response form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    /// Enclosing range of the whole declaration.
    pub range: Range,
    /// Range of the name; equals `range` for the flat form.
    pub selection_range: Range,
    pub container: Option<String>,
}

impl DocumentSymbolResponse {
    pub fn into_entries(self) -> Vec<SymbolEntry> {
        match self {
            Self::Flat(symbols) => symbols
                .into_iter()
                .map(|s| SymbolEntry {
                    name: s.name,
                    kind: s.kind,
                    range: s.location.range,
                    selection_range: s.location.range,
                    container: s.container_name,
                })
                .collect(),
            Self::Nested(symbols) => {
                let mut entries = Vec::new();
                flatten_symbols(symbols, None, &mut entries);
                entries
            }
        }
    }
}

fn flatten_symbols(symbols: Vec<DocumentSymbol>, container: Option<&str>, out: &mut Vec<SymbolEntry>) {
    for symbol in symbols {
        out.push(SymbolEntry {
            name: symbol.name.clone(),
            kind: symbol.kind,
            range: symbol.range,
            selection_range: symbol.selection_range,
            container: container.map(String::from),
        });
        flatten_symbols(symbol.children, Some(&symbol.name), out);
    }
}

// ── Hover ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hover {
    /// `MarkupContent`, `MarkedString` or an array of `MarkedString`.
    pub contents: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

impl Hover {
    /// Plain text of the hover, sections joined by blank lines.
    #[must_use]
    pub fn text(&self) -> String {
        fn piece(value: &Value) -> Option<String> {
            match value {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map.get("value").and_then(Value::as_str).map(String::from),
                _ => None,
            }
        }
        match &self.contents {
            Value::Array(items) => items.iter().filter_map(piece).collect::<Vec<_>>().join("\n\n"),
            other => piece(other).unwrap_or_default(),
        }
    }
}
