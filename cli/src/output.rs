//! JSON documents written at the end of a scan.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use anyhow::{Context, Result};
use callscout_traversal::TraversalReport;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RestApi {
    pub api: String,
    pub method: String,
    pub access_level: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RestApis {
    pub apis: Vec<RestApi>,
}

#[derive(Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommandUse {
    pub function_name: String,
    pub entry: String,
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct Commands {
    #[serde(rename = "zapi_commands")]
    pub commands: Vec<CommandUse>,
}

/// Every report without an output file, printed as one JSON object.
#[derive(Debug, Default, Serialize)]
pub struct Combined {
    #[serde(flatten)]
    pub rest: Option<RestApis>,
    #[serde(flatten)]
    pub commands: Option<Commands>,
}

impl Combined {
    pub fn is_empty(&self) -> bool {
        self.rest.is_none() && self.commands.is_none()
    }
}

/// Coarsest permission a set of verbs on one path requires.
pub fn access_level(verbs: &BTreeSet<&str>) -> &'static str {
    if verbs.contains("DELETE") {
        "all"
    } else if verbs.contains("PATCH") && verbs.contains("POST") {
        "read_create_modify"
    } else if verbs.contains("PATCH") {
        "read_modify"
    } else if verbs.contains("POST") {
        "read_create"
    } else {
        "readonly"
    }
}

/// One row per path with its verbs merged, ordered by path.
pub fn rest_apis(report: &TraversalReport) -> RestApis {
    let mut by_path: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for endpoint in report.extracted().filter_map(|e| e.as_endpoint()) {
        by_path
            .entry(endpoint.path())
            .or_default()
            .insert(endpoint.verb());
    }

    let apis = by_path
        .into_iter()
        .map(|(path, verbs)| RestApi {
            api: path.to_string(),
            method: verbs.iter().copied().collect::<Vec<_>>().join(", "),
            access_level: access_level(&verbs),
        })
        .collect();
    RestApis { apis }
}

/// One row per entry point and command it reaches.
pub fn commands(report: &TraversalReport) -> Commands {
    let mut rows = BTreeSet::new();
    for (entry, literals) in report.by_entry() {
        for command in literals.iter().filter_map(|e| e.as_command()) {
            rows.insert(CommandUse {
                function_name: entry.name().to_string(),
                entry: entry.to_string(),
                command: command.to_string(),
            });
        }
    }
    Commands {
        commands: rows.into_iter().collect(),
    }
}

/// Serialize with four-space indentation and a trailing newline.
pub fn write_json<T: Serialize, W: Write>(value: &T, mut out: W) -> Result<()> {
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .context("Failed to serialize report")?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
