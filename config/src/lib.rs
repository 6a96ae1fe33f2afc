//! Configuration for callscout.
//!
//! Read from TOML, located by an explicit path, then `./callscout.toml`, then
//! `~/.callscout/config.toml`. Every section is optional; unset keys fall back
//! to the built-in presets.

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use callscout_lsp::ServerConfig;
use callscout_traversal::Flavor;
use serde::Deserialize;
use thiserror::Error;

pub const LOCAL_CONFIG: &str = "callscout.toml";

pub const DEFAULT_REST_ENTRIES: &[&str] = &["storage_drivers/ontap/api/ontap_rest.go"];
pub const DEFAULT_COMMAND_ENTRIES: &[&str] = &["storage_drivers/ontap/api/ontap_zapi.go"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CallscoutConfig {
    pub server: Option<ServerConfig>,
    pub workspace: Option<WorkspaceConfig>,
    pub rest: Option<FlavorConfig>,
    pub commands: Option<FlavorConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkspaceConfig {
    /// Root of the Go module to scan.
    pub root: Option<PathBuf>,
    /// Workspace folder name reported to the server.
    pub name: Option<String>,
}

/// Overrides for one traversal flavor.
#[derive(Debug, Default, Deserialize)]
pub struct FlavorConfig {
    pub enabled: Option<bool>,
    /// Globs, relative to the workspace root, of files whose functions are
    /// entry points.
    pub entry_files: Option<Vec<String>>,
    pub module: Option<String>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub mock_marker: Option<String>,
    pub max_depth: Option<u32>,
    /// Report destination; stdout when unset.
    pub output: Option<PathBuf>,
    pub terminal: Option<TerminalConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TerminalConfig {
    pub path_contains: Option<Vec<String>>,
    pub file_prefix: Option<String>,
    pub file_suffix: Option<String>,
    pub function: Option<String>,
}

impl FlavorConfig {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    #[must_use]
    pub fn entry_files_or(&self, defaults: &[&str]) -> Vec<String> {
        self.entry_files
            .clone()
            .unwrap_or_else(|| defaults.iter().map(|s| (*s).to_string()).collect())
    }

    /// Layer the set keys over `preset`.
    #[must_use]
    pub fn apply(&self, mut preset: Flavor) -> Flavor {
        if let Some(module) = &self.module {
            preset.namespace.module.clone_from(module);
        }
        if let Some(include) = &self.include {
            preset.namespace.include.clone_from(include);
        }
        if let Some(exclude) = &self.exclude {
            preset.namespace.exclude.clone_from(exclude);
        }
        if let Some(marker) = &self.mock_marker {
            preset.mock_marker = (!marker.is_empty()).then(|| marker.clone());
        }
        if let Some(depth) = self.max_depth {
            preset.max_depth = depth;
        }
        if let Some(terminal) = &self.terminal {
            if let Some(fragments) = &terminal.path_contains {
                preset.terminal.path_contains.clone_from(fragments);
            }
            if terminal.file_prefix.is_some() {
                preset.terminal.file_prefix.clone_from(&terminal.file_prefix);
            }
            if terminal.file_suffix.is_some() {
                preset.terminal.file_suffix.clone_from(&terminal.file_suffix);
            }
            if terminal.function.is_some() {
                preset.terminal.function.clone_from(&terminal.function);
            }
        }
        preset
    }

    fn expand(&mut self) {
        if let Some(output) = &mut self.output {
            *output = expand_path(output);
        }
        if let Some(entries) = &mut self.entry_files {
            for entry in entries {
                *entry = expand_env_vars(entry);
            }
        }
    }
}

impl CallscoutConfig {
    /// Load the first config file that exists among the default locations.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        for path in config_candidates() {
            if path.exists() {
                return Self::load_from(&path).map(Some);
            }
        }
        Ok(None)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(mut config) => {
                config.expand();
                tracing::debug!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    fn expand(&mut self) {
        if let Some(server) = &mut self.server {
            server.map_strings(expand_env_vars);
        }
        if let Some(workspace) = &mut self.workspace {
            if let Some(root) = &mut workspace.root {
                *root = expand_path(root);
            }
            if let Some(name) = &mut workspace.name {
                *name = expand_env_vars(name);
            }
        }
        for flavor in [&mut self.rest, &mut self.commands].into_iter().flatten() {
            flavor.expand();
        }
    }

    #[must_use]
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace.as_ref()?.root.as_deref()
    }

    /// REST flavor with overrides applied, or `None` when disabled.
    #[must_use]
    pub fn rest_flavor(&self) -> Option<Flavor> {
        resolve(self.rest.as_ref(), Flavor::rest_endpoints())
    }

    /// Command flavor with overrides applied, or `None` when disabled.
    #[must_use]
    pub fn command_flavor(&self) -> Option<Flavor> {
        resolve(self.commands.as_ref(), Flavor::commands())
    }
}

fn resolve(overrides: Option<&FlavorConfig>, preset: Flavor) -> Option<Flavor> {
    match overrides {
        Some(config) if !config.is_enabled() => None,
        Some(config) => Some(config.apply(preset)),
        None => Some(preset),
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_vars(&path.to_string_lossy()))
}

/// Replace `${VAR}` with the variable's value; unset variables expand to
/// nothing and an unclosed `${` is kept as written.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// `./callscout.toml`, then `~/.callscout/config.toml`.
#[must_use]
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
    candidates.extend(config_path());
    candidates
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".callscout").join("config.toml"))
}
