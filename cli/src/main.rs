//! callscout - discover the storage APIs a Go code base reaches.
//!
//! ```text
//! main() -> load config -> LspCallGraph::connect()
//!             |
//!             +-- scan:  discover_entries() -> Recurser::launch() per flavor
//!             |          -> output::{rest_apis, commands} -> JSON sinks
//!             |
//!             +-- probe: one CallGraph query -> JSON on stdout
//! ```

mod output;

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use callscout_config::{CallscoutConfig, DEFAULT_COMMAND_ENTRIES, DEFAULT_REST_ENTRIES};
use callscout_lsp::{CallGraph, LspCallGraph, ServerConfig};
use callscout_syntax::GoSyntaxIndex;
use callscout_traversal::{Flavor, Recurser, TraversalError, TraversalReport, discover_entries};
use callscout_types::{SymbolRef, SyntaxIndex};

#[derive(Debug, Parser)]
#[command(name = "callscout", version, about = "Map Go entry points to the storage APIs they call")]
struct Cli {
    /// Config file; defaults to ./callscout.toml, then ~/.callscout/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root; overrides [workspace] root.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// host:port of a language server started with -listen.
    #[arg(long, global = true, conflicts_with = "server_command")]
    address: Option<String>,

    /// Spawn this language server over stdio instead.
    #[arg(long, global = true)]
    server_command: Option<String>,

    /// Append logs here instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every enabled flavor and write its report.
    Scan,
    /// Outgoing calls of the function declared at a position.
    Calls(PositionArgs),
    /// Implementations of the interface method at a position.
    Implementations(PositionArgs),
    /// References to the symbol at a position.
    References(PositionArgs),
    /// Hover text for the symbol at a position.
    Hover(PositionArgs),
    /// Symbols declared in a file.
    Symbols(FileArgs),
}

#[derive(Debug, Args)]
struct PositionArgs {
    /// Source file, absolute or relative to the workspace root.
    file: PathBuf,
    /// Zero-based line.
    line: u32,
    /// Zero-based byte column.
    character: u32,
}

#[derive(Debug, Args)]
struct FileArgs {
    file: PathBuf,
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();
        tracing::info!(path = %path.display(), "Logging initialized");
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<CallscoutConfig> {
    let config = match explicit {
        Some(path) => Some(CallscoutConfig::load_from(path)?),
        None => CallscoutConfig::load()?,
    };
    Ok(config.unwrap_or_default())
}

fn server_config(cli: &Cli, config: &CallscoutConfig) -> ServerConfig {
    let server = config.server();
    if let Some(command) = &cli.server_command {
        return server.with_command(command.clone(), Vec::new());
    }
    if let Some(address) = &cli.address {
        return server.with_address(address.clone());
    }
    server
}

fn workspace_root(cli: &Cli, config: &CallscoutConfig) -> Result<PathBuf> {
    let root = match (&cli.root, config.workspace_root()) {
        (Some(root), _) => root.clone(),
        (None, Some(root)) => root.to_path_buf(),
        (None, None) => env::current_dir().context("Failed to read current directory")?,
    };
    fs::canonicalize(&root)
        .with_context(|| format!("Workspace root {} is not accessible", root.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let config = load_config(cli.config.as_deref())?;
    let root = workspace_root(&cli, &config)?;
    let server = server_config(&cli, &config);

    tracing::info!(
        root = %root.display(),
        transport = %server.transport(),
        "Connecting to language server"
    );
    let graph = LspCallGraph::connect(&server, &root)
        .await
        .with_context(|| format!("Failed to connect to {}", server.transport()))?;
    tracing::info!(
        server = graph.server_info().name.as_deref().unwrap_or("unknown"),
        readiness = ?graph.readiness(),
        "Language server ready"
    );

    let result = tokio::select! {
        result = run(&graph, &cli.command, &config, &root) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("Interrupted")),
    };

    if let Err(e) = graph.shutdown().await {
        tracing::warn!("Shutdown was not clean: {e}");
    }
    result
}

async fn run(
    graph: &LspCallGraph,
    command: &Command,
    config: &CallscoutConfig,
    root: &Path,
) -> Result<()> {
    let at = |args: &PositionArgs| {
        SymbolRef::new(resolve(root, &args.file), args.line, args.character)
    };

    match command {
        Command::Scan => scan(graph, config, root).await,
        Command::Calls(args) => print(&graph.outgoing_calls(&at(args)).await?),
        Command::Implementations(args) => print(&graph.implementations(&at(args)).await?),
        Command::References(args) => print(&graph.references(&at(args)).await?),
        Command::Hover(args) => print(&graph.hover(&at(args)).await?),
        Command::Symbols(args) => {
            print(&graph.document_symbols(&resolve(root, &args.file)).await?)
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Sink {
    RestApis,
    Commands,
}

struct Pending {
    flavor: String,
    sink: Sink,
    /// Report file; `None` prints to stdout.
    destination: Option<PathBuf>,
    report: oneshot::Receiver<Result<TraversalReport, TraversalError>>,
}

async fn scan(graph: &LspCallGraph, config: &CallscoutConfig, root: &Path) -> Result<()> {
    let graph: Arc<dyn CallGraph> = Arc::new(graph.clone());
    let syntax: Arc<dyn SyntaxIndex> = Arc::new(GoSyntaxIndex::new(root));

    let flavors = [
        (
            Sink::RestApis,
            config.rest_flavor(),
            config.rest.as_ref(),
            DEFAULT_REST_ENTRIES,
        ),
        (
            Sink::Commands,
            config.command_flavor(),
            config.commands.as_ref(),
            DEFAULT_COMMAND_ENTRIES,
        ),
    ];

    let mut pending = Vec::new();
    for (sink, flavor, overrides, default_entries) in flavors {
        let Some(flavor) = flavor else {
            continue;
        };
        let patterns = overrides.map_or_else(
            || default_entries.iter().map(|s| (*s).to_string()).collect(),
            |o| o.entry_files_or(default_entries),
        );
        pending.push(Pending {
            flavor: flavor.name.clone(),
            sink,
            destination: overrides.and_then(|o| o.output.clone()),
            report: launch(&graph, &syntax, root, flavor, &patterns)?,
        });
    }
    if pending.is_empty() {
        bail!("Every flavor is disabled; nothing to scan");
    }

    let mut stdout = output::Combined::default();
    for Pending {
        flavor,
        sink,
        destination,
        report,
    } in pending
    {
        let report = report
            .await
            .map_err(|_| TraversalError::Abandoned)
            .and_then(|r| r)
            .with_context(|| format!("{flavor} traversal failed"))?;
        let stats = report.stats();
        tracing::info!(
            flavor = %flavor,
            findings = report.findings().len(),
            visited = stats.visited,
            dead_ends = stats.dead_ends,
            depth_cutoffs = stats.depth_cutoffs,
            interfaces = stats.interfaces,
            "Writing report"
        );
        match (sink, destination) {
            (Sink::RestApis, Some(path)) => write_file(&path, &output::rest_apis(&report))?,
            (Sink::RestApis, None) => stdout.rest = Some(output::rest_apis(&report)),
            (Sink::Commands, Some(path)) => write_file(&path, &output::commands(&report))?,
            (Sink::Commands, None) => stdout.commands = Some(output::commands(&report)),
        }
    }
    if !stdout.is_empty() {
        print(&stdout)?;
    }
    Ok(())
}

fn launch(
    graph: &Arc<dyn CallGraph>,
    syntax: &Arc<dyn SyntaxIndex>,
    root: &Path,
    flavor: Flavor,
    patterns: &[String],
) -> Result<oneshot::Receiver<Result<TraversalReport, TraversalError>>> {
    let entries = discover_entries(root, patterns, syntax.as_ref())
        .with_context(|| format!("Failed to discover {} entry points", flavor.name))?;
    if entries.is_empty() {
        tracing::warn!(
            flavor = %flavor.name,
            "No entry points matched {}",
            patterns.join(", ")
        );
    }
    Ok(Recurser::new(Arc::clone(graph), Arc::clone(syntax), flavor).launch(entries))
}

fn write_file<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    output::write_json(doc, file)
}

fn resolve(root: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        root.join(file)
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    output::write_json(value, io::stdout().lock())
}
