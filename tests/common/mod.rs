//! Shared test utilities and fixtures
//!
//! A scripted language server spoken to over an in-memory pipe, and a small
//! Go tree shaped like the ONTAP storage driver.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use callscout_lsp::codec::{FrameReader, FrameWriter};
use callscout_lsp::{LspCallGraph, ServerConfig, file_uri_to_path, path_to_file_uri};
use callscout_syntax::parse_go;
use callscout_types::SourcePoint;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{DuplexStream, WriteHalf};
use tokio::task::JoinHandle;

pub const MODULE: &str = "github.com/netapp/trident";

// ── Go fixture tree ─────────────────────────────────────────────────────

pub struct GoTree {
    _dir: TempDir,
    root: PathBuf,
}

impl GoTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        Self { _dir: dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn write(&self, relative: &str, source: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, source).unwrap();
        path
    }

    /// Every `.go` file below the root.
    pub fn go_files(&self) -> Vec<PathBuf> {
        fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, out);
                } else if path.extension().is_some_and(|ext| ext == "go") {
                    out.push(path);
                }
            }
        }
        let mut files = Vec::new();
        walk(&self.root, &mut files);
        files.sort();
        files
    }
}

pub const DRIVER_NAS: &str = r#"package ontap

import "github.com/netapp/trident/storage_drivers/ontap/api"

type NASDriver struct {
	API  api.OntapAPI
	rest *api.RestClient
}

func (d *NASDriver) CreateVolume(name string) error {
	return d.rest.VolumeCreate(name)
}

func (d *NASDriver) DeleteVolume(name string) error {
	return d.API.VolumeDestroy(name)
}

func (d *NASDriver) ResizeVolume(name string, size uint64) error {
	return d.rest.VolumeResize(name, size)
}
"#;

pub const DRIVER_SAN: &str = r#"package ontap

import "github.com/netapp/trident/storage_drivers/ontap/api"

type SANDriver struct {
	zapi *api.Client
}

func (d *SANDriver) CreateLun(path string) error {
	return d.zapi.LunCreate(path)
}
"#;

pub const ABSTRACTION: &str = r#"package api

type OntapAPI interface {
	VolumeDestroy(name string) error
	VolumeSize(name string) (uint64, error)
}
"#;

pub const ABSTRACTION_REST: &str = r#"package api

type OntapAPIREST struct {
	api *RestClient
}

func (d OntapAPIREST) VolumeDestroy(name string) error {
	return d.api.VolumeDelete(name)
}
"#;

pub const REST_CLIENT: &str = r#"package api

import (
	"github.com/netapp/trident/logging"
	"github.com/netapp/trident/storage_drivers/ontap/api/rest/client"
)

type RestClient struct {
	api *client.Client
}

func (c *RestClient) VolumeCreate(name string) error {
	logging.Logc("creating")
	return c.api.VolumeCreate(name)
}

func (c *RestClient) VolumeDelete(name string) error {
	return c.api.VolumeDelete(name)
}

func (c *RestClient) VolumeResize(name string, size uint64) error {
	return c.api.VolumeModify(name, size)
}
"#;

pub const ZAPI_CLIENT: &str = r#"package api

import "github.com/netapp/trident/storage_drivers/ontap/api/azgo"

type Client struct {
	zr *azgo.ZapiRunner
}

func (c Client) LunCreate(path string) error {
	request := azgo.NewLunCreateRequest().SetPath(path)
	_, err := request.ExecuteUsing(c.zr)
	return err
}
"#;

pub const MOCK_API: &str = r#"package mocks

type MockOntapAPI struct{}

func (m *MockOntapAPI) VolumeDestroy(name string) error {
	return client.VolumeModify(name, 0)
}
"#;

pub const VOLUME_CLIENT: &str = r#"package client

type Client struct {
	transport runtime.ClientTransport
}

func (a *Client) VolumeCreate(params *VolumeCreateParams) (*VolumeCreateAccepted, error) {
	op := &runtime.ClientOperation{
		ID:                 "volume_create",
		Method:             "POST",
		PathPattern:        "/storage/volumes",
		ProducesMediaTypes: []string{"application/hal+json"},
	}
	_, err := a.transport.Submit(op)
	return nil, err
}

func (a *Client) VolumeDelete(params *VolumeDeleteParams) (*VolumeDeleteAccepted, error) {
	op := &runtime.ClientOperation{
		ID:          "volume_delete",
		Method:      "DELETE",
		PathPattern: "/storage/volumes/{uuid}",
	}
	_, err := a.transport.Submit(op)
	return nil, err
}

func (a *Client) VolumeModify(params *VolumeModifyParams) (*VolumeModifyAccepted, error) {
	op := &runtime.ClientOperation{
		ID:          "volume_modify",
		Method:      "PATCH",
		PathPattern: "/storage/volumes/{uuid}",
	}
	_, err := a.transport.Submit(op)
	return nil, err
}
"#;

pub const LUN_CREATE: &str = r#"package azgo

import "encoding/xml"

type LunCreateBySizeRequest struct {
	XMLName xml.Name `xml:"lun-create-by-size"`
	PathPtr *string  `xml:"path"`
}

func (o *LunCreateBySizeRequest) ExecuteUsing(zr *ZapiRunner) (*LunCreateBySizeResponse, error) {
	return o.executeWithoutIteration(zr)
}
"#;

pub const LOGGING: &str = r#"package logging

func Logc(msg string) {
	println(msg)
}
"#;

/// The driver tree every end-to-end test scans.
pub fn trident_tree() -> GoTree {
    let tree = GoTree::new();
    tree.write("storage_drivers/ontap/ontap_nas.go", DRIVER_NAS);
    tree.write("storage_drivers/ontap/ontap_san.go", DRIVER_SAN);
    tree.write("storage_drivers/ontap/api/abstraction.go", ABSTRACTION);
    tree.write("storage_drivers/ontap/api/abstraction_rest.go", ABSTRACTION_REST);
    tree.write("storage_drivers/ontap/api/ontap_rest.go", REST_CLIENT);
    tree.write("storage_drivers/ontap/api/ontap_zapi.go", ZAPI_CLIENT);
    tree.write("storage_drivers/ontap/api/mocks/mock_api.go", MOCK_API);
    tree.write(
        "storage_drivers/ontap/api/rest/client/volume/volume_client.go",
        VOLUME_CLIENT,
    );
    tree.write("storage_drivers/ontap/api/azgo/api-lun-create.go", LUN_CREATE);
    tree.write("logging/log.go", LOGGING);
    tree
}

/// Call edges gopls would report for [`trident_tree`].
pub fn trident_script(tree: &GoTree) -> Script {
    Script::from_tree(tree)
        .call("NASDriver.CreateVolume", "RestClient.VolumeCreate")
        .call("NASDriver.DeleteVolume", "OntapAPI.VolumeDestroy")
        .call("NASDriver.ResizeVolume", "RestClient.VolumeResize")
        .call("RestClient.VolumeCreate", "Logc")
        .call("RestClient.VolumeCreate", "Client.VolumeCreate")
        .call("RestClient.VolumeDelete", "Client.VolumeDelete")
        .call("RestClient.VolumeResize", "Client.VolumeModify")
        .call("OntapAPIREST.VolumeDestroy", "RestClient.VolumeDelete")
        .call("MockOntapAPI.VolumeDestroy", "Client.VolumeModify")
        .implement("OntapAPI.VolumeDestroy", "OntapAPIREST.VolumeDestroy")
        .implement("OntapAPI.VolumeDestroy", "MockOntapAPI.VolumeDestroy")
        .call("SANDriver.CreateLun", "Client.LunCreate")
        .call("Client.LunCreate", "LunCreateBySizeRequest.ExecuteUsing")
}

// ── Scripted language server ────────────────────────────────────────────

/// A declaration the fake server knows about.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub path: PathBuf,
    pub at: SourcePoint,
    /// gopls style: `<package path> • <file name>`.
    pub detail: String,
    pub kind: u32,
}

impl Node {
    pub fn uri(&self) -> String {
        path_to_file_uri(&self.path).unwrap().to_string()
    }

    fn selection(&self) -> Value {
        json!({
            "start": {"line": self.at.line, "character": self.at.character},
            "end": {"line": self.at.line, "character": self.at.character + self.name.len() as u32}
        })
    }

    pub fn item(&self) -> Value {
        json!({
            "name": self.name,
            "kind": self.kind,
            "detail": self.detail,
            "uri": self.uri(),
            "range": {
                "start": {"line": self.at.line, "character": 0},
                "end": {"line": self.at.line + 1, "character": 1}
            },
            "selectionRange": self.selection(),
        })
    }

    pub fn location(&self) -> Value {
        json!({"uri": self.uri(), "range": self.selection()})
    }
}

/// What the fake server answers, keyed by `Receiver.Name`, `Interface.Method`
/// or a bare function name.
#[derive(Debug, Clone, Default)]
pub struct Script {
    nodes: HashMap<String, Node>,
    calls: HashMap<String, Vec<String>>,
    implementations: HashMap<String, Vec<String>>,
    failures: HashMap<String, (i64, String)>,
    delays: HashMap<String, Duration>,
}

impl Script {
    /// Register every declaration in the tree, positioned the way the
    /// syntax index sees it.
    pub fn from_tree(tree: &GoTree) -> Self {
        let mut script = Self::default();
        for path in tree.go_files() {
            let source = fs::read_to_string(&path).unwrap();
            let parsed = parse_go(&path, &source).unwrap();
            let package = path
                .parent()
                .unwrap()
                .strip_prefix(tree.root())
                .unwrap()
                .to_string_lossy()
                .into_owned();
            let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
            let detail = format!("{MODULE}/{package} • {file_name}");

            for function in parsed.functions() {
                let key = match &function.receiver {
                    Some(receiver) => format!("{receiver}.{}", function.name),
                    None => function.name.clone(),
                };
                let kind = if function.receiver.is_some() { 6 } else { 12 };
                script = script.node(key, &function.name, &path, function.name_at, &detail, kind);
            }
            for iface in parsed.interfaces() {
                for method in &iface.methods {
                    let key = format!("{}.{}", iface.name, method.name);
                    script = script.node(key, &method.name, &path, method.at, &detail, 6);
                }
            }
        }
        script
    }

    pub fn node(
        mut self,
        key: impl Into<String>,
        name: &str,
        path: &Path,
        at: SourcePoint,
        detail: &str,
        kind: u32,
    ) -> Self {
        self.nodes.insert(
            key.into(),
            Node {
                name: name.to_string(),
                path: path.to_path_buf(),
                at,
                detail: detail.to_string(),
                kind,
            },
        );
        self
    }

    pub fn call(mut self, from: &str, to: &str) -> Self {
        assert!(self.nodes.contains_key(from), "unknown caller {from}");
        assert!(self.nodes.contains_key(to), "unknown callee {to}");
        self.calls.entry(from.to_string()).or_default().push(to.to_string());
        self
    }

    pub fn implement(mut self, method: &str, by: &str) -> Self {
        assert!(self.nodes.contains_key(by), "unknown implementation {by}");
        self.implementations
            .entry(method.to_string())
            .or_default()
            .push(by.to_string());
        self
    }

    /// Answer outgoing-call queries for `key` with a JSON-RPC error.
    pub fn fail(mut self, key: &str, code: i64, message: &str) -> Self {
        self.failures
            .insert(key.to_string(), (code, message.to_string()));
        self
    }

    /// Hold every reply about `key` back for `delay`.
    pub fn delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub fn get(&self, key: &str) -> &Node {
        &self.nodes[key]
    }

    fn key_at(&self, uri: &Value, line: &Value) -> Option<&str> {
        let path = file_uri_to_path(uri.as_str()?)?;
        let line = u32::try_from(line.as_u64()?).ok()?;
        self.nodes
            .iter()
            .find(|(_, node)| node.path == path && node.at.line == line)
            .map(|(key, _)| key.as_str())
    }

    fn key_for(&self, method: &str, params: &Value) -> Option<&str> {
        if method == "callHierarchy/outgoingCalls" {
            let item = &params["item"];
            self.key_at(&item["uri"], &item["selectionRange"]["start"]["line"])
        } else {
            self.key_at(&params["textDocument"]["uri"], &params["position"]["line"])
        }
    }

    fn nodes_for<'a>(&'a self, keys: Option<&'a Vec<String>>) -> impl Iterator<Item = &'a Node> {
        keys.into_iter().flatten().map(|key| &self.nodes[key])
    }

    /// Reply to one request, with a label for the request log.
    fn answer(&self, method: &str, params: &Value) -> (Result<Value, (i64, String)>, String, Duration) {
        if method == "shutdown" {
            return (Ok(Value::Null), method.to_string(), Duration::ZERO);
        }
        if method == "textDocument/documentSymbol" {
            let path = params["textDocument"]["uri"]
                .as_str()
                .and_then(file_uri_to_path);
            let mut symbols: Vec<&Node> = self
                .nodes
                .values()
                .filter(|node| Some(&node.path) == path.as_ref())
                .collect();
            symbols.sort_by_key(|node| node.at);
            let result = symbols
                .iter()
                .map(|node| json!({"name": node.name, "kind": node.kind, "location": node.location()}))
                .collect();
            return (Ok(Value::Array(result)), method.to_string(), Duration::ZERO);
        }

        let Some(key) = self.key_for(method, params) else {
            return (Ok(json!([])), format!("{method} ?"), Duration::ZERO);
        };
        let label = format!("{method} {key}");
        let delay = self.delays.get(key).copied().unwrap_or_default();
        let node = &self.nodes[key];

        let result = match method {
            "textDocument/prepareCallHierarchy" => Ok(json!([node.item()])),
            "callHierarchy/outgoingCalls" => match self.failures.get(key) {
                Some(failure) => Err(failure.clone()),
                None => Ok(self
                    .nodes_for(self.calls.get(key))
                    .map(|callee| json!({"to": callee.item(), "fromRanges": []}))
                    .collect()),
            },
            "textDocument/implementation" => Ok(self
                .nodes_for(self.implementations.get(key))
                .map(Node::location)
                .collect()),
            "textDocument/references" => Ok(self
                .calls
                .iter()
                .filter(|(_, callees)| callees.iter().any(|c| c == key))
                .map(|(caller, _)| self.nodes[caller].location())
                .collect()),
            "textDocument/hover" => Ok(json!({
                "contents": {"kind": "markdown", "value": format!("func {key}")}
            })),
            _ => Ok(json!([])),
        };
        (result, label, delay)
    }
}

type SharedWriter = Arc<tokio::sync::Mutex<FrameWriter<WriteHalf<DuplexStream>>>>;

async fn send(writer: &SharedWriter, message: Value) {
    let bytes = serde_json::to_vec(&message).unwrap();
    let _ = writer.lock().await.write_frame(&bytes).await;
}

/// Handle on a running scripted server.
pub struct FakeServer {
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeServer {
    fn spawn(stream: DuplexStream, script: Script) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            let (read_half, write_half) = tokio::io::split(stream);
            let mut reader = FrameReader::new(read_half);
            let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(FrameWriter::new(write_half)));

            while let Ok(Some(bytes)) = reader.read_frame().await {
                let msg: Value = serde_json::from_slice(&bytes).unwrap();
                let method = msg["method"].as_str().unwrap_or_default().to_string();
                match method.as_str() {
                    "initialize" => {
                        send(
                            &writer,
                            json!({"jsonrpc": "2.0", "id": msg["id"], "result": {
                                "capabilities": {"callHierarchyProvider": true, "implementationProvider": true},
                                "serverInfo": {"name": "scripted-gopls", "version": "v0.0.0"}
                            }}),
                        )
                        .await;
                    }
                    "initialized" => {
                        send(
                            &writer,
                            json!({"jsonrpc": "2.0", "method": "window/logMessage",
                                   "params": {"type": 3, "message": "Finished loading packages."}}),
                        )
                        .await;
                    }
                    "exit" => {
                        log.lock().unwrap().push(method);
                        break;
                    }
                    _ if msg.get("id").is_some() => {
                        let (outcome, label, delay) = script.answer(&method, &msg["params"]);
                        log.lock().unwrap().push(label);
                        let writer = Arc::clone(&writer);
                        let id = msg["id"].clone();
                        tokio::spawn(async move {
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            let reply = match outcome {
                                Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                                Err((code, message)) => json!({"jsonrpc": "2.0", "id": id,
                                    "error": {"code": code, "message": message}}),
                            };
                            send(&writer, reply).await;
                        });
                    }
                    _ => {}
                }
            }
        });
        Self { requests, task }
    }

    /// `<method> <key>` for every request answered so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn asked(&self, method: &str, key: &str) -> bool {
        let wanted = format!("{method} {key}");
        self.requests().iter().any(|r| *r == wanted)
    }

    pub async fn finished(self) -> Vec<String> {
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap();
        self.requests.lock().unwrap().clone()
    }
}

/// Connect a client to a scripted server rooted at `root`.
pub async fn connect(script: Script, root: &Path) -> (LspCallGraph, FakeServer) {
    let (client_end, server_end) = tokio::io::duplex(1 << 20);
    let server = FakeServer::spawn(server_end, script);
    let (read_half, write_half) = tokio::io::split(client_end);
    let graph = LspCallGraph::from_streams(
        Box::new(read_half),
        Box::new(write_half),
        &ServerConfig::default(),
        root,
    )
    .await
    .unwrap();
    (graph, server)
}
