//! Typed protocol operations.
//!
//! An [`Operation`] names its method, builds its params, and turns the generic
//! `result` value into a typed output. The correlator only ever sees
//! `serde_json::Value`; shape errors surface here as
//! [`LspError::Serialization`] with the local decode code.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use callscout_types::SymbolRef;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::LspError;
use crate::protocol::{ErrorCode, Response, path_to_file_uri};
use crate::types::{
    CallHierarchyItem, DocumentSymbolResponse, Hover, Location, LocationsResponse, OutgoingCall,
    Position, SymbolEntry,
};

pub trait Operation: Send + Sync + 'static {
    const METHOD: &'static str;
    type Output: Send + 'static;

    fn params(&self) -> Result<Value, LspError>;

    /// Shape the `result` member of a successful response. `Value::Null`
    /// when the server sent `null` or omitted it.
    fn translate(&self, result: Value) -> Result<Self::Output, LspError>;
}

/// Unwrap a response envelope and hand its result to `op`.
pub(crate) fn complete<O: Operation>(op: &O, envelope: Value) -> Result<O::Output, LspError> {
    let response: Response =
        serde_json::from_value(envelope).map_err(|e| LspError::decode(O::METHOD, &e))?;
    if let Some(error) = response.error {
        return Err(LspError::Protocol {
            code: ErrorCode::from_code(error.code),
            message: error.message,
        });
    }
    op.translate(response.result.unwrap_or(Value::Null))
}

fn decode<T: serde::de::DeserializeOwned>(method: &'static str, value: Value) -> Result<T, LspError> {
    serde_json::from_value(value).map_err(|e| LspError::decode(method, &e))
}

fn encode<T: Serialize>(params: &T) -> Result<Value, LspError> {
    serde_json::to_value(params).map_err(|e| LspError::encode(&e))
}

#[derive(Serialize)]
struct TextDocumentIdentifier {
    uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextDocumentPositionParams {
    text_document: TextDocumentIdentifier,
    position: Position,
}

fn document(path: &Path) -> Result<TextDocumentIdentifier, LspError> {
    Ok(TextDocumentIdentifier {
        uri: path_to_file_uri(path)?.to_string(),
    })
}

fn position_params(at: &SymbolRef) -> Result<TextDocumentPositionParams, LspError> {
    Ok(TextDocumentPositionParams {
        text_document: document(at.path())?,
        position: Position {
            line: at.line(),
            character: at.character(),
        },
    })
}

// ── Lifecycle ───────────────────────────────────────────────────────────

pub struct Initialize {
    pub root_uri: String,
    pub workspace_name: String,
}

/// What the handshake keeps from the server's initialize reply.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub capabilities: Value,
}

impl ServerInfo {
    #[must_use]
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities
            .get(capability)
            .is_some_and(|v| !v.is_null() && *v != Value::Bool(false))
    }
}

impl Operation for Initialize {
    const METHOD: &'static str = "initialize";
    type Output = ServerInfo;

    fn params(&self) -> Result<Value, LspError> {
        Ok(crate::protocol::initialize_params(
            &self.root_uri,
            &self.workspace_name,
        ))
    }

    fn translate(&self, result: Value) -> Result<ServerInfo, LspError> {
        let Value::Object(mut map) = result else {
            return Err(LspError::Serialization {
                code: ErrorCode::DecodeFailed,
                message: format!("{}: expected an object", Self::METHOD),
            });
        };
        let info = map.remove("serverInfo").unwrap_or_default();
        Ok(ServerInfo {
            name: info.get("name").and_then(Value::as_str).map(String::from),
            version: info.get("version").and_then(Value::as_str).map(String::from),
            capabilities: map.remove("capabilities").unwrap_or_default(),
        })
    }
}

// ── Call hierarchy ──────────────────────────────────────────────────────

pub struct PrepareCallHierarchy {
    pub at: SymbolRef,
}

impl Operation for PrepareCallHierarchy {
    const METHOD: &'static str = "textDocument/prepareCallHierarchy";
    type Output = CallHierarchyItem;

    fn params(&self) -> Result<Value, LspError> {
        encode(&position_params(&self.at)?)
    }

    fn translate(&self, result: Value) -> Result<CallHierarchyItem, LspError> {
        let items: Option<Vec<CallHierarchyItem>> = decode(Self::METHOD, result)?;
        items
            .and_then(|items| items.into_iter().next())
            .ok_or(LspError::EmptyResult {
                method: Self::METHOD,
            })
    }
}

pub struct OutgoingCalls {
    pub item: CallHierarchyItem,
}

impl Operation for OutgoingCalls {
    const METHOD: &'static str = "callHierarchy/outgoingCalls";
    type Output = Vec<OutgoingCall>;

    fn params(&self) -> Result<Value, LspError> {
        Ok(serde_json::json!({ "item": encode(&self.item)? }))
    }

    fn translate(&self, result: Value) -> Result<Vec<OutgoingCall>, LspError> {
        let calls: Option<Vec<OutgoingCall>> = decode(Self::METHOD, result)?;
        Ok(calls.unwrap_or_default())
    }
}

// ── Navigation ──────────────────────────────────────────────────────────

pub struct Implementation {
    pub at: SymbolRef,
}

impl Operation for Implementation {
    const METHOD: &'static str = "textDocument/implementation";
    type Output = Vec<Location>;

    fn params(&self) -> Result<Value, LspError> {
        encode(&position_params(&self.at)?)
    }

    fn translate(&self, result: Value) -> Result<Vec<Location>, LspError> {
        let locations: Option<LocationsResponse> = decode(Self::METHOD, result)?;
        Ok(locations
            .map(LocationsResponse::into_locations)
            .unwrap_or_default())
    }
}

pub struct References {
    pub at: SymbolRef,
}

impl Operation for References {
    const METHOD: &'static str = "textDocument/references";
    type Output = Vec<Location>;

    fn params(&self) -> Result<Value, LspError> {
        let mut params = encode(&position_params(&self.at)?)?;
        params["context"] = serde_json::json!({ "includeDeclaration": false });
        Ok(params)
    }

    fn translate(&self, result: Value) -> Result<Vec<Location>, LspError> {
        let locations: Option<Vec<Location>> = decode(Self::METHOD, result)?;
        Ok(locations.unwrap_or_default())
    }
}

pub struct HoverRequest {
    pub at: SymbolRef,
}

impl Operation for HoverRequest {
    const METHOD: &'static str = "textDocument/hover";
    type Output = Option<Hover>;

    fn params(&self) -> Result<Value, LspError> {
        encode(&position_params(&self.at)?)
    }

    fn translate(&self, result: Value) -> Result<Option<Hover>, LspError> {
        decode(Self::METHOD, result)
    }
}

pub struct DocumentSymbols {
    pub path: PathBuf,
}

impl Operation for DocumentSymbols {
    const METHOD: &'static str = "textDocument/documentSymbol";
    type Output = Vec<SymbolEntry>;

    fn params(&self) -> Result<Value, LspError> {
        Ok(serde_json::json!({ "textDocument": encode(&document(&self.path)?)? }))
    }

    fn translate(&self, result: Value) -> Result<Vec<SymbolEntry>, LspError> {
        let symbols: Option<DocumentSymbolResponse> = decode(Self::METHOD, result)?;
        Ok(symbols
            .map(DocumentSymbolResponse::into_entries)
            .unwrap_or_default())
    }
}

// ── Delivery ────────────────────────────────────────────────────────────

/// The eventual outcome of one operation.
///
/// Returned immediately by every [`CallGraph`](crate::CallGraph) method; the
/// request is already in flight. Awaiting yields the result; dropping it
/// leaves the request to finish and be discarded.
#[must_use = "a Delivery does nothing useful unless awaited"]
pub struct Delivery<T> {
    rx: oneshot::Receiver<Result<T, LspError>>,
}

impl<T: Send + 'static> Delivery<T> {
    /// Run `work` on the runtime and deliver its outcome.
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<T, LspError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(work.await);
        });
        Self { rx }
    }

    /// An already-resolved delivery.
    pub fn ready(result: Result<T, LspError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl<T> Future for Delivery<T> {
    type Output = Result<T, LspError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(LspError::ConnectionClosed)))
    }
}
