//! JSON-RPC envelopes, error codes and URI helpers.

use std::{fmt, process};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

/// JSON-RPC and LSP reserved error codes, plus two client-side codes that
/// separate "we could not encode the request" from "we could not decode the
/// reply" from anything the server said.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerNotInitialized,
    UnknownErrorCode,
    RequestFailed,
    ServerCancelled,
    ContentModified,
    RequestCancelled,
    EncodeFailed,
    DecodeFailed,
    Other(i64),
}

impl ErrorCode {
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32002 => Self::ServerNotInitialized,
            -32001 => Self::UnknownErrorCode,
            -32803 => Self::RequestFailed,
            -32802 => Self::ServerCancelled,
            -32801 => Self::ContentModified,
            -32800 => Self::RequestCancelled,
            -32106 => Self::EncodeFailed,
            -32107 => Self::DecodeFailed,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerNotInitialized => -32002,
            Self::UnknownErrorCode => -32001,
            Self::RequestFailed => -32803,
            Self::ServerCancelled => -32802,
            Self::ContentModified => -32801,
            Self::RequestCancelled => -32800,
            Self::EncodeFailed => -32106,
            Self::DecodeFailed => -32107,
            Self::Other(code) => code,
        }
    }

    /// Codes produced on this side of the wire.
    #[must_use]
    pub fn is_local(self) -> bool {
        matches!(self, Self::EncodeFailed | Self::DecodeFailed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<&'a Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> Notification<'a> {
    pub fn new(method: &'a str, params: Option<&'a Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ResponseError {
    pub code: i64,
    pub message: String,
}

/// A response envelope with `result` left generic.
#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

/// One parsed incoming message.
#[derive(Debug)]
pub(crate) enum Incoming {
    Response { id: u64, body: Value },
    ServerRequest { id: Value, method: String, params: Option<Value> },
    Notification { method: String, params: Option<Value> },
}

/// Classify a decoded frame. Returns `None` for shapes that are none of the
/// three (including responses whose id is not a non-negative integer, which
/// this client never issues).
pub(crate) fn classify(frame: Value) -> Option<Incoming> {
    let Value::Object(mut map) = frame else {
        return None;
    };
    let method = map
        .get("method")
        .and_then(Value::as_str)
        .map(String::from);
    let has_result_or_error = map.contains_key("result") || map.contains_key("error");

    match (map.get("id").cloned(), method, has_result_or_error) {
        (Some(id), None, true) => {
            let id = id.as_u64()?;
            Some(Incoming::Response {
                id,
                body: Value::Object(map),
            })
        }
        (Some(id), Some(method), _) => Some(Incoming::ServerRequest {
            id,
            method,
            params: map.remove("params"),
        }),
        (None, Some(method), _) => Some(Incoming::Notification {
            method,
            params: map.remove("params"),
        }),
        _ => None,
    }
}

pub(crate) fn reply_ok(id: &Value, result: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub(crate) fn reply_err(id: &Value, code: ErrorCode, message: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code.code(),
            "message": message,
        }
    })
}

/// Answer for a server-initiated request. Progress and capability
/// registration are acknowledged; configuration gets one `null` per item;
/// everything else is not implemented.
pub(crate) fn answer_server_request(id: &Value, method: &str, params: Option<&Value>) -> Value {
    match method {
        "window/workDoneProgress/create" | "client/registerCapability" => {
            reply_ok(id, Value::Null)
        }
        "workspace/configuration" => {
            let items = params
                .and_then(|p| p.get("items"))
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            reply_ok(id, Value::Array(vec![Value::Null; items]))
        }
        _ => reply_err(
            id,
            ErrorCode::MethodNotFound,
            &format!("Method not found: {method}"),
        ),
    }
}

pub(crate) fn initialize_params(root_uri: &str, workspace_name: &str) -> Value {
    serde_json::json!({
        "processId": process::id(),
        "clientInfo": { "name": "callscout" },
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "callHierarchy": { "dynamicRegistration": false },
                "implementation": { "linkSupport": false },
                "references": { "dynamicRegistration": false },
                "hover": { "contentFormat": ["markdown", "plaintext"] },
                "documentSymbol": { "hierarchicalDocumentSymbolSupport": true }
            },
            "window": { "workDoneProgress": true }
        },
        "workspaceFolders": [{
            "uri": root_uri,
            "name": workspace_name
        }]
    })
}

pub fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
}
