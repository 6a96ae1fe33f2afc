//! Language Server Protocol client for call-graph queries.
//!
//! One connection carries many concurrent requests. Frames are read by a
//! single task and routed to callers by request id, so replies may arrive in
//! any order. [`LspCallGraph`] is the entry point.

pub mod codec;
pub mod protocol;
pub mod types;

mod client;
mod correlator;
mod error;
mod handshake;
mod operation;
mod transport;

pub use client::{CallGraph, LspCallGraph};
pub use error::LspError;
pub use handshake::HandshakeState;
pub use operation::{
    Delivery, DocumentSymbols, HoverRequest, Implementation, Initialize, Operation,
    OutgoingCalls, PrepareCallHierarchy, References, ServerInfo,
};
pub use protocol::{ErrorCode, PathToUriError, file_uri_to_path, path_to_file_uri};
pub use transport::{BoxedReader, BoxedWriter};
pub use types::{
    CallHierarchyItem, Hover, Location, OutgoingCall, Position, Range, ServerConfig, SymbolEntry,
    SymbolKind, Transport,
};
