use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::codec::FramingError;
use crate::protocol::{ErrorCode, PathToUriError};

/// Failure of one protocol operation or of the connection under it.
#[derive(Debug, Error)]
pub enum LspError {
    /// Malformed framing; the connection is gone.
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Protocol { code: ErrorCode, message: String },
    /// We could not encode the request or decode the reply.
    #[error("serialization error {code}: {message}")]
    Serialization { code: ErrorCode, message: String },
    /// The server had nothing to say, e.g. the position is not callable.
    #[error("{method} returned no result")]
    EmptyResult { method: &'static str },
    #[error("{method} timed out after {after:?}")]
    Timeout {
        method: &'static str,
        after: Duration,
    },
    #[error("connection to language server closed")]
    ConnectionClosed,
    #[error("connecting to {target}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Uri(#[from] PathToUriError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LspError {
    pub(crate) fn encode(err: &serde_json::Error) -> Self {
        Self::Serialization {
            code: ErrorCode::EncodeFailed,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(method: &str, err: &serde_json::Error) -> Self {
        Self::Serialization {
            code: ErrorCode::DecodeFailed,
            message: format!("{method}: {err}"),
        }
    }

    /// Numeric code for server and serialization failures.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Protocol { code, .. } | Self::Serialization { code, .. } => Some(*code),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty_result(&self) -> bool {
        matches!(self, Self::EmptyResult { .. })
    }

    /// Whether the connection itself is unusable after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Framing(_) | Self::ConnectionClosed | Self::Connect { .. } | Self::Io(_)
        )
    }
}
