//! Length-prefixed framing for JSON-RPC over a byte stream.
//!
//! Each message is
//! `Content-Length: N\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n<N bytes>`.
//! The codec moves raw payload bytes; JSON parsing belongs to the caller so that
//! a bad body costs one message, not the connection.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (32 MiB); workspace-wide symbol and reference replies
/// on large Go repositories get big.
pub const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

const CONTENT_TYPE: &str = "application/vscode-jsonrpc; charset=utf-8";

/// Malformed or truncated framing. Fatal to the connection.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("missing Content-Length header")]
    MissingLength,
    #[error("invalid Content-Length value {0:?}")]
    InvalidLength(String),
    #[error("Content-Length {len} exceeds maximum {max}")]
    Oversized { len: usize, max: usize },
    #[error("unexpected EOF while reading headers")]
    EofInHeaders,
    #[error("stream ended {read} bytes into a {expected} byte body")]
    Truncated { expected: usize, read: usize },
    #[error("reading frame: {0}")]
    Io(#[from] io::Error),
}

/// Frame `payload` with its header block.
#[must_use]
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "Content-Length: {}\r\nContent-Type: {CONTENT_TYPE}\r\n\r\n",
        payload.len()
    );
    let mut framed = Vec::with_capacity(header.len() + payload.len());
    framed.extend_from_slice(header.as_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Reads framed payloads from an async reader.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next payload.
    ///
    /// Returns `Ok(None)` on EOF at a frame boundary (clean shutdown).
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        let content_length = match self.read_headers().await? {
            Some(len) => len,
            None => return Ok(None),
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(FramingError::Oversized {
                len: content_length,
                max: MAX_FRAME_BYTES,
            });
        }

        let mut body = vec![0u8; content_length];
        let mut read = 0;
        while read < content_length {
            let n = self.reader.read(&mut body[read..]).await?;
            if n == 0 {
                return Err(FramingError::Truncated {
                    expected: content_length,
                    read,
                });
            }
            read += n;
        }
        Ok(Some(body))
    }

    /// Parse headers until the empty line separator.
    ///
    /// Returns the `Content-Length` value, or `None` on EOF.
    async fn read_headers(&mut self) -> Result<Option<usize>, FramingError> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut saw_any_header_bytes = false;

        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // `content_length == None` doesn't imply "no headers read";
                // EOF after only Content-Type is still mid-frame.
                if !saw_any_header_bytes {
                    return Ok(None);
                }
                return Err(FramingError::EofInHeaders);
            }
            saw_any_header_bytes = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            if let Some((key, value)) = trimmed.split_once(':')
                && key.trim().eq_ignore_ascii_case("Content-Length")
            {
                let value = value.trim();
                let len = value
                    .parse::<usize>()
                    .map_err(|_| FramingError::InvalidLength(value.to_string()))?;
                content_length = Some(len);
            }
        }

        content_length.map(Some).ok_or(FramingError::MissingLength)
    }
}

/// Writes framed payloads to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one frame and flush.
    pub async fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(&encode(payload)).await?;
        self.writer.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}
