//! Opening the physical connection: TCP to a listening server, or a child
//! process over stdio.

use std::io;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use crate::error::LspError;
use crate::types::Transport;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) struct Connection {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    /// Present when we spawned the server; killed on drop.
    pub child: Option<Child>,
}

pub(crate) async fn open(transport: &Transport) -> Result<Connection, LspError> {
    match transport {
        Transport::Tcp(address) => {
            let stream = TcpStream::connect(address.as_str())
                .await
                .map_err(|source| LspError::Connect {
                    target: transport.to_string(),
                    source,
                })?;
            stream.set_nodelay(true)?;
            let (read_half, write_half) = stream.into_split();
            tracing::info!("Connected to language server at {address}");
            Ok(Connection {
                reader: Box::new(read_half),
                writer: Box::new(write_half),
                child: None,
            })
        }
        Transport::Spawn { command, args } => {
            let resolved = which::which(command).map_err(|e| LspError::Connect {
                target: transport.to_string(),
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{command} not found in PATH: {e}"),
                ),
            })?;
            let mut child = Command::new(&resolved)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| LspError::Connect {
                    target: transport.to_string(),
                    source,
                })?;

            let (Some(stdout), Some(stdin)) = (child.stdout.take(), child.stdin.take()) else {
                return Err(LspError::ConnectionClosed);
            };
            tracing::info!(
                "Spawned language server {} (pid {:?})",
                resolved.display(),
                child.id()
            );
            Ok(Connection {
                reader: Box::new(stdout),
                writer: Box::new(stdin),
                child: Some(child),
            })
        }
    }
}
