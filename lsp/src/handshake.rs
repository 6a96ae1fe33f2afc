//! Initialize / initialized exchange and workspace readiness.
//!
//! Runs on the raw frame feed before the correlator exists. The exchange is an
//! explicit state machine:
//!
//! ```text
//! AwaitingInitializeResponse ──reply──► AwaitingReady ──signal──► Ready
//!            │                               │
//!        deadline: error                 deadline: TimedOut (warn, proceed)
//! ```
//!
//! Readiness signals, in order of preference: every `$/progress` token the
//! server began has ended; a `server/ready` notification; a log or show
//! message containing one of the configured markers.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::codec::FrameWriter;
use crate::correlator::{FrameFeed, log_notification};
use crate::error::LspError;
use crate::operation::{Initialize, Operation, ServerInfo, complete};
use crate::protocol::{self, Incoming, Notification, Request};
use crate::transport::BoxedWriter;
use crate::types::ServerConfig;

pub(crate) const INITIALIZE_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingInitializeResponse,
    AwaitingReady,
    Ready,
    TimedOut,
}

#[derive(Debug)]
enum Effect {
    Reply(Value),
    Initialized(ServerInfo),
}

struct Handshake {
    state: HandshakeState,
    markers: Vec<String>,
    /// `$/progress` tokens begun and not yet ended.
    progress: HashSet<String>,
}

impl Handshake {
    fn new(markers: Vec<String>) -> Self {
        Self {
            state: HandshakeState::AwaitingInitializeResponse,
            markers,
            progress: HashSet::new(),
        }
    }

    fn on_frame(&mut self, bytes: &[u8], init: &Initialize) -> Result<Option<Effect>, LspError> {
        let frame: Value = match serde_json::from_slice(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Discarding frame that is not JSON during handshake: {e}");
                return Ok(None);
            }
        };

        match protocol::classify(frame) {
            Some(Incoming::Response { id, body })
                if id == INITIALIZE_ID
                    && self.state == HandshakeState::AwaitingInitializeResponse =>
            {
                let info = complete(init, body)?;
                self.state = HandshakeState::AwaitingReady;
                Ok(Some(Effect::Initialized(info)))
            }
            Some(Incoming::Response { id, .. }) => {
                tracing::trace!(id, "Ignoring response during handshake");
                Ok(None)
            }
            Some(Incoming::ServerRequest { id, method, params }) => Ok(Some(Effect::Reply(
                protocol::answer_server_request(&id, &method, params.as_ref()),
            ))),
            Some(Incoming::Notification { method, params }) => {
                log_notification(&method, params.as_ref());
                if self.state == HandshakeState::AwaitingReady
                    && self.signals_ready(&method, params.as_ref())
                {
                    self.state = HandshakeState::Ready;
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn signals_ready(&mut self, method: &str, params: Option<&Value>) -> bool {
        match method {
            "server/ready" => true,
            "$/progress" => {
                let Some(params) = params else { return false };
                let token = match params.get("token") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => return false,
                };
                match params.pointer("/value/kind").and_then(Value::as_str) {
                    Some("begin") => {
                        self.progress.insert(token);
                        false
                    }
                    Some("end") => self.progress.remove(&token) && self.progress.is_empty(),
                    _ => false,
                }
            }
            "window/logMessage" | "window/showMessage" => {
                let message = params
                    .and_then(|p| p.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                self.markers.iter().any(|marker| message.contains(marker.as_str()))
            }
            _ => false,
        }
    }

    fn on_deadline(&mut self, after: Duration) -> Result<(), LspError> {
        match self.state {
            HandshakeState::AwaitingInitializeResponse => Err(LspError::Timeout {
                method: Initialize::METHOD,
                after,
            }),
            HandshakeState::AwaitingReady => {
                self.state = HandshakeState::TimedOut;
                Ok(())
            }
            HandshakeState::Ready | HandshakeState::TimedOut => Ok(()),
        }
    }

    fn is_done(&self) -> bool {
        matches!(self.state, HandshakeState::Ready | HandshakeState::TimedOut)
    }
}

pub(crate) struct HandshakeOutcome {
    pub info: ServerInfo,
    pub state: HandshakeState,
}

async fn write_value(writer: &mut FrameWriter<BoxedWriter>, value: &impl serde::Serialize) -> Result<(), LspError> {
    let payload = serde_json::to_vec(value).map_err(|e| LspError::encode(&e))?;
    writer.write_frame(&payload).await?;
    Ok(())
}

/// Drive the handshake to `Ready` or `TimedOut`.
pub(crate) async fn perform(
    feed: &mut FrameFeed,
    writer: &mut FrameWriter<BoxedWriter>,
    init: &Initialize,
    config: &ServerConfig,
) -> Result<HandshakeOutcome, LspError> {
    let mut handshake = Handshake::new(config.ready_markers().to_vec());
    let params = init.params()?;
    write_value(
        writer,
        &Request::new(INITIALIZE_ID, Initialize::METHOD, Some(&params)),
    )
    .await?;

    let mut deadline = Instant::now() + config.request_timeout();
    let mut info = ServerInfo::default();

    while !handshake.is_done() {
        let next = match tokio::time::timeout_at(deadline, feed.recv()).await {
            Ok(next) => next,
            Err(_) => {
                handshake.on_deadline(config.request_timeout())?;
                tracing::warn!(
                    "Server did not report readiness within {:?}; proceeding",
                    config.ready_timeout()
                );
                continue;
            }
        };

        let bytes = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(LspError::ConnectionClosed),
        };

        match handshake.on_frame(&bytes, init)? {
            Some(Effect::Reply(reply)) => write_value(writer, &reply).await?,
            Some(Effect::Initialized(server_info)) => {
                tracing::info!(
                    "Initialized {} {}",
                    server_info.name.as_deref().unwrap_or("language server"),
                    server_info.version.as_deref().unwrap_or_default()
                );
                let empty = serde_json::json!({});
                write_value(writer, &Notification::new("initialized", Some(&empty))).await?;
                info = server_info;

                if config.ready_timeout().is_zero() {
                    handshake.state = HandshakeState::Ready;
                } else {
                    deadline = Instant::now() + config.ready_timeout();
                }
            }
            None => {}
        }
    }

    if handshake.state == HandshakeState::Ready {
        tracing::info!("Workspace ready");
    }
    Ok(HandshakeOutcome {
        info,
        state: handshake.state,
    })
}
