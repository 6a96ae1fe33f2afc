//! Request/response correlation over one connection.
//!
//! Many callers submit concurrently; one reader task owns the read half and
//! routes every incoming frame. A response reaches its caller through a
//! per-id oneshot. Responses that arrive before anyone waits on them are
//! cached until claimed, so replies may come back in any order.
//!
//! ```text
//! submit(method) ──► wanted += id ──► [writer lock] write frame
//! correlate(id)  ──► cache hit? deliver : park waiter
//! reader task    ──► response: waiter? deliver : wanted? cache : drop
//!                    server request: reply
//!                    notification: log
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::{FrameReader, FrameWriter, FramingError};
use crate::error::LspError;
use crate::protocol::{self, Incoming, Notification, Request};
use crate::transport::{BoxedReader, BoxedWriter};

const FEED_CHANNEL_CAPACITY: usize = 256;

/// Frames read off the wire, in arrival order. Closed on EOF.
pub(crate) type FrameFeed = mpsc::Receiver<Result<Vec<u8>, FramingError>>;

pub(crate) type SharedWriter = Arc<Mutex<FrameWriter<BoxedWriter>>>;

/// Start the single reader of the connection.
///
/// The task stops at EOF or at the first framing error, which it forwards.
pub(crate) fn spawn_reader(reader: BoxedReader) -> (FrameFeed, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
    let handle = tokio::spawn(async move {
        let mut reader = FrameReader::new(reader);
        loop {
            match reader.read_frame().await {
                Ok(Some(frame)) => {
                    if tx.send(Ok(frame)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!("Language server closed the connection");
                    break;
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });
    (rx, handle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    Delivered,
    Cached,
    Discarded,
}

#[derive(Default)]
struct CorrelationState {
    /// Ids submitted and not yet delivered or abandoned.
    wanted: HashSet<u64>,
    /// Responses for wanted ids that nobody is waiting on yet.
    cache: HashMap<u64, Value>,
    waiters: HashMap<u64, oneshot::Sender<Value>>,
    closed: bool,
}

impl CorrelationState {
    fn route_response(&mut self, id: u64, body: Value) -> Routed {
        if !self.wanted.contains(&id) {
            return Routed::Discarded;
        }
        match self.waiters.remove(&id) {
            Some(waiter) => {
                self.wanted.remove(&id);
                // A dropped receiver means the caller gave up; nothing to do.
                let _ = waiter.send(body);
                Routed::Delivered
            }
            None => {
                self.cache.insert(id, body);
                Routed::Cached
            }
        }
    }

    fn claim(&mut self, id: u64) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        if let Some(body) = self.cache.remove(&id) {
            self.wanted.remove(&id);
            let _ = tx.send(body);
        } else if !self.closed && self.wanted.contains(&id) {
            self.waiters.insert(id, tx);
        }
        // Otherwise `tx` drops here and the caller sees a closed channel.
        rx
    }

    fn forget(&mut self, id: u64) {
        self.wanted.remove(&id);
        self.cache.remove(&id);
        self.waiters.remove(&id);
    }

    fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
        self.cache.clear();
        self.wanted.clear();
    }
}

pub(crate) struct Correlator {
    writer: SharedWriter,
    state: Arc<Mutex<CorrelationState>>,
    next_id: AtomicU64,
    router: JoinHandle<()>,
}

impl Correlator {
    /// Take over a connection whose handshake is complete. Ids start at
    /// `first_id` so they never collide with ids the handshake used.
    pub fn start(feed: FrameFeed, writer: FrameWriter<BoxedWriter>, first_id: u64) -> Self {
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let state = Arc::new(Mutex::new(CorrelationState::default()));
        let router = tokio::spawn(route_frames(feed, Arc::clone(&state), Arc::clone(&writer)));
        Self {
            writer,
            state,
            next_id: AtomicU64::new(first_id),
            router,
        }
    }

    /// Write a request and register its id as wanted. Returns the id.
    pub async fn submit(&self, method: &str, params: Option<&Value>) -> Result<u64, LspError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_vec(&Request::new(id, method, params))
            .map_err(|e| LspError::encode(&e))?;

        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(LspError::ConnectionClosed);
            }
            // Registered before the write so a fast reply is never dropped.
            state.wanted.insert(id);
        }

        let written = self.writer.lock().await.write_frame(&payload).await;
        if let Err(e) = written {
            self.abandon(id).await;
            return Err(e.into());
        }
        tracing::trace!(id, method, "Submitted request");
        Ok(id)
    }

    /// Receiver for the response to `id`. Resolves immediately if the
    /// response is already cached; fails if the connection closes first.
    pub async fn correlate(&self, id: u64) -> oneshot::Receiver<Value> {
        self.state.lock().await.claim(id)
    }

    /// Stop waiting for `id`; a late response is discarded.
    pub async fn abandon(&self, id: u64) {
        self.state.lock().await.forget(id);
    }

    /// Submit, then wait up to `deadline` for the raw response envelope.
    pub async fn call(
        &self,
        method: &'static str,
        params: Option<&Value>,
        deadline: Duration,
    ) -> Result<Value, LspError> {
        let id = self.submit(method, params).await?;
        let rx = self.correlate(id).await;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => Err(LspError::ConnectionClosed),
            Err(_) => {
                self.abandon(id).await;
                tracing::warn!(id, method, "Request timed out after {deadline:?}");
                Err(LspError::Timeout {
                    method,
                    after: deadline,
                })
            }
        }
    }

    pub async fn notify(&self, method: &str, params: Option<&Value>) -> Result<(), LspError> {
        let payload = serde_json::to_vec(&Notification::new(method, params))
            .map_err(|e| LspError::encode(&e))?;
        self.writer.lock().await.write_frame(&payload).await?;
        Ok(())
    }

    /// Number of submitted requests still awaiting a response.
    pub async fn outstanding(&self) -> usize {
        self.state.lock().await.wanted.len()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn close_writer(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        self.router.abort();
    }
}

async fn route_frames(mut feed: FrameFeed, state: Arc<Mutex<CorrelationState>>, writer: SharedWriter) {
    while let Some(item) = feed.recv().await {
        match item {
            Ok(bytes) => {
                dispatch_frame(&bytes, &state, &writer).await;
            }
            Err(e) => {
                tracing::error!("Framing error, dropping connection: {e}");
                break;
            }
        }
    }
    let mut state = state.lock().await;
    if !state.waiters.is_empty() {
        tracing::warn!(
            "Connection closed with {} request(s) still waiting",
            state.waiters.len()
        );
    }
    state.close();
}

async fn dispatch_frame(bytes: &[u8], state: &Mutex<CorrelationState>, writer: &SharedWriter) -> Option<Routed> {
    let frame: Value = match serde_json::from_slice(bytes) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Discarding frame that is not JSON: {e}");
            return None;
        }
    };
    let Some(incoming) = protocol::classify(frame) else {
        tracing::trace!("Ignoring malformed JSON-RPC frame");
        return None;
    };

    match incoming {
        Incoming::Response { id, body } => {
            let routed = state.lock().await.route_response(id, body);
            tracing::trace!(id, ?routed, "Routed response");
            Some(routed)
        }
        Incoming::ServerRequest { id, method, params } => {
            tracing::debug!("Server sent request: {method}");
            let reply = protocol::answer_server_request(&id, &method, params.as_ref());
            match serde_json::to_vec(&reply) {
                Ok(payload) => {
                    if let Err(e) = writer.lock().await.write_frame(&payload).await {
                        tracing::warn!("Failed to answer server request {method}: {e}");
                    }
                }
                Err(e) => tracing::warn!("Failed to encode reply to {method}: {e}"),
            }
            None
        }
        Incoming::Notification { method, params } => {
            log_notification(&method, params.as_ref());
            None
        }
    }
}

pub(crate) fn log_notification(method: &str, params: Option<&Value>) {
    match method {
        "window/logMessage" | "window/showMessage" => {
            let message = params
                .and_then(|p| p.get("message"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            tracing::debug!("Server: {message}");
        }
        _ => tracing::trace!("Ignoring notification: {method}"),
    }
}
