//! The call-graph facade: one connected language server, many concurrent
//! callers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use callscout_types::SymbolRef;
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::codec::FrameWriter;
use crate::correlator::{Correlator, spawn_reader};
use crate::error::LspError;
use crate::handshake::{self, HandshakeState, INITIALIZE_ID};
use crate::operation::{
    Delivery, DocumentSymbols, HoverRequest, Implementation, Initialize, Operation,
    OutgoingCalls, PrepareCallHierarchy, References, ServerInfo, complete,
};
use crate::protocol::path_to_file_uri;
use crate::transport::{self, BoxedReader, BoxedWriter};
use crate::types::{CallHierarchyItem, Hover, Location, OutgoingCall, ServerConfig, SymbolEntry};

const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Call-graph questions about source positions.
///
/// Every method returns at once with the request already in flight; callers
/// may hold many deliveries and await them in any order.
pub trait CallGraph: Send + Sync {
    /// The call-hierarchy item for the function declared at `at`.
    /// [`LspError::EmptyResult`] when nothing callable is there.
    fn prepare_call_hierarchy(&self, at: &SymbolRef) -> Delivery<CallHierarchyItem>;

    /// Prepare at `at`, then ask for that item's outgoing calls. A failed
    /// prepare fails the whole delivery.
    fn outgoing_calls(&self, at: &SymbolRef) -> Delivery<Vec<OutgoingCall>>;

    fn implementations(&self, at: &SymbolRef) -> Delivery<Vec<Location>>;

    /// References to the symbol at `at`, declaration excluded.
    fn references(&self, at: &SymbolRef) -> Delivery<Vec<Location>>;

    fn hover(&self, at: &SymbolRef) -> Delivery<Option<Hover>>;

    fn document_symbols(&self, path: &Path) -> Delivery<Vec<SymbolEntry>>;
}

struct Shutdown;

impl Operation for Shutdown {
    const METHOD: &'static str = "shutdown";
    type Output = ();

    fn params(&self) -> Result<Value, LspError> {
        Ok(Value::Null)
    }

    fn translate(&self, _result: Value) -> Result<(), LspError> {
        Ok(())
    }
}

struct Session {
    correlator: Correlator,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    child: Mutex<Option<Child>>,
}

impl Session {
    async fn execute<O: Operation>(&self, op: &O) -> Result<O::Output, LspError> {
        let params = op.params()?;
        let params = Some(&params).filter(|p| !p.is_null());
        let envelope = self
            .correlator
            .call(O::METHOD, params, self.request_timeout)
            .await?;
        complete(op, envelope)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// A [`CallGraph`] backed by a live language server.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct LspCallGraph {
    session: Arc<Session>,
    info: Arc<ServerInfo>,
    readiness: HandshakeState,
}

impl LspCallGraph {
    /// Open the configured transport, run the handshake rooted at `root`,
    /// and wait for the workspace to load.
    pub async fn connect(config: &ServerConfig, root: &Path) -> Result<Self, LspError> {
        let connection = transport::open(&config.transport()).await?;
        Self::establish(connection.reader, connection.writer, connection.child, config, root).await
    }

    /// Same as [`connect`](Self::connect) over streams the caller already
    /// holds.
    pub async fn from_streams(
        reader: BoxedReader,
        writer: BoxedWriter,
        config: &ServerConfig,
        root: &Path,
    ) -> Result<Self, LspError> {
        Self::establish(reader, writer, None, config, root).await
    }

    async fn establish(
        reader: BoxedReader,
        writer: BoxedWriter,
        child: Option<Child>,
        config: &ServerConfig,
        root: &Path,
    ) -> Result<Self, LspError> {
        let init = Initialize {
            root_uri: path_to_file_uri(root)?.to_string(),
            workspace_name: root
                .file_name()
                .map_or_else(|| "workspace".to_string(), |n| n.to_string_lossy().into_owned()),
        };

        let (mut feed, reader) = spawn_reader(reader);
        let mut writer = FrameWriter::new(writer);
        let outcome = match handshake::perform(&mut feed, &mut writer, &init, config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                reader.abort();
                return Err(e);
            }
        };

        let session = Session {
            correlator: Correlator::start(feed, writer, INITIALIZE_ID + 1),
            request_timeout: config.request_timeout(),
            reader,
            child: Mutex::new(child),
        };
        Ok(Self {
            session: Arc::new(session),
            info: Arc::new(outcome.info),
            readiness: outcome.state,
        })
    }

    #[must_use]
    pub fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    /// `Ready`, or `TimedOut` when the server never signalled readiness and
    /// queries went ahead anyway.
    #[must_use]
    pub fn readiness(&self) -> HandshakeState {
        self.readiness
    }

    /// Run any operation on this connection.
    pub fn dispatch<O: Operation>(&self, op: O) -> Delivery<O::Output> {
        let session = Arc::clone(&self.session);
        Delivery::spawn(async move { session.execute(&op).await })
    }

    /// Requests submitted and not yet answered.
    pub async fn outstanding(&self) -> usize {
        self.session.correlator.outstanding().await
    }

    /// Polite teardown: `shutdown`, `exit`, close our end, and reap a spawned
    /// server (killing it if it lingers).
    pub async fn shutdown(&self) -> Result<(), LspError> {
        let acknowledged = self.session.execute(&Shutdown).await;
        if let Err(e) = &acknowledged {
            tracing::warn!("Language server did not acknowledge shutdown: {e}");
        }
        if !self.session.correlator.is_closed().await {
            let _ = self.session.correlator.notify("exit", None).await;
        }
        self.session.correlator.close_writer().await;

        if let Some(mut child) = self.session.child.lock().await.take() {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::info!("Language server exited with {status}"),
                Ok(Err(e)) => tracing::warn!("Waiting for language server: {e}"),
                Err(_) => {
                    tracing::warn!("Language server still running after {EXIT_GRACE:?}; killing");
                    child.kill().await?;
                }
            }
        }
        acknowledged
    }
}

impl CallGraph for LspCallGraph {
    fn prepare_call_hierarchy(&self, at: &SymbolRef) -> Delivery<CallHierarchyItem> {
        self.dispatch(PrepareCallHierarchy { at: at.clone() })
    }

    fn outgoing_calls(&self, at: &SymbolRef) -> Delivery<Vec<OutgoingCall>> {
        let session = Arc::clone(&self.session);
        let at = at.clone();
        Delivery::spawn(async move {
            let item = session.execute(&PrepareCallHierarchy { at }).await?;
            session.execute(&OutgoingCalls { item }).await
        })
    }

    fn implementations(&self, at: &SymbolRef) -> Delivery<Vec<Location>> {
        self.dispatch(Implementation { at: at.clone() })
    }

    fn references(&self, at: &SymbolRef) -> Delivery<Vec<Location>> {
        self.dispatch(References { at: at.clone() })
    }

    fn hover(&self, at: &SymbolRef) -> Delivery<Option<Hover>> {
        self.dispatch(HoverRequest { at: at.clone() })
    }

    fn document_symbols(&self, path: &Path) -> Delivery<Vec<SymbolEntry>> {
        self.dispatch(DocumentSymbols {
            path: path.to_path_buf(),
        })
    }
}
