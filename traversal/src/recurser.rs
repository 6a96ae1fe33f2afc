//! Concurrent depth-first exploration of the call graph.
//!
//! Every node is a function identity `(path, line, character, name)` reached
//! at some depth. Each expansion runs as its own task:
//!
//! ```text
//! aborted? / too deep? ──► stop
//! claim(id, depth) failed ──► stop            (visited elsewhere, as shallow)
//! terminal file + extractor hit ──► record, stop
//! outgoing calls ──► error: dead end
//!                ──► none: interface method? implementations ──► fan out
//!                ──► edges in namespace ──► fan out at callee declaration
//! ```
//!
//! Identity is positional: two call paths reaching the same declaration are
//! one node. That is what makes cycles terminate.
//!
//! Every fan-out also records a caller → callee edge. Once the run drains,
//! each entry point is credited with the findings it reaches through those
//! edges within the depth ceiling, so attribution does not depend on which
//! entry's task happened to claim a shared function first.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use callscout_lsp::CallGraph;
use callscout_types::{Extracted, Finding, FunctionId, LookupError, SymbolRef, SyntaxIndex};
use tokio::sync::oneshot;

use crate::barrier::{Barrier, Ticket};
use crate::flavor::Flavor;
use crate::report::{TraversalError, TraversalReport, TraversalStats};

type Expansion = Pin<Box<dyn Future<Output = ()> + Send>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Visit {
    id: FunctionId,
    depth: u32,
}

/// State owned by one run of one flavor.
struct Run {
    graph: Arc<dyn CallGraph>,
    syntax: Arc<dyn SyntaxIndex>,
    flavor: Arc<Flavor>,
    barrier: Barrier,
    /// Shallowest depth each function has been claimed at.
    visited: Mutex<HashMap<FunctionId, u32>>,
    edges: Mutex<HashMap<FunctionId, BTreeSet<FunctionId>>>,
    findings: Mutex<BTreeMap<FunctionId, Extracted>>,
    failure: Mutex<Option<LookupError>>,
    aborted: AtomicBool,
    dead_ends: AtomicUsize,
    depth_cutoffs: AtomicUsize,
    interfaces: AtomicUsize,
}

impl Run {
    fn new(graph: Arc<dyn CallGraph>, syntax: Arc<dyn SyntaxIndex>, flavor: Arc<Flavor>) -> Self {
        Self {
            graph,
            syntax,
            flavor,
            barrier: Barrier::default(),
            visited: Mutex::new(HashMap::new()),
            edges: Mutex::new(HashMap::new()),
            findings: Mutex::new(BTreeMap::new()),
            failure: Mutex::new(None),
            aborted: AtomicBool::new(false),
            dead_ends: AtomicUsize::new(0),
            depth_cutoffs: AtomicUsize::new(0),
            interfaces: AtomicUsize::new(0),
        }
    }

    fn spawn(self: &Arc<Self>, visit: Visit) {
        let ticket = self.barrier.acquire();
        tokio::spawn(Arc::clone(self).expand(visit, ticket));
    }

    fn follow(self: &Arc<Self>, from: &Visit, to: FunctionId) {
        lock(&self.edges)
            .entry(from.id.clone())
            .or_default()
            .insert(to.clone());
        self.spawn(Visit {
            id: to,
            depth: from.depth + 1,
        });
    }

    /// Atomic check-and-insert. A function seen before may be claimed again
    /// only from a strictly shallower depth, so a deep first sighting cannot
    /// starve a shallow one of its depth budget.
    ///
    /// This departs from single admission on purpose: visits of one function
    /// at different depths can each succeed, shallowest last. Visits at the
    /// same depth still admit exactly one.
    fn claim(&self, id: &FunctionId, depth: u32) -> bool {
        let mut visited = lock(&self.visited);
        match visited.get_mut(id) {
            Some(seen) if *seen <= depth => false,
            Some(seen) => {
                *seen = depth;
                true
            }
            None => {
                visited.insert(id.clone(), depth);
                true
            }
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn abort(&self, err: LookupError) {
        tracing::error!(flavor = %self.flavor.name, "Aborting traversal: {err}");
        let mut failure = lock(&self.failure);
        if failure.is_none() {
            *failure = Some(err);
        }
        self.aborted.store(true, Ordering::Release);
    }

    fn record(&self, visit: &Visit, extracted: Extracted) {
        tracing::debug!(
            flavor = %self.flavor.name,
            function = %visit.id,
            "Found {}",
            extracted.fields().join(" ")
        );
        lock(&self.findings)
            .entry(visit.id.clone())
            .or_insert(extracted);
    }

    fn dead_end(&self, visit: &Visit, what: &str, err: &callscout_lsp::LspError) {
        self.dead_ends.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            flavor = %self.flavor.name,
            function = %visit.id,
            code = err.code().map(|c| c.code()),
            "{what} failed: {err}"
        );
    }

    fn expand(self: Arc<Self>, visit: Visit, ticket: Ticket) -> Expansion {
        Box::pin(async move {
            let _ticket = ticket;
            self.visit(visit).await;
        })
    }

    async fn visit(self: &Arc<Self>, visit: Visit) {
        if self.is_aborted() {
            return;
        }
        if visit.depth > self.flavor.max_depth {
            self.depth_cutoffs.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(flavor = %self.flavor.name, function = %visit.id, "Depth ceiling");
            return;
        }
        if !self.claim(&visit.id, visit.depth) {
            return;
        }
        tracing::trace!(
            flavor = %self.flavor.name,
            function = %visit.id,
            depth = visit.depth,
            "Visiting"
        );

        let at = visit.id.symbol();
        if self.flavor.terminal.matches(at.path(), visit.id.name()) {
            let file = match self.syntax.parsed(at.path()) {
                Ok(file) => file,
                Err(e) => return self.abort(e),
            };
            if let Some(extracted) = self.flavor.extractor.extract(&file, visit.id.name(), at.line()) {
                return self.record(&visit, extracted);
            }
        }

        let calls = match self.graph.outgoing_calls(&at).await {
            Ok(calls) => calls,
            Err(e) if e.is_empty_result() => Vec::new(),
            Err(e) => return self.dead_end(&visit, "Outgoing calls", &e),
        };

        if calls.is_empty() {
            return self.resolve_interface(&visit, &at).await;
        }

        for call in calls {
            if !self.flavor.namespace.admits(call.to.detail()) {
                continue;
            }
            let Some(callee) = call.to.declaration() else {
                continue;
            };
            self.follow(&visit, FunctionId::new(&callee, call.to.name));
        }
    }

    /// A function with no outgoing calls may be an interface method; if so,
    /// carry on into its implementations.
    async fn resolve_interface(self: &Arc<Self>, visit: &Visit, at: &SymbolRef) {
        let file = match self.syntax.parsed(at.path()) {
            Ok(file) => file,
            Err(e) => return self.abort(e),
        };
        let Some((iface, _)) = file.interface_method(visit.id.name(), at.line()) else {
            return;
        };
        self.interfaces.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            flavor = %self.flavor.name,
            function = %visit.id,
            "Resolving implementations of {}.{}",
            iface.name,
            visit.id.name()
        );

        let locations = match self.graph.implementations(at).await {
            Ok(locations) => locations,
            Err(e) => return self.dead_end(visit, "Implementations", &e),
        };
        for location in locations {
            if self.flavor.is_mock(&location.uri) {
                tracing::trace!("Skipping mock implementation {}", location.uri);
                continue;
            }
            let Some(target) = location.symbol() else {
                continue;
            };
            self.follow(visit, FunctionId::new(&target, visit.id.name()));
        }
    }

    fn finish(&self, entries: &[FunctionId]) -> Result<TraversalReport, TraversalError> {
        if let Some(err) = lock(&self.failure).take() {
            return Err(err.into());
        }
        let found = mem::take(&mut *lock(&self.findings));
        let findings = attribute(entries, &lock(&self.edges), found, self.flavor.max_depth);
        let stats = TraversalStats {
            visited: lock(&self.visited).len(),
            dead_ends: self.dead_ends.load(Ordering::Relaxed),
            depth_cutoffs: self.depth_cutoffs.load(Ordering::Relaxed),
            interfaces: self.interfaces.load(Ordering::Relaxed),
        };
        Ok(TraversalReport::new(self.flavor.name.clone(), findings, stats))
    }
}

/// Credit each finding with every entry that reaches it along recorded edges
/// in at most `max_depth` steps. Terminals end a path.
fn attribute(
    entries: &[FunctionId],
    edges: &HashMap<FunctionId, BTreeSet<FunctionId>>,
    found: BTreeMap<FunctionId, Extracted>,
    max_depth: u32,
) -> BTreeMap<FunctionId, Finding> {
    let mut reached: HashMap<FunctionId, BTreeSet<FunctionId>> = HashMap::new();
    for entry in entries {
        let mut seen = HashSet::from([entry]);
        let mut queue = VecDeque::from([(entry, 0)]);
        while let Some((node, depth)) = queue.pop_front() {
            if found.contains_key(node) {
                reached
                    .entry(node.clone())
                    .or_default()
                    .insert(entry.clone());
                continue;
            }
            if depth == max_depth {
                continue;
            }
            for next in edges.get(node).into_iter().flatten() {
                if seen.insert(next) {
                    queue.push_back((next, depth + 1));
                }
            }
        }
    }

    found
        .into_iter()
        .map(|(terminal, extracted)| {
            let entries = reached.remove(&terminal).unwrap_or_default();
            (terminal, Finding::new(entries, extracted))
        })
        .collect()
}

/// Runs one [`Flavor`] over a shared call graph.
///
/// Each run owns its visited set and findings; several recursers may share
/// one [`CallGraph`] concurrently.
#[derive(Clone)]
pub struct Recurser {
    graph: Arc<dyn CallGraph>,
    syntax: Arc<dyn SyntaxIndex>,
    flavor: Arc<Flavor>,
}

impl Recurser {
    pub fn new(graph: Arc<dyn CallGraph>, syntax: Arc<dyn SyntaxIndex>, flavor: Flavor) -> Self {
        Self {
            graph,
            syntax,
            flavor: Arc::new(flavor),
        }
    }

    #[must_use]
    pub fn flavor(&self) -> &Flavor {
        &self.flavor
    }

    /// Explore from every entry point and return once no expansion is left.
    ///
    /// Query failures only end their own branch. A [`LookupError`] means the
    /// inputs are inconsistent and fails the whole run.
    pub async fn run(&self, entries: Vec<FunctionId>) -> Result<TraversalReport, TraversalError> {
        let run = Arc::new(Run::new(
            Arc::clone(&self.graph),
            Arc::clone(&self.syntax),
            Arc::clone(&self.flavor),
        ));
        tracing::info!(
            flavor = %self.flavor.name,
            "Traversing from {} entry points",
            entries.len()
        );

        for entry in &entries {
            run.spawn(Visit {
                id: entry.clone(),
                depth: 0,
            });
        }
        run.barrier.wait().await;

        let report = run.finish(&entries)?;
        tracing::info!(
            flavor = %self.flavor.name,
            findings = report.findings().len(),
            visited = report.stats().visited,
            dead_ends = report.stats().dead_ends,
            "Traversal complete"
        );
        Ok(report)
    }

    /// [`run`](Self::run) on its own task; the report arrives once on the
    /// returned channel.
    pub fn launch(
        &self,
        entries: Vec<FunctionId>,
    ) -> oneshot::Receiver<Result<TraversalReport, TraversalError>> {
        let (tx, rx) = oneshot::channel();
        let recurser = self.clone();
        tokio::spawn(async move {
            let _ = tx.send(recurser.run(entries).await);
        });
        rx
    }
}
