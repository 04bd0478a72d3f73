//! Node contract and shared node machinery
//!
//! Every processing node implements [`QueryNode`]: upstreams push results
//! in with `on_next`, announce completion with `on_complete`, and surface
//! failures with `on_error`. Pushes are synchronous on the caller's
//! thread; a node either emits immediately or buffers internally.
//!
//! [`NodeCore`] carries the state every node needs: its id, the pipeline
//! context, downstream wiring, and the error/cancellation latches that
//! implement the propagation rules. Concrete nodes embed a core and get
//! the default propagation behavior from the trait's provided methods.

use crate::error::{Error, Result};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::result::QueryResult;
use crate::series::{SeriesIter, TimeSeries};
use crate::value::ValueKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

// ============================================================================
// Descriptors
// ============================================================================

/// A serialized node configuration
///
/// Recognized fields beyond `kind` and `id` depend on the node kind and
/// are deserialized by the node's factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// The node kind, e.g. "sliding-window"
    pub kind: String,
    /// Unique node id within the graph
    pub id: String,
    /// Kind-specific options
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl NodeDescriptor {
    /// Parse a descriptor from JSON text
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Invalid node descriptor: {}", e)))
    }

    /// Deserialize the kind-specific config, with the `id` field injected
    pub fn config<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let mut map = self.options.clone();
        map.insert(
            "id".to_string(),
            serde_json::Value::String(self.id.clone()),
        );
        serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| {
            Error::config(format!("Invalid '{}' config for node '{}': {}", self.kind, self.id, e))
        })
    }
}

// ============================================================================
// Node Contract
// ============================================================================

/// A processing node in the query graph
///
/// `on_next` takes `Arc<Self>` so a node can hand non-owning references
/// to itself to the results it emits; a node outlives all of them.
pub trait QueryNode: Send + Sync {
    /// The shared node state
    fn core(&self) -> &NodeCore;

    /// The factory that built this node, used for iterator projection
    fn factory(&self) -> Arc<dyn NodeFactory>;

    /// Downcast support for factories that need the concrete node
    fn as_any(&self) -> &dyn Any;

    /// Called by an upstream when a result is available
    fn on_next(self: Arc<Self>, result: Arc<dyn QueryResult>);

    /// Unique node id within the graph
    fn id(&self) -> &str {
        self.core().id()
    }

    /// Called by an upstream announcing it has produced `total_sequences`
    /// results; forwarded downstream preserving the pair
    fn on_complete(&self, upstream: &str, final_sequence: u64, total_sequences: u64) {
        trace!(
            node = self.core().id(),
            upstream,
            final_sequence,
            total_sequences,
            "upstream complete"
        );
        self.core()
            .complete_downstream(final_sequence, total_sequences);
    }

    /// Called by an upstream on failure; propagated as-is downstream
    fn on_error(&self, error: Error) {
        self.core().error_downstream(error);
    }

    /// Release retained resources; idempotent
    fn close(&self) {
        self.core().close();
    }
}

impl std::fmt::Debug for dyn QueryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryNode").field("id", &self.id()).finish()
    }
}

/// Connect `upstream` to `downstream`
pub fn wire(upstream: &Arc<dyn QueryNode>, downstream: Arc<dyn QueryNode>) {
    downstream.core().add_upstream(upstream.id());
    upstream.core().add_downstream(downstream);
}

// ============================================================================
// Node Core
// ============================================================================

/// State shared by every node implementation
///
/// Holds the wiring plus the latches implementing the propagation rules:
/// a node that saw an error from any upstream forwards completions but
/// produces no further results of its own, and a cancelled node drops
/// pending deliveries after forwarding one terminal completion.
pub struct NodeCore {
    id: String,
    context: Arc<PipelineContext>,
    downstreams: RwLock<Vec<Arc<dyn QueryNode>>>,
    upstreams: RwLock<Vec<String>>,
    saw_error: AtomicBool,
    closed: AtomicBool,
    terminal_sent: AtomicBool,
    results_seen: AtomicU64,
    last_sequence: AtomicU64,
}

impl NodeCore {
    /// Create a core for the given node id
    pub fn new(id: impl Into<String>, context: Arc<PipelineContext>) -> Self {
        Self {
            id: id.into(),
            context,
            downstreams: RwLock::new(Vec::new()),
            upstreams: RwLock::new(Vec::new()),
            saw_error: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            terminal_sent: AtomicBool::new(false),
            results_seen: AtomicU64::new(0),
            last_sequence: AtomicU64::new(0),
        }
    }

    /// The node id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The pipeline context
    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    /// Register a downstream consumer
    pub fn add_downstream(&self, node: Arc<dyn QueryNode>) {
        self.downstreams.write().push(node);
    }

    /// Record an upstream producer by id
    pub fn add_upstream(&self, id: &str) {
        self.upstreams.write().push(id.to_string());
    }

    /// Snapshot of the downstream collection
    pub fn downstreams(&self) -> Vec<Arc<dyn QueryNode>> {
        self.downstreams.read().clone()
    }

    /// Ids of the registered upstreams
    pub fn upstreams(&self) -> Vec<String> {
        self.upstreams.read().clone()
    }

    /// Whether an incoming result should be processed
    ///
    /// Returns false once closed, once any upstream errored, or once the
    /// execution is cancelled; cancellation additionally forwards one
    /// terminal completion so downstreams can finish.
    pub fn accepts_results(&self) -> bool {
        if self.closed.load(Ordering::Acquire) || self.saw_error.load(Ordering::Acquire) {
            return false;
        }
        if self.context.is_cancelled() {
            self.send_terminal_complete();
            return false;
        }
        true
    }

    /// Push a result to every downstream
    pub fn send_downstream(&self, result: Arc<dyn QueryResult>) {
        self.results_seen.fetch_add(1, Ordering::Relaxed);
        self.last_sequence
            .store(result.sequence_id(), Ordering::Relaxed);
        trace!(
            node = %self.id,
            sequence = result.sequence_id(),
            series = result.time_series().len(),
            "emitting result"
        );
        for downstream in self.downstreams() {
            downstream.on_next(Arc::clone(&result));
        }
    }

    /// Forward a completion announcement to every downstream
    pub fn complete_downstream(&self, final_sequence: u64, total_sequences: u64) {
        for downstream in self.downstreams() {
            downstream.on_complete(&self.id, final_sequence, total_sequences);
        }
    }

    /// Latch the error state and propagate the error to every downstream
    pub fn error_downstream(&self, error: Error) {
        self.saw_error.store(true, Ordering::Release);
        debug!(node = %self.id, %error, "propagating error");
        for downstream in self.downstreams() {
            downstream.on_error(error.clone());
        }
    }

    /// True once any upstream error was observed
    pub fn saw_error(&self) -> bool {
        self.saw_error.load(Ordering::Acquire)
    }

    /// Mark the node closed; idempotent
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            trace!(node = %self.id, "closed");
        }
    }

    /// True once `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Forward one terminal completion after cancellation
    fn send_terminal_complete(&self) {
        if !self.terminal_sent.swap(true, Ordering::AcqRel) {
            let last = self.last_sequence.load(Ordering::Relaxed);
            let total = self.results_seen.load(Ordering::Relaxed);
            warn!(node = %self.id, "cancelled, sending terminal completion");
            self.complete_downstream(last, total);
        }
    }
}

// ============================================================================
// Node Factory
// ============================================================================

/// Per-kind constructor and iterator factory
///
/// A factory declares which [`ValueKind`]s its nodes transform; the
/// projection layer routes those kinds to [`NodeFactory::new_typed_iterator`]
/// and passes everything else through to the source series untouched.
pub trait NodeFactory: Send + Sync {
    /// The node kind this factory builds, e.g. "summarizer"
    fn kind(&self) -> &'static str;

    /// The value kinds this node's iterators handle
    fn value_kinds(&self) -> &'static [ValueKind];

    /// The kinds a wrapped series exposes, given the source's kinds
    ///
    /// Defaults to the source's own kinds (same-kind transforms); nodes
    /// that change representation override this.
    fn projected_kinds(&self, source_kinds: &[ValueKind]) -> Vec<ValueKind> {
        source_kinds.to_vec()
    }

    /// Build a node from a descriptor
    fn create(
        &self,
        context: Arc<PipelineContext>,
        descriptor: &NodeDescriptor,
    ) -> Result<Arc<dyn QueryNode>>;

    /// Build the node-specific iterator for one wrapped series
    fn new_typed_iterator(
        &self,
        kind: ValueKind,
        node: Arc<dyn QueryNode>,
        result: &dyn QueryResult,
        sources: Vec<Arc<dyn TimeSeries>>,
    ) -> Result<SeriesIter>;
}
