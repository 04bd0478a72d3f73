//! Data store interfaces and the bundled in-memory store
//!
//! Concrete storage backends live outside the core; the pipeline consumes
//! them through [`DataStore`] and [`DataStoreFactory`]. A backend pushes
//! sequence-ordered results into the leaf node of a graph and announces
//! completion when done.
//!
//! The process-wide factory slot uses one-shot initialization: the first
//! install wins and is published safely, every later install fails. The
//! bundled [`MemDataStoreFactory`] hands out a single shared store
//! instance the same way.

use crate::error::{Error, Result};
use crate::pipeline::node::QueryNode;
use crate::pipeline::result::BaseResult;
use crate::rollup::RollupConfig;
use crate::series::TimeSeries;
use crate::types::{IdKind, TimeSpecification, TimeUnit};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use tracing::warn;

// ============================================================================
// Interfaces
// ============================================================================

/// A source of query results
pub trait DataStore: Send + Sync {
    /// The store id
    fn id(&self) -> &str;

    /// Push every result into `node` in sequence order, then announce
    /// completion
    ///
    /// Honors the cancellation token on the node's pipeline context:
    /// pending deliveries are dropped and completion reflects what was
    /// actually delivered.
    fn execute(&self, node: Arc<dyn QueryNode>) -> Result<()>;
}

/// Opens data stores and describes their capabilities
pub trait DataStoreFactory: Send + Sync {
    /// The factory id
    fn id(&self) -> &str;

    /// Open (or reuse) the store with the given id
    fn open(&self, id: &str) -> Result<Arc<dyn DataStore>>;

    /// The identity encoding of series this factory's stores produce
    fn id_kind(&self) -> IdKind;

    /// Whether the backend can evaluate the given node kind itself
    fn supports_pushdown(&self, node_kind: &str) -> bool;
}

// ============================================================================
// Process-Wide Factory Slot
// ============================================================================

static FACTORY: OnceLock<Arc<dyn DataStoreFactory>> = OnceLock::new();

/// Install the process-wide data store factory; the first install wins
pub fn install_data_store_factory(factory: Arc<dyn DataStoreFactory>) -> Result<()> {
    FACTORY
        .set(factory)
        .map_err(|_| Error::config("Data store factory already installed"))
}

/// The installed data store factory, if any
pub fn data_store_factory() -> Option<Arc<dyn DataStoreFactory>> {
    FACTORY.get().cloned()
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// One result batch staged in a [`MemDataStore`]
#[derive(Clone, Default)]
pub struct MemBatch {
    /// Series to emit
    pub series: Vec<Arc<dyn TimeSeries>>,
    /// Optional alignment grid
    pub time_specification: Option<TimeSpecification>,
    /// Optional rollup config
    pub rollup_config: Option<Arc<RollupConfig>>,
    /// Timestamp resolution
    pub resolution: Option<TimeUnit>,
}

/// An in-memory data store for tests and embedded use
pub struct MemDataStore {
    id: String,
    batches: RwLock<Vec<MemBatch>>,
}

impl MemDataStore {
    /// Create an empty store
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            batches: RwLock::new(Vec::new()),
        }
    }

    /// Stage a batch; batches are emitted in staging order
    pub fn push_batch(&self, batch: MemBatch) {
        self.batches.write().push(batch);
    }

    /// Number of staged batches
    pub fn len(&self) -> usize {
        self.batches.read().len()
    }

    /// True if nothing is staged
    pub fn is_empty(&self) -> bool {
        self.batches.read().is_empty()
    }
}

impl DataStore for MemDataStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute(&self, node: Arc<dyn QueryNode>) -> Result<()> {
        let context = Arc::clone(node.core().context());
        let batches = self.batches.read().clone();
        let mut delivered: u64 = 0;

        for (sequence, batch) in batches.into_iter().enumerate() {
            if context.is_cancelled() {
                warn!(store = %self.id, delivered, "cancelled, dropping pending batches");
                break;
            }
            let mut builder = BaseResult::builder(&self.id, sequence as u64)
                .resolution(batch.resolution.unwrap_or(TimeUnit::Millis));
            if let Some(spec) = batch.time_specification {
                builder = builder.time_specification(spec);
            }
            if let Some(rollup) = batch.rollup_config {
                builder = builder.rollup_config(rollup);
            }
            for series in batch.series {
                builder = builder.series(series);
            }
            Arc::clone(&node).on_next(Arc::new(builder.build()));
            delivered += 1;
        }

        node.on_complete(&self.id, delivered.saturating_sub(1), delivered);
        Ok(())
    }
}

/// Factory handing out one shared [`MemDataStore`]
///
/// The store is constructed exactly once on first open and reused for
/// every later open, whatever id is passed.
#[derive(Default)]
pub struct MemDataStoreFactory {
    store: OnceLock<Arc<MemDataStore>>,
}

impl MemDataStoreFactory {
    /// Create a factory with no store yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the shared store with its concrete type
    pub fn open_mem(&self, id: &str) -> Arc<MemDataStore> {
        Arc::clone(
            self.store
                .get_or_init(|| Arc::new(MemDataStore::new(id))),
        )
    }
}

impl DataStoreFactory for MemDataStoreFactory {
    fn id(&self) -> &str {
        "memory"
    }

    fn open(&self, id: &str) -> Result<Arc<dyn DataStore>> {
        Ok(self.open_mem(id))
    }

    fn id_kind(&self) -> IdKind {
        IdKind::StringId
    }

    fn supports_pushdown(&self, _node_kind: &str) -> bool {
        false
    }
}
