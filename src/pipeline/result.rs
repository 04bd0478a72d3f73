//! Result types and the wrapping view used by transforming nodes
//!
//! A [`QueryResult`] is one batch of series produced by a node for a given
//! sequence id. Transforming nodes never copy points: they emit a
//! [`ResultView`] that delegates all metadata to the wrapped upstream
//! result and substitutes each contained series with a lazily-iterating
//! [`ProjectedSeries`]. The view holds the only retained reference to the
//! upstream result, so dropping the view (and any iterators created from
//! it) releases the upstream exactly once, error paths included.

use crate::pipeline::node::QueryNode;
use crate::rollup::RollupConfig;
use crate::series::{SeriesIter, TimeSeries};
use crate::types::{IdKind, TimeSeriesId, TimeSpecification, TimeUnit};
use crate::value::ValueKind;
use std::sync::{Arc, Weak};

// ============================================================================
// Result Contract
// ============================================================================

/// One batch of time-series produced by a node
///
/// Sequence ids strictly increase within a single upstream and never
/// repeat. Consumers must not mutate a result; it is shared immutably.
pub trait QueryResult: Send + Sync {
    /// The grid the contained series align to, if any
    fn time_specification(&self) -> Option<&TimeSpecification>;

    /// The contained series, in source order
    fn time_series(&self) -> &[Arc<dyn TimeSeries>];

    /// Position of this result within its upstream's output
    fn sequence_id(&self) -> u64;

    /// Id of the node that emitted this result
    fn source(&self) -> &str;

    /// Identity encoding of the contained series
    fn id_kind(&self) -> IdKind;

    /// Timestamp resolution of the contained series
    fn resolution(&self) -> TimeUnit;

    /// The rollup config defining summary-ids for this result, if any
    fn rollup_config(&self) -> Option<Arc<RollupConfig>>;
}

// ============================================================================
// Base Result
// ============================================================================

/// Concrete result used by sources (and tests)
pub struct BaseResult {
    sequence_id: u64,
    source: String,
    time_specification: Option<TimeSpecification>,
    resolution: TimeUnit,
    rollup_config: Option<Arc<RollupConfig>>,
    id_kind: IdKind,
    series: Vec<Arc<dyn TimeSeries>>,
}

impl BaseResult {
    /// Start building a result for the given source node and sequence id
    pub fn builder(source: impl Into<String>, sequence_id: u64) -> BaseResultBuilder {
        BaseResultBuilder {
            inner: BaseResult {
                sequence_id,
                source: source.into(),
                time_specification: None,
                resolution: TimeUnit::Millis,
                rollup_config: None,
                id_kind: IdKind::StringId,
                series: Vec::new(),
            },
        }
    }
}

impl QueryResult for BaseResult {
    fn time_specification(&self) -> Option<&TimeSpecification> {
        self.time_specification.as_ref()
    }

    fn time_series(&self) -> &[Arc<dyn TimeSeries>] {
        &self.series
    }

    fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    fn resolution(&self) -> TimeUnit {
        self.resolution
    }

    fn rollup_config(&self) -> Option<Arc<RollupConfig>> {
        self.rollup_config.clone()
    }
}

/// Builder for [`BaseResult`]
pub struct BaseResultBuilder {
    inner: BaseResult,
}

impl BaseResultBuilder {
    /// Set the time specification
    pub fn time_specification(mut self, spec: TimeSpecification) -> Self {
        self.inner.time_specification = Some(spec);
        self
    }

    /// Set the resolution (defaults to millis)
    pub fn resolution(mut self, resolution: TimeUnit) -> Self {
        self.inner.resolution = resolution;
        self
    }

    /// Attach a rollup config
    pub fn rollup_config(mut self, config: Arc<RollupConfig>) -> Self {
        self.inner.rollup_config = Some(config);
        self
    }

    /// Set the identity encoding (defaults to string ids)
    pub fn id_kind(mut self, kind: IdKind) -> Self {
        self.inner.id_kind = kind;
        self
    }

    /// Append a series
    pub fn series(mut self, series: Arc<dyn TimeSeries>) -> Self {
        self.inner.series.push(series);
        self
    }

    /// Finish the result
    pub fn build(self) -> BaseResult {
        self.inner
    }
}

// ============================================================================
// Result View
// ============================================================================

/// The wrapper every transforming node emits
///
/// Delegates all metadata to the wrapped upstream result, replaces only
/// the series collection with projections, and reports the wrapping node
/// as the source for downstream traversal.
pub struct ResultView {
    node_id: String,
    upstream: Arc<dyn QueryResult>,
    series: Vec<Arc<dyn TimeSeries>>,
}

impl ResultView {
    /// Wrap `upstream`, projecting every contained series through `node`
    ///
    /// The node reference held by the view and its projections is
    /// non-owning: a node outlives all of its emitted results.
    pub fn new(node: &Arc<dyn QueryNode>, upstream: Arc<dyn QueryResult>) -> Self {
        let weak = Arc::downgrade(node);
        let series = upstream
            .time_series()
            .iter()
            .map(|source| {
                Arc::new(ProjectedSeries {
                    node: weak.clone(),
                    upstream: Arc::clone(&upstream),
                    source: Arc::clone(source),
                }) as Arc<dyn TimeSeries>
            })
            .collect();
        Self {
            node_id: node.id().to_string(),
            upstream,
            series,
        }
    }
}

impl QueryResult for ResultView {
    fn time_specification(&self) -> Option<&TimeSpecification> {
        self.upstream.time_specification()
    }

    fn time_series(&self) -> &[Arc<dyn TimeSeries>] {
        &self.series
    }

    fn sequence_id(&self) -> u64 {
        self.upstream.sequence_id()
    }

    fn source(&self) -> &str {
        &self.node_id
    }

    fn id_kind(&self) -> IdKind {
        self.upstream.id_kind()
    }

    fn resolution(&self) -> TimeUnit {
        self.upstream.resolution()
    }

    fn rollup_config(&self) -> Option<Arc<RollupConfig>> {
        self.upstream.rollup_config()
    }
}

// ============================================================================
// Projected Series
// ============================================================================

/// A wrapped series that injects node-specific iterators
///
/// Iterator requests follow three rules: a kind the projection does not
/// expose is absent; a kind the node's factory handles gets the
/// node-specific iterator; anything else passes through to the source's
/// own iterator untouched.
pub struct ProjectedSeries {
    node: Weak<dyn QueryNode>,
    upstream: Arc<dyn QueryResult>,
    source: Arc<dyn TimeSeries>,
}

impl TimeSeries for ProjectedSeries {
    fn id(&self) -> &TimeSeriesId {
        self.source.id()
    }

    fn kinds(&self) -> Vec<ValueKind> {
        match self.node.upgrade() {
            Some(node) => node.factory().projected_kinds(&self.source.kinds()),
            None => Vec::new(),
        }
    }

    fn iterator(&self, kind: ValueKind) -> Option<SeriesIter> {
        let node = self.node.upgrade()?;
        let factory = node.factory();
        if !factory.projected_kinds(&self.source.kinds()).contains(&kind) {
            return None;
        }
        if factory.value_kinds().contains(&kind) {
            let iter = factory.new_typed_iterator(
                kind,
                node,
                self.upstream.as_ref(),
                vec![Arc::clone(&self.source)],
            );
            match iter {
                Ok(iter) => Some(iter),
                // Construction failures surface on the first next()
                Err(e) => Some(Box::new(std::iter::once(Err(e)))),
            }
        } else {
            self.source.iterator(kind)
        }
    }
}
