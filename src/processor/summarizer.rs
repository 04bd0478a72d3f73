//! Summarizer node
//!
//! Reduces each input series to a single multi-statistic summary point.
//! The output point sits at the timestamp of the first input point and
//! carries one entry per requested summary, keyed by the summary-id the
//! result's rollup config assigns to that name. An empty input series
//! produces nothing at all.
//!
//! The running accumulator starts integral and promotes to floating the
//! first time a floating input arrives; promotion never reverts. `count`
//! is always integral and `avg` always floating; everything else is
//! reported with the accumulator's kind at finalization.
//!
//! NaN handling follows the node's `infectious_nan` flag: skipped
//! entirely when false (and excluded from `count`), contaminating every
//! statistic except `count` when true (`count` then counts every input,
//! NaNs included).

use crate::error::{Error, Result};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::node::{NodeCore, NodeDescriptor, NodeFactory, QueryNode};
use crate::pipeline::result::{QueryResult, ResultView};
use crate::processor::Aggregation;
use crate::series::{SeriesIter, TimeSeries};
use crate::types::TimeStamp;
use crate::value::{NumericValue, SeriesValue, SummaryPoint, ValueKind};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

// ============================================================================
// Config
// ============================================================================

/// Configuration for a summarizer node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Ordered list of summary names to compute
    pub summaries: Vec<String>,

    /// When true, one NaN input contaminates every statistic but count
    #[serde(default, alias = "infectiousNan")]
    pub infectious_nan: bool,

    /// Unique node id within the graph
    pub id: String,
}

// ============================================================================
// Node
// ============================================================================

/// The summarizer node
pub struct SummarizerNode {
    core: NodeCore,
    config: SummarizerConfig,
    summaries: Vec<(String, Aggregation)>,
}

impl std::fmt::Debug for SummarizerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizerNode")
            .field("id", &self.core.id())
            .field("config", &self.config)
            .finish()
    }
}

impl SummarizerNode {
    /// Build a node, resolving and validating the summary names
    pub fn from_config(
        context: Arc<PipelineContext>,
        config: SummarizerConfig,
    ) -> Result<Arc<Self>> {
        if config.summaries.is_empty() {
            return Err(Error::config("Summarizer requires at least one summary"));
        }
        let summaries = config
            .summaries
            .iter()
            .map(|name| Aggregation::parse(name).map(|agg| (name.clone(), agg)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Self {
            core: NodeCore::new(config.id.clone(), context),
            config,
            summaries,
        }))
    }

    /// The node config
    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    /// The resolved summaries in config order
    pub fn summaries(&self) -> &[(String, Aggregation)] {
        &self.summaries
    }
}

impl QueryNode for SummarizerNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn factory(&self) -> Arc<dyn NodeFactory> {
        Arc::new(SummarizerFactory)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn on_next(self: Arc<Self>, result: Arc<dyn QueryResult>) {
        if !self.core.accepts_results() {
            return;
        }
        trace!(node = self.core.id(), sequence = result.sequence_id(), "wrapping result");
        let node: Arc<dyn QueryNode> = self.clone();
        let view = ResultView::new(&node, result);
        self.core.send_downstream(Arc::new(view));
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Factory for [`SummarizerNode`]
pub struct SummarizerFactory;

impl NodeFactory for SummarizerFactory {
    fn kind(&self) -> &'static str {
        "summarizer"
    }

    fn value_kinds(&self) -> &'static [ValueKind] {
        &[ValueKind::NumericSummary]
    }

    /// A summarized series gains the summary kind; everything the source
    /// exposed stays reachable as an unchanged pass-through
    fn projected_kinds(&self, source_kinds: &[ValueKind]) -> Vec<ValueKind> {
        let mut kinds = source_kinds.to_vec();
        if !kinds.is_empty() && !kinds.contains(&ValueKind::NumericSummary) {
            kinds.push(ValueKind::NumericSummary);
        }
        kinds
    }

    fn create(
        &self,
        context: Arc<PipelineContext>,
        descriptor: &NodeDescriptor,
    ) -> Result<Arc<dyn QueryNode>> {
        let config: SummarizerConfig = descriptor.config()?;
        let node = SummarizerNode::from_config(context, config)?;
        Ok(node)
    }

    fn new_typed_iterator(
        &self,
        kind: ValueKind,
        node: Arc<dyn QueryNode>,
        result: &dyn QueryResult,
        sources: Vec<Arc<dyn TimeSeries>>,
    ) -> Result<SeriesIter> {
        if kind != ValueKind::NumericSummary {
            return Err(Error::config(format!(
                "Summarizer does not handle '{}'",
                kind
            )));
        }
        let summarizer = node
            .as_any()
            .downcast_ref::<SummarizerNode>()
            .ok_or_else(|| Error::config("Node is not a summarizer node"))?;
        let source = sources
            .first()
            .ok_or_else(|| Error::config("Summarizer requires a source series"))?;

        // Numeric inputs get summarized; an already-summarized source
        // passes through untouched
        let source_iter = source
            .iterator(ValueKind::NumericScalar)
            .or_else(|| source.iterator(ValueKind::NumericArray));
        let source_iter = match source_iter {
            Some(iter) => iter,
            None => {
                return source.iterator(ValueKind::NumericSummary).ok_or_else(|| {
                    Error::type_error("Source series exposes no numeric data to summarize")
                });
            }
        };

        let rollup = result
            .rollup_config()
            .ok_or_else(|| Error::config("Summarizer requires a rollup config on the result"))?;
        let entries = summarizer
            .summaries
            .iter()
            .map(|(name, agg)| rollup.require_id(name).map(|id| (*agg, id)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Box::new(SummarizerIterator {
            source: source_iter,
            entries,
            accumulator: SummaryAccumulator::new(summarizer.config.infectious_nan),
            token: summarizer.core.context().cancellation().clone(),
            done: false,
        }))
    }
}

// ============================================================================
// Iterator
// ============================================================================

/// Consumes the whole source series and emits at most one summary point
///
/// Not restartable; construct a new iterator over the same source to
/// re-read.
struct SummarizerIterator {
    source: SeriesIter,
    entries: Vec<(Aggregation, u32)>,
    accumulator: SummaryAccumulator,
    token: CancellationToken,
    done: bool,
}

impl Iterator for SummarizerIterator {
    type Item = Result<SeriesValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.done = true;

        loop {
            if self.token.is_cancelled() {
                return None;
            }
            match self.source.next() {
                None => break,
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(SeriesValue::Scalar(point))) => {
                    self.accumulator.observe(point.timestamp, point.value);
                }
                Some(Ok(SeriesValue::Array(array))) => {
                    for index in 0..array.len() {
                        if let Some(value) = array.value_at(index) {
                            self.accumulator.observe(array.start, value);
                        }
                    }
                }
                Some(Ok(other)) => {
                    return Some(Err(Error::type_error(format!(
                        "Expected numeric input, got {}",
                        other.kind()
                    ))));
                }
            }
        }

        self.accumulator
            .finalize(&self.entries)
            .map(|point| Ok(SeriesValue::Summary(point)))
    }
}

// ============================================================================
// Accumulator
// ============================================================================

/// Whole-series running statistics with permanent int-to-float promotion
struct SummaryAccumulator {
    infectious_nan: bool,
    first_ts: Option<TimeStamp>,
    total: i64,
    non_nan: i64,
    nan_seen: bool,
    promoted: bool,
    sum_int: i64,
    sum_float: f64,
    min: Option<NumericValue>,
    max: Option<NumericValue>,
    first: Option<NumericValue>,
    last: Option<NumericValue>,
}

impl SummaryAccumulator {
    fn new(infectious_nan: bool) -> Self {
        Self {
            infectious_nan,
            first_ts: None,
            total: 0,
            non_nan: 0,
            nan_seen: false,
            promoted: false,
            sum_int: 0,
            sum_float: 0.0,
            min: None,
            max: None,
            first: None,
            last: None,
        }
    }

    fn observe(&mut self, timestamp: TimeStamp, value: NumericValue) {
        // The output timestamp latches on the very first input, NaN or not
        if self.first_ts.is_none() {
            self.first_ts = Some(timestamp);
        }
        self.total += 1;

        if value.is_float() && !self.promoted {
            self.promoted = true;
            self.sum_float = self.sum_int as f64;
            self.sum_int = 0;
        }
        if value.is_nan() {
            self.nan_seen = true;
            return;
        }
        self.non_nan += 1;

        match value {
            NumericValue::Int(v) if !self.promoted => self.sum_int += v,
            other => self.sum_float += other.as_f64(),
        }
        if self.min.map_or(true, |m| value.as_f64() < m.as_f64()) {
            self.min = Some(value);
        }
        if self.max.map_or(true, |m| value.as_f64() > m.as_f64()) {
            self.max = Some(value);
        }
        if self.first.is_none() {
            self.first = Some(value);
        }
        self.last = Some(value);
    }

    fn sum_as_f64(&self) -> f64 {
        if self.promoted {
            self.sum_float
        } else {
            self.sum_int as f64
        }
    }

    /// Report a value with the accumulator's kind at finalization
    fn tagged(&self, value: NumericValue) -> NumericValue {
        if self.promoted {
            NumericValue::Float(value.as_f64())
        } else {
            value
        }
    }

    fn statistic(&self, aggregation: Aggregation) -> NumericValue {
        let infected = self.infectious_nan && self.nan_seen;
        let nan = NumericValue::Float(f64::NAN);
        match aggregation {
            Aggregation::Count => NumericValue::Int(if self.infectious_nan {
                self.total
            } else {
                self.non_nan
            }),
            Aggregation::Sum => {
                if infected || self.non_nan == 0 {
                    nan
                } else if self.promoted {
                    NumericValue::Float(self.sum_float)
                } else {
                    NumericValue::Int(self.sum_int)
                }
            }
            Aggregation::Avg => {
                if infected || self.non_nan == 0 {
                    nan
                } else {
                    NumericValue::Float(self.sum_as_f64() / self.non_nan as f64)
                }
            }
            Aggregation::Min => {
                if infected {
                    nan
                } else {
                    self.min.map(|v| self.tagged(v)).unwrap_or(nan)
                }
            }
            Aggregation::Max => {
                if infected {
                    nan
                } else {
                    self.max.map(|v| self.tagged(v)).unwrap_or(nan)
                }
            }
            Aggregation::First => {
                if infected {
                    nan
                } else {
                    self.first.map(|v| self.tagged(v)).unwrap_or(nan)
                }
            }
            Aggregation::Last => {
                if infected {
                    nan
                } else {
                    self.last.map(|v| self.tagged(v)).unwrap_or(nan)
                }
            }
        }
    }

    /// Emit the summary point, or `None` when no input was seen
    fn finalize(&self, entries: &[(Aggregation, u32)]) -> Option<SummaryPoint> {
        let timestamp = self.first_ts?;
        let mut point = SummaryPoint::new(timestamp);
        for &(aggregation, id) in entries {
            point.insert(id, self.statistic(aggregation));
        }
        Some(point)
    }
}
