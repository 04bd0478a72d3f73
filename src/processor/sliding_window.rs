//! Sliding-window aggregation node
//!
//! Computes an aggregation over a window that slides across the data
//! points of each series, e.g. a 5 minute moving average or a 10 minute
//! max. The first emission is the first data point at or after the query
//! start; each emitted value aggregates the source points in the
//! half-open window `(t - window, t]` for the current timestamp `t`, so
//! points before the query start participate in head windows without
//! being emitted themselves.
//!
//! The scalar iterator is single-pass: it admits the newest point on each
//! step and evicts points past the window's left edge. Min and max use a
//! monotonic deque for amortized O(1) steps; sum, avg and count keep a
//! running accumulator with subtract-on-leave, recomputed from the window
//! after a bounded number of evictions to cap floating-point drift.
//!
//! Array series are windowed by index, with element spacing taken from
//! the result's time specification; all other kinds pass through to the
//! source untouched.

use crate::error::{Error, Result};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::node::{NodeCore, NodeDescriptor, NodeFactory, QueryNode};
use crate::pipeline::result::{QueryResult, ResultView};
use crate::processor::Aggregation;
use crate::series::{SeriesIter, TimeSeries};
use crate::types::{TimeStamp, WindowDuration};
use crate::value::{
    ArrayBuilder, ArrayData, ArrayValue, NumericValue, ScalarPoint, SeriesValue, ValueKind,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

fn default_recompute_bound() -> usize {
    1024
}

// ============================================================================
// Config
// ============================================================================

/// Configuration for a sliding-window node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Window length as a duration string, e.g. "5m" or "1h"
    pub window: String,

    /// The aggregation applied to each window
    pub aggregator: Aggregation,

    /// When true, any NaN in a window makes the aggregate NaN (count
    /// excepted)
    #[serde(default, alias = "infectiousNan")]
    pub infectious_nan: bool,

    /// Evictions tolerated before the running accumulator is recomputed
    /// from the window
    #[serde(default = "default_recompute_bound")]
    pub recompute_bound: usize,

    /// Unique node id within the graph
    pub id: String,
}

// ============================================================================
// Node
// ============================================================================

/// The sliding-window node
///
/// Holds only immutable config; per-query state lives on the iterators,
/// so one node instance may serve results from parallel executions.
pub struct SlidingWindowNode {
    core: NodeCore,
    config: SlidingWindowConfig,
    window: WindowDuration,
}

impl SlidingWindowNode {
    /// Build a node, validating the window duration
    pub fn from_config(
        context: Arc<PipelineContext>,
        config: SlidingWindowConfig,
    ) -> Result<Arc<Self>> {
        let window = WindowDuration::parse(&config.window)?;
        Ok(Arc::new(Self {
            core: NodeCore::new(config.id.clone(), context),
            config,
            window,
        }))
    }

    /// The node config
    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    /// The parsed window duration
    pub fn window(&self) -> WindowDuration {
        self.window
    }
}

impl QueryNode for SlidingWindowNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn factory(&self) -> Arc<dyn NodeFactory> {
        Arc::new(SlidingWindowFactory)
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

/// Factory for [`SlidingWindowNode`]
pub struct SlidingWindowFactory;

impl NodeFactory for SlidingWindowFactory {
    fn kind(&self) -> &'static str {
        "sliding-window"
    }

    fn value_kinds(&self) -> &'static [ValueKind] {
        &[ValueKind::NumericScalar, ValueKind::NumericArray]
    }

    fn create(
        &self,
        context: Arc<PipelineContext>,
        descriptor: &NodeDescriptor,
    ) -> Result<Arc<dyn QueryNode>> {
        let config: SlidingWindowConfig = descriptor.config()?;
        let node = SlidingWindowNode::from_config(context, config)?;
        Ok(node)
    }

    fn new_typed_iterator(
        &self,
        kind: ValueKind,
        node: Arc<dyn QueryNode>,
        result: &dyn QueryResult,
        sources: Vec<Arc<dyn TimeSeries>>,
    ) -> Result<SeriesIter> {
        let sw = node
            .as_any()
            .downcast_ref::<SlidingWindowNode>()
            .ok_or_else(|| Error::config("Node is not a sliding-window node"))?;
        let source = sources
            .first()
            .ok_or_else(|| Error::config("Sliding window requires a source series"))?;
        let context = sw.core.context();
        let token = context.cancellation().clone();
        let query_start = context.query_start();
        let window_millis = sw.window.as_millis();

        match kind {
            ValueKind::NumericScalar => {
                let iter = source.iterator(ValueKind::NumericScalar).ok_or_else(|| {
                    Error::type_error("Source series does not expose NumericScalar")
                })?;
                Ok(Box::new(SlidingWindowScalarIter::new(
                    iter,
                    sw.config.aggregator,
                    sw.config.infectious_nan,
                    sw.config.recompute_bound,
                    window_millis,
                    query_start,
                    token,
                )))
            }
            ValueKind::NumericArray => {
                let iter = source.iterator(ValueKind::NumericArray).ok_or_else(|| {
                    Error::type_error("Source series does not expose NumericArray")
                })?;
                let interval = result
                    .time_specification()
                    .map(|spec| spec.interval_millis());
                Ok(Box::new(SlidingWindowArrayIter {
                    source: iter,
                    aggregator: sw.config.aggregator,
                    infectious_nan: sw.config.infectious_nan,
                    window_millis,
                    query_start,
                    interval_millis: interval,
                    token,
                    failed: false,
                }))
            }
            other => Err(Error::config(format!(
                "Sliding window does not handle '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Scalar Iterator
// ============================================================================

/// Single-pass rolling aggregate over scalar points
///
/// Restartable only by constructing a fresh iterator from the same
/// source.
struct SlidingWindowScalarIter {
    source: SeriesIter,
    aggregator: Aggregation,
    infectious_nan: bool,
    recompute_bound: usize,
    window_millis: i64,
    query_start: TimeStamp,
    token: CancellationToken,

    // Every in-window point, NaNs included; front is oldest
    window: VecDeque<ScalarPoint>,
    // Monotonic deques over non-NaN points; fronts hold the extremes
    min_deque: VecDeque<ScalarPoint>,
    max_deque: VecDeque<ScalarPoint>,
    // Running accumulator, integral until the first floating value
    sum_int: i64,
    sum_float: f64,
    promoted: bool,
    non_nan: usize,
    nan_in_window: usize,
    evictions: usize,

    last_ts: Option<TimeStamp>,
    failed: bool,
}

impl SlidingWindowScalarIter {
    fn new(
        source: SeriesIter,
        aggregator: Aggregation,
        infectious_nan: bool,
        recompute_bound: usize,
        window_millis: i64,
        query_start: TimeStamp,
        token: CancellationToken,
    ) -> Self {
        Self {
            source,
            aggregator,
            infectious_nan,
            recompute_bound,
            window_millis,
            query_start,
            token,
            window: VecDeque::new(),
            min_deque: VecDeque::new(),
            max_deque: VecDeque::new(),
            sum_int: 0,
            sum_float: 0.0,
            promoted: false,
            non_nan: 0,
            nan_in_window: 0,
            evictions: 0,
            last_ts: None,
            failed: false,
        }
    }

    fn admit(&mut self, point: ScalarPoint) {
        self.window.push_back(point);
        if point.value.is_nan() {
            self.nan_in_window += 1;
            return;
        }
        self.non_nan += 1;

        match point.value {
            NumericValue::Int(v) if !self.promoted => self.sum_int += v,
            NumericValue::Int(v) => self.sum_float += v as f64,
            NumericValue::Float(v) => {
                if !self.promoted {
                    self.promoted = true;
                    self.sum_float = self.sum_int as f64;
                    self.sum_int = 0;
                }
                self.sum_float += v;
            }
        }

        let v = point.value.as_f64();
        while self
            .min_deque
            .back()
            .is_some_and(|p| p.value.as_f64() >= v)
        {
            self.min_deque.pop_back();
        }
        self.min_deque.push_back(point);
        while self
            .max_deque
            .back()
            .is_some_and(|p| p.value.as_f64() <= v)
        {
            self.max_deque.pop_back();
        }
        self.max_deque.push_back(point);
    }

    /// Drop points at or before `current - window` (the window's left
    /// edge is exclusive)
    fn evict(&mut self, current: TimeStamp) {
        let left = current.epoch_millis() - self.window_millis;
        while let Some(front) = self.window.front().copied() {
            if front.timestamp.epoch_millis() > left {
                break;
            }
            self.window.pop_front();
            self.leave(front);
        }
        while self
            .min_deque
            .front()
            .is_some_and(|p| p.timestamp.epoch_millis() <= left)
        {
            self.min_deque.pop_front();
        }
        while self
            .max_deque
            .front()
            .is_some_and(|p| p.timestamp.epoch_millis() <= left)
        {
            self.max_deque.pop_front();
        }
    }

    fn leave(&mut self, point: ScalarPoint) {
        if point.value.is_nan() {
            self.nan_in_window -= 1;
            return;
        }
        self.non_nan -= 1;
        match point.value {
            NumericValue::Int(v) if !self.promoted => self.sum_int -= v,
            NumericValue::Int(v) => self.sum_float -= v as f64,
            NumericValue::Float(v) => self.sum_float -= v,
        }
        self.evictions += 1;
        if self.evictions > self.recompute_bound {
            self.recompute();
        }
    }

    /// Rebuild the accumulator from the window to shed accumulated error
    fn recompute(&mut self) {
        self.evictions = 0;
        if !self.promoted {
            return;
        }
        self.sum_float = self
            .window
            .iter()
            .filter(|p| !p.value.is_nan())
            .map(|p| p.value.as_f64())
            .sum();
    }

    fn sum_as_f64(&self) -> f64 {
        if self.promoted {
            self.sum_float
        } else {
            self.sum_int as f64
        }
    }

    /// Report a value with the accumulator's current kind
    fn tagged(&self, value: NumericValue) -> NumericValue {
        if self.promoted {
            NumericValue::Float(value.as_f64())
        } else {
            value
        }
    }

    fn aggregate(&self) -> NumericValue {
        let infected = self.infectious_nan && self.nan_in_window > 0;
        match self.aggregator {
            Aggregation::Count => NumericValue::Int(self.non_nan as i64),
            Aggregation::Sum => {
                if infected || self.non_nan == 0 {
                    NumericValue::Float(f64::NAN)
                } else if self.promoted {
                    NumericValue::Float(self.sum_float)
                } else {
                    NumericValue::Int(self.sum_int)
                }
            }
            Aggregation::Avg => {
                if infected || self.non_nan == 0 {
                    NumericValue::Float(f64::NAN)
                } else {
                    NumericValue::Float(self.sum_as_f64() / self.non_nan as f64)
                }
            }
            Aggregation::Min => match self.min_deque.front() {
                Some(point) if !infected => self.tagged(point.value),
                _ => NumericValue::Float(f64::NAN),
            },
            Aggregation::Max => match self.max_deque.front() {
                Some(point) if !infected => self.tagged(point.value),
                _ => NumericValue::Float(f64::NAN),
            },
            Aggregation::First => {
                if infected {
                    return NumericValue::Float(f64::NAN);
                }
                self.window
                    .iter()
                    .find(|p| !p.value.is_nan())
                    .map(|p| self.tagged(p.value))
                    .unwrap_or(NumericValue::Float(f64::NAN))
            }
            Aggregation::Last => {
                if infected {
                    return NumericValue::Float(f64::NAN);
                }
                self.window
                    .iter()
                    .rev()
                    .find(|p| !p.value.is_nan())
                    .map(|p| self.tagged(p.value))
                    .unwrap_or(NumericValue::Float(f64::NAN))
            }
        }
    }
}

impl Iterator for SlidingWindowScalarIter {
    type Item = Result<SeriesValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            // Cancelled iterators report end-of-stream, they do not raise
            if self.token.is_cancelled() {
                return None;
            }
            let point = match self.source.next()? {
                Ok(SeriesValue::Scalar(point)) => point,
                Ok(other) => {
                    self.failed = true;
                    return Some(Err(Error::type_error(format!(
                        "Expected scalar point, got {}",
                        other.kind()
                    ))));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            if let Some(last) = self.last_ts {
                if point.timestamp < last {
                    self.failed = true;
                    return Some(Err(Error::type_error(format!(
                        "Timestamps out of order: {} after {}",
                        point.timestamp, last
                    ))));
                }
            }
            self.last_ts = Some(point.timestamp);

            self.admit(point);
            self.evict(point.timestamp);

            // Points before the query start feed the window silently
            if point.timestamp >= self.query_start {
                return Some(Ok(SeriesValue::Scalar(ScalarPoint {
                    timestamp: point.timestamp,
                    value: self.aggregate(),
                })));
            }
        }
    }
}

// ============================================================================
// Array Iterator
// ============================================================================

/// Rolling aggregate over dense array runs, windowed by index
struct SlidingWindowArrayIter {
    source: SeriesIter,
    aggregator: Aggregation,
    infectious_nan: bool,
    window_millis: i64,
    query_start: TimeStamp,
    interval_millis: Option<i64>,
    token: CancellationToken,
    failed: bool,
}

impl Iterator for SlidingWindowArrayIter {
    type Item = Result<SeriesValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.token.is_cancelled() {
                return None;
            }
            let array = match self.source.next()? {
                Ok(SeriesValue::Array(array)) => array,
                Ok(other) => {
                    self.failed = true;
                    return Some(Err(Error::type_error(format!(
                        "Expected array run, got {}",
                        other.kind()
                    ))));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            let interval = match self.interval_millis {
                Some(interval) if interval > 0 => interval,
                _ => {
                    self.failed = true;
                    return Some(Err(Error::type_error(
                        "Array series requires a time specification interval",
                    )));
                }
            };

            // Slots reachable backwards while staying inside (t - w, t]
            let max_back = ((self.window_millis - 1) / interval) as usize;
            let start_millis = array.start.epoch_millis();
            let q = self.query_start.epoch_millis();
            let first = if q <= start_millis {
                0
            } else {
                (q - start_millis + interval - 1).div_euclid(interval) as usize
            };
            if first >= array.len() {
                continue;
            }

            let out_start = TimeStamp::from_millis(
                start_millis.saturating_add(interval.saturating_mul(first as i64)),
            );
            let mut builder = ArrayBuilder::new(out_start);
            for index in first..array.len() {
                let lo = index.saturating_sub(max_back);
                builder.push(aggregate_slice(
                    &array,
                    lo,
                    index,
                    self.aggregator,
                    self.infectious_nan,
                ));
            }
            return Some(Ok(SeriesValue::Array(builder.build())));
        }
    }
}

/// Aggregate the inclusive slot range `[lo, hi]` of an array run
fn aggregate_slice(
    array: &ArrayValue,
    lo: usize,
    hi: usize,
    aggregator: Aggregation,
    infectious_nan: bool,
) -> NumericValue {
    match &array.data {
        ArrayData::Int(values) => {
            let slice = &values[lo..=hi];
            match aggregator {
                Aggregation::Sum => NumericValue::Int(slice.iter().sum()),
                Aggregation::Min => NumericValue::Int(slice.iter().copied().fold(i64::MAX, i64::min)),
                Aggregation::Max => NumericValue::Int(slice.iter().copied().fold(i64::MIN, i64::max)),
                Aggregation::Count => NumericValue::Int(slice.len() as i64),
                Aggregation::Avg => NumericValue::Float(
                    slice.iter().sum::<i64>() as f64 / slice.len() as f64,
                ),
                Aggregation::First => NumericValue::Int(slice[0]),
                Aggregation::Last => NumericValue::Int(slice[slice.len() - 1]),
            }
        }
        ArrayData::Float(values) => {
            let slice = &values[lo..=hi];
            let infected = infectious_nan && slice.iter().any(|v| v.is_nan());
            let mut valid = slice.iter().copied().filter(|v| !v.is_nan());
            match aggregator {
                Aggregation::Count => {
                    NumericValue::Int(slice.iter().filter(|v| !v.is_nan()).count() as i64)
                }
                _ if infected => NumericValue::Float(f64::NAN),
                Aggregation::Sum => NumericValue::Float(fold_or_nan(valid, |a, b| a + b)),
                Aggregation::Min => NumericValue::Float(fold_or_nan(valid, f64::min)),
                Aggregation::Max => NumericValue::Float(fold_or_nan(valid, f64::max)),
                Aggregation::Avg => {
                    let count = slice.iter().filter(|v| !v.is_nan()).count();
                    if count == 0 {
                        NumericValue::Float(f64::NAN)
                    } else {
                        NumericValue::Float(
                            slice.iter().filter(|v| !v.is_nan()).sum::<f64>() / count as f64,
                        )
                    }
                }
                Aggregation::First => {
                    NumericValue::Float(valid.next().unwrap_or(f64::NAN))
                }
                Aggregation::Last => {
                    NumericValue::Float(valid.next_back().unwrap_or(f64::NAN))
                }
            }
        }
    }
}

fn fold_or_nan(values: impl Iterator<Item = f64>, f: impl Fn(f64, f64) -> f64) -> f64 {
    values.reduce(f).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::PipelineContext;
    use crate::pipeline::result::BaseResult;
    use crate::series::MemTimeSeries;
    use crate::series::ArrayTimeSeries;
    use crate::types::{TimeSeriesId, TimeSpecification};

    fn context_from(start_secs: i64) -> Arc<PipelineContext> {
        PipelineContext::builder()
            .start(TimeStamp::from_secs(start_secs))
            .build()
    }

    fn node(
        context: Arc<PipelineContext>,
        window: &str,
        aggregator: Aggregation,
        infectious_nan: bool,
    ) -> Arc<SlidingWindowNode> {
        SlidingWindowNode::from_config(
            context,
            SlidingWindowConfig {
                window: window.to_string(),
                aggregator,
                infectious_nan,
                recompute_bound: default_recompute_bound(),
                id: "sw".to_string(),
            },
        )
        .unwrap()
    }

    fn scalar_series(points: &[(i64, NumericValue)]) -> Arc<dyn TimeSeries> {
        Arc::new(MemTimeSeries::new(
            TimeSeriesId::metric("m"),
            points
                .iter()
                .map(|&(secs, value)| ScalarPoint::new(TimeStamp::from_secs(secs), value))
                .collect(),
        ))
    }

    fn run_scalar(
        node: Arc<SlidingWindowNode>,
        series: Arc<dyn TimeSeries>,
    ) -> Vec<(i64, NumericValue)> {
        let result = BaseResult::builder("store", 0).build();
        let iter = SlidingWindowFactory
            .new_typed_iterator(ValueKind::NumericScalar, node, &result, vec![series])
            .unwrap();
        iter.map(|item| match item.unwrap() {
            SeriesValue::Scalar(p) => (p.timestamp.epoch(), p.value),
            other => panic!("expected scalar, got {:?}", other),
        })
        .collect()
    }

    #[test]
    fn test_integer_sum_growing_then_sliding() {
        // Six points one second apart, all 1; a 5 second window saturates
        // at five contributing points
        let points: Vec<_> = (1..=6).map(|t| (t, NumericValue::Int(1))).collect();
        let node = node(context_from(1), "5s", Aggregation::Sum, false);
        let emitted = run_scalar(node, scalar_series(&points));
        assert_eq!(
            emitted,
            vec![
                (1, NumericValue::Int(1)),
                (2, NumericValue::Int(2)),
                (3, NumericValue::Int(3)),
                (4, NumericValue::Int(4)),
                (5, NumericValue::Int(5)),
                (6, NumericValue::Int(5)),
            ]
        );
    }

    #[test]
    fn test_points_before_query_start_feed_head_windows() {
        let points = [
            (0, NumericValue::Int(10)),
            (60, NumericValue::Int(20)),
            (120, NumericValue::Int(30)),
        ];
        let node = node(context_from(60), "5m", Aggregation::Sum, false);
        let emitted = run_scalar(node, scalar_series(&points));
        // t=0 is not emitted but contributes to both windows
        assert_eq!(
            emitted,
            vec![(60, NumericValue::Int(30)), (120, NumericValue::Int(60))]
        );
    }

    #[test]
    fn test_window_left_edge_is_exclusive() {
        let points = [
            (0, NumericValue::Int(5)),
            (5, NumericValue::Int(7)),
        ];
        let node = node(context_from(0), "5s", Aggregation::Sum, false);
        let emitted = run_scalar(node, scalar_series(&points));
        // (0, 5] excludes the point at t=0 exactly window width back
        assert_eq!(
            emitted,
            vec![(0, NumericValue::Int(5)), (5, NumericValue::Int(7))]
        );
    }

    #[test]
    fn test_min_max_monotonic_deque() {
        let points = [
            (1, NumericValue::Int(3)),
            (2, NumericValue::Int(9)),
            (3, NumericValue::Int(1)),
            (4, NumericValue::Int(4)),
            (5, NumericValue::Int(8)),
            (6, NumericValue::Int(2)),
        ];
        let ctx = context_from(1);
        let min_node = node(ctx.clone(), "3s", Aggregation::Min, false);
        let emitted = run_scalar(min_node, scalar_series(&points));
        assert_eq!(
            emitted.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            vec![
                NumericValue::Int(3),
                NumericValue::Int(3),
                NumericValue::Int(1),
                NumericValue::Int(1),
                NumericValue::Int(1),
                NumericValue::Int(2),
            ]
        );

        let max_node = node(ctx, "3s", Aggregation::Max, false);
        let emitted = run_scalar(max_node, scalar_series(&points));
        assert_eq!(
            emitted.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            vec![
                NumericValue::Int(3),
                NumericValue::Int(9),
                NumericValue::Int(9),
                NumericValue::Int(9),
                NumericValue::Int(8),
                NumericValue::Int(8),
            ]
        );
    }

    #[test]
    fn test_avg_and_count() {
        let points = [
            (1, NumericValue::Int(2)),
            (2, NumericValue::Int(4)),
            (3, NumericValue::Int(9)),
        ];
        let ctx = context_from(1);
        let avg = run_scalar(node(ctx.clone(), "2s", Aggregation::Avg, false), scalar_series(&points));
        assert_eq!(avg[0].1, NumericValue::Float(2.0));
        assert_eq!(avg[1].1, NumericValue::Float(3.0));
        assert_eq!(avg[2].1, NumericValue::Float(6.5));

        let count = run_scalar(node(ctx, "2s", Aggregation::Count, false), scalar_series(&points));
        assert_eq!(count[2].1, NumericValue::Int(2));
    }

    #[test]
    fn test_mixed_types_promote_to_float() {
        let points = [
            (1, NumericValue::Int(2)),
            (2, NumericValue::Float(0.5)),
            (3, NumericValue::Int(3)),
        ];
        let emitted = run_scalar(
            node(context_from(1), "10s", Aggregation::Sum, false),
            scalar_series(&points),
        );
        assert_eq!(emitted[0].1, NumericValue::Int(2));
        assert_eq!(emitted[1].1, NumericValue::Float(2.5));
        // Promotion is permanent even though the new point is integral
        assert_eq!(emitted[2].1, NumericValue::Float(5.5));
    }

    #[test]
    fn test_nan_skipped_by_default() {
        let points = [
            (1, NumericValue::Float(2.0)),
            (2, NumericValue::Float(f64::NAN)),
            (3, NumericValue::Float(4.0)),
        ];
        let ctx = context_from(1);
        let sum = run_scalar(node(ctx.clone(), "10s", Aggregation::Sum, false), scalar_series(&points));
        assert_eq!(sum[1].1, NumericValue::Float(2.0));
        assert_eq!(sum[2].1, NumericValue::Float(6.0));

        let count = run_scalar(node(ctx, "10s", Aggregation::Count, false), scalar_series(&points));
        assert_eq!(count[2].1, NumericValue::Int(2));
    }

    #[test]
    fn test_nan_infectious() {
        let points = [
            (1, NumericValue::Float(2.0)),
            (2, NumericValue::Float(f64::NAN)),
            (3, NumericValue::Float(4.0)),
        ];
        let ctx = context_from(1);
        let sum = run_scalar(node(ctx.clone(), "2s", Aggregation::Sum, true), scalar_series(&points));
        assert_eq!(sum[0].1, NumericValue::Float(2.0));
        assert!(matches!(sum[1].1, NumericValue::Float(v) if v.is_nan()));
        // The NaN at t=2 is still inside the (1, 3] window
        assert!(matches!(sum[2].1, NumericValue::Float(v) if v.is_nan()));

        // Count stays a plain non-NaN count under either policy
        let count = run_scalar(node(ctx, "2s", Aggregation::Count, true), scalar_series(&points));
        assert_eq!(count[1].1, NumericValue::Int(1));
    }

    #[test]
    fn test_first_and_last() {
        let points = [
            (1, NumericValue::Int(7)),
            (2, NumericValue::Int(8)),
            (3, NumericValue::Int(9)),
        ];
        let ctx = context_from(1);
        let first = run_scalar(node(ctx.clone(), "2s", Aggregation::First, false), scalar_series(&points));
        assert_eq!(
            first.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            vec![NumericValue::Int(7), NumericValue::Int(7), NumericValue::Int(8)]
        );
        let last = run_scalar(node(ctx, "2s", Aggregation::Last, false), scalar_series(&points));
        assert_eq!(last[2].1, NumericValue::Int(9));
    }

    #[test]
    fn test_running_sum_recompute_matches_window() {
        // A tiny recompute bound forces the drift guard on nearly every
        // eviction; results must match the straightforward window sum
        let points: Vec<_> = (1..200)
            .map(|t| (t, NumericValue::Float(0.1 * t as f64)))
            .collect();
        let context = context_from(1);
        let node = SlidingWindowNode::from_config(
            context,
            SlidingWindowConfig {
                window: "10s".to_string(),
                aggregator: Aggregation::Sum,
                infectious_nan: false,
                recompute_bound: 4,
                id: "sw".to_string(),
            },
        )
        .unwrap();
        let emitted = run_scalar(node, scalar_series(&points));
        for (t, value) in &emitted {
            let expected: f64 = points
                .iter()
                .filter(|(pt, _)| *pt > t - 10 && pt <= t)
                .map(|(_, v)| v.as_f64())
                .sum();
            assert!((value.as_f64() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_out_of_order_timestamps_raise_type_error() {
        let points = [
            (5, NumericValue::Int(1)),
            (3, NumericValue::Int(1)),
        ];
        let node = node(context_from(0), "5s", Aggregation::Sum, false);
        let result = BaseResult::builder("store", 0).build();
        let mut iter = SlidingWindowFactory
            .new_typed_iterator(
                ValueKind::NumericScalar,
                node,
                &result,
                vec![scalar_series(&points)],
            )
            .unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(iter.next().unwrap(), Err(Error::Type(_))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_cancelled_iterator_reports_end_of_stream() {
        let points: Vec<_> = (1..=3).map(|t| (t, NumericValue::Int(1))).collect();
        let context = context_from(1);
        let node = node(context.clone(), "5s", Aggregation::Sum, false);
        let result = BaseResult::builder("store", 0).build();
        let mut iter = SlidingWindowFactory
            .new_typed_iterator(
                ValueKind::NumericScalar,
                node,
                &result,
                vec![scalar_series(&points)],
            )
            .unwrap();
        assert!(iter.next().is_some());
        context.cancel();
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_array_windowing() {
        let context = context_from(0);
        let node = node(context, "5s", Aggregation::Sum, false);
        let series: Arc<dyn TimeSeries> = Arc::new(ArrayTimeSeries::new(
            TimeSeriesId::metric("m"),
            ArrayValue::new(
                TimeStamp::from_secs(1),
                ArrayData::Int(vec![1, 1, 1, 1, 1, 1]),
            ),
        ));
        let result = BaseResult::builder("store", 0)
            .time_specification(TimeSpecification::new(
                TimeStamp::from_secs(1),
                TimeStamp::from_secs(7),
                WindowDuration::parse("1s").unwrap(),
            ))
            .build();
        let mut iter = SlidingWindowFactory
            .new_typed_iterator(ValueKind::NumericArray, node, &result, vec![series])
            .unwrap();
        match iter.next().unwrap().unwrap() {
            SeriesValue::Array(array) => {
                assert_eq!(array.start.epoch(), 1);
                assert_eq!(array.data, ArrayData::Int(vec![1, 2, 3, 4, 5, 5]));
            }
            other => panic!("expected array, got {:?}", other),
        }
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_array_first_emitted_index_respects_query_start() {
        let context = context_from(3);
        let node = node(context, "2s", Aggregation::Sum, false);
        let series: Arc<dyn TimeSeries> = Arc::new(ArrayTimeSeries::new(
            TimeSeriesId::metric("m"),
            ArrayValue::new(TimeStamp::from_secs(0), ArrayData::Int(vec![1, 2, 3, 4, 5])),
        ));
        let result = BaseResult::builder("store", 0)
            .time_specification(TimeSpecification::new(
                TimeStamp::from_secs(0),
                TimeStamp::from_secs(5),
                WindowDuration::parse("1s").unwrap(),
            ))
            .build();
        let mut iter = SlidingWindowFactory
            .new_typed_iterator(ValueKind::NumericArray, node, &result, vec![series])
            .unwrap();
        match iter.next().unwrap().unwrap() {
            SeriesValue::Array(array) => {
                // First slot at or past t=3 is index 3; windows reach back
                // two slots
                assert_eq!(array.start.epoch(), 3);
                assert_eq!(array.data, ArrayData::Int(vec![7, 9]));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_array_without_interval_is_type_error() {
        let context = context_from(0);
        let node = node(context, "5s", Aggregation::Sum, false);
        let series: Arc<dyn TimeSeries> = Arc::new(ArrayTimeSeries::new(
            TimeSeriesId::metric("m"),
            ArrayValue::new(TimeStamp::from_secs(0), ArrayData::Int(vec![1, 2])),
        ));
        let result = BaseResult::builder("store", 0).build();
        let mut iter = SlidingWindowFactory
            .new_typed_iterator(ValueKind::NumericArray, node, &result, vec![series])
            .unwrap();
        assert!(matches!(iter.next().unwrap(), Err(Error::Type(_))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_config_from_descriptor() {
        let descriptor = NodeDescriptor::parse(
            r#"{"kind": "sliding-window", "id": "sw1", "window": "5m", "aggregator": "avg"}"#,
        )
        .unwrap();
        let context = context_from(0);
        let node = SlidingWindowFactory.create(context, &descriptor).unwrap();
        assert_eq!(node.id(), "sw1");
        let sw = node.as_any().downcast_ref::<SlidingWindowNode>().unwrap();
        assert_eq!(sw.window().as_millis(), 300_000);
        assert_eq!(sw.config().aggregator, Aggregation::Avg);
        assert!(!sw.config().infectious_nan);
    }

    #[test]
    fn test_bad_window_is_config_error() {
        let descriptor = NodeDescriptor::parse(
            r#"{"kind": "sliding-window", "id": "sw1", "window": "fast", "aggregator": "sum"}"#,
        )
        .unwrap();
        let err = SlidingWindowFactory
            .create(context_from(0), &descriptor)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
