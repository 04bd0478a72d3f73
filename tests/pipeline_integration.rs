//! Integration tests for the streaming query pipeline
//!
//! These tests drive complete graphs end-to-end:
//! - Store -> sliding window -> summarizer -> collector
//! - Metadata preservation and sequence ordering across wrapping nodes
//! - Pass-through of kinds a node does not transform
//! - Error and completion propagation
//! - Cancellation mid-stream

use std::any::Any;
use std::sync::Arc;

use tsflow::pipeline::{
    wire, CollectorFactory, CollectorNode, NodeCore, NodeDescriptor, NodeFactory, PipelineContext,
    QueryNode, QueryResult,
};
use tsflow::rollup::RollupConfig;
use tsflow::series::{MemTimeSeries, SummaryTimeSeries, TimeSeries};
use tsflow::storage::{DataStore, MemBatch, MemDataStore, MemDataStoreFactory};
use tsflow::types::{TimeSeriesId, TimeStamp, TimeUnit};
use tsflow::value::{NumericValue, ScalarPoint, SeriesValue, SummaryPoint, ValueKind};
use tsflow::Error;

// ============================================================================
// Helper Functions
// ============================================================================

fn context(start_secs: i64) -> Arc<PipelineContext> {
    PipelineContext::builder()
        .start(TimeStamp::from_secs(start_secs))
        .end(TimeStamp::from_secs(start_secs + 3600))
        .build()
}

fn rollup() -> Arc<RollupConfig> {
    Arc::new(
        RollupConfig::builder()
            .aggregation_id("sum", 0)
            .aggregation_id("count", 1)
            .aggregation_id("max", 2)
            .aggregation_id("min", 3)
            .aggregation_id("avg", 5)
            .build(),
    )
}

fn int_series(metric: &str, points: &[(i64, i64)]) -> Arc<dyn TimeSeries> {
    Arc::new(MemTimeSeries::new(
        TimeSeriesId::metric(metric),
        points
            .iter()
            .map(|&(secs, value)| ScalarPoint::new(TimeStamp::from_secs(secs), value))
            .collect(),
    ))
}

fn create(context: &Arc<PipelineContext>, json: &str) -> Arc<dyn QueryNode> {
    let descriptor = NodeDescriptor::parse(json).unwrap();
    context
        .registry()
        .create_node(Arc::clone(context), &descriptor)
        .unwrap()
}

fn scalar_values(series: &Arc<dyn TimeSeries>) -> Vec<(i64, NumericValue)> {
    series
        .iterator(ValueKind::NumericScalar)
        .expect("scalar iterator")
        .map(|item| match item.unwrap() {
            SeriesValue::Scalar(p) => (p.timestamp.epoch(), p.value),
            other => panic!("expected scalar, got {:?}", other),
        })
        .collect()
}

// ============================================================================
// End-To-End Pipelines
// ============================================================================

#[test]
fn test_store_window_summarizer_chain() {
    let ctx = context(0);
    let window = create(
        &ctx,
        r#"{"kind": "sliding-window", "id": "sw", "window": "5m", "aggregator": "sum"}"#,
    );
    let summarizer = create(
        &ctx,
        r#"{"kind": "summarizer", "id": "summary", "summaries": ["sum", "avg", "max", "min", "count"]}"#,
    );
    let sink = CollectorNode::shared("out", ctx.clone());
    wire(&window, summarizer.clone());
    wire(&summarizer, sink.clone());

    let store = MemDataStore::new("mem");
    store.push_batch(MemBatch {
        series: vec![int_series(
            "cpu.usage",
            &[(0, 42), (60, 24), (120, -8), (240, 1)],
        )],
        rollup_config: Some(rollup()),
        resolution: Some(TimeUnit::Seconds),
        ..Default::default()
    });
    store.execute(Arc::clone(&window)).unwrap();

    let results = sink.results();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    // Metadata is delegated through both wrapping views
    assert_eq!(result.source(), "summary");
    assert_eq!(result.sequence_id(), 0);
    assert_eq!(result.resolution(), TimeUnit::Seconds);
    assert!(result.rollup_config().is_some());

    let series = &result.time_series()[0];
    assert_eq!(
        series.kinds(),
        vec![ValueKind::NumericScalar, ValueKind::NumericSummary]
    );
    let mut iter = series.iterator(ValueKind::NumericSummary).unwrap();
    let point = match iter.next().unwrap().unwrap() {
        SeriesValue::Summary(point) => point,
        other => panic!("expected summary, got {:?}", other),
    };
    assert!(iter.next().is_none());

    // Windowed sums are 42, 66, 58, 59; the summarizer reduces those
    assert_eq!(point.timestamp.epoch(), 0);
    assert_eq!(point.value(0), Some(NumericValue::Int(225)));
    assert_eq!(point.value(1), Some(NumericValue::Int(4)));
    assert_eq!(point.value(2), Some(NumericValue::Int(66)));
    assert_eq!(point.value(3), Some(NumericValue::Int(42)));
    assert!((point.value(5).unwrap().as_f64() - 56.25).abs() < 1e-3);

    // Scalars are a kind the summarizer does not handle: the projection
    // hands back the windowed source series bit-identical
    assert_eq!(
        scalar_values(series),
        vec![
            (0, NumericValue::Int(42)),
            (60, NumericValue::Int(66)),
            (120, NumericValue::Int(58)),
            (240, NumericValue::Int(59)),
        ]
    );
}

#[test]
fn test_window_results_stream_per_sequence() {
    let ctx = context(0);
    let window = create(
        &ctx,
        r#"{"kind": "sliding-window", "id": "sw", "window": "2m", "aggregator": "avg"}"#,
    );
    let sink = CollectorNode::shared("out", ctx.clone());
    wire(&window, sink.clone());

    let store = MemDataStore::new("mem");
    store.push_batch(MemBatch {
        series: vec![int_series("m", &[(0, 2), (60, 4)])],
        ..Default::default()
    });
    store.push_batch(MemBatch {
        series: vec![int_series("m", &[(300, 8), (360, 10)])],
        ..Default::default()
    });
    store.execute(Arc::clone(&window)).unwrap();

    let results = sink.results();
    assert_eq!(results.len(), 2);
    // Sequence ids strictly increase across a single upstream
    assert!(results[0].sequence_id() < results[1].sequence_id());
    assert_eq!(sink.completions(), vec![("sw".to_string(), 1, 2)]);

    let first = scalar_values(&results[0].time_series()[0]);
    assert_eq!(
        first,
        vec![
            (0, NumericValue::Float(2.0)),
            (60, NumericValue::Float(3.0)),
        ]
    );
    let second = scalar_values(&results[1].time_series()[0]);
    assert_eq!(
        second,
        vec![
            (300, NumericValue::Float(8.0)),
            (360, NumericValue::Float(9.0)),
        ]
    );
}

#[test]
fn test_fan_out_delivers_to_every_downstream() {
    let ctx = context(0);
    let window = create(
        &ctx,
        r#"{"kind": "sliding-window", "id": "sw", "window": "1m", "aggregator": "max"}"#,
    );
    let left = CollectorNode::shared("left", ctx.clone());
    let right = CollectorNode::shared("right", ctx.clone());
    wire(&window, left.clone());
    wire(&window, right.clone());

    let store = MemDataStore::new("mem");
    store.push_batch(MemBatch {
        series: vec![int_series("m", &[(0, 1)])],
        ..Default::default()
    });
    store.execute(window).unwrap();

    assert_eq!(left.results().len(), 1);
    assert_eq!(right.results().len(), 1);
    assert_eq!(left.completions(), right.completions());
}

// ============================================================================
// Pass-Through
// ============================================================================

#[test]
fn test_unhandled_kind_passes_through_bit_identical() {
    let ctx = context(0);
    let window = create(
        &ctx,
        r#"{"kind": "sliding-window", "id": "sw", "window": "5m", "aggregator": "sum"}"#,
    );
    let sink = CollectorNode::shared("out", ctx.clone());
    wire(&window, sink.clone());

    let mut a = SummaryPoint::new(TimeStamp::from_secs(0));
    a.insert(0, 10i64);
    a.insert(2, 3.5);
    let mut b = SummaryPoint::new(TimeStamp::from_secs(60));
    b.insert(0, 20i64);
    let source: Arc<dyn TimeSeries> = Arc::new(SummaryTimeSeries::new(
        TimeSeriesId::metric("preaggregated"),
        vec![a, b],
    ));

    let store = MemDataStore::new("mem");
    store.push_batch(MemBatch {
        series: vec![Arc::clone(&source)],
        rollup_config: Some(rollup()),
        ..Default::default()
    });
    store.execute(Arc::clone(&window)).unwrap();

    let results = sink.results();
    let projected = &results[0].time_series()[0];
    // The sliding window does not transform summaries
    assert_eq!(projected.kinds(), vec![ValueKind::NumericSummary]);

    let through: Vec<_> = projected
        .iterator(ValueKind::NumericSummary)
        .unwrap()
        .map(|item| item.unwrap())
        .collect();
    let original: Vec<_> = source
        .iterator(ValueKind::NumericSummary)
        .unwrap()
        .map(|item| item.unwrap())
        .collect();
    assert_eq!(through, original);

    // And an unknown kind stays absent
    assert!(projected.iterator(ValueKind::NumericArray).is_none());
}

// ============================================================================
// Error Propagation
// ============================================================================

#[test]
fn test_upstream_error_latches_and_completion_still_flows() {
    let ctx = context(0);
    let window = create(
        &ctx,
        r#"{"kind": "sliding-window", "id": "sw", "window": "1m", "aggregator": "sum"}"#,
    );
    let sink = CollectorNode::shared("out", ctx.clone());
    wire(&window, sink.clone());

    window.on_error(Error::upstream("mem", "backend exploded"));

    // Deliveries after the error are dropped by the node
    let store = MemDataStore::new("mem");
    store.push_batch(MemBatch {
        series: vec![int_series("m", &[(0, 1)])],
        ..Default::default()
    });
    store.execute(Arc::clone(&window)).unwrap();

    assert!(sink.results().is_empty());
    assert_eq!(
        sink.errors(),
        vec![Error::upstream("mem", "backend exploded")]
    );
    // The store's completion is still forwarded downstream
    assert_eq!(sink.completions(), vec![("sw".to_string(), 0, 1)]);
}

#[test]
fn test_iteration_error_surfaces_on_offending_next() {
    let ctx = context(0);
    let window = create(
        &ctx,
        r#"{"kind": "sliding-window", "id": "sw", "window": "1m", "aggregator": "sum"}"#,
    );
    let sink = CollectorNode::shared("out", ctx.clone());
    wire(&window, sink.clone());

    let store = MemDataStore::new("mem");
    store.push_batch(MemBatch {
        // Timestamps regress: the invariant violation surfaces lazily
        series: vec![int_series("m", &[(120, 1), (60, 2)])],
        ..Default::default()
    });
    store.execute(Arc::clone(&window)).unwrap();

    let results = sink.results();
    let mut iter = results[0].time_series()[0]
        .iterator(ValueKind::NumericScalar)
        .unwrap();
    assert!(iter.next().unwrap().is_ok());
    assert!(matches!(iter.next().unwrap(), Err(Error::Type(_))));
    assert!(iter.next().is_none());
}

// ============================================================================
// Cancellation
// ============================================================================

/// Forwards results and cancels the execution after the first one
struct CancelAfterFirst {
    core: NodeCore,
}

impl QueryNode for CancelAfterFirst {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn factory(&self) -> Arc<dyn NodeFactory> {
        Arc::new(CollectorFactory)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn on_next(self: Arc<Self>, result: Arc<dyn QueryResult>) {
        if !self.core.accepts_results() {
            return;
        }
        self.core.send_downstream(result);
        self.core.context().cancel();
    }
}

#[test]
fn test_cancellation_drops_pending_batches() {
    let ctx = context(0);
    let canceller: Arc<dyn QueryNode> = Arc::new(CancelAfterFirst {
        core: NodeCore::new("canceller", ctx.clone()),
    });
    let sink = CollectorNode::shared("out", ctx.clone());
    wire(&canceller, sink.clone());

    let store = MemDataStore::new("mem");
    for _ in 0..3 {
        store.push_batch(MemBatch {
            series: vec![int_series("m", &[(0, 1)])],
            ..Default::default()
        });
    }
    store.execute(canceller).unwrap();

    // Only the first batch made it through before cancellation
    assert_eq!(sink.results().len(), 1);
    // The store stops delivering and announces what it actually delivered
    assert_eq!(sink.completions(), vec![("canceller".to_string(), 0, 1)]);
}

// ============================================================================
// Factory Plumbing
// ============================================================================

#[test]
fn test_store_factory_reuses_one_instance() {
    let factory = MemDataStoreFactory::new();
    let first = factory.open_mem("mem");
    first.push_batch(MemBatch::default());
    let second = factory.open_mem("mem");
    assert_eq!(second.len(), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_registry_rejects_unknown_kind() {
    let ctx = context(0);
    let descriptor = NodeDescriptor::parse(r#"{"kind": "downsample", "id": "d"}"#).unwrap();
    let err = ctx
        .registry()
        .create_node(ctx.clone(), &descriptor)
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
