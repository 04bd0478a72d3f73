//! tsflow - Streaming time-series query pipeline
//!
//! A query is a directed acyclic graph of processing nodes: leaf nodes
//! read raw series from a data store and interior nodes transform results
//! in flight. Interior nodes never copy points; they wrap each upstream
//! result in a view whose series project lazily, so point-level work only
//! happens when a downstream consumer pulls from an iterator.
//!
//! Built-in transforms:
//! - **Sliding window**: rolling aggregate over a fixed time window per
//!   series (moving average, windowed max, ...)
//! - **Summarizer**: whole-series reduction to one multi-statistic point
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tsflow::pipeline::{wire, CollectorNode, NodeDescriptor, PipelineContext};
//! use tsflow::series::MemTimeSeries;
//! use tsflow::storage::{DataStore, MemBatch, MemDataStore};
//! use tsflow::types::{TimeSeriesId, TimeStamp};
//! use tsflow::value::ScalarPoint;
//!
//! let context = PipelineContext::builder()
//!     .start(TimeStamp::from_secs(0))
//!     .end(TimeStamp::from_secs(600))
//!     .build();
//!
//! // store -> 5 minute moving sum -> collector
//! let descriptor = NodeDescriptor::parse(
//!     r#"{"kind": "sliding-window", "id": "sw", "window": "5m", "aggregator": "sum"}"#,
//! ).unwrap();
//! let window = context.registry()
//!     .create_node(context.clone(), &descriptor).unwrap();
//! let sink = CollectorNode::shared("out", context.clone());
//! wire(&window, sink.clone());
//!
//! let store = MemDataStore::new("mem");
//! store.push_batch(MemBatch {
//!     series: vec![Arc::new(MemTimeSeries::new(
//!         TimeSeriesId::metric("cpu.usage"),
//!         vec![ScalarPoint::new(TimeStamp::from_secs(0), 42i64)],
//!     ))],
//!     ..Default::default()
//! });
//! store.execute(window).unwrap();
//!
//! assert_eq!(sink.results().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod pipeline;
pub mod processor;
pub mod rollup;
pub mod series;
pub mod storage;
pub mod types;
pub mod value;

// Re-export main types
pub use error::{Error, Result};
pub use pipeline::{
    NodeDescriptor, NodeFactory, PipelineContext, QueryNode, QueryResult, Registry, ResultView,
};
pub use rollup::RollupConfig;
pub use series::TimeSeries;
pub use types::{TimeSeriesId, TimeSpecification, TimeStamp, TimeUnit, WindowDuration};
pub use value::{NumericValue, ScalarPoint, SeriesValue, ValueKind};
