//! Pipeline execution model
//!
//! A query is a DAG of [`QueryNode`]s. Leaves read from a data store and
//! push [`QueryResult`]s downstream; interior nodes wrap each result in a
//! [`ResultView`] whose series compute lazily when a downstream consumer
//! pulls points. Completion and errors propagate along the same edges.
//!
//! Scheduling is single-threaded cooperative per execution: upstream
//! nodes invoke downstream `on_next` synchronously on the caller's
//! thread. Separate executions may run in parallel on different threads,
//! which is why nodes keep per-query state on iterators and views rather
//! than on themselves.

pub mod context;
pub mod node;
pub mod registry;
pub mod result;
pub mod sink;

pub use context::{Clock, FixedClock, PipelineContext, PipelineContextBuilder, QueryBounds, SystemClock};
pub use node::{wire, NodeCore, NodeDescriptor, NodeFactory, QueryNode};
pub use registry::Registry;
pub use result::{BaseResult, BaseResultBuilder, ProjectedSeries, QueryResult, ResultView};
pub use sink::{CollectorFactory, CollectorNode};
