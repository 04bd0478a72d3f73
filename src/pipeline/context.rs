//! Per-query pipeline context
//!
//! One [`PipelineContext`] is shared by every node in a single query
//! execution. It carries the node-factory registry, the clock used when
//! the query has no explicit end time, the cancellation token consulted by
//! long-running iterators, and the query's time bounds.

use crate::pipeline::registry::Registry;
use crate::types::TimeStamp;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Source of "now" for queries without an explicit end time
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> TimeStamp;
}

/// Wall clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp {
        TimeStamp::from_millis(chrono::Utc::now().timestamp_millis())
    }
}

/// A clock pinned to a fixed instant, for deterministic tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub TimeStamp);

impl Clock for FixedClock {
    fn now(&self) -> TimeStamp {
        self.0
    }
}

/// The query's time bounds
///
/// The start is required; when the end is absent the context's clock
/// supplies the current time on demand.
#[derive(Debug, Clone, Copy)]
pub struct QueryBounds {
    /// Query start (inclusive)
    pub start: TimeStamp,
    /// Query end, or `None` for "now"
    pub end: Option<TimeStamp>,
}

/// Shared state for one query execution
pub struct PipelineContext {
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    token: CancellationToken,
    bounds: QueryBounds,
}

impl PipelineContext {
    /// Start building a context
    pub fn builder() -> PipelineContextBuilder {
        PipelineContextBuilder::default()
    }

    /// The node-factory registry for this execution
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The clock supplying "now"
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The cancellation token shared by all nodes and iterators
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the execution
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the execution has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Query start time
    pub fn query_start(&self) -> TimeStamp {
        self.bounds.start
    }

    /// Query end time, defaulted from the clock when absent
    pub fn query_end(&self) -> TimeStamp {
        self.bounds.end.unwrap_or_else(|| self.clock.now())
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("bounds", &self.bounds)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Builder for [`PipelineContext`]
pub struct PipelineContextBuilder {
    registry: Option<Arc<Registry>>,
    clock: Arc<dyn Clock>,
    token: CancellationToken,
    bounds: QueryBounds,
}

impl Default for PipelineContextBuilder {
    fn default() -> Self {
        Self {
            registry: None,
            clock: Arc::new(SystemClock),
            token: CancellationToken::new(),
            bounds: QueryBounds {
                start: TimeStamp::from_millis(0),
                end: None,
            },
        }
    }
}

impl PipelineContextBuilder {
    /// Use a specific registry (defaults to [`Registry::with_defaults`])
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a specific clock (defaults to [`SystemClock`])
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use an externally owned cancellation token
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Set the query start time
    pub fn start(mut self, start: TimeStamp) -> Self {
        self.bounds.start = start;
        self
    }

    /// Set an explicit query end time
    pub fn end(mut self, end: TimeStamp) -> Self {
        self.bounds.end = Some(end);
        self
    }

    /// Build the context
    pub fn build(self) -> Arc<PipelineContext> {
        Arc::new(PipelineContext {
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(Registry::with_defaults())),
            clock: self.clock,
            token: self.token,
            bounds: self.bounds,
        })
    }
}
