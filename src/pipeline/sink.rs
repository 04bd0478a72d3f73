//! Terminal collector node
//!
//! A [`CollectorNode`] sits at the downstream edge of a graph and records
//! everything pushed into it: results, completion announcements, and
//! errors. Serialization sinks live outside the core; this collector is
//! the in-process stand-in used to drive pipelines and assert on their
//! output.

use crate::error::{Error, Result};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::node::{NodeCore, NodeDescriptor, NodeFactory, QueryNode};
use crate::pipeline::result::QueryResult;
use crate::series::{SeriesIter, TimeSeries};
use crate::value::ValueKind;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// Records every delivery from its upstreams
pub struct CollectorNode {
    core: NodeCore,
    results: Mutex<Vec<Arc<dyn QueryResult>>>,
    completions: Mutex<Vec<(String, u64, u64)>>,
    errors: Mutex<Vec<Error>>,
}

impl CollectorNode {
    /// Create a shared collector
    pub fn shared(id: impl Into<String>, context: Arc<PipelineContext>) -> Arc<Self> {
        Arc::new(Self {
            core: NodeCore::new(id, context),
            results: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        })
    }

    /// Results received so far
    pub fn results(&self) -> Vec<Arc<dyn QueryResult>> {
        self.results.lock().clone()
    }

    /// Completion announcements as (upstream, final_sequence, total_sequences)
    pub fn completions(&self) -> Vec<(String, u64, u64)> {
        self.completions.lock().clone()
    }

    /// Errors received so far
    pub fn errors(&self) -> Vec<Error> {
        self.errors.lock().clone()
    }
}

impl QueryNode for CollectorNode {
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
        self.results.lock().push(result);
    }

    fn on_complete(&self, upstream: &str, final_sequence: u64, total_sequences: u64) {
        self.completions
            .lock()
            .push((upstream.to_string(), final_sequence, total_sequences));
        self.core
            .complete_downstream(final_sequence, total_sequences);
    }

    fn on_error(&self, error: Error) {
        self.errors.lock().push(error.clone());
        self.core.error_downstream(error);
    }
}

/// Factory for [`CollectorNode`]
///
/// Collectors transform nothing, so no value kinds are registered and
/// wrapped series would pass everything through.
pub struct CollectorFactory;

impl NodeFactory for CollectorFactory {
    fn kind(&self) -> &'static str {
        "collector"
    }

    fn value_kinds(&self) -> &'static [ValueKind] {
        &[]
    }

    fn create(
        &self,
        context: Arc<PipelineContext>,
        descriptor: &NodeDescriptor,
    ) -> Result<Arc<dyn QueryNode>> {
        Ok(CollectorNode::shared(descriptor.id.clone(), context))
    }

    fn new_typed_iterator(
        &self,
        kind: ValueKind,
        _node: Arc<dyn QueryNode>,
        _result: &dyn QueryResult,
        _sources: Vec<Arc<dyn TimeSeries>>,
    ) -> Result<SeriesIter> {
        Err(Error::config(format!(
            "Collector nodes produce no '{}' iterators",
            kind
        )))
    }
}
