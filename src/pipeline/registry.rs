//! Node-factory registry
//!
//! An explicit mapping from node kind to [`NodeFactory`]. Iterator lookup
//! for a (node-kind, value-kind) pair goes through the factory's declared
//! `value_kinds`; there is no reflection anywhere in the dispatch path.

use crate::error::{Error, Result};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::node::{NodeDescriptor, NodeFactory, QueryNode};
use crate::pipeline::sink::CollectorFactory;
use crate::processor::sliding_window::SlidingWindowFactory;
use crate::processor::summarizer::SummarizerFactory;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of node factories, keyed by node kind
#[derive(Default)]
pub struct Registry {
    factories: RwLock<HashMap<&'static str, Arc<dyn NodeFactory>>>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in node kinds registered
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(SlidingWindowFactory));
        registry.register(Arc::new(SummarizerFactory));
        registry.register(Arc::new(CollectorFactory));
        registry
    }

    /// Register a factory under its declared kind; later wins
    pub fn register(&self, factory: Arc<dyn NodeFactory>) {
        debug!(kind = factory.kind(), "registering node factory");
        self.factories.write().insert(factory.kind(), factory);
    }

    /// The factory for a node kind, if registered
    pub fn factory(&self, kind: &str) -> Option<Arc<dyn NodeFactory>> {
        self.factories.read().get(kind).cloned()
    }

    /// Registered node kinds, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.read().keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build a node from a descriptor, resolving its factory by kind
    pub fn create_node(
        &self,
        context: Arc<PipelineContext>,
        descriptor: &NodeDescriptor,
    ) -> Result<Arc<dyn QueryNode>> {
        let factory = self.factory(&descriptor.kind).ok_or_else(|| {
            Error::config(format!("Unknown node kind '{}'", descriptor.kind))
        })?;
        factory.create(context, descriptor)
    }
}
