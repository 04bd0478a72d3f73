//! Transforming nodes
//!
//! This module provides the interior nodes of the query graph:
//! - Sliding-window aggregation ([`sliding_window`])
//! - Whole-series summarization ([`summarizer`])
//!
//! Both share the closed [`Aggregation`] set; the sliding window applies
//! one function per rolling window, the summarizer applies several to the
//! whole series at once.

pub mod sliding_window;
pub mod summarizer;

pub use sliding_window::{SlidingWindowConfig, SlidingWindowFactory, SlidingWindowNode};
pub use summarizer::{SummarizerConfig, SummarizerFactory, SummarizerNode};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// The aggregation functions supported by the transforming nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Sum of values
    Sum,
    /// Floating-point mean
    Avg,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Count of non-NaN values
    Count,
    /// Value of the earliest-timestamped point
    First,
    /// Value of the latest-timestamped point
    Last,
}

impl Aggregation {
    /// Resolve an aggregation name, failing with a config error on
    /// unknown names
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "sum" => Ok(Aggregation::Sum),
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "count" => Ok(Aggregation::Count),
            "first" => Ok(Aggregation::First),
            "last" => Ok(Aggregation::Last),
            other => Err(Error::config(format!("Unknown aggregation '{}'", other))),
        }
    }

    /// The canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        }
    }
}
