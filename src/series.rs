//! Time-series trait and in-memory implementations
//!
//! A [`TimeSeries`] exposes a stable set of [`ValueKind`]s for its
//! lifetime and hands out single-pass iterators per kind. Requesting a
//! kind the series does not expose yields "absent" (`None`), never an
//! error.
//!
//! The in-memory implementations here back the bundled data store and the
//! test suites; real storage backends provide their own.

use crate::error::Result;
use crate::types::TimeSeriesId;
use crate::value::{ArrayValue, ScalarPoint, SeriesValue, SummaryPoint, ValueKind};
use std::sync::Arc;

/// A single-pass, fallible point iterator
///
/// Points emerge in non-decreasing timestamp order. Invariant violations
/// surface as an `Err` on the offending `next()`. Iterators are not
/// restartable; construct a fresh one from the series to re-read.
pub type SeriesIter = Box<dyn Iterator<Item = Result<SeriesValue>> + Send>;

/// An identified sequence of values, possibly exposing several kinds
pub trait TimeSeries: Send + Sync {
    /// The series identity
    fn id(&self) -> &TimeSeriesId;

    /// The kinds this series exposes; stable for the series' lifetime
    fn kinds(&self) -> Vec<ValueKind>;

    /// A fresh iterator of the given kind, or `None` if the kind is not
    /// exposed
    fn iterator(&self, kind: ValueKind) -> Option<SeriesIter>;
}

// ============================================================================
// In-Memory Series
// ============================================================================

/// An in-memory `NumericScalar` series
///
/// Points are shared behind an `Arc` so iterators never copy them.
pub struct MemTimeSeries {
    id: TimeSeriesId,
    points: Arc<Vec<ScalarPoint>>,
}

impl MemTimeSeries {
    /// Create a series over the given points (assumed timestamp-ordered)
    pub fn new(id: TimeSeriesId, points: Vec<ScalarPoint>) -> Self {
        Self {
            id,
            points: Arc::new(points),
        }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the series holds no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl TimeSeries for MemTimeSeries {
    fn id(&self) -> &TimeSeriesId {
        &self.id
    }

    fn kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::NumericScalar]
    }

    fn iterator(&self, kind: ValueKind) -> Option<SeriesIter> {
        if kind != ValueKind::NumericScalar {
            return None;
        }
        let points = Arc::clone(&self.points);
        let mut index = 0;
        Some(Box::new(std::iter::from_fn(move || {
            let point = points.get(index).copied()?;
            index += 1;
            Some(Ok(SeriesValue::Scalar(point)))
        })))
    }
}

/// An in-memory `NumericArray` series holding one dense run
pub struct ArrayTimeSeries {
    id: TimeSeriesId,
    value: Arc<ArrayValue>,
}

impl ArrayTimeSeries {
    /// Create a series over the given array run
    pub fn new(id: TimeSeriesId, value: ArrayValue) -> Self {
        Self {
            id,
            value: Arc::new(value),
        }
    }
}

impl TimeSeries for ArrayTimeSeries {
    fn id(&self) -> &TimeSeriesId {
        &self.id
    }

    fn kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::NumericArray]
    }

    fn iterator(&self, kind: ValueKind) -> Option<SeriesIter> {
        if kind != ValueKind::NumericArray {
            return None;
        }
        let value = Arc::clone(&self.value);
        let mut done = false;
        Some(Box::new(std::iter::from_fn(move || {
            if done || value.is_empty() {
                return None;
            }
            done = true;
            Some(Ok(SeriesValue::Array((*value).clone())))
        })))
    }
}

/// An in-memory `NumericSummary` series
pub struct SummaryTimeSeries {
    id: TimeSeriesId,
    points: Arc<Vec<SummaryPoint>>,
}

impl SummaryTimeSeries {
    /// Create a series over the given summary points
    pub fn new(id: TimeSeriesId, points: Vec<SummaryPoint>) -> Self {
        Self {
            id,
            points: Arc::new(points),
        }
    }
}

impl TimeSeries for SummaryTimeSeries {
    fn id(&self) -> &TimeSeriesId {
        &self.id
    }

    fn kinds(&self) -> Vec<ValueKind> {
        vec![ValueKind::NumericSummary]
    }

    fn iterator(&self, kind: ValueKind) -> Option<SeriesIter> {
        if kind != ValueKind::NumericSummary {
            return None;
        }
        let points = Arc::clone(&self.points);
        let mut index = 0;
        Some(Box::new(std::iter::from_fn(move || {
            let point = points.get(index).cloned()?;
            index += 1;
            Some(Ok(SeriesValue::Summary(point)))
        })))
    }
}
