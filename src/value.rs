//! The numeric value model
//!
//! Points flowing through the pipeline carry one of three representations,
//! selected by [`ValueKind`]:
//!
//! - **`NumericScalar`**: one (timestamp, value) pair per point, where the
//!   value is tagged integral or floating ([`NumericValue`])
//! - **`NumericArray`**: a dense run of values starting at a timestamp,
//!   with element timestamps derived from the result's time specification
//! - **`NumericSummary`**: a single point holding a map of summary-id to
//!   scalar, ids defined by the emitting result's rollup config
//!
//! There is no implicit coercion at the point level. Arrays are tagged
//! integral or floating for the whole series; promotion from integral to
//! floating happens through [`ArrayBuilder`] and is permanent.

use crate::types::TimeStamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Value Kind
// ============================================================================

/// The closed set of data representations a series can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Individually timestamped scalar points
    NumericScalar,
    /// Dense value runs aligned to the result's time grid
    NumericArray,
    /// Multi-statistic summary points
    NumericSummary,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::NumericScalar => write!(f, "NumericScalar"),
            ValueKind::NumericArray => write!(f, "NumericArray"),
            ValueKind::NumericSummary => write!(f, "NumericSummary"),
        }
    }
}

// ============================================================================
// Scalar Values
// ============================================================================

/// A scalar value tagged integral or floating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NumericValue {
    /// Signed 64-bit integral value
    Int(i64),
    /// IEEE-754 double value
    Float(f64),
}

impl NumericValue {
    /// The value as a double, converting integral values
    pub fn as_f64(&self) -> f64 {
        match self {
            NumericValue::Int(v) => *v as f64,
            NumericValue::Float(v) => *v,
        }
    }

    /// True if the value carries the floating tag
    pub fn is_float(&self) -> bool {
        matches!(self, NumericValue::Float(_))
    }

    /// True if the value is a floating NaN
    pub fn is_nan(&self) -> bool {
        matches!(self, NumericValue::Float(v) if v.is_nan())
    }
}

impl From<i64> for NumericValue {
    fn from(v: i64) -> Self {
        NumericValue::Int(v)
    }
}

impl From<f64> for NumericValue {
    fn from(v: f64) -> Self {
        NumericValue::Float(v)
    }
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericValue::Int(v) => write!(f, "{}", v),
            NumericValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// One point of a `NumericScalar` series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarPoint {
    /// When the value was observed
    pub timestamp: TimeStamp,
    /// The observed value
    pub value: NumericValue,
}

impl ScalarPoint {
    /// Create a point
    pub fn new(timestamp: TimeStamp, value: impl Into<NumericValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

// ============================================================================
// Array Values
// ============================================================================

/// Backing storage for a dense array run, tagged at the series level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    /// All elements integral
    Int(Vec<i64>),
    /// All elements floating
    Float(Vec<f64>),
}

impl ArrayData {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Int(v) => v.len(),
            ArrayData::Float(v) => v.len(),
        }
    }

    /// True if there are no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dense run of values starting at `start`
///
/// Element `i` sits at `start + i * interval`, with the interval taken
/// from the enclosing result's [`TimeSpecification`]. The array's length
/// and that interval together fully determine every element's timestamp.
///
/// [`TimeSpecification`]: crate::types::TimeSpecification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    /// Timestamp of element 0
    pub start: TimeStamp,
    /// Element storage
    pub data: ArrayData,
}

impl ArrayValue {
    /// Create an array value
    pub fn new(start: TimeStamp, data: ArrayData) -> Self {
        Self { start, data }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if there are no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True if the series has promoted to floating
    pub fn is_float(&self) -> bool {
        matches!(self.data, ArrayData::Float(_))
    }

    /// The element at `index` as a tagged scalar
    ///
    /// Returns `None` past the end.
    pub fn value_at(&self, index: usize) -> Option<NumericValue> {
        match &self.data {
            ArrayData::Int(v) => v.get(index).map(|&x| NumericValue::Int(x)),
            ArrayData::Float(v) => v.get(index).map(|&x| NumericValue::Float(x)),
        }
    }
}

/// Incrementally builds an [`ArrayValue`], promoting integral storage to
/// floating the first time a floating element arrives
///
/// Promotion is monotonic: once floating, the array stays floating even if
/// every later element is integral.
#[derive(Debug, Clone)]
pub struct ArrayBuilder {
    start: TimeStamp,
    ints: Vec<i64>,
    floats: Vec<f64>,
    promoted: bool,
}

impl ArrayBuilder {
    /// Start an array at the given timestamp
    pub fn new(start: TimeStamp) -> Self {
        Self {
            start,
            ints: Vec::new(),
            floats: Vec::new(),
            promoted: false,
        }
    }

    /// Append an element, promoting to floating if needed
    pub fn push(&mut self, value: NumericValue) {
        match value {
            NumericValue::Int(v) if !self.promoted => self.ints.push(v),
            NumericValue::Int(v) => self.floats.push(v as f64),
            NumericValue::Float(v) => {
                if !self.promoted {
                    self.promoted = true;
                    self.floats = self.ints.iter().map(|&x| x as f64).collect();
                    self.ints = Vec::new();
                }
                self.floats.push(v);
            }
        }
    }

    /// Number of elements appended so far
    pub fn len(&self) -> usize {
        if self.promoted {
            self.floats.len()
        } else {
            self.ints.len()
        }
    }

    /// True if nothing was appended
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finish and return the array value
    pub fn build(self) -> ArrayValue {
        let data = if self.promoted {
            ArrayData::Float(self.floats)
        } else {
            ArrayData::Int(self.ints)
        };
        ArrayValue::new(self.start, data)
    }
}

// ============================================================================
// Summary Values
// ============================================================================

/// One point of a `NumericSummary` series
///
/// Maps summary-ids (small non-negative integers defined by the emitting
/// result's rollup config) to scalar values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryPoint {
    /// The point's timestamp
    pub timestamp: TimeStamp,
    values: BTreeMap<u32, NumericValue>,
}

impl SummaryPoint {
    /// Create an empty summary at the given timestamp
    pub fn new(timestamp: TimeStamp) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Set the value for a summary-id
    pub fn insert(&mut self, summary_id: u32, value: impl Into<NumericValue>) {
        self.values.insert(summary_id, value.into());
    }

    /// The value stored for a summary-id, if any
    pub fn value(&self, summary_id: u32) -> Option<NumericValue> {
        self.values.get(&summary_id).copied()
    }

    /// The summary-ids present, ascending
    pub fn summaries_available(&self) -> Vec<u32> {
        self.values.keys().copied().collect()
    }

    /// Number of summaries present
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no summaries are present
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Tagged Point
// ============================================================================

/// A point as yielded by series iterators, tagged with its representation
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValue {
    /// A scalar point
    Scalar(ScalarPoint),
    /// A dense array run
    Array(ArrayValue),
    /// A summary point
    Summary(SummaryPoint),
}

impl SeriesValue {
    /// Which representation this point carries
    pub fn kind(&self) -> ValueKind {
        match self {
            SeriesValue::Scalar(_) => ValueKind::NumericScalar,
            SeriesValue::Array(_) => ValueKind::NumericArray,
            SeriesValue::Summary(_) => ValueKind::NumericSummary,
        }
    }

    /// The point's timestamp (array runs report their start)
    pub fn timestamp(&self) -> TimeStamp {
        match self {
            SeriesValue::Scalar(p) => p.timestamp,
            SeriesValue::Array(a) => a.start,
            SeriesValue::Summary(s) => s.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_value_tags() {
        let i = NumericValue::Int(42);
        let f = NumericValue::Float(42.0);
        assert!(!i.is_float());
        assert!(f.is_float());
        assert_eq!(i.as_f64(), 42.0);
        assert!(NumericValue::Float(f64::NAN).is_nan());
        assert!(!NumericValue::Int(0).is_nan());
    }

    #[test]
    fn test_array_builder_stays_integral() {
        let mut builder = ArrayBuilder::new(TimeStamp::from_secs(0));
        builder.push(NumericValue::Int(1));
        builder.push(NumericValue::Int(2));
        let array = builder.build();
        assert!(!array.is_float());
        assert_eq!(array.value_at(1), Some(NumericValue::Int(2)));
        assert_eq!(array.value_at(2), None);
    }

    #[test]
    fn test_array_builder_promotion_is_permanent() {
        let mut builder = ArrayBuilder::new(TimeStamp::from_secs(0));
        builder.push(NumericValue::Int(1));
        builder.push(NumericValue::Float(2.5));
        // Integral after promotion stays in the float store
        builder.push(NumericValue::Int(3));
        let array = builder.build();
        assert!(array.is_float());
        assert_eq!(array.len(), 3);
        assert_eq!(array.value_at(0), Some(NumericValue::Float(1.0)));
        assert_eq!(array.value_at(2), Some(NumericValue::Float(3.0)));
    }

    #[test]
    fn test_summary_point() {
        let mut point = SummaryPoint::new(TimeStamp::from_secs(0));
        point.insert(0, 59i64);
        point.insert(5, 14.75);
        assert_eq!(point.value(0), Some(NumericValue::Int(59)));
        assert_eq!(point.value(5), Some(NumericValue::Float(14.75)));
        assert_eq!(point.value(4), None);
        assert_eq!(point.summaries_available(), vec![0, 5]);
    }

    #[test]
    fn test_series_value_kind() {
        let scalar = SeriesValue::Scalar(ScalarPoint::new(TimeStamp::from_secs(1), 7i64));
        assert_eq!(scalar.kind(), ValueKind::NumericScalar);
        assert_eq!(scalar.timestamp().epoch(), 1);
    }
}
