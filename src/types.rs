//! Core data types used throughout the pipeline
//!
//! This module defines the fundamental data structures shared by every
//! node and iterator:
//!
//! # Key Types
//!
//! - **`TimeStamp`**: A millisecond-precision instant, ordered, with
//!   duration arithmetic in the supported units
//! - **`TimeUnit`**: The closed set of duration units (millis to days)
//! - **`WindowDuration`**: An (amount, unit) pair parseable from strings
//!   like `"5m"` or `"1h"`
//! - **`TimeSpecification`**: The optional per-result grid (start, end,
//!   interval, time zone) that contained series align to
//! - **`TimeSeriesId`**: Series identity, either a metric name + tag set
//!   or an opaque byte encoding
//!
//! # Example
//!
//! ```rust
//! use tsflow::types::{TimeStamp, TimeUnit, WindowDuration};
//!
//! let ts = TimeStamp::from_secs(60);
//! assert_eq!(ts.epoch(), 60);
//! assert_eq!(ts.add(5, TimeUnit::Minutes).epoch(), 360);
//!
//! let window = WindowDuration::parse("5m").unwrap();
//! assert_eq!(window.as_millis(), 300_000);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An instant in time with millisecond precision
///
/// Stored as milliseconds since the Unix epoch. Second-precision sources
/// construct through [`TimeStamp::from_secs`]; ordering and equality are
/// millisecond-exact either way.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TimeStamp(i64);

impl TimeStamp {
    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Create a timestamp from seconds since epoch
    pub fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Seconds since epoch (truncating)
    pub fn epoch(&self) -> i64 {
        self.0.div_euclid(1000)
    }

    /// Milliseconds since epoch
    pub fn epoch_millis(&self) -> i64 {
        self.0
    }

    /// Return this timestamp advanced by `amount` of `unit`
    ///
    /// Negative amounts move backwards. Saturates at the i64 range rather
    /// than wrapping.
    pub fn add(&self, amount: i64, unit: TimeUnit) -> TimeStamp {
        TimeStamp(self.0.saturating_add(unit.as_millis(amount)))
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Duration units supported by [`TimeStamp::add`] and window configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Milliseconds
    Millis,
    /// Seconds
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
    /// Days
    Days,
}

impl TimeUnit {
    /// Convert `amount` of this unit to milliseconds, saturating
    pub fn as_millis(&self, amount: i64) -> i64 {
        let factor = match self {
            TimeUnit::Millis => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        };
        amount.saturating_mul(factor)
    }

    /// The duration-string suffix for this unit ("ms", "s", "m", "h", "d")
    pub fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Millis => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "m",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// A duration expressed as (amount, unit)
///
/// Parsed from strings like `"5m"`, `"1h"`, `"250ms"`. The amount must be
/// a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDuration {
    /// Number of units
    pub amount: i64,
    /// The unit
    pub unit: TimeUnit,
}

impl WindowDuration {
    /// Create a duration, validating that the amount is positive
    pub fn new(amount: i64, unit: TimeUnit) -> Result<Self> {
        if amount <= 0 {
            return Err(Error::config(format!(
                "Duration amount must be positive, got {}",
                amount
            )));
        }
        Ok(Self { amount, unit })
    }

    /// Parse a duration string such as `"5m"` or `"30s"`
    ///
    /// Recognized suffixes: `ms`, `s`, `m`, `h`, `d`. The `ms` suffix is
    /// matched before `s` so `"250ms"` parses as milliseconds.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (digits, unit) = if let Some(d) = text.strip_suffix("ms") {
            (d, TimeUnit::Millis)
        } else if let Some(d) = text.strip_suffix('s') {
            (d, TimeUnit::Seconds)
        } else if let Some(d) = text.strip_suffix('m') {
            (d, TimeUnit::Minutes)
        } else if let Some(d) = text.strip_suffix('h') {
            (d, TimeUnit::Hours)
        } else if let Some(d) = text.strip_suffix('d') {
            (d, TimeUnit::Days)
        } else {
            return Err(Error::config(format!(
                "Invalid duration '{}': missing unit suffix (ms, s, m, h, d)",
                text
            )));
        };

        let amount: i64 = digits.parse().map_err(|_| {
            Error::config(format!("Invalid duration '{}': bad amount '{}'", text, digits))
        })?;
        Self::new(amount, unit)
    }

    /// Total length in milliseconds
    pub fn as_millis(&self) -> i64 {
        self.unit.as_millis(self.amount)
    }
}

impl fmt::Display for WindowDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

/// The time grid a result's series are aligned to
///
/// When a result carries a specification, every contained series is
/// implicitly aligned: an array element at index `i` sits at
/// `start + i * interval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSpecification {
    /// Grid start (inclusive)
    pub start: TimeStamp,
    /// Grid end (exclusive)
    pub end: TimeStamp,
    /// Spacing between grid slots
    pub interval: WindowDuration,
    /// Time zone name used when the query was parsed, e.g. "UTC"
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

impl TimeSpecification {
    /// Create a specification with the default UTC time zone
    pub fn new(start: TimeStamp, end: TimeStamp, interval: WindowDuration) -> Self {
        Self {
            start,
            end,
            interval,
            time_zone: default_time_zone(),
        }
    }

    /// Interval length in milliseconds
    pub fn interval_millis(&self) -> i64 {
        self.interval.as_millis()
    }

    /// The timestamp of grid slot `index`
    pub fn timestamp_at(&self, index: usize) -> TimeStamp {
        TimeStamp::from_millis(
            self.start
                .epoch_millis()
                .saturating_add(self.interval_millis().saturating_mul(index as i64)),
        )
    }
}

/// The two identity encodings a series can carry
///
/// Nodes that only understand one encoding check this before accepting a
/// result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdKind {
    /// Decoded metric name + tag set
    StringId,
    /// Opaque internal byte encoding
    ByteId,
}

/// Identity of a time-series
///
/// Either a decoded metric name with its tag set, or an opaque byte
/// encoding produced by a storage backend. The two kinds are distinguished
/// at the type level so nodes can refuse incompatible inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeSeriesId {
    /// Metric name plus dimensional tags
    Metric {
        /// Metric name, e.g. "cpu.usage"
        metric: String,
        /// Sorted tag key/value pairs
        tags: BTreeMap<String, String>,
    },
    /// Backend-specific byte encoding
    Encoded(Vec<u8>),
}

impl TimeSeriesId {
    /// Create a string-kind id with no tags
    pub fn metric(name: impl Into<String>) -> Self {
        TimeSeriesId::Metric {
            metric: name.into(),
            tags: BTreeMap::new(),
        }
    }

    /// Create a string-kind id with tags
    pub fn metric_with_tags<K, V>(name: impl Into<String>, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        TimeSeriesId::Metric {
            metric: name.into(),
            tags: tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Which identity encoding this id uses
    pub fn kind(&self) -> IdKind {
        match self {
            TimeSeriesId::Metric { .. } => IdKind::StringId,
            TimeSeriesId::Encoded(_) => IdKind::ByteId,
        }
    }
}

/// Parses human time strings into timestamps
///
/// Full calendar parsing lives outside the core; the pipeline only
/// consumes this interface when a caller hands times over as text.
pub trait TimeParser: Send + Sync {
    /// Parse `text` in the given time zone
    fn parse(&self, text: &str, time_zone: &str) -> Result<TimeStamp>;
}

/// Parser for plain epoch offsets: seconds, or milliseconds with an
/// `ms` suffix
///
/// The time zone is ignored; epoch offsets are zone-independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochTimeParser;

impl TimeParser for EpochTimeParser {
    fn parse(&self, text: &str, _time_zone: &str) -> Result<TimeStamp> {
        let text = text.trim();
        if let Some(millis) = text.strip_suffix("ms") {
            let millis: i64 = millis.parse().map_err(|_| {
                Error::config(format!("Invalid epoch milliseconds '{}'", text))
            })?;
            return Ok(TimeStamp::from_millis(millis));
        }
        let secs: i64 = text
            .parse()
            .map_err(|_| Error::config(format!("Invalid epoch seconds '{}'", text)))?;
        Ok(TimeStamp::from_secs(secs))
    }
}
