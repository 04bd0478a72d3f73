//! Rollup configuration
//!
//! Maps human aggregation names ("sum", "count", ...) to the compact
//! numeric summary-ids carried inside `NumericSummary` points. A rollup
//! config is attached to a result by its source and is immutable for the
//! lifetime of that result.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Immutable mapping between aggregation names and summary-ids
///
/// Built once via [`RollupConfigBuilder`]; shared across a result's
/// consumers behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RollupConfig {
    name_to_id: HashMap<String, u32>,
    id_to_name: HashMap<u32, String>,
}

impl RollupConfig {
    /// Start building a config
    pub fn builder() -> RollupConfigBuilder {
        RollupConfigBuilder::default()
    }

    /// A config with the conventional id assignments
    ///
    /// sum→0, count→1, max→2, min→3, avg→5, first→6, last→7. Id 4 is
    /// deliberately unassigned.
    pub fn sample() -> Self {
        Self::builder()
            .aggregation_id("sum", 0)
            .aggregation_id("count", 1)
            .aggregation_id("max", 2)
            .aggregation_id("min", 3)
            .aggregation_id("avg", 5)
            .aggregation_id("first", 6)
            .aggregation_id("last", 7)
            .build()
    }

    /// The summary-id assigned to a name, if any
    pub fn summary_id(&self, name: &str) -> Option<u32> {
        self.name_to_id.get(name).copied()
    }

    /// The name assigned to a summary-id, if any
    pub fn summary_name(&self, id: u32) -> Option<&str> {
        self.id_to_name.get(&id).map(|s| s.as_str())
    }

    /// Resolve a name to its id, failing with a config error if unmapped
    pub fn require_id(&self, name: &str) -> Result<u32> {
        self.summary_id(name).ok_or_else(|| {
            Error::config(format!("Rollup config has no id for summary '{}'", name))
        })
    }
}

/// Builder for [`RollupConfig`]
#[derive(Debug, Clone, Default)]
pub struct RollupConfigBuilder {
    assignments: Vec<(String, u32)>,
}

impl RollupConfigBuilder {
    /// Assign an id to an aggregation name
    pub fn aggregation_id(mut self, name: impl Into<String>, id: u32) -> Self {
        self.assignments.push((name.into(), id));
        self
    }

    /// Build the config; later assignments win on duplicates
    pub fn build(self) -> RollupConfig {
        let mut config = RollupConfig::default();
        for (name, id) in self.assignments {
            config.id_to_name.insert(id, name.clone());
            config.name_to_id.insert(name, id);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_ways() {
        let config = RollupConfig::sample();
        assert_eq!(config.summary_id("sum"), Some(0));
        assert_eq!(config.summary_id("avg"), Some(5));
        assert_eq!(config.summary_name(1), Some("count"));
        assert_eq!(config.summary_name(3), Some("min"));
    }

    #[test]
    fn test_unassigned_id() {
        let config = RollupConfig::sample();
        assert_eq!(config.summary_name(4), None);
        assert_eq!(config.summary_id("p99"), None);
        assert!(config.require_id("p99").is_err());
    }

    #[test]
    fn test_builder() {
        let config = RollupConfig::builder()
            .aggregation_id("sum", 0)
            .aggregation_id("count", 9)
            .build();
        assert_eq!(config.require_id("count").unwrap(), 9);
        assert_eq!(config.summary_name(0), Some("sum"));
    }
}
