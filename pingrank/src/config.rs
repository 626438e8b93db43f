//! Configuration types for the latency query engine.
//!
//! A configuration names the tables the engine may query, how each table's
//! keys are laid out, which attribute holds which field, and which secondary
//! indexes exist. Configuration is loaded once and validated before any
//! query runs.
//!
//! # Example
//!
//! ```json
//! {
//!   "store_timeout_ms": 5000,
//!   "tables": [
//!     {
//!       "name": "r2r_pings",
//!       "layout": { "kind": "composite_sort_key", "sort_key": "destination#timestamp" },
//!       "origin_time_index": "origin-timestamp-index"
//!     },
//!     {
//!       "name": "r2l_pings",
//!       "layout": { "kind": "timestamp_sort_key" }
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default store call threshold before a query is reported as timed out.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 10_000;

/// Default separator between peer and timestamp in a composite sort key.
pub const DEFAULT_KEY_SEPARATOR: char = '#';

fn default_timeout_ms() -> u64 {
    DEFAULT_STORE_TIMEOUT_MS
}

fn default_separator() -> char {
    DEFAULT_KEY_SEPARATOR
}

/// Names of the attributes holding each sample field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    /// Partition key attribute holding the origin region.
    pub origin: String,
    /// Attribute holding the peer (destination region or location).
    pub peer: String,
    /// Attribute holding the ISO-8601 UTC timestamp.
    pub timestamp: String,
    /// Attribute holding the latency in milliseconds, as a number or text.
    pub latency: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            origin: "origin".to_string(),
            peer: "destination".to_string(),
            timestamp: "timestamp".to_string(),
            latency: "latency".to_string(),
        }
    }
}

/// How a table's primary key is laid out.
///
/// Both layouts partition by origin. They differ in the sort key, which
/// decides which lookups are cheap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyLayout {
    /// Sort key is `<peer><separator><timestamp>`.
    ///
    /// Per-pair lookups are sort-key prefix ranges. Fetching every peer of
    /// an origin needs an origin/timestamp index or a partition filter.
    CompositeSortKey {
        /// Name of the composite sort key attribute.
        sort_key: String,
        /// Separator between the peer and the timestamp.
        #[serde(default = "default_separator")]
        separator: char,
    },

    /// Sort key is the timestamp attribute; the peer is a filtered attribute.
    ///
    /// Window fetches are partition ranges; per-pair lookups filter on peer.
    TimestampSortKey,
}

/// Configuration for one queryable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name callers select with.
    pub name: String,

    /// Primary key layout.
    pub layout: KeyLayout,

    /// Attribute names; defaults to `origin`, `destination`, `timestamp`, `latency`.
    #[serde(default)]
    pub attributes: AttributeNames,

    /// Secondary index partitioned by origin and sorted by timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_time_index: Option<String>,

    /// Secondary index partitioned by peer and sorted by timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_time_index: Option<String>,
}

impl TableConfig {
    /// A table keyed by `(origin, destination#timestamp)` with default attributes.
    pub fn composite(name: impl Into<String>) -> Self {
        let attributes = AttributeNames::default();
        Self {
            name: name.into(),
            layout: KeyLayout::CompositeSortKey {
                sort_key: format!(
                    "{}{DEFAULT_KEY_SEPARATOR}{}",
                    attributes.peer, attributes.timestamp
                ),
                separator: DEFAULT_KEY_SEPARATOR,
            },
            attributes,
            origin_time_index: None,
            peer_time_index: None,
        }
    }

    /// A table keyed by `(origin, timestamp)` with default attributes.
    pub fn timestamp_sorted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layout: KeyLayout::TimestampSortKey,
            attributes: AttributeNames::default(),
            origin_time_index: None,
            peer_time_index: None,
        }
    }

    /// Declares an origin/timestamp secondary index.
    #[must_use]
    pub fn with_origin_time_index(mut self, index: impl Into<String>) -> Self {
        self.origin_time_index = Some(index.into());
        self
    }

    /// Declares a peer/timestamp secondary index.
    #[must_use]
    pub fn with_peer_time_index(mut self, index: impl Into<String>) -> Self {
        self.peer_time_index = Some(index.into());
        self
    }

    /// Validates the table configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a name is blank or two attributes
    /// share a name.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("table name must not be empty"));
        }

        let attrs = &self.attributes;
        let mut names = vec![
            attrs.origin.as_str(),
            attrs.peer.as_str(),
            attrs.timestamp.as_str(),
            attrs.latency.as_str(),
        ];
        if let KeyLayout::CompositeSortKey { sort_key, .. } = &self.layout {
            names.push(sort_key.as_str());
        }

        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(invalid(format!(
                "table '{}' has an empty attribute name",
                self.name
            )));
        }

        let distinct: HashSet<&str> = names.iter().copied().collect();
        if distinct.len() != names.len() {
            return Err(invalid(format!(
                "table '{}' maps two fields to the same attribute",
                self.name
            )));
        }

        for index in [&self.origin_time_index, &self.peer_time_index]
            .into_iter()
            .flatten()
        {
            if index.trim().is_empty() {
                return Err(invalid(format!(
                    "table '{}' declares an index with an empty name",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Threshold after which a store call fails with a timeout.
    #[serde(default = "default_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Tables the engine may query.
    pub tables: Vec<TableConfig>,
}

impl EngineConfig {
    /// Creates a configuration with the default timeout.
    pub fn new(tables: Vec<TableConfig>) -> Self {
        Self {
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            tables,
        }
    }

    /// Returns the store call threshold.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`], [`ConfigError::Parse`] or
    /// [`ConfigError::Invalid`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the timeout is zero, no tables are
    /// configured, a table name repeats, or any table is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.store_timeout_ms == 0 {
            return Err(invalid("store_timeout_ms must be > 0"));
        }
        if self.tables.is_empty() {
            return Err(invalid("at least one table must be configured"));
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !seen.insert(table.name.as_str()) {
                return Err(invalid(format!("table '{}' is configured twice", table.name)));
            }
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> crate::error::PingRankError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
    .into()
}
