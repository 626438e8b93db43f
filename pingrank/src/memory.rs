//! In-memory [`TelemetryStore`] implementation.
//!
//! Holds raw items per table and evaluates [`StoreRequest`]s the way a
//! partitioned key-value store would: partition equality, sort-key range,
//! ordering, filters, then limit. Secondary index names are accepted as-is;
//! every index is answered from the same item list using the partition and
//! sort attributes named in the request.
//!
//! Used by the test suites, the benches and the CLI.
//!
//! # Data file format
//!
//! ```json
//! {
//!   "r2r_pings": [
//!     { "origin": "us-east-1", "destination": "eu-west-1",
//!       "timestamp": "2024-05-01T12:00:00Z", "latency": "71.3" }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::config::TableConfig;
use crate::error::{ConfigError, Result, StoreQueryError};
use crate::sample::{RawItem, Sample};
use crate::store::{Access, Order, StoreRequest, TelemetryStore, attribute_text};

/// A read-only store backed by in-memory item lists.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<RawItem>>,
}

impl MemoryStore {
    /// Creates a store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads tables from a JSON data file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] if the file
    /// cannot be read or parsed, and [`ConfigError::Invalid`] if it does not
    /// map table names to arrays of objects.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let value: Value = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(value)
    }

    /// Builds a store from a `{ "<table>": [item, ...] }` document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the document has another shape.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(tables) = value else {
            return Err(ConfigError::Invalid {
                reason: "data file must be an object of table name to item array".to_string(),
            }
            .into());
        };

        let mut store = Self::new();
        for (table, items) in tables {
            let Value::Array(items) = items else {
                return Err(ConfigError::Invalid {
                    reason: format!("table '{table}' must hold an array of items"),
                }
                .into());
            };
            let entry = store.tables.entry(table.clone()).or_default();
            for (position, item) in items.into_iter().enumerate() {
                let Value::Object(item) = item else {
                    return Err(ConfigError::Invalid {
                        reason: format!("item {position} of table '{table}' is not an object"),
                    }
                    .into());
                };
                entry.push(item);
            }
        }
        Ok(store)
    }

    /// Ensures `table` exists, even if empty.
    pub fn create_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    /// Appends a raw item to `table`, creating the table if needed.
    pub fn insert(&mut self, table: &str, item: RawItem) {
        self.tables.entry(table.to_string()).or_default().push(item);
    }

    /// Appends a sample rendered in `table`'s layout.
    pub fn insert_sample(&mut self, table: &TableConfig, sample: &Sample) {
        self.insert(&table.name, sample.to_item(table));
    }

    /// Number of items in `table`, or `None` if it does not exist.
    pub fn len(&self, table: &str) -> Option<usize> {
        self.tables.get(table).map(Vec::len)
    }

    fn execute(&self, request: &StoreRequest) -> std::result::Result<Vec<RawItem>, StoreQueryError> {
        let items = self
            .tables
            .get(&request.table)
            .ok_or_else(|| StoreQueryError::UnknownTable {
                table: request.table.clone(),
            })?;

        let selected: Vec<&RawItem> = match &request.access {
            Access::Partition(key) => {
                let mut hits: Vec<(String, &RawItem)> = items
                    .iter()
                    .filter(|item| {
                        attribute_text(item, &key.partition_attr)
                            .is_some_and(|v| v == key.partition_value)
                    })
                    .filter_map(|item| {
                        let sort_value = attribute_text(item, &key.sort_attr)?;
                        key.sort_range
                            .contains(&sort_value)
                            .then_some((sort_value, item))
                    })
                    .collect();

                hits.sort_by(|a, b| a.0.cmp(&b.0));
                if request.order == Order::Descending {
                    hits.reverse();
                }
                hits.into_iter().map(|(_, item)| item).collect()
            }
            Access::Scan => items.iter().collect(),
        };

        Ok(selected
            .into_iter()
            .filter(|item| request.filters.iter().all(|f| f.matches(item)))
            .take(request.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

impl TelemetryStore for MemoryStore {
    async fn query(
        &self,
        request: &StoreRequest,
    ) -> std::result::Result<Vec<RawItem>, StoreQueryError> {
        self.execute(request)
    }
}
