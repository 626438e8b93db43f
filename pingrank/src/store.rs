//! The store abstraction the adapter queries.
//!
//! The engine never constructs a store client itself. A [`TelemetryStore`]
//! is injected by the caller, which lets production code talk to a real
//! partitioned key-value store while tests use [`crate::memory::MemoryStore`].
//!
//! A store only needs to understand two request shapes:
//!
//! - **Partition access**: equality on a partition attribute, an inclusive
//!   string range on the sort attribute, ascending or descending order, and
//!   an optional limit. May target a named secondary index.
//! - **Scan**: every item of the table.
//!
//! Both shapes take attribute filters evaluated after key selection. All
//! comparisons are lexicographic on the attribute's text form; numbers are
//! compared by their JSON rendering.
//!
//! Timestamp attributes and composite sort keys must hold fixed-width UTC
//! renderings from [`crate::instant::format_key`], so that descending key
//! order is newest first.
//!
//! `limit` bounds the number of items that survive filtering. Backends whose
//! native limit applies before filtering must keep paging until the limit is
//! met or the key range is exhausted.

use std::future::Future;

use serde_json::Value;

use crate::error::StoreQueryError;
use crate::sample::RawItem;

/// An inclusive range over attribute text. `None` leaves a side open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    /// Smallest accepted value.
    pub lower: Option<String>,
    /// Largest accepted value.
    pub upper: Option<String>,
}

impl KeyRange {
    /// A range with optional bounds.
    pub fn new(lower: Option<String>, upper: Option<String>) -> Self {
        Self { lower, upper }
    }

    /// True when neither side is bounded.
    pub fn is_open(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Whether `value` falls inside the range.
    pub fn contains(&self, value: &str) -> bool {
        self.lower.as_deref().is_none_or(|lo| value >= lo)
            && self.upper.as_deref().is_none_or(|hi| value <= hi)
    }
}

/// Key selection for partition access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCondition {
    /// Secondary index to query instead of the base table.
    pub index: Option<String>,
    /// Partition attribute name.
    pub partition_attr: String,
    /// Required partition value.
    pub partition_value: String,
    /// Sort attribute name; results are ordered by it.
    pub sort_attr: String,
    /// Accepted sort attribute values.
    pub sort_range: KeyRange,
}

/// How items are selected before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// One partition, through the base table or a secondary index.
    Partition(KeyCondition),
    /// The whole table.
    Scan,
}

/// A predicate applied to selected items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Attribute text equals `value`.
    Equals {
        /// Attribute name.
        attribute: String,
        /// Required value.
        value: String,
    },
    /// Attribute text falls inside `range`.
    InRange {
        /// Attribute name.
        attribute: String,
        /// Accepted values.
        range: KeyRange,
    },
}

impl Filter {
    /// Whether `item` satisfies the predicate. Missing attributes never match.
    pub fn matches(&self, item: &RawItem) -> bool {
        match self {
            Self::Equals { attribute, value } => {
                attribute_text(item, attribute).is_some_and(|v| v == *value)
            }
            Self::InRange { attribute, range } => {
                attribute_text(item, attribute).is_some_and(|v| range.contains(&v))
            }
        }
    }
}

/// Sort direction for partition access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Smallest sort key first.
    Ascending,
    /// Largest sort key first.
    Descending,
}

/// A read request against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRequest {
    /// Table to read.
    pub table: String,
    /// Key selection.
    pub access: Access,
    /// Post-selection predicates, all of which must hold.
    pub filters: Vec<Filter>,
    /// Result order for partition access. Scans return store order.
    pub order: Order,
    /// Maximum number of matching items to return.
    pub limit: Option<usize>,
}

/// A read-only, append-only latency store.
///
/// Implementations must be safe to call concurrently; the engine holds no
/// locks around them.
pub trait TelemetryStore: Send + Sync {
    /// Executes `request` and returns the matching raw items.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreQueryError`] if the table is unknown or the backend
    /// fails. Implementations must not retry internally.
    fn query(
        &self,
        request: &StoreRequest,
    ) -> impl Future<Output = Result<Vec<RawItem>, StoreQueryError>> + Send;
}

/// Text form of an attribute used for key comparisons.
pub fn attribute_text(item: &RawItem, attribute: &str) -> Option<String> {
    match item.get(attribute)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_range_inclusive() {
        let range = KeyRange::new(Some("b".to_string()), Some("d".to_string()));
        assert!(range.contains("b"));
        assert!(range.contains("c"));
        assert!(range.contains("d"));
        assert!(!range.contains("a"));
        assert!(!range.contains("d0"));
        assert!(KeyRange::default().contains("anything"));
        assert!(KeyRange::default().is_open());
    }

    #[test]
    fn test_filter_matches_numbers_as_text() {
        let item = json!({ "destination": "eu-west-1", "latency": 12 })
            .as_object()
            .cloned()
            .unwrap();

        let eq = Filter::Equals {
            attribute: "latency".to_string(),
            value: "12".to_string(),
        };
        assert!(eq.matches(&item));

        let missing = Filter::Equals {
            attribute: "origin".to_string(),
            value: "us-east-1".to_string(),
        };
        assert!(!missing.matches(&item));
    }
}
