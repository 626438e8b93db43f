//! Telemetry store adapter: logical fetches to store requests.
//!
//! The adapter turns "latest sample for a pair", "samples of an origin in a
//! window" and "samples reaching a peer in a window" into [`StoreRequest`]s,
//! pushing as much selection as the table's key layout allows down to the
//! store. It then converts raw items into [`Sample`]s and reconciles them
//! against the exact window.
//!
//! # Access paths
//!
//! Every fetch is planned before it runs. The plan names the [`IndexPath`]
//! it uses, so callers can see what a query costs:
//!
//! | Fetch            | Composite key (`peer#ts`)                       | Timestamp key                    |
//! |------------------|-------------------------------------------------|----------------------------------|
//! | latest(pair)     | `SortKeyPrefix`, newest first, limit 1          | `PartitionFilteredDescending`    |
//! | window(pair)     | `SortKeyPrefix` range                           | `PartitionRange` + peer filter   |
//! | window(origin)   | `SecondaryIndex` if configured, else `PartitionFilter` | `PartitionRange`          |
//! | inbound(peer)    | `SecondaryIndex` if configured, else `TableScan` | same                            |
//!
//! `PartitionFilter` and `TableScan` stay correct but read far more than they
//! return; they are logged at `warn`.
//!
//! # Window reconciliation
//!
//! Time bounds are pushed down at second granularity (see
//! [`crate::instant`]), so the store returns a superset of the window. After
//! conversion, samples outside the exact `[lower, upper]` range, or for a
//! different origin/peer than requested, are dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{KeyLayout, TableConfig};
use crate::error::{MalformedSampleError, Result, StoreQueryError};
use crate::instant::{KEY_CEILING, key_ceiling, key_floor};
use crate::sample::{RawItem, Sample};
use crate::store::{Access, Filter, KeyCondition, KeyRange, Order, StoreRequest, TelemetryStore};
use crate::window::Window;

/// The access path a fetch uses, with its cost characteristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum IndexPath {
    /// Sort-key prefix range inside the origin partition.
    ///
    /// Reads only the pair's samples inside the window.
    SortKeyPrefix,

    /// Timestamp range inside the origin partition.
    ///
    /// Reads every sample of the origin inside the window.
    PartitionRange,

    /// Newest-first walk of the origin partition, stopping at the first
    /// sample for the peer.
    ///
    /// Reads the samples newer than the pair's latest one.
    PartitionFilteredDescending,

    /// Whole origin partition, filtered by timestamp afterwards.
    ///
    /// Reads the origin's entire history regardless of the window.
    PartitionFilter,

    /// Timestamp range inside one partition of a secondary index.
    ///
    /// Reads every sample of the index partition inside the window.
    SecondaryIndex {
        /// Index name.
        index: String,
    },

    /// Whole table, filtered afterwards.
    ///
    /// Reads every sample in the table.
    TableScan,
}

impl IndexPath {
    /// True for paths whose cost does not shrink with the window.
    pub fn is_scan(&self) -> bool {
        matches!(self, Self::PartitionFilter | Self::TableScan)
    }
}

/// A store request plus the access path it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// The access path.
    pub index_path: IndexPath,
    /// The request sent to the store.
    pub request: StoreRequest,
}

/// The sample returned by a latest fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestFetch {
    /// The most recent sample for the pair, if any.
    pub sample: Option<Sample>,
    /// The access path used.
    pub index_path: IndexPath,
}

/// Samples returned by a window fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFetch {
    /// Samples inside the window, in store order.
    pub samples: Vec<Sample>,
    /// The access path used.
    pub index_path: IndexPath,
}

/// Adapter between logical latency fetches and one table of a store.
///
/// Holds no mutable state; clones share the same store handle.
#[derive(Debug)]
pub struct TelemetryAdapter<S> {
    store: Arc<S>,
    table: TableConfig,
    timeout: Duration,
}

impl<S> Clone for TelemetryAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: self.table.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S: TelemetryStore> TelemetryAdapter<S> {
    /// Creates an adapter for `table`. Store calls exceeding `timeout` fail.
    pub fn new(store: Arc<S>, table: TableConfig, timeout: Duration) -> Self {
        Self {
            store,
            table,
            timeout,
        }
    }

    /// The table this adapter reads.
    pub fn table(&self) -> &TableConfig {
        &self.table
    }

    /// Plans the lookup of the single most recent sample for a pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreQueryError::InvalidIdentifier`] for an unusable origin or peer.
    pub fn plan_latest(&self, origin: &str, peer: &str) -> std::result::Result<FetchPlan, StoreQueryError> {
        self.check_identifier("origin", origin)?;
        self.check_identifier("peer", peer)?;
        let attrs = &self.table.attributes;

        let plan = match &self.table.layout {
            KeyLayout::CompositeSortKey {
                sort_key,
                separator,
            } => FetchPlan {
                index_path: IndexPath::SortKeyPrefix,
                request: self.partition_request(
                    None,
                    &attrs.origin,
                    origin,
                    sort_key,
                    KeyRange::new(
                        Some(format!("{peer}{separator}")),
                        Some(format!("{peer}{separator}{KEY_CEILING}")),
                    ),
                    vec![],
                    Order::Descending,
                    Some(1),
                ),
            },
            KeyLayout::TimestampSortKey => FetchPlan {
                index_path: IndexPath::PartitionFilteredDescending,
                request: self.partition_request(
                    None,
                    &attrs.origin,
                    origin,
                    &attrs.timestamp,
                    KeyRange::default(),
                    vec![peer_filter(&attrs.peer, peer)],
                    Order::Descending,
                    Some(1),
                ),
            },
        };
        Ok(plan)
    }

    /// Plans a window fetch for an origin, optionally narrowed to one peer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreQueryError::InvalidIdentifier`] for an unusable
    /// identifier, and [`StoreQueryError::UnboundedWindow`] when no peer and
    /// no bound is given without [`Window::all_time`].
    pub fn plan_window(
        &self,
        origin: &str,
        peer: Option<&str>,
        window: &Window,
    ) -> std::result::Result<FetchPlan, StoreQueryError> {
        self.check_identifier("origin", origin)?;
        if let Some(peer) = peer {
            self.check_identifier("peer", peer)?;
        } else if window.is_unbounded() && !window.allows_full_history() {
            return Err(StoreQueryError::UnboundedWindow {
                subject: origin.to_string(),
            });
        }

        let attrs = &self.table.attributes;
        let time_range = time_key_range(window);

        let plan = match (&self.table.layout, peer) {
            (
                KeyLayout::CompositeSortKey {
                    sort_key,
                    separator,
                },
                Some(peer),
            ) => {
                let lower = window.lower().map_or_else(String::new, |lo| key_floor(&lo));
                let upper = window
                    .upper()
                    .map_or_else(|| KEY_CEILING.to_string(), |hi| key_ceiling(&hi));
                FetchPlan {
                    index_path: IndexPath::SortKeyPrefix,
                    request: self.partition_request(
                        None,
                        &attrs.origin,
                        origin,
                        sort_key,
                        KeyRange::new(
                            Some(format!("{peer}{separator}{lower}")),
                            Some(format!("{peer}{separator}{upper}")),
                        ),
                        vec![],
                        Order::Ascending,
                        None,
                    ),
                }
            }
            (KeyLayout::CompositeSortKey { sort_key, .. }, None) => {
                match &self.table.origin_time_index {
                    Some(index) => FetchPlan {
                        index_path: IndexPath::SecondaryIndex {
                            index: index.clone(),
                        },
                        request: self.partition_request(
                            Some(index.clone()),
                            &attrs.origin,
                            origin,
                            &attrs.timestamp,
                            time_range,
                            vec![],
                            Order::Ascending,
                            None,
                        ),
                    },
                    // The timestamp may only exist inside the sort key, so the
                    // window is applied after conversion.
                    None => FetchPlan {
                        index_path: IndexPath::PartitionFilter,
                        request: self.partition_request(
                            None,
                            &attrs.origin,
                            origin,
                            sort_key,
                            KeyRange::default(),
                            vec![],
                            Order::Ascending,
                            None,
                        ),
                    },
                }
            }
            (KeyLayout::TimestampSortKey, peer) => FetchPlan {
                index_path: IndexPath::PartitionRange,
                request: self.partition_request(
                    None,
                    &attrs.origin,
                    origin,
                    &attrs.timestamp,
                    time_range,
                    peer.map(|p| peer_filter(&attrs.peer, p)).into_iter().collect(),
                    Order::Ascending,
                    None,
                ),
            },
        };
        Ok(plan)
    }

    /// Plans a window fetch of every origin's samples towards `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreQueryError::InvalidIdentifier`] for an unusable peer,
    /// and [`StoreQueryError::UnboundedWindow`] when no bound is given
    /// without [`Window::all_time`].
    pub fn plan_inbound(&self, peer: &str, window: &Window) -> std::result::Result<FetchPlan, StoreQueryError> {
        self.check_identifier("peer", peer)?;
        if window.is_unbounded() && !window.allows_full_history() {
            return Err(StoreQueryError::UnboundedWindow {
                subject: peer.to_string(),
            });
        }
        let attrs = &self.table.attributes;
        let time_range = time_key_range(window);

        let plan = match &self.table.peer_time_index {
            Some(index) => FetchPlan {
                index_path: IndexPath::SecondaryIndex {
                    index: index.clone(),
                },
                request: self.partition_request(
                    Some(index.clone()),
                    &attrs.peer,
                    peer,
                    &attrs.timestamp,
                    time_range,
                    vec![],
                    Order::Ascending,
                    None,
                ),
            },
            None => {
                let mut filters = vec![peer_filter(&attrs.peer, peer)];
                if !time_range.is_open() {
                    filters.push(Filter::InRange {
                        attribute: attrs.timestamp.clone(),
                        range: time_range,
                    });
                }
                FetchPlan {
                    index_path: IndexPath::TableScan,
                    request: StoreRequest {
                        table: self.table.name.clone(),
                        access: Access::Scan,
                        filters,
                        order: Order::Ascending,
                        limit: None,
                    },
                }
            }
        };
        Ok(plan)
    }

    /// Returns the most recent sample for `(origin, peer)`, if any.
    ///
    /// Reads at most one item from the store.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreQueryError`] if the query cannot be built or the
    /// store fails, or a [`MalformedSampleError`] if the item is malformed.
    pub async fn fetch_latest(&self, origin: &str, peer: &str) -> Result<LatestFetch> {
        let plan = self.plan_latest(origin, peer)?;
        let items = self.execute(&plan).await?;

        let mut samples = self.convert(items, |s| s.origin == origin && s.peer == peer, &Window::unbounded())?;
        Ok(LatestFetch {
            sample: samples.pop(),
            index_path: plan.index_path,
        })
    }

    /// Returns every sample of `origin` (towards `peer`, if given) in `window`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreQueryError`] if the query cannot be built or the
    /// store fails, or a [`MalformedSampleError`] if any item is malformed.
    pub async fn fetch_window(
        &self,
        origin: &str,
        peer: Option<&str>,
        window: &Window,
    ) -> Result<WindowFetch> {
        let plan = self.plan_window(origin, peer, window)?;
        let items = self.execute(&plan).await?;

        let samples = self.convert(
            items,
            |s| s.origin == origin && peer.is_none_or(|p| s.peer == p),
            window,
        )?;
        Ok(WindowFetch {
            samples,
            index_path: plan.index_path,
        })
    }

    /// Returns every sample from any origin towards `peer` in `window`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreQueryError`] if the query cannot be built or the
    /// store fails, or a [`MalformedSampleError`] if any item is malformed.
    pub async fn fetch_inbound(&self, peer: &str, window: &Window) -> Result<WindowFetch> {
        let plan = self.plan_inbound(peer, window)?;
        let items = self.execute(&plan).await?;

        let samples = self.convert(items, |s| s.peer == peer, window)?;
        Ok(WindowFetch {
            samples,
            index_path: plan.index_path,
        })
    }

    async fn execute(&self, plan: &FetchPlan) -> std::result::Result<Vec<RawItem>, StoreQueryError> {
        if plan.index_path.is_scan() {
            tracing::warn!(
                "table '{}': no index covers this fetch, falling back to {:?}",
                self.table.name,
                plan.index_path
            );
        } else {
            tracing::debug!("table '{}': fetching via {:?}", self.table.name, plan.index_path);
        }

        match tokio::time::timeout(self.timeout, self.store.query(&plan.request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "table '{}': store did not answer within {:?}",
                    self.table.name,
                    self.timeout
                );
                Err(StoreQueryError::Timeout {
                    table: self.table.name.clone(),
                    elapsed: self.timeout,
                })
            }
        }
    }

    /// Converts raw items, failing on the first malformed one, then keeps
    /// only samples that match `wanted` and fall inside `window`.
    fn convert(
        &self,
        items: Vec<RawItem>,
        wanted: impl Fn(&Sample) -> bool,
        window: &Window,
    ) -> std::result::Result<Vec<Sample>, MalformedSampleError> {
        let fetched = items.len();
        let mut samples = Vec::with_capacity(fetched);
        for item in &items {
            let sample = Sample::from_item(item, &self.table)?;
            if wanted(&sample) && window.contains(&sample.timestamp) {
                samples.push(sample);
            }
        }

        if samples.len() < fetched {
            tracing::debug!(
                "table '{}': reconciled {fetched} fetched item(s) down to {}",
                self.table.name,
                samples.len()
            );
        }
        Ok(samples)
    }

    fn check_identifier(&self, field: &'static str, value: &str) -> std::result::Result<(), StoreQueryError> {
        let reject = |reason: String| StoreQueryError::InvalidIdentifier {
            field,
            value: value.to_string(),
            reason,
        };

        if value.trim().is_empty() {
            return Err(reject("must not be empty".to_string()));
        }
        if value.chars().any(char::is_control) {
            return Err(reject("must not contain control characters".to_string()));
        }
        if let KeyLayout::CompositeSortKey { separator, .. } = &self.table.layout
            && value.contains(*separator)
        {
            return Err(reject(format!("must not contain the key separator '{separator}'")));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn partition_request(
        &self,
        index: Option<String>,
        partition_attr: &str,
        partition_value: &str,
        sort_attr: &str,
        sort_range: KeyRange,
        filters: Vec<Filter>,
        order: Order,
        limit: Option<usize>,
    ) -> StoreRequest {
        StoreRequest {
            table: self.table.name.clone(),
            access: Access::Partition(KeyCondition {
                index,
                partition_attr: partition_attr.to_string(),
                partition_value: partition_value.to_string(),
                sort_attr: sort_attr.to_string(),
                sort_range,
            }),
            filters,
            order,
            limit,
        }
    }
}

fn peer_filter(attribute: &str, peer: &str) -> Filter {
    Filter::Equals {
        attribute: attribute.to_string(),
        value: peer.to_string(),
    }
}

fn time_key_range(window: &Window) -> KeyRange {
    KeyRange::new(
        window.lower().map(|lo| key_floor(&lo)),
        window.upper().map(|hi| key_ceiling(&hi)),
    )
}
