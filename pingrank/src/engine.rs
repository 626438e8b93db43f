//! Caller-facing query engine.
//!
//! [`PingEngine`] owns the injected store handle and one
//! [`TelemetryAdapter`] per configured table, and exposes the two
//! operations callers use:
//!
//! - [`PingEngine::get_pings`]: the latest sample for a pair, or every
//!   sample for the pair inside a window.
//! - [`PingEngine::get_nth_ping`]: the k-th lowest or highest latency among
//!   the counterparts of a fixed origin or peer, one latest sample each.
//!
//! The engine holds no mutable state. Concurrent calls share nothing but
//! the store handle and need no coordination.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use pingrank::{
//!     Direction, EngineConfig, FixedSide, MemoryStore, PingEngine, RankOutcome, RankQuery,
//!     SelfPairPolicy, Window,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pingrank::Result<()> {
//! let store = MemoryStore::from_json(serde_json::json!({
//!     "r2l_pings": [
//!         { "origin": "us-east-1", "destination": "Paris",
//!           "timestamp": "2024-05-01T12:00:00Z", "latency": "80.5" },
//!         { "origin": "us-east-1", "destination": "Tokyo",
//!           "timestamp": "2024-05-01T12:00:00Z", "latency": "160.0" }
//!     ]
//! }))?;
//! let config = EngineConfig::new(vec![pingrank::TableConfig::timestamp_sorted("r2l_pings")]);
//! let engine = PingEngine::new(Arc::new(store), config)?;
//!
//! let query = RankQuery::new(
//!     "r2l_pings",
//!     FixedSide::Origin("us-east-1".to_string()),
//!     Window::all_time(),
//!     1,
//!     Direction::Lowest,
//!     SelfPairPolicy::Keep,
//! );
//! let result = engine.get_nth_ping(&query).await?;
//! assert!(matches!(result.outcome(), RankOutcome::Ranked(s) if s.peer == "Paris"));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::TelemetryAdapter;
use crate::config::{EngineConfig, TableConfig};
use crate::error::{Result, StoreQueryError};
use crate::outcome::{NoDataRecorded, PingsOutcome, QueryResult, RankOutcome, Subject};
use crate::resolver::{self, Direction, FixedSide};
use crate::store::TelemetryStore;
use crate::window::{Bounds, Window};

/// Whether samples where origin and peer are the same region take part in ranking.
///
/// There is deliberately no default: a region pinging itself usually ranks
/// first for "lowest", and only the caller knows whether that is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfPairPolicy {
    /// Rank self-pairs like any other pair.
    Keep,
    /// Drop self-pairs before ranking.
    Exclude,
}

/// Point-in-time or historical lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingMode {
    /// The single most recent sample.
    Latest,
    /// Every sample inside the window.
    Windowed(Window),
}

/// A pair lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingQuery {
    /// Table to read.
    pub table: String,
    /// Origin region.
    pub origin: String,
    /// Peer region or location.
    pub peer: String,
    /// Latest or windowed.
    pub mode: PingMode,
}

impl PingQuery {
    /// Latest sample for `(origin, peer)`.
    pub fn latest(
        table: impl Into<String>,
        origin: impl Into<String>,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            origin: origin.into(),
            peer: peer.into(),
            mode: PingMode::Latest,
        }
    }

    /// Every sample for `(origin, peer)` inside `window`.
    pub fn windowed(
        table: impl Into<String>,
        origin: impl Into<String>,
        peer: impl Into<String>,
        window: Window,
    ) -> Self {
        Self {
            table: table.into(),
            origin: origin.into(),
            peer: peer.into(),
            mode: PingMode::Windowed(window),
        }
    }

    /// Builds a query from loosely typed arguments.
    ///
    /// Bounds are ISO-8601 strings; offsets are converted to UTC. When
    /// `latest` is set, bounds are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreQueryError::InvalidInstant`] or
    /// [`StoreQueryError::InvalidWindow`] for unusable bounds.
    pub fn from_args(
        origin: &str,
        peer: &str,
        table: &str,
        latest: bool,
        lower: Option<&str>,
        upper: Option<&str>,
    ) -> std::result::Result<Self, StoreQueryError> {
        if latest {
            if lower.is_some() || upper.is_some() {
                tracing::debug!("latest lookup for {origin} -> {peer}: ignoring time bounds");
            }
            return Ok(Self::latest(table, origin, peer));
        }
        Ok(Self::windowed(table, origin, peer, Window::parse(lower, upper)?))
    }

    /// The bounds echoed back in a "no data" outcome.
    pub fn bounds(&self) -> Bounds {
        match &self.mode {
            PingMode::Latest => Bounds::Unbounded,
            PingMode::Windowed(window) => window.bounds(),
        }
    }
}

/// A k-th ranked lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankQuery {
    /// Table to read.
    pub table: String,
    /// The side held fixed; the other side is ranked.
    pub side: FixedSide,
    /// Samples outside this window are ignored.
    pub window: Window,
    /// 1-based rank.
    pub rank: usize,
    /// Lowest or highest latency first.
    pub direction: Direction,
    /// What to do with self-pairs.
    pub self_pairs: SelfPairPolicy,
}

impl RankQuery {
    /// Creates a ranked query.
    pub fn new(
        table: impl Into<String>,
        side: FixedSide,
        window: Window,
        rank: usize,
        direction: Direction,
        self_pairs: SelfPairPolicy,
    ) -> Self {
        Self {
            table: table.into(),
            side,
            window,
            rank,
            direction,
            self_pairs,
        }
    }
}

/// Latency query engine over an injected [`TelemetryStore`].
#[derive(Debug)]
pub struct PingEngine<S> {
    adapters: HashMap<String, TelemetryAdapter<S>>,
}

impl<S: TelemetryStore> PingEngine<S> {
    /// Creates an engine serving every table in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::Invalid`] if the configuration does not validate.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.store_timeout();

        let adapters = config
            .tables
            .into_iter()
            .map(|table| {
                let name = table.name.clone();
                (name, TelemetryAdapter::new(Arc::clone(&store), table, timeout))
            })
            .collect();

        Ok(Self { adapters })
    }

    /// Configured tables, sorted by name.
    pub fn tables(&self) -> Vec<&TableConfig> {
        let mut tables: Vec<&TableConfig> = self.adapters.values().map(TelemetryAdapter::table).collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    /// Looks up the latest sample, or the samples in a window, for a pair.
    ///
    /// A window query returns samples in store order. An empty result is
    /// [`PingsOutcome::NoData`] carrying the query's bounds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PingRankError::Store`] for an unknown table, an
    /// invalid identifier or a failing store, and
    /// [`crate::PingRankError::MalformedSample`] if any fetched record is malformed.
    pub async fn get_pings(&self, query: &PingQuery) -> Result<QueryResult<PingsOutcome>> {
        let adapter = self.adapter(&query.table)?;

        let (samples, index_path) = match &query.mode {
            PingMode::Latest => {
                let latest = adapter.fetch_latest(&query.origin, &query.peer).await?;
                (latest.sample.into_iter().collect::<Vec<_>>(), latest.index_path)
            }
            PingMode::Windowed(window) => {
                let fetch = adapter
                    .fetch_window(&query.origin, Some(&query.peer), window)
                    .await?;
                (fetch.samples, fetch.index_path)
            }
        };

        let fetched = samples.len();
        tracing::debug!(
            "get_pings {} -> {} on '{}': {fetched} sample(s)",
            query.origin,
            query.peer,
            query.table
        );

        let outcome = if samples.is_empty() {
            PingsOutcome::NoData(NoDataRecorded {
                subject: Subject::Pair {
                    origin: query.origin.clone(),
                    peer: query.peer.clone(),
                },
                bounds: query.bounds(),
            })
        } else {
            PingsOutcome::Found { samples }
        };
        Ok(QueryResult::new(outcome, index_path, fetched))
    }

    /// Finds the `rank`-th lowest or highest latency for a fixed side.
    ///
    /// Fetches every sample in the window for the fixed origin (or, for a
    /// fixed peer, from every origin), applies the self-pair policy, then
    /// hands the rest to [`resolver::resolve`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::PingRankError::Store`] for an unknown table, an
    /// invalid identifier, an unbounded window without opt-in or a
    /// failing store, and [`crate::PingRankError::MalformedSample`] if any
    /// fetched record is malformed. A malformed record is never skipped.
    pub async fn get_nth_ping(&self, query: &RankQuery) -> Result<QueryResult<RankOutcome>> {
        let adapter = self.adapter(&query.table)?;

        let fetch = match &query.side {
            FixedSide::Origin(origin) => adapter.fetch_window(origin, None, &query.window).await?,
            FixedSide::Peer(peer) => adapter.fetch_inbound(peer, &query.window).await?,
        };
        let fetched = fetch.samples.len();

        let mut samples = fetch.samples;
        if query.self_pairs == SelfPairPolicy::Exclude {
            samples.retain(|s| s.origin != s.peer);
            if samples.len() < fetched {
                tracing::debug!(
                    "excluded {} self-pair sample(s) for {}",
                    fetched - samples.len(),
                    query.side
                );
            }
        }

        let outcome = resolver::resolve(
            &samples,
            &query.side,
            query.rank,
            query.direction,
            query.window.bounds(),
        );
        Ok(QueryResult::new(outcome, fetch.index_path, fetched))
    }

    fn adapter(&self, table: &str) -> std::result::Result<&TelemetryAdapter<S>, StoreQueryError> {
        self.adapters
            .get(table)
            .ok_or_else(|| StoreQueryError::UnknownTable {
                table: table.to_string(),
            })
    }
}
