//! # pingrank
//!
//! Latency-telemetry query engine.
//!
//! pingrank answers two questions over a store of ping samples between
//! cloud regions and locations: "what is the latency between A and B (now,
//! or over a window)?" and "which peer of A is the k-th fastest or slowest?".
//! The store is injected, so the same engine runs against a production
//! key-value backend or the in-memory store used by tests and the CLI.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Ranking keeps only the latest sample per peer inside the window
//! - Every fetch names the index path it used, so full scans are visible
//! - Store calls are bounded by a configurable timeout
//! - Malformed records fail the query instead of being skipped
//! - No internal retries, no background tasks, no shared mutable state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pingrank::{EngineConfig, MemoryStore, PingEngine, PingQuery, PingsOutcome};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load("config.json")?;
//! let store = MemoryStore::load("samples.json")?;
//! let engine = PingEngine::new(Arc::new(store), config)?;
//!
//! let query = PingQuery::latest("r2r_pings", "us-east-1", "eu-west-1");
//! match engine.get_pings(&query).await?.into_outcome() {
//!     PingsOutcome::Found { samples } => println!("{} ms", samples[0].latency_ms),
//!     PingsOutcome::NoData(no_data) => println!("{no_data}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`PingEngine`]: Caller-facing entry point; one adapter per table
//! - [`TelemetryAdapter`]: Plans, runs and reconciles store fetches
//! - [`resolver`]: Deduplication-by-latest and k-th order statistic
//! - [`TelemetryStore`]: The injected store dependency
//!
//! ## Modules
//!
//! - [`engine`]: `get_pings` / `get_nth_ping`
//! - [`adapter`]: Fetch planning, index paths, timeout, window reconciliation
//! - [`resolver`]: Rank resolution
//! - [`outcome`]: Query outcomes and their user-facing messages
//! - [`store`]: Store request model and trait
//! - [`memory`]: In-memory store
//! - [`sample`]: Typed samples and raw item conversion
//! - [`window`]: Inclusive time windows
//! - [`instant`]: ISO-8601 parsing and store key rendering
//! - [`config`]: Engine and table configuration
//! - [`error`]: Error types

pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod instant;
pub mod memory;
pub mod outcome;
pub mod resolver;
pub mod sample;
pub mod store;
pub mod window;

// Re-export primary API types at crate root for convenience.
pub use adapter::{IndexPath, LatestFetch, TelemetryAdapter, WindowFetch};
pub use config::{AttributeNames, EngineConfig, KeyLayout, TableConfig};
pub use engine::{PingEngine, PingMode, PingQuery, RankQuery, SelfPairPolicy};
pub use error::{ConfigError, MalformedSampleError, PingRankError, Result, StoreQueryError};
pub use memory::MemoryStore;
pub use outcome::{NoDataRecorded, PingsOutcome, QueryResult, RankOutcome, Subject};
pub use resolver::{Direction, FixedSide};
pub use sample::{RawItem, Sample};
pub use store::TelemetryStore;
pub use window::{Bounds, Window};
