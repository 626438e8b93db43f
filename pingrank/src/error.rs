//! Error types for the pingrank latency query engine.
//!
//! Errors are never retried or swallowed inside the crate. Store and
//! resolution failures propagate to the immediate caller, which decides how
//! to phrase them and whether to retry.
//!
//! Empty results are not errors: "no samples in range" and "fewer peers than
//! the requested rank" are ordinary outcomes, see [`crate::outcome`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Boxed error used to chain backend-specific failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for all pingrank operations.
#[derive(Error, Debug)]
pub enum PingRankError {
    /// The store could not answer the query, or the query could not be built.
    #[error("error querying store: {0}")]
    Store(#[from] StoreQueryError),

    /// A fetched record could not be turned into a [`crate::Sample`].
    #[error("malformed sample: {0}")]
    MalformedSample(#[from] MalformedSampleError),

    /// Configuration could not be loaded or failed validation.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while building or executing a store query.
///
/// Store unavailability, timeouts, malformed identifiers and query
/// construction failures all surface through this one type.
#[derive(Error, Debug)]
pub enum StoreQueryError {
    /// The backend failed to execute the request.
    #[error("table '{table}' is unavailable: {source}")]
    Unavailable {
        /// The table being queried.
        table: String,
        /// The underlying backend error.
        #[source]
        source: BoxError,
    },

    /// The store did not answer within the configured threshold.
    #[error("query against table '{table}' timed out after {elapsed:?}")]
    Timeout {
        /// The table being queried.
        table: String,
        /// How long the caller waited.
        elapsed: Duration,
    },

    /// The requested table is not present in the catalog or the store.
    #[error("unknown table '{table}'")]
    UnknownTable {
        /// The requested table name.
        table: String,
    },

    /// An origin or peer identifier is unusable.
    #[error("invalid {field} identifier '{value}': {reason}")]
    InvalidIdentifier {
        /// Which identifier was rejected (`origin` or `peer`).
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A time bound is not a valid ISO-8601 instant.
    #[error("invalid instant '{value}': {source}")]
    InvalidInstant {
        /// The rejected input.
        value: String,
        /// The underlying parse error.
        #[source]
        source: chrono::ParseError,
    },

    /// The lower bound is later than the upper bound.
    #[error("invalid window: lower bound {lower} is after upper bound {upper}")]
    InvalidWindow {
        /// The lower bound, rendered as ISO-8601.
        lower: String,
        /// The upper bound, rendered as ISO-8601.
        upper: String,
    },

    /// A fetch across every counterpart of a fixed origin or peer was
    /// requested with no bounds.
    ///
    /// Callers that really want the full history must pass
    /// [`crate::Window::all_time`].
    #[error("refusing unbounded scan of every counterpart of '{subject}': supply a bound or opt in with an all-time window")]
    UnboundedWindow {
        /// The fixed origin or peer whose full history would have been scanned.
        subject: String,
    },
}

/// Errors raised when a raw store item cannot be converted into a sample.
///
/// Any one of these fails the whole resolution. Dropping the record instead
/// could silently change which peer ends up at a given rank.
#[derive(Error, Debug)]
pub enum MalformedSampleError {
    /// A required attribute is absent from the item.
    #[error("missing attribute '{attribute}'")]
    MissingAttribute {
        /// The attribute name.
        attribute: String,
    },

    /// An identifier attribute is present but blank.
    #[error("attribute '{attribute}' is empty")]
    EmptyIdentifier {
        /// The attribute name.
        attribute: String,
    },

    /// The latency attribute is not a number.
    #[error("latency '{value}' is not numeric")]
    NonNumericLatency {
        /// The stored value.
        value: String,
    },

    /// The latency parsed, but is negative, NaN or infinite.
    #[error("latency {value} is out of range (must be finite and >= 0)")]
    LatencyOutOfRange {
        /// The parsed value.
        value: f64,
    },

    /// The timestamp attribute is not a valid ISO-8601 instant.
    #[error("timestamp '{value}' is invalid: {source}")]
    InvalidTimestamp {
        /// The stored value.
        value: String,
        /// The underlying parse error.
        #[source]
        source: chrono::ParseError,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for the expected shape.
    #[error("failed to parse '{}': {source}", path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The configuration parsed but is inconsistent.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Description of what is wrong.
        reason: String,
    },
}

/// Type alias for `Result<T, PingRankError>`.
pub type Result<T> = std::result::Result<T, PingRankError>;
