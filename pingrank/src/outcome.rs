//! Query outcomes handed back to callers.
//!
//! A valid query that finds nothing is not an error. Outcomes distinguish
//! "no samples at all" from "fewer distinct peers than the requested rank",
//! and carry enough context for a precise user-facing message through their
//! `Display` implementations.

use std::fmt;

use serde::Serialize;

use crate::adapter::IndexPath;
use crate::instant::format_instant;
use crate::resolver::{Direction, FixedSide};
use crate::sample::Sample;
use crate::window::Bounds;

/// What a "no data" outcome is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    /// A specific origin/peer pair.
    Pair {
        /// Origin region.
        origin: String,
        /// Peer region or location.
        peer: String,
    },
    /// One fixed side of a ranking query.
    Side(FixedSide),
}

/// A valid query matched zero samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoDataRecorded {
    /// What was queried.
    pub subject: Subject,
    /// The bounds of the query, echoed back unchanged.
    pub bounds: Bounds,
}

impl fmt::Display for NoDataRecorded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Subject::Pair { origin, peer } => {
                write!(f, "No ping data recorded between {origin} and {peer}")?;
            }
            Subject::Side(side) => write!(f, "No ping data recorded for {side}")?,
        }
        match &self.bounds {
            Bounds::Unbounded => f.write_str("."),
            Bounds::After { lower } => write!(f, " after {}.", format_instant(lower)),
            Bounds::Before { upper } => write!(f, " before {}.", format_instant(upper)),
            Bounds::Between { lower, upper } => write!(
                f,
                " from {} to {}.",
                format_instant(lower),
                format_instant(upper)
            ),
        }
    }
}

/// Outcome of a latest or windowed pair lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PingsOutcome {
    /// Matching samples. Exactly one for a latest lookup.
    Found {
        /// Samples in store order.
        samples: Vec<Sample>,
    },
    /// Nothing matched.
    NoData(NoDataRecorded),
}

/// Outcome of a k-th ranked lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RankOutcome {
    /// The sample at the requested rank.
    Ranked(Sample),
    /// Samples exist but there are fewer distinct counterparts than the rank.
    InsufficientData {
        /// The rank asked for.
        requested: usize,
        /// How many deduplicated entries there were.
        available: usize,
        /// The ranking direction, for the message.
        direction: Direction,
    },
    /// Nothing matched.
    NoData(NoDataRecorded),
}

impl fmt::Display for RankOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ranked(sample) => write!(
                f,
                "{} -> {}: {} ms at {}",
                sample.origin,
                sample.peer,
                sample.latency_ms,
                format_instant(&sample.timestamp)
            ),
            Self::InsufficientData {
                requested,
                available,
                direction,
            } => write!(
                f,
                "Not enough data recorded to find the {} {direction} ping, {available} deduplicated entries available in the given time range.",
                ordinal(*requested)
            ),
            Self::NoData(no_data) => no_data.fmt(f),
        }
    }
}

/// An outcome plus how it was obtained.
///
/// Mirrors what a caller needs to judge the cost of a query: which access
/// path served it and how many raw samples were read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult<O> {
    outcome: O,
    index_path: IndexPath,
    fetched: usize,
}

impl<O> QueryResult<O> {
    /// Wraps an outcome with its access metadata.
    pub fn new(outcome: O, index_path: IndexPath, fetched: usize) -> Self {
        Self {
            outcome,
            index_path,
            fetched,
        }
    }

    /// The outcome.
    pub fn outcome(&self) -> &O {
        &self.outcome
    }

    /// The access path the store query used.
    pub fn index_path(&self) -> &IndexPath {
        &self.index_path
    }

    /// Number of samples read, after window reconciliation.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Consumes the result, returning the outcome.
    pub fn into_outcome(self) -> O {
        self.outcome
    }
}

/// `1st`, `2nd`, `3rd`, `4th`, `11th`, `21st`, ...
fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}
