//! Rank resolution over deduplicated latency samples.
//!
//! Given every sample fetched for a window, the resolver keeps one sample per
//! counterpart (the non-fixed side of the query), orders the survivors by
//! latency and picks the k-th.
//!
//! # Algorithm
//!
//! 1. Empty input short-circuits to [`RankOutcome::NoData`].
//! 2. Samples are grouped by counterpart. Groups are kept in order of first
//!    appearance in the input.
//! 3. Each group reduces to its sample with the greatest timestamp, even if
//!    an older sample had a better latency. On equal timestamps the sample
//!    seen first wins.
//! 4. Survivors are stable-sorted by latency, ascending for
//!    [`Direction::Lowest`] and descending for [`Direction::Highest`]. Ties
//!    keep the group order from step 2.
//! 5. Rank `k` (1-based) selects index `k - 1`; anything outside
//!    `1..=len` is [`RankOutcome::InsufficientData`].
//!
//! Self-pairs (origin == peer) are ranked like any other pair. Excluding
//! them is a caller policy, see [`crate::engine::SelfPairPolicy`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::outcome::{NoDataRecorded, RankOutcome, Subject};
use crate::sample::Sample;
use crate::window::Bounds;

/// Which end of the latency ordering rank 1 refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Rank 1 is the smallest latency.
    Lowest,
    /// Rank 1 is the largest latency.
    Highest,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lowest => f.write_str("lowest"),
            Self::Highest => f.write_str("highest"),
        }
    }
}

/// The side of a ranking query that is held fixed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "side", content = "id", rename_all = "snake_case")]
pub enum FixedSide {
    /// Rank the peers reached from this origin.
    Origin(String),
    /// Rank the origins that reached this peer.
    Peer(String),
}

impl FixedSide {
    /// The fixed identifier.
    pub fn id(&self) -> &str {
        match self {
            Self::Origin(id) | Self::Peer(id) => id,
        }
    }

    /// The other side of `sample` relative to this fixed side.
    pub fn counterpart<'a>(&self, sample: &'a Sample) -> &'a str {
        match self {
            Self::Origin(_) => &sample.peer,
            Self::Peer(_) => &sample.origin,
        }
    }
}

impl fmt::Display for FixedSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Reduces `samples` to the latest sample per counterpart.
///
/// Output order is the order in which each counterpart first appears.
pub fn dedup_latest<'a>(samples: &'a [Sample], side: &FixedSide) -> Vec<&'a Sample> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut latest: Vec<&Sample> = Vec::new();

    for sample in samples {
        match slots.get(side.counterpart(sample)).copied() {
            Some(slot) => {
                if sample.timestamp > latest[slot].timestamp {
                    latest[slot] = sample;
                }
            }
            None => {
                slots.insert(side.counterpart(sample), latest.len());
                latest.push(sample);
            }
        }
    }

    latest
}

/// Orders deduplicated samples by latency in `direction`.
pub fn rank_order<'a>(mut samples: Vec<&'a Sample>, direction: Direction) -> Vec<&'a Sample> {
    match direction {
        Direction::Lowest => samples.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms)),
        Direction::Highest => samples.sort_by(|a, b| b.latency_ms.total_cmp(&a.latency_ms)),
    }
    samples
}

/// Selects the `rank`-th sample (1-based) of the deduplicated set.
///
/// `bounds` is only echoed back in a [`RankOutcome::NoData`] outcome.
pub fn resolve(
    samples: &[Sample],
    side: &FixedSide,
    rank: usize,
    direction: Direction,
    bounds: Bounds,
) -> RankOutcome {
    if samples.is_empty() {
        return RankOutcome::NoData(NoDataRecorded {
            subject: Subject::Side(side.clone()),
            bounds,
        });
    }

    let ordered = rank_order(dedup_latest(samples, side), direction);
    let available = ordered.len();

    match rank.checked_sub(1).and_then(|index| ordered.get(index)) {
        Some(sample) => RankOutcome::Ranked((*sample).clone()),
        None => RankOutcome::InsufficientData {
            requested: rank,
            available,
            direction,
        },
    }
}
