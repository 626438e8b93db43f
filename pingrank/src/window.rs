//! Inclusive time windows for historical queries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreQueryError;
use crate::instant::{format_instant, parse_instant};

/// An inclusive `[lower, upper]` time range; either side may be open.
///
/// A window with both sides open only permits fetching every peer of an
/// origin, or every origin of a peer, when it was built with
/// [`Window::all_time`]. Scanning a full history has unbounded cost, so it is
/// never a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    lower: Option<DateTime<Utc>>,
    upper: Option<DateTime<Utc>>,
    all_time: bool,
}

impl Window {
    /// Creates a window from optional bounds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreQueryError::InvalidWindow`] if `lower > upper`.
    pub fn new(
        lower: Option<DateTime<Utc>>,
        upper: Option<DateTime<Utc>>,
    ) -> Result<Self, StoreQueryError> {
        if let (Some(lo), Some(hi)) = (lower, upper)
            && lo > hi
        {
            return Err(StoreQueryError::InvalidWindow {
                lower: format_instant(&lo),
                upper: format_instant(&hi),
            });
        }
        Ok(Self {
            lower,
            upper,
            all_time: false,
        })
    }

    /// Parses optional ISO-8601 bounds into a window.
    ///
    /// # Errors
    ///
    /// Returns [`StoreQueryError::InvalidInstant`] for an unparseable bound
    /// and [`StoreQueryError::InvalidWindow`] for inverted bounds.
    pub fn parse(lower: Option<&str>, upper: Option<&str>) -> Result<Self, StoreQueryError> {
        Self::new(lower.map(parse_bound).transpose()?, upper.map(parse_bound).transpose()?)
    }

    /// Both bounds set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreQueryError::InvalidWindow`] if `lower > upper`.
    pub fn between(lower: DateTime<Utc>, upper: DateTime<Utc>) -> Result<Self, StoreQueryError> {
        Self::new(Some(lower), Some(upper))
    }

    /// Everything at or after `lower`.
    pub fn after(lower: DateTime<Utc>) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
            all_time: false,
        }
    }

    /// Everything at or before `upper`.
    pub fn before(upper: DateTime<Utc>) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
            all_time: false,
        }
    }

    /// No bounds. Only usable for a single origin/peer pair.
    pub fn unbounded() -> Self {
        Self {
            lower: None,
            upper: None,
            all_time: false,
        }
    }

    /// No bounds, explicitly permitting a scan of every counterpart's full history.
    pub fn all_time() -> Self {
        Self {
            lower: None,
            upper: None,
            all_time: true,
        }
    }

    /// Lower bound, if any.
    pub fn lower(&self) -> Option<DateTime<Utc>> {
        self.lower
    }

    /// Upper bound, if any.
    pub fn upper(&self) -> Option<DateTime<Utc>> {
        self.upper
    }

    /// True when neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// True when the caller opted in to unbounded scans.
    pub fn allows_full_history(&self) -> bool {
        self.all_time
    }

    /// Whether `instant` falls inside the window (bounds inclusive).
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        self.lower.is_none_or(|lo| *instant >= lo) && self.upper.is_none_or(|hi| *instant <= hi)
    }

    /// Which bounds are present, with their values.
    pub fn bounds(&self) -> Bounds {
        match (self.lower, self.upper) {
            (None, None) => Bounds::Unbounded,
            (Some(lower), None) => Bounds::After { lower },
            (None, Some(upper)) => Bounds::Before { upper },
            (Some(lower), Some(upper)) => Bounds::Between { lower, upper },
        }
    }
}

fn parse_bound(value: &str) -> Result<DateTime<Utc>, StoreQueryError> {
    parse_instant(value).map_err(|e| StoreQueryError::InvalidInstant {
        value: value.to_string(),
        source: e,
    })
}

/// Bound presence of a query, echoed back in "no data" outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Bounds {
    /// No bounds: a point-in-time (latest) or full-history query.
    Unbounded,
    /// Only a lower bound.
    After {
        /// Inclusive lower bound.
        lower: DateTime<Utc>,
    },
    /// Only an upper bound.
    Before {
        /// Inclusive upper bound.
        upper: DateTime<Utc>,
    },
    /// Both bounds.
    Between {
        /// Inclusive lower bound.
        lower: DateTime<Utc>,
        /// Inclusive upper bound.
        upper: DateTime<Utc>,
    },
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("unbounded"),
            Self::After { lower } => write!(f, "after {}", format_instant(lower)),
            Self::Before { upper } => write!(f, "before {}", format_instant(upper)),
            Self::Between { lower, upper } => {
                write!(f, "from {} to {}", format_instant(lower), format_instant(upper))
            }
        }
    }
}
