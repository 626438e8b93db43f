//! Typed latency samples and their conversion from raw store items.
//!
//! Stores hand back items as untyped attribute maps. They are validated
//! here, at the adapter boundary, so that ranking only ever sees samples
//! with non-empty identifiers, a UTC timestamp and a finite, non-negative
//! latency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{KeyLayout, TableConfig};
use crate::error::MalformedSampleError;
use crate::instant::{format_key, parse_instant};

/// A raw store item: attribute name to JSON value.
pub type RawItem = serde_json::Map<String, Value>;

/// One latency observation between an origin and a peer at an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Region the probe was sent from.
    pub origin: String,
    /// Destination region or location.
    pub peer: String,
    /// When the observation was taken (UTC).
    pub timestamp: DateTime<Utc>,
    /// Round-trip latency in milliseconds.
    pub latency_ms: f64,
}

impl Sample {
    /// Creates a validated sample.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedSampleError::EmptyIdentifier`] for a blank origin
    /// or peer and [`MalformedSampleError::LatencyOutOfRange`] for a
    /// negative, NaN or infinite latency.
    pub fn new(
        origin: impl Into<String>,
        peer: impl Into<String>,
        timestamp: DateTime<Utc>,
        latency_ms: f64,
    ) -> Result<Self, MalformedSampleError> {
        let origin = origin.into();
        let peer = peer.into();
        if origin.trim().is_empty() {
            return Err(MalformedSampleError::EmptyIdentifier {
                attribute: "origin".to_string(),
            });
        }
        if peer.trim().is_empty() {
            return Err(MalformedSampleError::EmptyIdentifier {
                attribute: "peer".to_string(),
            });
        }
        check_latency(latency_ms)?;

        Ok(Self {
            origin,
            peer,
            timestamp,
            latency_ms,
        })
    }

    /// Converts a raw store item into a sample using the table's attribute names.
    ///
    /// The latency may be stored as a JSON number or as numeric text. On a
    /// composite-key table, a missing peer or timestamp attribute is
    /// recovered from the sort key.
    ///
    /// # Errors
    ///
    /// Returns a [`MalformedSampleError`] describing the first problem found.
    pub fn from_item(item: &RawItem, table: &TableConfig) -> Result<Self, MalformedSampleError> {
        let attrs = &table.attributes;

        let origin = text_attribute(item, &attrs.origin)?;

        let composite = match &table.layout {
            KeyLayout::CompositeSortKey {
                sort_key,
                separator,
            } => item
                .get(sort_key)
                .and_then(Value::as_str)
                .and_then(|key| key.rsplit_once(*separator)),
            KeyLayout::TimestampSortKey => None,
        };

        let peer = match (item.contains_key(&attrs.peer), composite) {
            (false, Some((peer, _))) => peer.to_string(),
            _ => text_attribute(item, &attrs.peer)?,
        };

        let raw_timestamp = match (item.contains_key(&attrs.timestamp), composite) {
            (false, Some((_, ts))) => ts.to_string(),
            _ => text_attribute(item, &attrs.timestamp)?,
        };
        let timestamp =
            parse_instant(&raw_timestamp).map_err(|e| MalformedSampleError::InvalidTimestamp {
                value: raw_timestamp.clone(),
                source: e,
            })?;

        let latency_ms = match item.get(&attrs.latency) {
            None | Some(Value::Null) => {
                return Err(MalformedSampleError::MissingAttribute {
                    attribute: attrs.latency.clone(),
                });
            }
            Some(value) => parse_latency(value)?,
        };

        Self::new(origin, peer, timestamp, latency_ms)
    }

    /// Renders the sample as a raw item in the table's layout.
    ///
    /// Latency is written as text, the way the ingestion pipeline stores it.
    /// The timestamp and composite key use the fixed-width [`format_key`] form.
    pub fn to_item(&self, table: &TableConfig) -> RawItem {
        let attrs = &table.attributes;
        let timestamp = format_key(&self.timestamp);

        let mut item = RawItem::new();
        item.insert(attrs.origin.clone(), Value::String(self.origin.clone()));
        item.insert(attrs.peer.clone(), Value::String(self.peer.clone()));
        item.insert(attrs.timestamp.clone(), Value::String(timestamp.clone()));
        item.insert(
            attrs.latency.clone(),
            Value::String(self.latency_ms.to_string()),
        );
        if let KeyLayout::CompositeSortKey {
            sort_key,
            separator,
        } = &table.layout
        {
            item.insert(
                sort_key.clone(),
                Value::String(format!("{}{separator}{timestamp}", self.peer)),
            );
        }
        item
    }
}

fn text_attribute(item: &RawItem, attribute: &str) -> Result<String, MalformedSampleError> {
    match item.get(attribute) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(MalformedSampleError::EmptyIdentifier {
            attribute: attribute.to_string(),
        }),
        _ => Err(MalformedSampleError::MissingAttribute {
            attribute: attribute.to_string(),
        }),
    }
}

fn parse_latency(value: &Value) -> Result<f64, MalformedSampleError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(latency) => {
            check_latency(latency)?;
            Ok(latency)
        }
        None => Err(MalformedSampleError::NonNumericLatency {
            value: match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }),
    }
}

fn check_latency(latency: f64) -> Result<(), MalformedSampleError> {
    if latency.is_finite() && latency >= 0.0 {
        Ok(())
    } else {
        Err(MalformedSampleError::LatencyOutOfRange { value: latency })
    }
}
