//! ISO-8601 instant parsing and store-key rendering.
//!
//! Callers hand over bounds in whatever offset the user typed. Everything is
//! normalised to UTC before it reaches a store, and stored timestamps are
//! UTC ISO-8601 strings compared lexicographically by the store.
//!
//! Stored timestamps and composite sort keys must be written with
//! [`format_key`]: fixed-width nanosecond precision and a `Z` suffix. Only
//! then does text order match time order, which newest-first lookups rely on.
//! Mixed widths break it, since `12:00:00Z` sorts after `12:00:00.500Z`.
//!
//! Store-side range bounds are rendered at second granularity:
//!
//! ```text
//! floor(12:00:00.250Z)   = "2024-05-01T12:00:00"     <- prefix of every rendering of that second
//! ceiling(12:00:00.250Z) = "2024-05-01T12:00:00~"    <- '~' sorts after digits, '.', 'Z', '+', '-'
//! ```
//!
//! The pushed-down range is therefore a superset of the exact window,
//! whichever suffix (`Z`, `+00:00`, fractional seconds) the writer used. The
//! adapter reconciles the result against the exact instants afterwards.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Sorts after every character that can follow the seconds field.
pub const KEY_CEILING: char = '~';

const SECONDS_PREFIX: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses an ISO-8601 instant and converts it to UTC.
///
/// Strings carrying an offset (`Z`, `+02:00`, ...) are converted; strings
/// with no offset are taken to already be UTC. A bare date means midnight UTC.
///
/// # Errors
///
/// Returns the RFC 3339 parse error if no accepted form matches.
///
/// # Examples
///
/// ```rust
/// use pingrank::instant::{format_instant, parse_instant};
///
/// let t = parse_instant("2024-05-01T08:00:00-04:00")?;
/// assert_eq!(format_instant(&t), "2024-05-01T12:00:00Z");
/// # Ok::<(), chrono::ParseError>(())
/// ```
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let input = input.trim();
    let rfc3339_err = match DateTime::parse_from_rfc3339(input) {
        Ok(dt) => return Ok(dt.with_timezone(&Utc)),
        Err(e) => e,
    };

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc());
    }

    Err(rfc3339_err)
}

/// Renders an instant as canonical UTC ISO-8601 (`...Z`).
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Renders an instant as a fixed-width UTC store key.
///
/// Every key has the same length, so lexicographic order is time order.
///
/// ```rust
/// use pingrank::instant::{format_key, parse_instant};
///
/// let t = parse_instant("2024-05-01T12:00:00.5Z")?;
/// assert_eq!(format_key(&t), "2024-05-01T12:00:00.500000000Z");
/// # Ok::<(), chrono::ParseError>(())
/// ```
pub fn format_key(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Smallest store key that can hold a rendering of `instant`'s second.
pub fn key_floor(instant: &DateTime<Utc>) -> String {
    instant.format(SECONDS_PREFIX).to_string()
}

/// Largest store key that can hold a rendering of `instant`'s second.
pub fn key_ceiling(instant: &DateTime<Utc>) -> String {
    format!("{}{KEY_CEILING}", instant.format(SECONDS_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset_converts_to_utc() {
        let t = parse_instant("2024-05-01T14:30:00+02:00").unwrap();
        assert_eq!(format_instant(&t), "2024-05-01T12:30:00Z");
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let t = parse_instant("2024-05-01T12:30:00.5").unwrap();
        assert_eq!(format_instant(&t), "2024-05-01T12:30:00.500Z");
    }

    #[test]
    fn test_parse_bare_date_is_midnight() {
        let t = parse_instant("2024-05-01").unwrap();
        assert_eq!(format_instant(&t), "2024-05-01T00:00:00Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_instant("yesterday").is_err());
        assert!(parse_instant("").is_err());
    }

    #[test]
    fn test_key_text_order_is_time_order() {
        let instants: Vec<_> = [
            "2024-05-01T11:59:59.999999999Z",
            "2024-05-01T12:00:00Z",
            "2024-05-01T12:00:00.000000001Z",
            "2024-05-01T12:00:00.5Z",
            "2024-05-01T12:00:01Z",
        ]
        .iter()
        .map(|s| parse_instant(s).unwrap())
        .collect();

        let keys: Vec<_> = instants.iter().map(format_key).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "{keys:?}");
        assert!(keys.iter().all(|k| k.len() == keys[0].len()));

        let t = parse_instant("2024-05-01T12:00:00.5Z").unwrap();
        assert!(key_floor(&t) <= format_key(&t));
        assert!(format_key(&t) <= key_ceiling(&t));
    }

    #[test]
    fn test_key_range_brackets_every_rendering() {
        let t = parse_instant("2024-05-01T12:00:00.250Z").unwrap();
        let floor = key_floor(&t);
        let ceiling = key_ceiling(&t);

        for stored in [
            "2024-05-01T12:00:00Z",
            "2024-05-01T12:00:00+00:00",
            "2024-05-01T12:00:00.999999Z",
        ] {
            assert!(floor.as_str() <= stored, "{stored} below floor");
            assert!(stored <= ceiling.as_str(), "{stored} above ceiling");
        }

        assert!("2024-05-01T12:00:01Z" > ceiling.as_str());
        assert!("2024-05-01T11:59:59.999Z" < floor.as_str());
    }
}
