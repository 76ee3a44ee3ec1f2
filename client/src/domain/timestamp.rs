//! Timestamp text encoding shared by ride rows and gateway filters.
//!
//! Outgoing instants are rendered as RFC 3339 with millisecond precision and a
//! `Z` suffix. Incoming values may carry an offset or be naive, in which case
//! they are read as UTC.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Render an instant the way the backend stores and compares it.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use carpool::domain::format_instant;
///
/// let at = Utc.with_ymd_and_hms(2024, 3, 10, 14, 0, 0).single().expect("valid");
/// assert_eq!(format_instant(at), "2024-03-10T14:00:00.000Z");
/// ```
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returned when timestamp text matches none of the accepted layouts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp `{raw}`: {reason}")]
pub struct TimestampError {
    /// Text that failed to parse.
    pub raw: String,
    /// Parser diagnostic for the naive layouts.
    pub reason: String,
}

/// Parse an instant from RFC 3339 text or from a naive timestamp taken as UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|err| TimestampError {
            raw: raw.to_owned(),
            reason: err.to_string(),
        })
}

pub(crate) mod serde_instant {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub(crate) fn serialize<S: Serializer>(
        instant: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_instant(*instant))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_instant(&raw).map_err(D::Error::custom)
    }
}
