//! Ride rows and the values used to create them.
//!
//! A ride's `name` is copied from the poster's profile when the ride is
//! posted; later profile edits never rewrite it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use super::timestamp::{format_instant, serde_instant};
use super::user::UserId;

/// Prefix marking ids minted locally for optimistic placeholders.
pub const TEMPORARY_ID_PREFIX: &str = "temp-";

/// Poster label shown on a placeholder until the insert is confirmed.
pub const PLACEHOLDER_POSTER_NAME: &str = "Loading...";

/// Opaque ride identifier.
///
/// Server ids may arrive as JSON strings or integers; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct RideId(String);

impl RideId {
    /// Wrap a server-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a placeholder id as `temp-<millis>-<sequence>`.
    ///
    /// The sequence keeps ids minted within the same millisecond distinct.
    pub fn temporary(now: DateTime<Utc>, sequence: u64) -> Self {
        Self(format!(
            "{TEMPORARY_ID_PREFIX}{}-{sequence}",
            now.timestamp_millis()
        ))
    }

    /// Whether this id belongs to an optimistic placeholder.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RideId> for String {
    fn from(value: RideId) -> Self {
        value.0
    }
}

impl<'de> Deserialize<'de> for RideId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        })
    }
}

/// Poster contact details joined from the `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PosterContact {
    /// Poster phone number; `None` when the profile has not recorded one.
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// A posted ride offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ride {
    /// Server-assigned id, or a `temp-` id while optimistic.
    pub id: RideId,
    /// Where the ride is heading.
    pub destination: String,
    /// Where the ride leaves from.
    #[serde(rename = "from")]
    pub origin: String,
    /// Departure instant.
    #[serde(with = "serde_instant")]
    pub date: DateTime<Utc>,
    /// Poster identity.
    pub user_id: UserId,
    /// Poster display name captured at post time.
    pub name: String,
    /// Joined poster contact; absent when the query did not join profiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<PosterContact>,
}

impl Ride {
    /// Build the optimistic stand-in shown while a post is in flight.
    pub fn placeholder(draft: &NewRide, user_id: UserId, id: RideId) -> Self {
        Self {
            id,
            destination: draft.destination.clone(),
            origin: draft.origin.clone(),
            date: draft.date,
            user_id,
            name: PLACEHOLDER_POSTER_NAME.to_owned(),
            profiles: Some(PosterContact::default()),
        }
    }

    /// Poster phone number, when joined and recorded.
    pub fn phone_number(&self) -> Option<&str> {
        self.profiles
            .as_ref()
            .and_then(|contact| contact.phone_number.as_deref())
    }
}

/// Caller input for posting a ride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRide {
    /// Where the ride is heading.
    pub destination: String,
    /// Where the ride leaves from.
    pub origin: String,
    /// Departure instant.
    pub date: DateTime<Utc>,
}

impl NewRide {
    /// Build the insert row stamped with the poster's id and display name.
    pub fn to_row(&self, user_id: &UserId, poster_name: &str) -> Value {
        json!({
            "destination": self.destination,
            "from": self.origin,
            "date": format_instant(self.date),
            "user_id": user_id.as_str(),
            "name": poster_name,
        })
    }
}

/// Sort rides by departure, earliest first, keeping insertion order for ties.
pub fn sort_by_departure(rides: &mut [Ride]) {
    rides.sort_by_key(|ride| ride.date);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    #[fixture]
    fn departure() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 14, 0, 0)
            .single()
            .expect("valid fixture timestamp")
    }

    #[rstest]
    fn decodes_joined_row_with_numeric_id(departure: DateTime<Utc>) {
        let ride: Ride = serde_json::from_value(json!({
            "id": 9,
            "destination": "Airport",
            "from": "Station",
            "date": "2024-03-10T14:00:00",
            "user_id": "u1",
            "name": "Asha",
            "profiles": { "phone_number": "9999999999" }
        }))
        .expect("row decodes");

        assert_eq!(ride.id, RideId::new("9"));
        assert_eq!(ride.date, departure);
        assert_eq!(ride.phone_number(), Some("9999999999"));
    }

    #[rstest]
    fn decodes_row_without_join() {
        let ride: Ride = serde_json::from_value(json!({
            "id": "r1",
            "destination": "Airport",
            "from": "Station",
            "date": "2024-03-10T14:00:00+00:00",
            "user_id": "u1",
            "name": "Asha"
        }))
        .expect("row decodes");

        assert!(ride.profiles.is_none());
        assert_eq!(ride.phone_number(), None);
    }

    #[rstest]
    fn placeholder_is_temporary_and_unconfirmed(departure: DateTime<Utc>) {
        let draft = NewRide {
            destination: "Airport".to_owned(),
            origin: "Station".to_owned(),
            date: departure,
        };
        let user = UserId::new("u1").expect("user id");

        let placeholder = Ride::placeholder(&draft, user, RideId::temporary(departure, 3));

        assert!(placeholder.id.is_temporary());
        assert_eq!(
            placeholder.id.as_str(),
            format!("temp-{}-3", departure.timestamp_millis())
        );
        assert_eq!(placeholder.name, PLACEHOLDER_POSTER_NAME);
        assert_eq!(placeholder.phone_number(), None);
    }

    #[rstest]
    fn temporary_ids_in_one_millisecond_differ(departure: DateTime<Utc>) {
        assert_ne!(
            RideId::temporary(departure, 0),
            RideId::temporary(departure, 1)
        );
    }

    #[rstest]
    fn insert_row_carries_poster_stamp(departure: DateTime<Utc>) {
        let draft = NewRide {
            destination: "Airport".to_owned(),
            origin: "Station".to_owned(),
            date: departure,
        };
        let user = UserId::new("u1").expect("user id");

        assert_eq!(
            draft.to_row(&user, "Asha"),
            json!({
                "destination": "Airport",
                "from": "Station",
                "date": "2024-03-10T14:00:00.000Z",
                "user_id": "u1",
                "name": "Asha",
            })
        );
    }
}
