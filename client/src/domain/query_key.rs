//! Cache descriptors for ride and profile reads.
//!
//! Two structurally equal keys address the same cache entry. Every ride key
//! lives in the `rides` namespace so a single [`KeyScope::Rides`] can cancel,
//! snapshot or invalidate all of them at once.

use std::fmt;

use chrono::NaiveDate;

use super::date_window::{DateWindow, TimeWindow};
use super::ride::{Ride, RideId};
use super::user::UserId;

/// Parameters of a filtered ride search.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RideFilter {
    /// Case-insensitive fragment matched against the destination.
    pub destination: String,
    /// Case-insensitive fragment matched against the origin.
    pub origin: String,
    /// Departure day, in UTC.
    pub date: NaiveDate,
    /// Optional time of day narrowing the start of the day.
    pub time_window: Option<TimeWindow>,
}

impl RideFilter {
    /// Build a filter from its parts.
    pub fn new(
        destination: impl Into<String>,
        origin: impl Into<String>,
        date: NaiveDate,
        time_window: Option<TimeWindow>,
    ) -> Self {
        Self {
            destination: destination.into(),
            origin: origin.into(),
            date,
            time_window,
        }
    }

    /// A filtered search only runs once both text fragments are filled in.
    pub fn is_complete(&self) -> bool {
        !self.destination.trim().is_empty() && !self.origin.trim().is_empty()
    }

    /// Departure range the search covers.
    pub fn window(&self) -> DateWindow {
        DateWindow::starting_at(self.date, self.time_window)
    }

    /// Whether `ride` would be returned by this search.
    pub fn matches(&self, ride: &Ride) -> bool {
        contains_ignoring_case(&ride.destination, &self.destination)
            && contains_ignoring_case(&ride.origin, &self.origin)
            && self.window().contains(ride.date)
    }
}

fn contains_ignoring_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Descriptor of a cached read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// Unfiltered ride listing.
    AllRides,
    /// Ride search by destination, origin and day.
    RidesByFilter(RideFilter),
    /// Rides posted by one user.
    RidesByUser(UserId),
    /// Rides departing on one day.
    RidesByDate(NaiveDate),
    /// A single ride.
    SingleRide(RideId),
    /// The signed-in user's profile.
    CurrentUserProfile,
}

impl QueryKey {
    /// Whether the key belongs to the `rides` namespace.
    pub fn is_ride_query(&self) -> bool {
        !matches!(self, Self::CurrentUserProfile)
    }

    /// Whether a freshly posted `ride` belongs in the list this key caches.
    ///
    /// Single-ride entries never take part in list fan-out.
    pub fn admits(&self, ride: &Ride) -> bool {
        match self {
            Self::AllRides => true,
            Self::RidesByFilter(filter) => filter.matches(ride),
            Self::RidesByUser(user_id) => ride.user_id == *user_id,
            Self::RidesByDate(date) => DateWindow::for_day(*date).contains(ride.date),
            Self::SingleRide(_) | Self::CurrentUserProfile => false,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllRides => f.write_str("rides/all"),
            Self::RidesByFilter(filter) => {
                write!(
                    f,
                    "rides/filter/{}/{}/{}",
                    filter.destination, filter.origin, filter.date
                )?;
                if let Some(window) = filter.time_window {
                    write!(f, "@{window}")?;
                }
                Ok(())
            }
            Self::RidesByUser(user_id) => write!(f, "rides/by-user/{user_id}"),
            Self::RidesByDate(date) => write!(f, "rides/by-date/{date}"),
            Self::SingleRide(id) => write!(f, "rides/single/{id}"),
            Self::CurrentUserProfile => f.write_str("profile/current"),
        }
    }
}

/// Set of keys targeted by cancel, invalidate and optimistic edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyScope {
    /// Every entry in the cache.
    All,
    /// Every ride entry.
    Rides,
    /// Exactly one entry.
    Exact(QueryKey),
}

impl KeyScope {
    /// Whether `key` falls inside the scope.
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::All => true,
            Self::Rides => key.is_ride_query(),
            Self::Exact(exact) => exact == key,
        }
    }
}
