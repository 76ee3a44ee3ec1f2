//! Cache entry payloads and the state observers see.

use chrono::{DateTime, Utc};

use crate::domain::{Error, Profile, QueryKey, Ride};

/// Payload stored under a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
    /// A ride listing.
    Rides(Vec<Ride>),
    /// A single ride; `None` when the backend reported no such row.
    Ride(Option<Ride>),
    /// The current user's profile; `None` when signed out or missing.
    Profile(Option<Profile>),
}

impl QueryData {
    /// Borrow a ride listing.
    pub fn as_rides(&self) -> Option<&[Ride]> {
        match self {
            Self::Rides(rides) => Some(rides),
            _ => None,
        }
    }

    /// Mutably borrow a ride listing.
    pub fn as_rides_mut(&mut self) -> Option<&mut Vec<Ride>> {
        match self {
            Self::Rides(rides) => Some(rides),
            _ => None,
        }
    }

    /// Take a ride listing.
    pub fn into_rides(self) -> Option<Vec<Ride>> {
        match self {
            Self::Rides(rides) => Some(rides),
            _ => None,
        }
    }

    /// Take a single-ride payload.
    pub fn into_ride(self) -> Option<Option<Ride>> {
        match self {
            Self::Ride(ride) => Some(ride),
            _ => None,
        }
    }

    /// Take a profile payload.
    pub fn into_profile(self) -> Option<Option<Profile>> {
        match self {
            Self::Profile(profile) => Some(profile),
            _ => None,
        }
    }
}

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    /// Never fetched, or disabled.
    #[default]
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The last fetch stored data.
    Success,
    /// The last fetch exhausted its retries.
    Error,
}

/// What a caller or observer sees for one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    /// Last stored payload.
    pub data: Option<T>,
    /// Entry status.
    pub status: QueryStatus,
    /// Last surfaced error.
    pub error: Option<Error>,
    /// Whether a fetch is currently in flight.
    pub is_fetching: bool,
}

impl<T> QueryState<T> {
    /// State of an entry that has never been fetched.
    pub fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            is_fetching: false,
        }
    }

    /// Whether the entry is loading with nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading && self.data.is_none()
    }

    /// Convert the payload, keeping status and error.
    ///
    /// A payload `project` rejects is reported as absent.
    pub fn project<U>(self, project: impl FnOnce(T) -> Option<U>) -> QueryState<U> {
        QueryState {
            data: self.data.and_then(project),
            status: self.status,
            error: self.error,
            is_fetching: self.is_fetching,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

/// Point-in-time copy of an entry, used for snapshots and rollbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Entry descriptor.
    pub key: QueryKey,
    /// Stored payload.
    pub data: Option<QueryData>,
    /// Entry status.
    pub status: QueryStatus,
    /// Last surfaced error.
    pub error: Option<Error>,
    /// Completion time of the last successful fetch or write.
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Marked stale by an invalidation.
    pub invalidated: bool,
}

impl CacheEntry {
    /// Ride listing held by the entry, if any.
    pub fn rides(&self) -> Option<&[Ride]> {
        self.data.as_ref().and_then(QueryData::as_rides)
    }
}
