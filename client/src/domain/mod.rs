//! Domain primitives, the query cache and the ride/profile services.
//!
//! Purpose: own the client-side synchronisation rules for rides and
//! profiles. Everything here is transport agnostic; the backend is reached
//! only through the traits in [`ports`].
//!
//! Public surface:
//! - Ride, Profile, Identity and their ids, plus date/time windows.
//! - QueryKey and KeyScope: cache descriptors and the scopes that select them.
//! - QueryCache: the shared keyed store with observers and invalidation.
//! - OptimisticTransaction: snapshot, speculative edit, commit or rollback.
//! - RideQueryService, RideMutationService, ProfileService.
//! - Error and ErrorCode: the error payload every operation surfaces.

pub mod date_window;
pub mod error;
pub mod optimistic;
pub mod ports;
pub mod profile;
pub mod profile_service;
pub mod query_cache;
pub mod query_key;
pub mod ride;
pub mod ride_mutations;
pub mod ride_queries;
mod row_codec;
pub mod timestamp;
pub mod user;

pub use self::date_window::{DateWindow, TimeWindow, TimeWindowError};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::optimistic::{
    MutationTracker, OptimisticTransaction, PendingMutation, Settlement, TransactionState,
};
pub use self::profile::{
    FULL_NAME_MIN, PHONE_NUMBER_DIGITS, Profile, ProfileUpdate, ProfileValidationError,
    validate_profile_input,
};
pub use self::profile_service::{PROFILE_STALE_TIME, ProfileService};
pub use self::query_cache::{
    CacheEntry, DEFAULT_QUERY_RETRIES, QueryCache, QueryData, QueryFn, QueryObserver,
    QueryOptions, QueryState, QueryStatus, TokioSleeper, query_fn,
};
pub use self::query_key::{KeyScope, QueryKey, RideFilter};
pub use self::ride::{
    NewRide, PLACEHOLDER_POSTER_NAME, PosterContact, Ride, RideId, TEMPORARY_ID_PREFIX,
    sort_by_departure,
};
pub use self::ride_mutations::RideMutationService;
pub use self::ride_queries::{
    RideQueryService, all_rides_request, filtered_rides_request, ride_by_id_request,
    rides_by_date_request, rides_by_user_request,
};
pub use self::timestamp::{TimestampError, format_instant, parse_instant};
pub use self::user::{Identity, UserId, UserIdValidationError};

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, Error>;
