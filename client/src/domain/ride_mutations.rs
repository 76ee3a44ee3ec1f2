//! Ride write operations with optimistic cache updates.
//!
//! Both mutations follow the same protocol: cancel in-flight ride fetches,
//! snapshot every ride entry, apply a speculative edit, issue exactly one
//! gateway write, then merge or roll back. The whole `rides` namespace is
//! invalidated afterwards and the call returns once the observed entries have
//! been refetched. Writes are never retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mockable::Clock;
use serde_json::Value;
use tracing::{info, warn};

use super::optimistic::{MutationTracker, OptimisticTransaction};
use super::ports::{
    DeleteRequest, Filter, IdentityProvider, InsertRequest, RowGateway, SelectRequest, Selection,
    Table,
};
use super::query_cache::{QueryCache, QueryData};
use super::ride_queries::joined_ride_selection;
use super::row_codec::decode_row;
use super::{
    DomainResult, Error, KeyScope, NewRide, QueryKey, Ride, RideId, UserId, sort_by_departure,
};

/// Message surfaced when posting without a session.
pub const NOT_AUTHENTICATED_MESSAGE: &str = "User not authenticated. Cannot post ride.";
/// Message surfaced when the poster's profile has no usable name.
pub const PROFILE_INCOMPLETE_MESSAGE: &str =
    "Could not find user profile or name. Please complete your profile.";

/// Post and delete rides.
pub struct RideMutationService<G, I> {
    gateway: Arc<G>,
    identity: Arc<I>,
    cache: Arc<QueryCache>,
    clock: Arc<dyn Clock>,
    tracker: MutationTracker,
    placeholder_seq: AtomicU64,
}

impl<G, I> RideMutationService<G, I> {
    /// Create a new service.
    pub fn new(
        gateway: Arc<G>,
        identity: Arc<I>,
        cache: Arc<QueryCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            identity,
            cache,
            clock,
            tracker: MutationTracker::default(),
            placeholder_seq: AtomicU64::new(0),
        }
    }

    /// Whether a post or delete issued through this service is unsettled.
    pub fn is_pending(&self) -> bool {
        self.tracker.is_pending()
    }
}

impl<G, I> RideMutationService<G, I>
where
    G: RowGateway,
    I: IdentityProvider,
{
    /// Post a ride on behalf of the signed-in user.
    ///
    /// Fails before touching the cache when nobody is signed in or the
    /// poster's profile has no full name. Returns the stored ride.
    pub async fn post_ride(&self, draft: NewRide) -> DomainResult<Ride> {
        let _pending = self.tracker.begin();
        let identity = self
            .identity
            .current_identity()
            .await?
            .ok_or_else(|| Error::unauthorized(NOT_AUTHENTICATED_MESSAGE))?;
        let poster_name = self.poster_name(&identity.id).await?;
        info!(user_id = %identity.id, destination = %draft.destination, "posting ride");

        let placeholder_id = RideId::temporary(
            self.clock.utc(),
            self.placeholder_seq.fetch_add(1, Ordering::Relaxed),
        );
        let placeholder = Ride::placeholder(&draft, identity.id.clone(), placeholder_id);
        let mut tx = OptimisticTransaction::new(&self.cache, KeyScope::Rides);
        tx.apply(|key, data| append_placeholder(key, data, &placeholder))?;

        tx.begin_commit()?;
        let inserted = self
            .gateway
            .insert(InsertRequest {
                table: Table::Rides,
                row: draft.to_row(&identity.id, &poster_name),
                returning: joined_ride_selection(),
            })
            .await
            .map_err(Error::from)
            .and_then(decode_row::<Ride>);

        let outcome = match inserted {
            Ok(ride) => {
                tx.commit(|key, data| replace_placeholder(key, data, &placeholder.id, &ride))?;
                Ok(ride)
            }
            Err(err) => {
                warn!(error = %err, placeholder = %placeholder.id, "posting ride failed");
                tx.rollback()?;
                Err(err)
            }
        };
        let settlement = tx.settle(&KeyScope::Rides).await?;
        info!(?settlement, "ride post settled");
        outcome
    }

    /// Delete a ride. Authorisation is left to the backend.
    pub async fn delete_ride(&self, id: &RideId) -> DomainResult<()> {
        let _pending = self.tracker.begin();
        info!(ride_id = %id, "deleting ride");

        let mut tx = OptimisticTransaction::new(&self.cache, KeyScope::Rides);
        tx.apply(|key, data| remove_ride(key, data, id))?;

        tx.begin_commit()?;
        let deleted = self
            .gateway
            .delete(DeleteRequest {
                table: Table::Rides,
                filters: vec![Filter::eq("id", id.as_str())],
            })
            .await
            .map_err(Error::from);

        let outcome = match deleted {
            Ok(()) => tx.commit(|_, _| false),
            Err(err) => {
                warn!(error = %err, ride_id = %id, "deleting ride failed");
                tx.rollback()?;
                Err(err)
            }
        };
        let settlement = tx.settle(&KeyScope::Rides).await?;
        info!(?settlement, "ride delete settled");
        outcome
    }

    async fn poster_name(&self, user_id: &UserId) -> DomainResult<String> {
        let request = SelectRequest::new(Table::Profiles)
            .select(Selection::columns(["full_name"]))
            .filter(Filter::eq("id", user_id.as_str()))
            .single();
        let rows = match self.gateway.select(request).await {
            Ok(rows) => rows,
            Err(err) if err.is_no_rows() => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        rows.first()
            .and_then(|row| row.get("full_name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| Error::profile_incomplete(PROFILE_INCOMPLETE_MESSAGE))
    }
}

fn append_placeholder(key: &QueryKey, data: &mut QueryData, placeholder: &Ride) -> bool {
    if !key.admits(placeholder) {
        return false;
    }
    data.as_rides_mut().is_some_and(|rides| {
        rides.push(placeholder.clone());
        true
    })
}

fn replace_placeholder(
    key: &QueryKey,
    data: &mut QueryData,
    placeholder: &RideId,
    stored: &Ride,
) -> bool {
    let Some(rides) = data.as_rides_mut() else {
        return false;
    };
    let before = rides.len();
    rides.retain(|ride| ride.id != *placeholder);
    let mut changed = rides.len() != before;
    if key.admits(stored) && !rides.iter().any(|ride| ride.id == stored.id) {
        rides.push(stored.clone());
        sort_by_departure(rides);
        changed = true;
    }
    changed
}

fn remove_ride(key: &QueryKey, data: &mut QueryData, id: &RideId) -> bool {
    match data {
        QueryData::Rides(rides) => {
            let before = rides.len();
            rides.retain(|ride| ride.id != *id);
            rides.len() != before
        }
        QueryData::Ride(ride) if *key == QueryKey::SingleRide(id.clone()) => ride.take().is_some(),
        _ => false,
    }
}

#[cfg(test)]
#[path = "ride_mutations_tests.rs"]
mod tests;
