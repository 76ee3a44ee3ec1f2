//! Current-user profile query and the optimistic profile edit.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::optimistic::{MutationTracker, OptimisticTransaction};
use super::ports::{Filter, IdentityProvider, RowGateway, SelectRequest, Selection, Table, UpdateRequest};
use super::query_cache::{QueryCache, QueryData, QueryOptions, QueryState, query_fn};
use super::row_codec::decode_row;
use super::{DomainResult, Error, KeyScope, Profile, ProfileUpdate, QueryKey};

/// Freshness window of the cached profile.
pub const PROFILE_STALE_TIME: Duration = Duration::from_secs(5 * 60);

fn profile_scope() -> KeyScope {
    KeyScope::Exact(QueryKey::CurrentUserProfile)
}

/// Reads and edits the signed-in user's profile.
pub struct ProfileService<G, I> {
    gateway: Arc<G>,
    identity: Arc<I>,
    cache: Arc<QueryCache>,
    options: QueryOptions,
    tracker: MutationTracker,
}

impl<G, I> ProfileService<G, I> {
    /// Create a new service; the profile stays fresh for five minutes.
    pub fn new(gateway: Arc<G>, identity: Arc<I>, cache: Arc<QueryCache>) -> Self {
        Self {
            gateway,
            identity,
            cache,
            options: QueryOptions::default().with_stale_time(PROFILE_STALE_TIME),
            tracker: MutationTracker::default(),
        }
    }

    /// Override the profile fetch policy.
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether a profile edit is unsettled.
    pub fn is_pending(&self) -> bool {
        self.tracker.is_pending()
    }
}

impl<G, I> ProfileService<G, I>
where
    G: RowGateway + 'static,
    I: IdentityProvider + 'static,
{
    /// The signed-in user's profile; `None` data when signed out or when the
    /// row does not exist.
    pub async fn fetch_profile(&self) -> QueryState<Option<Profile>> {
        let gateway = Arc::clone(&self.gateway);
        let identity = Arc::clone(&self.identity);
        let fetch = query_fn(move || {
            let gateway = Arc::clone(&gateway);
            let identity = Arc::clone(&identity);
            async move {
                let profile = load_profile(gateway.as_ref(), identity.as_ref()).await?;
                Ok(QueryData::Profile(profile))
            }
        });
        self.cache
            .run_query(QueryKey::CurrentUserProfile, fetch, self.options)
            .await
            .project(QueryData::into_profile)
    }

    /// Overwrite full name and phone number.
    ///
    /// Input is not validated here; see
    /// [`validate_profile_input`](crate::domain::validate_profile_input).
    pub async fn update_profile(&self, update: ProfileUpdate) -> DomainResult<Profile> {
        let _pending = self.tracker.begin();
        info!(user_id = %update.user_id, "updating profile");

        let mut tx = OptimisticTransaction::new(&self.cache, profile_scope());
        tx.apply(|_, data| match data {
            QueryData::Profile(Some(profile)) => {
                profile.apply(&update);
                true
            }
            _ => false,
        })?;

        tx.begin_commit()?;
        let updated = self
            .gateway
            .update(UpdateRequest {
                table: Table::Profiles,
                filters: vec![Filter::eq("id", update.user_id.as_str())],
                patch: update.to_patch(),
                returning: Selection::all(),
            })
            .await
            .map_err(Error::from)
            .and_then(decode_row::<Profile>);

        let outcome = match updated {
            Ok(profile) => {
                tx.commit(|_, _| false)?;
                self.cache
                    .set(&QueryKey::CurrentUserProfile, QueryData::Profile(Some(profile.clone())));
                Ok(profile)
            }
            Err(err) => {
                warn!(error = %err, user_id = %update.user_id, "profile update failed");
                tx.rollback()?;
                Err(err)
            }
        };
        let settlement = tx.settle(&profile_scope()).await?;
        info!(?settlement, "profile update settled");
        outcome
    }
}

async fn load_profile<G, I>(gateway: &G, identity: &I) -> DomainResult<Option<Profile>>
where
    G: RowGateway + ?Sized,
    I: IdentityProvider + ?Sized,
{
    let Some(identity) = identity.current_identity().await? else {
        return Ok(None);
    };
    let request = SelectRequest::new(Table::Profiles)
        .filter(Filter::eq("id", identity.id.as_str()))
        .single();
    match gateway.select(request).await {
        Ok(rows) => rows.into_iter().next().map(decode_row).transpose(),
        Err(err) if err.is_no_rows() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
#[path = "profile_service_tests.rs"]
mod tests;
