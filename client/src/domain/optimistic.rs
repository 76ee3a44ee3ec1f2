//! Optimistic write protocol shared by the ride and profile mutations.
//!
//! A transaction snapshots every cache entry in its scope, applies a
//! speculative edit, and then either merges the authoritative result or puts
//! the snapshot back. Whatever the outcome, [`OptimisticTransaction::settle`]
//! invalidates the affected scope and waits for the scheduled refetches.
//!
//! ```text
//! Idle --apply--> Optimistic --begin_commit--> Committing --commit--> Settled(Committed)
//!                     |                            |
//!                     +----------rollback----------+-----> Settled(RolledBack)
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use super::query_cache::{CacheEntry, QueryCache, QueryData};
use super::{Error, KeyScope, QueryKey};

/// How a settled transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The authoritative result was merged.
    Committed,
    /// The snapshot was restored.
    RolledBack,
}

/// Position of a transaction in the optimistic protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Nothing applied yet.
    Idle,
    /// Speculative edit visible in the cache.
    Optimistic,
    /// The authoritative write is in flight.
    Committing,
    /// Finished.
    Settled(Settlement),
}

/// One optimistic write against the cache.
pub struct OptimisticTransaction<'a> {
    cache: &'a QueryCache,
    scope: KeyScope,
    snapshot: Vec<CacheEntry>,
    state: TransactionState,
}

impl<'a> OptimisticTransaction<'a> {
    /// Start a transaction over `scope`.
    pub fn new(cache: &'a QueryCache, scope: KeyScope) -> Self {
        Self {
            cache,
            scope,
            snapshot: Vec::new(),
            state: TransactionState::Idle,
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Entries captured when the speculative edit was applied.
    pub fn snapshot(&self) -> &[CacheEntry] {
        &self.snapshot
    }

    /// Cancel in-flight fetches, snapshot the scope and apply `edit`.
    pub fn apply(
        &mut self,
        edit: impl FnMut(&QueryKey, &mut QueryData) -> bool,
    ) -> Result<(), Error> {
        self.transition(TransactionState::Idle, TransactionState::Optimistic)?;
        self.snapshot = self.cache.apply_optimistic(&self.scope, edit);
        debug!(entries = self.snapshot.len(), "applied optimistic edit");
        Ok(())
    }

    /// Record that the authoritative write has been issued.
    pub fn begin_commit(&mut self) -> Result<(), Error> {
        self.transition(TransactionState::Optimistic, TransactionState::Committing)
    }

    /// Merge the authoritative result into every entry in scope.
    pub fn commit(
        &mut self,
        finalize: impl FnMut(&QueryKey, &mut QueryData) -> bool,
    ) -> Result<(), Error> {
        self.transition(
            TransactionState::Committing,
            TransactionState::Settled(Settlement::Committed),
        )?;
        self.cache.update(&self.scope, finalize);
        Ok(())
    }

    /// Restore the snapshot verbatim.
    pub fn rollback(&mut self) -> Result<(), Error> {
        match self.state {
            TransactionState::Optimistic | TransactionState::Committing => {
                self.restore();
                Ok(())
            }
            other => Err(illegal(other, "rolled back")),
        }
    }

    /// Invalidate `invalidate` and wait for the refetches it schedules.
    pub async fn settle(self, invalidate: &KeyScope) -> Result<Settlement, Error> {
        let TransactionState::Settled(settlement) = self.state else {
            return Err(illegal(self.state, "settled"));
        };
        self.cache.invalidate(invalidate);
        let refetched = self.cache.refetch_pending().await;
        debug!(?settlement, refetched, "optimistic transaction settled");
        Ok(settlement)
    }

    fn restore(&mut self) {
        self.cache.restore(&self.snapshot);
        self.state = TransactionState::Settled(Settlement::RolledBack);
        warn!(entries = self.snapshot.len(), "rolled back optimistic edit");
    }

    fn transition(&mut self, from: TransactionState, to: TransactionState) -> Result<(), Error> {
        if self.state != from {
            return Err(illegal(self.state, "moved to the next state"));
        }
        self.state = to;
        Ok(())
    }
}

impl Drop for OptimisticTransaction<'_> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            TransactionState::Optimistic | TransactionState::Committing
        ) {
            self.restore();
        }
    }
}

fn illegal(state: TransactionState, action: &str) -> Error {
    Error::internal(format!(
        "optimistic transaction in state {state:?} cannot be {action}"
    ))
}

/// Counts mutation calls that have not settled yet.
#[derive(Debug, Default)]
pub struct MutationTracker {
    in_flight: AtomicUsize,
}

impl MutationTracker {
    /// Mark a mutation as started until the returned guard drops.
    pub fn begin(&self) -> PendingMutation<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        PendingMutation { tracker: self }
    }

    /// Whether any mutation is unsettled.
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

/// Guard returned by [`MutationTracker::begin`].
#[derive(Debug)]
pub struct PendingMutation<'a> {
    tracker: &'a MutationTracker,
}

impl Drop for PendingMutation<'_> {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::{Profile, UserId};
    use crate::test_support::{ImmediateSleeper, MutableClock};

    #[fixture]
    fn cache() -> QueryCache {
        let now = Utc
            .with_ymd_and_hms(2024, 3, 1, 8, 0, 0)
            .single()
            .expect("valid fixture timestamp");
        QueryCache::new(Arc::new(MutableClock::new(now)), Arc::new(ImmediateSleeper))
    }

    fn profile(name: &str) -> QueryData {
        QueryData::Profile(Some(Profile {
            id: UserId::new("u1").expect("user id"),
            full_name: Some(name.to_owned()),
            phone_number: None,
            avatar_url: None,
        }))
    }

    fn rename(name: &'static str) -> impl FnMut(&QueryKey, &mut QueryData) -> bool {
        move |_, data| match data {
            QueryData::Profile(Some(profile)) => {
                profile.full_name = Some(name.to_owned());
                true
            }
            _ => false,
        }
    }

    fn scope() -> KeyScope {
        KeyScope::Exact(QueryKey::CurrentUserProfile)
    }

    fn cached(cache: &QueryCache) -> Option<QueryData> {
        cache
            .get(&QueryKey::CurrentUserProfile)
            .and_then(|entry| entry.data)
    }

    #[rstest]
    #[tokio::test]
    async fn commit_path_walks_every_state(cache: QueryCache) {
        cache.set(&QueryKey::CurrentUserProfile, profile("Asha"));
        let mut tx = OptimisticTransaction::new(&cache, scope());
        assert_eq!(tx.state(), TransactionState::Idle);

        tx.apply(rename("Asha R")).expect("apply");
        assert_eq!(tx.state(), TransactionState::Optimistic);
        assert_eq!(cached(&cache), Some(profile("Asha R")));

        tx.begin_commit().expect("begin commit");
        tx.commit(rename("Asha Rao")).expect("commit");
        assert_eq!(
            tx.state(),
            TransactionState::Settled(Settlement::Committed)
        );
        assert_eq!(cached(&cache), Some(profile("Asha Rao")));

        let settlement = tx.settle(&scope()).await.expect("settle");
        assert_eq!(settlement, Settlement::Committed);
    }

    #[rstest]
    fn rollback_restores_the_snapshot(cache: QueryCache) {
        cache.set(&QueryKey::CurrentUserProfile, profile("Asha"));
        let before = cache.get(&QueryKey::CurrentUserProfile);
        let mut tx = OptimisticTransaction::new(&cache, scope());

        tx.apply(rename("Someone else")).expect("apply");
        tx.begin_commit().expect("begin commit");
        tx.rollback().expect("rollback");

        assert_eq!(
            tx.state(),
            TransactionState::Settled(Settlement::RolledBack)
        );
        assert_eq!(cache.get(&QueryKey::CurrentUserProfile), before);
    }

    #[rstest]
    fn dropping_an_unsettled_transaction_rolls_back(cache: QueryCache) {
        cache.set(&QueryKey::CurrentUserProfile, profile("Asha"));
        {
            let mut tx = OptimisticTransaction::new(&cache, scope());
            tx.apply(rename("Abandoned")).expect("apply");
        }
        assert_eq!(cached(&cache), Some(profile("Asha")));
    }

    #[rstest]
    #[case::commit_before_apply(false)]
    #[case::rollback_before_apply(true)]
    fn illegal_transitions_are_internal_errors(cache: QueryCache, #[case] rollback: bool) {
        let mut tx = OptimisticTransaction::new(&cache, scope());
        let err = if rollback {
            tx.rollback().expect_err("idle rollback rejected")
        } else {
            tx.commit(|_, _| false).expect_err("idle commit rejected")
        };
        assert_eq!(err.code(), crate::domain::ErrorCode::InternalError);
        assert_eq!(tx.state(), TransactionState::Idle);
    }

    #[rstest]
    #[tokio::test]
    async fn settling_requires_a_settled_transaction(cache: QueryCache) {
        let mut tx = OptimisticTransaction::new(&cache, scope());
        tx.apply(|_, _| false).expect("apply");
        let err = tx.settle(&scope()).await.expect_err("unsettled");
        assert_eq!(err.code(), crate::domain::ErrorCode::InternalError);
    }

    #[rstest]
    fn tracker_counts_unsettled_mutations() {
        let tracker = MutationTracker::default();
        assert!(!tracker.is_pending());
        let first = tracker.begin();
        let second = tracker.begin();
        drop(first);
        assert!(tracker.is_pending());
        drop(second);
        assert!(!tracker.is_pending());
    }
}
