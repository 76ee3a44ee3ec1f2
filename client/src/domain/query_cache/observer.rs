//! Live subscriptions to a single cache entry.

use tokio::sync::watch;

use super::entry::{QueryData, QueryState};
use crate::domain::QueryKey;

/// Receives every state an entry publishes.
///
/// Dropping the observer unregisters it; entries with no observers are no
/// longer refetched eagerly when invalidated.
#[derive(Debug)]
pub struct QueryObserver {
    key: QueryKey,
    receiver: watch::Receiver<QueryState<QueryData>>,
}

impl QueryObserver {
    pub(super) fn new(key: QueryKey, receiver: watch::Receiver<QueryState<QueryData>>) -> Self {
        Self { key, receiver }
    }

    /// Descriptor being observed.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Latest published state, marking it as seen.
    pub fn current(&mut self) -> QueryState<QueryData> {
        self.receiver.borrow_and_update().clone()
    }

    /// Whether a state was published since the last [`Self::current`].
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Wait for the next published state. Returns `None` once the cache is
    /// gone.
    pub async fn changed(&mut self) -> Option<QueryState<QueryData>> {
        self.receiver.changed().await.ok()?;
        Some(self.current())
    }

    /// Wait until the entry reaches a state satisfying `predicate`.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&QueryState<QueryData>) -> bool,
    ) -> Option<QueryState<QueryData>> {
        self.receiver
            .wait_for(|state| predicate(state))
            .await
            .ok()
            .map(|state| state.clone())
    }
}
