//! In-memory query cache shared by the ride and profile services.
//!
//! The cache maps a [`QueryKey`] to the last fetched payload plus its status,
//! error and freshness. It never talks to the network itself: callers supply
//! the fetch function with each [`QueryCache::run_query`] and the cache keeps
//! it so invalidations can refetch later.
//!
//! All state sits behind one `std::sync::Mutex` that is only held for short,
//! synchronous critical sections. Observers are `tokio::sync::watch`
//! receivers and are notified before any write returns.
//!
//! Every fetch is stamped with a request number. Only the response of the
//! most recently issued request for a key may write the entry; `set`,
//! `restore` and `cancel` supersede whatever is in flight.

mod entry;
mod observer;
mod options;
mod retry;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use mockable::Clock;
use tokio::sync::{Notify, watch};
use tracing::{debug, warn};

use super::ports::RetrySleeper;
use super::{Error, KeyScope, QueryKey};

pub use entry::{CacheEntry, QueryData, QueryState, QueryStatus};
pub use observer::QueryObserver;
pub use options::{DEFAULT_QUERY_RETRIES, QueryOptions};
pub use retry::{TokioSleeper, retry_delay};

/// Fetch function registered for a key.
pub type QueryFn = Arc<dyn Fn() -> BoxFuture<'static, Result<QueryData, Error>> + Send + Sync>;

/// Wrap an async closure as a [`QueryFn`].
pub fn query_fn<F, Fut>(fetch: F) -> QueryFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<QueryData, Error>> + Send + 'static,
{
    Arc::new(move || fetch().boxed())
}

#[derive(Clone)]
struct RegisteredFetch {
    query_fn: QueryFn,
    options: QueryOptions,
}

struct EntrySlot {
    data: Option<QueryData>,
    status: QueryStatus,
    error: Option<Error>,
    last_fetched_at: Option<DateTime<Utc>>,
    invalidated: bool,
    active_request: Option<u64>,
    fetcher: Option<RegisteredFetch>,
    publisher: watch::Sender<QueryState<QueryData>>,
}

impl EntrySlot {
    fn new() -> Self {
        let (publisher, _) = watch::channel(QueryState::idle());
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            last_fetched_at: None,
            invalidated: false,
            active_request: None,
            fetcher: None,
            publisher,
        }
    }

    fn state(&self) -> QueryState<QueryData> {
        QueryState {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            is_fetching: self.active_request.is_some(),
        }
    }

    fn snapshot(&self, key: &QueryKey) -> CacheEntry {
        CacheEntry {
            key: key.clone(),
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            last_fetched_at: self.last_fetched_at,
            invalidated: self.invalidated,
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state());
    }

    fn is_fresh(&self, now: DateTime<Utc>, options: &QueryOptions) -> bool {
        if self.invalidated || self.status != QueryStatus::Success || self.data.is_none() {
            return false;
        }
        let stale_time = TimeDelta::from_std(options.stale_time).unwrap_or(TimeDelta::MAX);
        self.last_fetched_at
            .is_some_and(|fetched| now.signed_duration_since(fetched) < stale_time)
    }

    /// Drop any in-flight request and settle the status on what is stored.
    fn supersede(&mut self) -> bool {
        if self.active_request.take().is_none() {
            return false;
        }
        self.status = if self.data.is_some() {
            QueryStatus::Success
        } else if self.error.is_some() {
            QueryStatus::Error
        } else {
            QueryStatus::Idle
        };
        true
    }

    fn store(&mut self, data: QueryData, now: DateTime<Utc>) {
        self.data = Some(data);
        self.status = QueryStatus::Success;
        self.error = None;
        self.last_fetched_at = Some(now);
        self.invalidated = false;
    }
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<QueryKey, EntrySlot>,
    pending_refetch: HashSet<QueryKey>,
    next_request: u64,
}

impl CacheState {
    fn slot_mut(&mut self, key: &QueryKey) -> &mut EntrySlot {
        self.slots.entry(key.clone()).or_insert_with(EntrySlot::new)
    }

    fn issue_request(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }

    fn matching_mut<'a>(
        &'a mut self,
        scope: &'a KeyScope,
    ) -> impl Iterator<Item = (&'a QueryKey, &'a mut EntrySlot)> + 'a {
        self.slots.iter_mut().filter(move |(key, _)| scope.matches(key))
    }
}

/// Process-wide query cache.
///
/// Construct one per process and share it through an `Arc`.
pub struct QueryCache {
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn RetrySleeper>,
    state: Mutex<CacheState>,
    refetch_signal: Notify,
}

impl QueryCache {
    /// Build an empty cache.
    pub fn new(clock: Arc<dyn Clock>, sleeper: Arc<dyn RetrySleeper>) -> Self {
        Self {
            clock,
            sleeper,
            state: Mutex::new(CacheState::default()),
            refetch_signal: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read `key`, fetching through `query_fn` unless disabled or fresh.
    ///
    /// The fetch function and options are remembered for later refetches.
    pub async fn run_query(
        &self,
        key: QueryKey,
        query_fn: QueryFn,
        options: QueryOptions,
    ) -> QueryState<QueryData> {
        let now = self.clock.utc();
        {
            let mut state = self.lock();
            let slot = state.slot_mut(&key);
            slot.fetcher = Some(RegisteredFetch {
                query_fn: Arc::clone(&query_fn),
                options,
            });
            if !options.enabled {
                return QueryState {
                    is_fetching: false,
                    ..slot.state()
                };
            }
            if slot.is_fresh(now, &options) {
                debug!(%key, "serving fresh cache entry");
                return slot.state();
            }
        }
        self.fetch(key, query_fn, options.retry).await
    }

    async fn fetch(&self, key: QueryKey, query_fn: QueryFn, retry: u32) -> QueryState<QueryData> {
        let request = {
            let mut state = self.lock();
            let request = state.issue_request();
            let slot = state.slot_mut(&key);
            slot.active_request = Some(request);
            slot.status = QueryStatus::Loading;
            slot.publish();
            request
        };
        debug!(%key, request, "fetching");

        let mut attempt = 0;
        let outcome = loop {
            let result = query_fn().await;
            if !self.is_current(&key, request) {
                debug!(%key, request, "discarding superseded response");
                return self.state_of(&key);
            }
            match result {
                Ok(data) => break Ok(data),
                Err(err) if attempt < retry => {
                    debug!(%key, request, attempt, error = %err, "retrying query");
                    self.sleeper.sleep(retry_delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => break Err(err),
            }
        };

        let now = self.clock.utc();
        let mut state = self.lock();
        let slot = state.slot_mut(&key);
        if slot.active_request != Some(request) {
            debug!(%key, request, "discarding superseded response");
            return slot.state();
        }
        slot.active_request = None;
        match outcome {
            Ok(data) => slot.store(data, now),
            Err(err) => {
                slot.status = QueryStatus::Error;
                slot.error = Some(err);
            }
        }
        slot.publish();
        slot.state()
    }

    fn is_current(&self, key: &QueryKey, request: u64) -> bool {
        self.lock()
            .slots
            .get(key)
            .is_some_and(|slot| slot.active_request == Some(request))
    }

    fn state_of(&self, key: &QueryKey) -> QueryState<QueryData> {
        self.lock()
            .slots
            .get(key)
            .map_or_else(QueryState::idle, EntrySlot::state)
    }

    /// Snapshot of `key`, without fetching.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.lock().slots.get(key).map(|slot| slot.snapshot(key))
    }

    /// Overwrite the payload of `key` and notify its observers.
    pub fn set(&self, key: &QueryKey, data: QueryData) {
        let now = self.clock.utc();
        let mut state = self.lock();
        let slot = state.slot_mut(key);
        slot.active_request = None;
        slot.store(data, now);
        slot.publish();
    }

    /// Suspend in-flight fetches for every key in `scope`; their responses
    /// will be discarded. Returns the number of fetches cancelled.
    pub fn cancel(&self, scope: &KeyScope) -> usize {
        let mut state = self.lock();
        let mut cancelled = 0;
        for (key, slot) in state.matching_mut(scope) {
            if slot.supersede() {
                debug!(%key, "cancelled in-flight fetch");
                slot.publish();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Write snapshotted entries back verbatim.
    pub fn restore(&self, entries: &[CacheEntry]) {
        let mut state = self.lock();
        for entry in entries {
            let slot = state.slot_mut(&entry.key);
            slot.active_request = None;
            slot.data = entry.data.clone();
            slot.status = entry.status;
            slot.error = entry.error.clone();
            slot.last_fetched_at = entry.last_fetched_at;
            slot.invalidated = entry.invalidated;
            slot.publish();
        }
    }

    /// Cancel, snapshot and speculatively edit every entry in `scope`.
    ///
    /// `edit` only sees entries holding data and returns whether it changed
    /// them. The whole operation happens in one critical section.
    pub fn apply_optimistic(
        &self,
        scope: &KeyScope,
        mut edit: impl FnMut(&QueryKey, &mut QueryData) -> bool,
    ) -> Vec<CacheEntry> {
        let mut state = self.lock();
        let mut snapshot = Vec::new();
        for (key, slot) in state.matching_mut(scope) {
            let cancelled = slot.supersede();
            snapshot.push(slot.snapshot(key));
            let edited = slot.data.as_mut().is_some_and(|data| edit(key, data));
            if cancelled || edited {
                slot.publish();
            }
        }
        snapshot
    }

    /// Apply a commit-time edit to every entry in `scope` holding data.
    /// Returns the number of entries changed.
    pub fn update(
        &self,
        scope: &KeyScope,
        mut edit: impl FnMut(&QueryKey, &mut QueryData) -> bool,
    ) -> usize {
        let mut state = self.lock();
        let mut changed = 0;
        for (key, slot) in state.matching_mut(scope) {
            if slot.data.as_mut().is_some_and(|data| edit(key, data)) {
                slot.publish();
                changed += 1;
            }
        }
        changed
    }

    /// Mark every entry in `scope` stale.
    ///
    /// Observed entries with a registered, enabled fetch are queued for
    /// refetch; the rest refetch on their next read. Returns the number of
    /// entries marked.
    pub fn invalidate(&self, scope: &KeyScope) -> usize {
        let mut state = self.lock();
        let mut marked = 0;
        let mut scheduled = Vec::new();
        for (key, slot) in state.matching_mut(scope) {
            slot.invalidated = true;
            marked += 1;
            let refetchable = slot
                .fetcher
                .as_ref()
                .is_some_and(|fetch| fetch.options.enabled);
            if refetchable && slot.publisher.receiver_count() > 0 {
                scheduled.push(key.clone());
            }
        }
        let queued = !scheduled.is_empty();
        state.pending_refetch.extend(scheduled);
        drop(state);
        if queued {
            self.refetch_signal.notify_one();
        }
        marked
    }

    /// Whether `key` is queued for refetch.
    pub fn is_refetch_pending(&self, key: &QueryKey) -> bool {
        self.lock().pending_refetch.contains(key)
    }

    /// Run every queued refetch once, concurrently. Returns how many ran.
    pub async fn refetch_pending(&self) -> usize {
        let jobs: Vec<(QueryKey, RegisteredFetch)> = {
            let mut state = self.lock();
            let keys: Vec<QueryKey> = state.pending_refetch.drain().collect();
            keys.into_iter()
                .filter_map(|key| {
                    let fetch = state.slots.get(&key)?.fetcher.clone()?;
                    Some((key, fetch))
                })
                .collect()
        };
        if jobs.is_empty() {
            return 0;
        }
        debug!(count = jobs.len(), "refetching invalidated queries");
        let runs = jobs.into_iter().map(|(key, fetch)| async move {
            let outcome = self
                .fetch(key.clone(), fetch.query_fn, fetch.options.retry)
                .await;
            if let Some(err) = outcome.error.filter(|_| outcome.status == QueryStatus::Error) {
                warn!(%key, error = %err, "background refetch failed");
            }
        });
        let results = join_all(runs).await;
        results.len()
    }

    /// Drive queued refetches for as long as the cache lives.
    pub async fn run_background_refetches(self: Arc<Self>) {
        loop {
            self.refetch_signal.notified().await;
            self.refetch_pending().await;
        }
    }

    /// Register an observer for `key`, creating an idle entry if needed.
    pub fn subscribe(&self, key: QueryKey) -> QueryObserver {
        let mut state = self.lock();
        let receiver = state.slot_mut(&key).publisher.subscribe();
        QueryObserver::new(key, receiver)
    }

    /// Number of live observers for `key`.
    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.lock()
            .slots
            .get(key)
            .map_or(0, |slot| slot.publisher.receiver_count())
    }
}
