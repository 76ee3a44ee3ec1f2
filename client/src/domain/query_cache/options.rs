//! Per-query fetch policy.

use std::time::Duration;

/// Retries applied when a query does not override them.
pub const DEFAULT_QUERY_RETRIES: u32 = 2;

/// Fetch policy declared by the module that owns a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Disabled queries never touch the network.
    pub enabled: bool,
    /// How long stored data is served without refetching.
    pub stale_time: Duration,
    /// Extra attempts after the first failure.
    pub retry: u32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: Duration::ZERO,
            retry: DEFAULT_QUERY_RETRIES,
        }
    }
}

impl QueryOptions {
    /// Set whether the query may fetch.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the freshness window.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Set the retry budget.
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }
}
