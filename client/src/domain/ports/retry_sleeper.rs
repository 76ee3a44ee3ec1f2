//! Port used to wait between query retry attempts.

use std::time::Duration;

use async_trait::async_trait;

/// Suspends the calling task between retries.
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use carpool::domain::ports::RetrySleeper;
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
/// #[derive(Default)]
/// struct CountingSleeper {
///     calls: Arc<Mutex<u32>>,
/// }
/// #[async_trait]
/// impl RetrySleeper for CountingSleeper {
///     async fn sleep(&self, _duration: Duration) {
///         *self.calls.lock().expect("calls mutex") += 1;
///     }
/// }
/// # async fn demo() {
/// let sleeper = CountingSleeper::default();
/// sleeper.sleep(Duration::from_millis(25)).await;
/// assert_eq!(*sleeper.calls.lock().expect("calls mutex"), 1);
/// # }
/// ```
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}
