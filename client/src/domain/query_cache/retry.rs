//! Backoff between query retry attempts.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::RetrySleeper;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt` (zero-based): `min(1s * 2^attempt, 30s)`.
pub fn retry_delay(attempt: u32) -> Duration {
    let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
    BASE_DELAY.saturating_mul(factor).min(MAX_DELAY)
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(4, 16)]
    #[case(5, 30)]
    #[case(40, 30)]
    fn delay_doubles_up_to_the_cap(#[case] attempt: u32, #[case] seconds: u64) {
        assert_eq!(retry_delay(attempt), Duration::from_secs(seconds));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_waits_on_the_runtime_clock() {
        let started = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(2)).await;
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
